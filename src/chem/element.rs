#[derive(Debug, PartialEq)]
pub struct Element {
    pub number: u8,
    pub symbol: &'static str,
    /// Standard atomic weight.
    pub mass: f64,
    /// Default valences, ascending. Empty means "no implicit hydrogens".
    pub valences: &'static [u8],
    /// Single-bond covalent radius in angstrom.
    pub covalent_radius: f64,
    /// Member of the SMILES organic subset (may appear without brackets).
    pub organic: bool,
}

const fn el(
    number: u8,
    symbol: &'static str,
    mass: f64,
    valences: &'static [u8],
    covalent_radius: f64,
    organic: bool,
) -> Element {
    Element { number, symbol, mass, valences, covalent_radius, organic }
}

pub static ELEMENTS: &[Element] = &[
    el(1, "H", 1.008, &[1], 0.31, false),
    el(2, "He", 4.003, &[], 0.28, false),
    el(3, "Li", 6.941, &[1], 1.28, false),
    el(4, "Be", 9.012, &[2], 0.96, false),
    el(5, "B", 10.812, &[3], 0.84, true),
    el(6, "C", 12.011, &[4], 0.76, true),
    el(7, "N", 14.007, &[3, 5], 0.71, true),
    el(8, "O", 15.999, &[2], 0.66, true),
    el(9, "F", 18.998, &[1], 0.57, true),
    el(10, "Ne", 20.180, &[], 0.58, false),
    el(11, "Na", 22.990, &[1], 1.66, false),
    el(12, "Mg", 24.305, &[2], 1.41, false),
    el(13, "Al", 26.982, &[3], 1.21, false),
    el(14, "Si", 28.086, &[4], 1.11, false),
    el(15, "P", 30.974, &[3, 5], 1.07, true),
    el(16, "S", 32.067, &[2, 4, 6], 1.05, true),
    el(17, "Cl", 35.453, &[1], 1.02, true),
    el(18, "Ar", 39.948, &[], 1.06, false),
    el(19, "K", 39.098, &[1], 2.03, false),
    el(20, "Ca", 40.078, &[2], 1.76, false),
    el(26, "Fe", 55.845, &[], 1.32, false),
    el(29, "Cu", 63.546, &[], 1.32, false),
    el(30, "Zn", 65.390, &[], 1.22, false),
    el(32, "Ge", 72.610, &[4], 1.20, false),
    el(33, "As", 74.922, &[3, 5], 1.19, false),
    el(34, "Se", 78.960, &[2, 4, 6], 1.20, false),
    el(35, "Br", 79.904, &[1], 1.20, true),
    el(50, "Sn", 118.710, &[], 1.39, false),
    el(52, "Te", 127.600, &[2, 4, 6], 1.38, false),
    el(53, "I", 126.904, &[1], 1.39, true),
];

pub fn lookup(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

pub fn hydrogen() -> &'static Element {
    &ELEMENTS[0]
}

impl Element {
    pub fn is(&self, symbol: &str) -> bool {
        self.symbol == symbol
    }

    /// Atoms that contribute a lone pair (not a hydrogen) to an aromatic ring.
    pub fn is_aromatic_donor(&self) -> bool {
        matches!(self.symbol, "O" | "S" | "Se" | "Te")
    }

    pub fn is_hetero(&self) -> bool {
        !matches!(self.symbol, "C" | "H")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup("Cl").map(|e| e.number), Some(17));
        assert!(lookup("Xx").is_none());
        assert_eq!(hydrogen().symbol, "H");
    }

    #[test]
    fn test_organic_subset_membership() {
        let organic: Vec<&str> = ELEMENTS.iter().filter(|e| e.organic).map(|e| e.symbol).collect();
        assert_eq!(organic, vec!["B", "C", "N", "O", "F", "P", "S", "Cl", "Br", "I"]);
    }
}
