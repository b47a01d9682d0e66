use super::element::{self, Element};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to an atom's valence. Aromatic bonds count once here;
    /// the shared pi electron is accounted for per atom.
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    /// Bond type code used by MDL molfiles.
    pub fn mdl_code(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 8,
            BondOrder::Aromatic => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Atom {
    /// `None` is the `*` wildcard (an unresolved substituent).
    pub element: Option<&'static Element>,
    pub aromatic: bool,
    pub charge: i8,
    pub isotope: Option<u16>,
    /// Written in brackets; bracket atoms never get implicit hydrogens.
    pub bracket: bool,
    pub explicit_h: u8,
    pub implicit_h: u8,
}

impl Atom {
    pub fn new(element: Option<&'static Element>) -> Self {
        Self {
            element,
            aromatic: false,
            charge: 0,
            isotope: None,
            bracket: false,
            explicit_h: 0,
            implicit_h: 0,
        }
    }

    pub fn total_h(&self) -> u8 {
        self.explicit_h + self.implicit_h
    }

    pub fn is_wildcard(&self) -> bool {
        self.element.is_none()
    }

    pub fn is(&self, symbol: &str) -> bool {
        self.element.map(|e| e.is(symbol)).unwrap_or(false)
    }

    pub fn symbol(&self) -> &'static str {
        self.element.map(|e| e.symbol).unwrap_or("*")
    }

    pub fn atomic_number(&self) -> u8 {
        self.element.map(|e| e.number).unwrap_or(0)
    }

    pub fn mass(&self) -> f64 {
        match (self.isotope, self.element) {
            (Some(isotope), Some(_)) => isotope as f64,
            (None, Some(e)) => e.mass,
            (_, None) => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.a == atom { self.b } else { self.a }
    }
}

/// Molecular graph. Hydrogens are implicit counts on their heavy atom unless
/// they were written as explicit `[H]` atoms.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) -> Result<usize, String> {
        if a == b {
            return Err("atom bonded to itself".to_string());
        }
        if self.bond_between(a, b).is_some() {
            return Err(format!("duplicate bond between atoms {} and {}", a + 1, b + 1));
        }
        let index = self.bonds.len();
        self.bonds.push(Bond { a, b, order });
        self.adjacency[a].push((b, index));
        self.adjacency[b].push((a, index));
        Ok(index)
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// `(neighbor, bond index)` pairs.
    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    pub fn heavy_degree(&self, atom: usize) -> usize {
        self.adjacency[atom]
            .iter()
            .filter(|(n, _)| !self.atoms[*n].is("H"))
            .count()
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.adjacency
            .get(a)?
            .iter()
            .find(|(n, _)| *n == b)
            .map(|(_, bond)| &self.bonds[*bond])
    }

    pub fn has_wildcard(&self) -> bool {
        self.atoms.iter().any(Atom::is_wildcard)
    }

    fn bond_valence(&self, atom: usize) -> u8 {
        self.adjacency[atom]
            .iter()
            .map(|(_, b)| self.bonds[*b].order.valence())
            .sum()
    }

    fn is_aromatic_donor(&self, atom: usize) -> bool {
        let a = &self.atoms[atom];
        a.aromatic && a.element.map(|e| e.is_aromatic_donor()).unwrap_or(false)
    }

    /// Hydrogens an unbracketed atom of this kind would carry at this
    /// position, or `None` when the atom cannot be written without brackets.
    pub fn default_implicit_h(&self, atom: usize) -> Option<u8> {
        let a = &self.atoms[atom];
        let element = match a.element {
            Some(e) if e.organic => e,
            Some(_) => return None,
            None => return Some(0),
        };
        if a.aromatic && self.is_aromatic_donor(atom) {
            return Some(0);
        }
        let used = self.bond_valence(atom) + u8::from(a.aromatic);
        if a.aromatic {
            let target = element.valences.first().copied().unwrap_or(0);
            return Some(target.saturating_sub(used));
        }
        Some(
            element
                .valences
                .iter()
                .find(|v| **v >= used)
                .map(|v| v - used)
                .unwrap_or(0),
        )
    }

    /// Fills in implicit hydrogens and rejects chemically impossible graphs.
    pub fn assign_implicit_hydrogens(&mut self) -> Result<(), String> {
        for i in 0..self.atoms.len() {
            let implicit = if self.atoms[i].bracket {
                0
            } else {
                self.default_implicit_h(i).unwrap_or(0)
            };
            self.atoms[i].implicit_h = implicit;
        }

        for i in 0..self.atoms.len() {
            let a = &self.atoms[i];
            let Some(element) = a.element else { continue };
            if a.charge != 0 || element.valences.is_empty() {
                continue;
            }
            let max = element.valences.iter().copied().max().unwrap_or(0);
            let used = self.bond_valence(i) + a.total_h();
            if !a.aromatic && used > max {
                return Err(format!(
                    "{} at atom {} has valence {}, more than allowed {}",
                    element.symbol, i + 1, used, max
                ));
            }
        }

        for i in 0..self.atoms.len() {
            if self.atoms[i].aromatic && !self.is_in_ring(i) {
                return Err(format!("non-ring atom {} marked aromatic", i + 1));
            }
        }
        Ok(())
    }

    /// Whether removing the bond leaves its endpoints connected.
    pub fn is_ring_bond(&self, bond: usize) -> bool {
        let Bond { a, b, .. } = self.bonds[bond];
        let mut seen = vec![false; self.atoms.len()];
        let mut stack = vec![a];
        seen[a] = true;
        while let Some(current) = stack.pop() {
            for (next, via) in &self.adjacency[current] {
                if *via == bond || seen[*next] {
                    continue;
                }
                if *next == b {
                    return true;
                }
                seen[*next] = true;
                stack.push(*next);
            }
        }
        false
    }

    pub fn is_in_ring(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|(_, b)| self.is_ring_bond(*b))
    }

    pub fn in_three_ring(&self, atom: usize) -> bool {
        let nbrs = &self.adjacency[atom];
        nbrs.iter().enumerate().any(|(i, (x, _))| {
            nbrs[i + 1..].iter().any(|(y, _)| self.bond_between(*x, *y).is_some())
        })
    }

    /// Connected components as lists of atom indices, in order of first atom.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.atoms.len()];
        let mut components = Vec::new();
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(current) = stack.pop() {
                component.push(current);
                for (next, _) in &self.adjacency[current] {
                    if !seen[*next] {
                        seen[*next] = true;
                        stack.push(*next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// Copy of the molecule with every hydrogen as an explicit atom.
    pub fn with_explicit_hydrogens(&self) -> Molecule {
        let mut mol = Molecule::new();
        for atom in &self.atoms {
            let mut copy = atom.clone();
            copy.explicit_h = 0;
            copy.implicit_h = 0;
            copy.bracket = true;
            mol.add_atom(copy);
        }
        for bond in &self.bonds {
            // indices are unchanged, the original graph was already valid
            let _ = mol.add_bond(bond.a, bond.b, bond.order);
        }
        for (i, atom) in self.atoms.iter().enumerate() {
            for _ in 0..atom.total_h() {
                let mut h = Atom::new(Some(element::hydrogen()));
                h.bracket = true;
                let index = mol.add_atom(h);
                let _ = mol.add_bond(i, index, BondOrder::Single);
            }
        }
        mol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carbon() -> Atom {
        Atom::new(element::lookup("C"))
    }

    #[test]
    fn test_duplicate_and_self_bonds_rejected() {
        let mut mol = Molecule::new();
        let a = mol.add_atom(carbon());
        let b = mol.add_atom(carbon());
        assert!(mol.add_bond(a, b, BondOrder::Single).is_ok());
        assert!(mol.add_bond(b, a, BondOrder::Double).is_err());
        assert!(mol.add_bond(a, a, BondOrder::Single).is_err());
    }

    #[test]
    fn test_implicit_hydrogens_for_ethene() {
        let mut mol = Molecule::new();
        let a = mol.add_atom(carbon());
        let b = mol.add_atom(carbon());
        mol.add_bond(a, b, BondOrder::Double).unwrap();
        mol.assign_implicit_hydrogens().unwrap();
        assert_eq!(mol.atoms[a].implicit_h, 2);
        assert_eq!(mol.atoms[b].implicit_h, 2);
    }

    #[test]
    fn test_pentavalent_carbon_rejected() {
        let mut mol = Molecule::new();
        let center = mol.add_atom(carbon());
        for _ in 0..5 {
            let n = mol.add_atom(carbon());
            mol.add_bond(center, n, BondOrder::Single).unwrap();
        }
        assert!(mol.assign_implicit_hydrogens().is_err());
    }

    #[test]
    fn test_ring_detection() {
        let mut mol = Molecule::new();
        let atoms: Vec<usize> = (0..3).map(|_| mol.add_atom(carbon())).collect();
        let tail = mol.add_atom(carbon());
        mol.add_bond(atoms[0], atoms[1], BondOrder::Single).unwrap();
        mol.add_bond(atoms[1], atoms[2], BondOrder::Single).unwrap();
        let closing = mol.add_bond(atoms[2], atoms[0], BondOrder::Single).unwrap();
        let exo = mol.add_bond(atoms[0], tail, BondOrder::Single).unwrap();
        assert!(mol.is_ring_bond(closing));
        assert!(!mol.is_ring_bond(exo));
        assert!(mol.in_three_ring(atoms[1]));
        assert!(!mol.is_in_ring(tail));
    }

    #[test]
    fn test_explicit_hydrogen_copy() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(carbon());
        let o = mol.add_atom(Atom::new(element::lookup("O")));
        mol.add_bond(c, o, BondOrder::Single).unwrap();
        mol.assign_implicit_hydrogens().unwrap();
        let full = mol.with_explicit_hydrogens();
        assert_eq!(full.atom_count(), 6);
        assert_eq!(full.bonds.len(), 5);
        assert!(full.atoms.iter().all(|a| a.total_h() == 0));
    }
}
