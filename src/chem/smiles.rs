use std::collections::HashMap;

use super::element;
use super::molecule::{Atom, BondOrder, Molecule};
use super::ChemError;

/// Parses a SMILES string into a molecule with implicit hydrogens assigned
/// and aromaticity perceived, so Kekulé and aromatic input agree.
pub fn parse_smiles(input: &str) -> Result<Molecule, ChemError> {
    let mut parser = Parser::new(input);
    parser.run()?;
    let Parser { mut mol, .. } = parser;
    mol.assign_implicit_hydrogens()
        .and_then(|_| mol.kekulize())
        .map_err(|reason| ChemError::Parse {
            position: input.len(),
            reason,
        })?;
    mol.perceive_aromaticity();
    Ok(mol)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    mol: Molecule,
    prev: Option<usize>,
    branches: Vec<Option<usize>>,
    pending_bond: Option<BondOrder>,
    /// Open ring closures: number -> (atom, bond written at the opening).
    rings: HashMap<u16, (usize, Option<BondOrder>)>,
    branch_needs_atom: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            src: input.as_bytes(),
            pos: 0,
            mol: Molecule::new(),
            prev: None,
            branches: Vec::new(),
            pending_bond: None,
            rings: HashMap::new(),
            branch_needs_atom: false,
        }
    }

    fn error(&self, reason: impl Into<String>) -> ChemError {
        ChemError::Parse { position: self.pos, reason: reason.into() }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn run(&mut self) -> Result<(), ChemError> {
        if self.src.is_empty() {
            return Err(self.error("empty input"));
        }

        while let Some(c) = self.peek() {
            match c {
                b'(' => {
                    if self.prev.is_none() {
                        return Err(self.error("branch without a preceding atom"));
                    }
                    if self.pending_bond.is_some() {
                        return Err(self.error("bond symbol before branch"));
                    }
                    self.branches.push(self.prev);
                    self.branch_needs_atom = true;
                    self.pos += 1;
                }
                b')' => {
                    if self.branch_needs_atom || self.pending_bond.is_some() {
                        return Err(self.error("empty or dangling branch"));
                    }
                    let Some(restored) = self.branches.pop() else {
                        return Err(self.error("unbalanced ')'"));
                    };
                    self.prev = restored;
                    self.pos += 1;
                }
                b'.' => {
                    if self.pending_bond.is_some() || self.branch_needs_atom || self.prev.is_none() {
                        return Err(self.error("misplaced '.'"));
                    }
                    if self.pos + 1 == self.src.len() {
                        return Err(self.error("trailing '.'"));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b'$' | b':' | b'/' | b'\\' => {
                    if self.prev.is_none() {
                        return Err(self.error("bond without a preceding atom"));
                    }
                    if self.pending_bond.is_some() {
                        return Err(self.error("two consecutive bond symbols"));
                    }
                    self.pending_bond = Some(match c {
                        b'=' => BondOrder::Double,
                        b'#' => BondOrder::Triple,
                        b'$' => BondOrder::Quadruple,
                        b':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    });
                    self.pos += 1;
                }
                b'0'..=b'9' | b'%' => self.ring_closure()?,
                b'[' => {
                    let atom = self.bracket_atom()?;
                    self.push_atom(atom)?;
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.push_atom(atom)?;
                }
            }
        }

        if self.pending_bond.is_some() {
            return Err(self.error("trailing bond symbol"));
        }
        if !self.branches.is_empty() {
            return Err(self.error("unclosed branch"));
        }
        if let Some(number) = self.rings.keys().min() {
            return Err(self.error(format!("unclosed ring {}", number)));
        }
        if self.mol.atom_count() == 0 {
            return Err(self.error("no atoms"));
        }
        Ok(())
    }

    fn default_order(&self, a: usize, b: usize) -> BondOrder {
        if self.mol.atoms[a].aromatic && self.mol.atoms[b].aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn push_atom(&mut self, atom: Atom) -> Result<(), ChemError> {
        let index = self.mol.add_atom(atom);
        if let Some(prev) = self.prev {
            let order = self
                .pending_bond
                .take()
                .unwrap_or_else(|| self.default_order(prev, index));
            self.mol.add_bond(prev, index, order).map_err(|e| self.error(e))?;
        }
        self.prev = Some(index);
        self.branch_needs_atom = false;
        Ok(())
    }

    fn ring_closure(&mut self) -> Result<(), ChemError> {
        let Some(current) = self.prev else {
            return Err(self.error("ring closure without a preceding atom"));
        };
        if self.branch_needs_atom {
            return Err(self.error("ring closure at start of branch"));
        }

        let number = if self.peek() == Some(b'%') {
            let digits = self.src.get(self.pos + 1..self.pos + 3).unwrap_or_default();
            if digits.len() != 2 || !digits.iter().all(u8::is_ascii_digit) {
                return Err(self.error("'%' must be followed by two digits"));
            }
            let n = u16::from(digits[0] - b'0') * 10 + u16::from(digits[1] - b'0');
            self.pos += 3;
            n
        } else {
            let n = u16::from(self.src[self.pos] - b'0');
            self.pos += 1;
            n
        };

        let written = self.pending_bond.take();
        match self.rings.remove(&number) {
            Some((opening, opened_with)) => {
                let order = match (opened_with, written) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(self.error(format!("conflicting bonds on ring {}", number)));
                    }
                    (Some(a), _) => a,
                    (None, Some(b)) => b,
                    (None, None) => self.default_order(opening, current),
                };
                self.mol.add_bond(opening, current, order).map_err(|e| self.error(e))?;
            }
            None => {
                self.rings.insert(number, (current, written));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, ChemError> {
        let c = self.src[self.pos];
        let next = self.src.get(self.pos + 1).copied();
        let (symbol, aromatic, width) = match (c, next) {
            (b'*', _) => ("*", false, 1),
            (b'C', Some(b'l')) => ("Cl", false, 2),
            (b'B', Some(b'r')) => ("Br", false, 2),
            (b'B', _) => ("B", false, 1),
            (b'C', _) => ("C", false, 1),
            (b'N', _) => ("N", false, 1),
            (b'O', _) => ("O", false, 1),
            (b'P', _) => ("P", false, 1),
            (b'S', _) => ("S", false, 1),
            (b'F', _) => ("F", false, 1),
            (b'I', _) => ("I", false, 1),
            (b'b', _) => ("B", true, 1),
            (b'c', _) => ("C", true, 1),
            (b'n', _) => ("N", true, 1),
            (b'o', _) => ("O", true, 1),
            (b'p', _) => ("P", true, 1),
            (b's', _) => ("S", true, 1),
            _ => {
                return Err(self.error(format!("unexpected character '{}'", char::from(c))));
            }
        };
        self.pos += width;

        if symbol == "*" {
            return Ok(Atom::new(None));
        }
        let mut atom = Atom::new(element::lookup(symbol));
        atom.aromatic = aromatic;
        Ok(atom)
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&self.src[start..self.pos]).ok()?.parse().ok()
    }

    fn bracket_atom(&mut self) -> Result<Atom, ChemError> {
        self.pos += 1;

        let isotope = match self.number() {
            Some(n) => Some(u16::try_from(n).map_err(|_| self.error("isotope out of range"))?),
            None => None,
        };

        let mut atom = self.bracket_symbol()?;
        atom.bracket = true;
        atom.isotope = isotope;

        // chirality is accepted and ignored
        if self.peek() == Some(b'@') {
            while self.peek() == Some(b'@') {
                self.pos += 1;
            }
            while self.peek().map(|c| c.is_ascii_uppercase() && c != b'H').unwrap_or(false) {
                self.pos += 1;
                self.number();
            }
        }

        if self.peek() == Some(b'H') {
            self.pos += 1;
            let count = self.number().unwrap_or(1);
            atom.explicit_h = u8::try_from(count).map_err(|_| self.error("hydrogen count out of range"))?;
        }

        if let Some(sign @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let unit: i32 = if sign == b'+' { 1 } else { -1 };
            let magnitude = match self.number() {
                Some(n) => n as i32,
                None => {
                    let mut n = 1;
                    while self.peek() == Some(sign) {
                        self.pos += 1;
                        n += 1;
                    }
                    n
                }
            };
            atom.charge = i8::try_from(unit * magnitude).map_err(|_| self.error("charge out of range"))?;
        }

        if self.peek() == Some(b':') {
            self.pos += 1;
            if self.number().is_none() {
                return Err(self.error("atom class without a number"));
            }
        }

        if self.peek() != Some(b']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(atom)
    }

    fn bracket_symbol(&mut self) -> Result<Atom, ChemError> {
        let Some(c) = self.peek() else {
            return Err(self.error("unterminated bracket atom"));
        };

        if c == b'*' {
            self.pos += 1;
            return Ok(Atom::new(None));
        }

        if c.is_ascii_lowercase() {
            // aromatic: se, as, te, or a single letter
            for two in ["se", "as", "te"] {
                if self.src[self.pos..].starts_with(two.as_bytes()) {
                    self.pos += 2;
                    return self.aromatic_atom(two);
                }
            }
            self.pos += 1;
            let one = char::from(c).to_string();
            return self.aromatic_atom(&one);
        }

        if !c.is_ascii_uppercase() {
            return Err(self.error("expected an element symbol"));
        }

        if let Some(second) = self.src.get(self.pos + 1).filter(|s| s.is_ascii_lowercase()) {
            let two: String = [char::from(c), char::from(*second)].iter().collect();
            if let Some(e) = element::lookup(&two) {
                self.pos += 2;
                return Ok(Atom::new(Some(e)));
            }
        }

        let one = char::from(c).to_string();
        match element::lookup(&one) {
            Some(e) => {
                self.pos += 1;
                Ok(Atom::new(Some(e)))
            }
            None => Err(self.error(format!("unknown element '{}'", one))),
        }
    }

    fn aromatic_atom(&self, lower: &str) -> Result<Atom, ChemError> {
        let mut chars = lower.chars();
        let symbol: String = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .into_iter()
            .chain(chars)
            .collect();
        match element::lookup(&symbol) {
            Some(e) if matches!(e.symbol, "B" | "C" | "N" | "O" | "P" | "S" | "Se" | "As" | "Te") => {
                let mut atom = Atom::new(Some(e));
                atom.aromatic = true;
                Ok(atom)
            }
            _ => Err(self.error(format!("'{}' cannot be aromatic", lower))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heavy_and_h(smiles: &str) -> (usize, u32) {
        let mol = parse_smiles(smiles).unwrap();
        let h = mol.atoms.iter().map(|a| a.total_h() as u32).sum();
        (mol.atom_count(), h)
    }

    #[test]
    fn test_simple_chains() {
        assert_eq!(heavy_and_h("CCO"), (3, 6));
        assert_eq!(heavy_and_h("C=C"), (2, 4));
        assert_eq!(heavy_and_h("C#N"), (2, 1));
        assert_eq!(heavy_and_h("ClCBr"), (3, 2));
    }

    #[test]
    fn test_branches_and_rings() {
        assert_eq!(heavy_and_h("CC(C)(C)C"), (5, 12));
        assert_eq!(heavy_and_h("C1CCCCC1"), (6, 12));
        assert_eq!(heavy_and_h("C%10CC%10"), (3, 6));
    }

    #[test]
    fn test_aromatic_rings() {
        assert_eq!(heavy_and_h("c1ccccc1"), (6, 6));
        assert_eq!(heavy_and_h("c1ccncc1"), (6, 5));
        assert_eq!(heavy_and_h("c1cc[nH]c1"), (5, 5));
        assert_eq!(heavy_and_h("c1ccsc1"), (5, 4));
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
    }

    #[test]
    fn test_kekule_benzene() {
        let mol = parse_smiles("C1=CC=CC=C1").unwrap();
        assert_eq!(mol.atom_count(), 6);
        assert_eq!(mol.bonds.len(), 6);
        assert!(mol.atoms.iter().all(|a| a.aromatic));
        assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
    }

    #[test]
    fn test_open_chain_double_bonds_untouched() {
        let mol = parse_smiles("C=CC=C").unwrap();
        assert!(mol.atoms.iter().all(|a| !a.aromatic));
        assert_eq!(mol.bonds.iter().filter(|b| b.order == BondOrder::Double).count(), 2);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse_smiles("[NH4+]").unwrap();
        assert_eq!(mol.atoms[0].charge, 1);
        assert_eq!(mol.atoms[0].total_h(), 4);

        let mol = parse_smiles("CC(=O)[O-]").unwrap();
        assert_eq!(mol.atoms[3].charge, -1);
        assert_eq!(mol.atoms[3].total_h(), 0);

        let mol = parse_smiles("[13CH4]").unwrap();
        assert_eq!(mol.atoms[0].isotope, Some(13));

        let mol = parse_smiles("C[C@@H](N)O").unwrap();
        assert_eq!(mol.atoms[1].total_h(), 1);

        let mol = parse_smiles("[Fe+++]").unwrap();
        assert_eq!(mol.atoms[0].charge, 3);
    }

    #[test]
    fn test_wildcard_atom() {
        let mol = parse_smiles("*c1ccccc1").unwrap();
        assert!(mol.has_wildcard());
        assert_eq!(mol.atoms[0].total_h(), 0);
        assert_eq!(mol.atoms[1].total_h(), 0);
    }

    #[test]
    fn test_disconnected_components() {
        let mol = parse_smiles("[Na+].[Cl-]").unwrap();
        assert_eq!(mol.components().len(), 2);
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in [
            "", "garbage", "C1CC", "C(C", "CC)", "C==C", "C(", "()", "[C", "[Xx]", "C(C)(C)(C)(C)C",
            "c1cccc", "cc", "c1cccc1", "=C", "C.", "C%1", "[CH5]",
        ] {
            assert!(parse_smiles(bad).is_err(), "expected {:?} to be rejected", bad);
        }
    }

    #[test]
    fn test_error_reports_position() {
        match parse_smiles("CCx") {
            Err(ChemError::Parse { position, .. }) => assert_eq!(position, 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
