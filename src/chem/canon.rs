use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use super::molecule::{BondOrder, Molecule};

/// Canonical SMILES: atoms ranked by iteratively refined graph invariants,
/// then written by a depth-first walk that always follows the lowest rank.
pub fn canonical_smiles(mol: &Molecule) -> String {
    let ranks = canonical_ranks(mol);

    let mut components = mol.components();
    for component in &mut components {
        component.sort_by_key(|a| ranks[*a]);
    }
    components.sort_by_key(|c| c.first().map(|a| ranks[*a]).unwrap_or(usize::MAX));

    let mut writer = Writer::new(mol, &ranks);
    let parts: Vec<String> = components
        .iter()
        .filter_map(|c| c.first())
        .map(|start| writer.component(*start))
        .collect();
    parts.join(".")
}

/// Fixed-width hashed key of a canonical SMILES, laid out as
/// `XXXXXXXXXXXXXX-XXXXXXXXXX-N`.
pub fn structure_key(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let letters: String = digest.iter().take(24).map(|b| char::from(b'A' + b % 26)).collect();
    format!("{}-{}-N", &letters[..14], &letters[14..24])
}

fn densify<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let distinct: Vec<K> = keys.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    keys.iter()
        .map(|k| distinct.binary_search(k).unwrap_or(0))
        .collect()
}

fn bond_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Quadruple => 4,
        BondOrder::Aromatic => 5,
    }
}

fn distinct_count(ranks: &[usize]) -> usize {
    ranks.iter().collect::<BTreeSet<_>>().len()
}

fn refine(mol: &Molecule, mut ranks: Vec<usize>) -> Vec<usize> {
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = (0..mol.atom_count())
            .map(|i| {
                let mut around: Vec<(usize, u8)> = mol
                    .neighbors(i)
                    .iter()
                    .map(|(n, b)| (ranks[*n], bond_code(mol.bonds[*b].order)))
                    .collect();
                around.sort_unstable();
                (ranks[i], around)
            })
            .collect();
        let next = densify(&keys);
        if distinct_count(&next) == distinct_count(&ranks) {
            return next;
        }
        ranks = next;
    }
}

pub(crate) fn canonical_ranks(mol: &Molecule) -> Vec<usize> {
    let invariants: Vec<_> = (0..mol.atom_count())
        .map(|i| {
            let a = &mol.atoms[i];
            (
                a.atomic_number(),
                a.isotope.unwrap_or(0),
                a.aromatic,
                a.charge,
                a.total_h(),
                mol.degree(i),
                mol.is_in_ring(i),
            )
        })
        .collect();

    let mut ranks = refine(mol, densify(&invariants));

    // Break remaining ties one atom at a time. Symmetric atoms give the same
    // string whichever is picked.
    while distinct_count(&ranks) < ranks.len() {
        let mut seen = BTreeSet::new();
        let tied = ranks
            .iter()
            .copied()
            .filter(|r| !seen.insert(*r))
            .min()
            .unwrap_or(0);
        let Some(pick) = ranks.iter().position(|r| *r == tied) else { break };
        let doubled: Vec<usize> = ranks
            .iter()
            .enumerate()
            .map(|(i, r)| if i == pick { r * 2 } else { r * 2 + 1 })
            .collect();
        ranks = refine(mol, densify(&doubled));
    }
    ranks
}

struct Writer<'a> {
    mol: &'a Molecule,
    ranks: &'a [usize],
    visited: Vec<bool>,
    used_bond: Vec<bool>,
    children: Vec<Vec<(usize, usize)>>,
    ring_opens: Vec<Vec<usize>>,
    ring_closes: Vec<Vec<usize>>,
    digits: Vec<Option<usize>>,
    bond_digit: Vec<Option<usize>>,
}

impl<'a> Writer<'a> {
    fn new(mol: &'a Molecule, ranks: &'a [usize]) -> Self {
        let n = mol.atom_count();
        Self {
            mol,
            ranks,
            visited: vec![false; n],
            used_bond: vec![false; mol.bonds.len()],
            children: vec![Vec::new(); n],
            ring_opens: vec![Vec::new(); n],
            ring_closes: vec![Vec::new(); n],
            digits: Vec::new(),
            bond_digit: vec![None; mol.bonds.len()],
        }
    }

    fn component(&mut self, start: usize) -> String {
        self.walk(start, None);
        let mut out = String::new();
        self.emit(start, &mut out);
        out
    }

    fn walk(&mut self, atom: usize, via: Option<usize>) {
        self.visited[atom] = true;
        let mut around: Vec<(usize, usize)> = self.mol.neighbors(atom).to_vec();
        around.sort_by_key(|(n, _)| self.ranks[*n]);
        for (next, bond) in around {
            if Some(bond) == via || self.used_bond[bond] {
                continue;
            }
            self.used_bond[bond] = true;
            if self.visited[next] {
                self.ring_opens[next].push(bond);
                self.ring_closes[atom].push(bond);
            } else {
                self.children[atom].push((next, bond));
                self.walk(next, Some(bond));
            }
        }
    }

    fn emit(&mut self, atom: usize, out: &mut String) {
        out.push_str(&atom_token(self.mol, atom));

        for bond in self.ring_closes[atom].clone() {
            if let Some(digit) = self.bond_digit[bond] {
                out.push_str(&digit_token(digit));
                self.digits[digit] = None;
            }
        }
        for bond in self.ring_opens[atom].clone() {
            let digit = self.alloc_digit(bond);
            out.push_str(bond_token(self.mol, bond));
            out.push_str(&digit_token(digit));
        }

        let children = self.children[atom].clone();
        let last = children.len().saturating_sub(1);
        for (k, (child, bond)) in children.into_iter().enumerate() {
            let branch = k != last;
            if branch {
                out.push('(');
            }
            out.push_str(bond_token(self.mol, bond));
            self.emit(child, out);
            if branch {
                out.push(')');
            }
        }
    }

    fn alloc_digit(&mut self, bond: usize) -> usize {
        let slot = match self.digits.iter().skip(1).position(Option::is_none) {
            Some(free) => free + 1,
            None => {
                if self.digits.is_empty() {
                    self.digits.push(None);
                }
                self.digits.push(None);
                self.digits.len() - 1
            }
        };
        self.digits[slot] = Some(bond);
        self.bond_digit[bond] = Some(slot);
        slot
    }
}

fn digit_token(digit: usize) -> String {
    if digit < 10 {
        digit.to_string()
    } else {
        format!("%{:02}", digit)
    }
}

fn bond_token(mol: &Molecule, bond: usize) -> &'static str {
    let b = &mol.bonds[bond];
    let both_aromatic = mol.atoms[b.a].aromatic && mol.atoms[b.b].aromatic;
    match b.order {
        BondOrder::Single if both_aromatic => "-",
        BondOrder::Single => "",
        BondOrder::Double => "=",
        BondOrder::Triple => "#",
        BondOrder::Quadruple => "$",
        BondOrder::Aromatic if both_aromatic => "",
        BondOrder::Aromatic => ":",
    }
}

fn atom_token(mol: &Molecule, atom: usize) -> String {
    let a = &mol.atoms[atom];
    let symbol = if a.aromatic {
        a.symbol().to_ascii_lowercase()
    } else {
        a.symbol().to_string()
    };

    let plain = a.charge == 0
        && a.isotope.is_none()
        && mol.default_implicit_h(atom) == Some(a.total_h());
    if plain {
        return symbol;
    }

    let mut token = String::from("[");
    if let Some(isotope) = a.isotope {
        token.push_str(&isotope.to_string());
    }
    token.push_str(&symbol);
    match a.total_h() {
        0 => {}
        1 => token.push('H'),
        n => token.push_str(&format!("H{}", n)),
    }
    match a.charge {
        0 => {}
        1 => token.push('+'),
        -1 => token.push('-'),
        c if c > 0 => token.push_str(&format!("+{}", c)),
        c => token.push_str(&format!("-{}", -c)),
    }
    token.push(']');
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::smiles::parse_smiles;

    fn canon(smiles: &str) -> String {
        canonical_smiles(&parse_smiles(smiles).unwrap())
    }

    #[test]
    fn test_same_molecule_different_input_order() {
        assert_eq!(canon("CCO"), canon("OCC"));
        assert_eq!(canon("c1ccccc1O"), canon("Oc1ccccc1"));
        assert_eq!(canon("CC(=O)O"), canon("OC(C)=O"));
        assert_eq!(canon("C1CCCCC1N"), canon("NC1CCCCC1"));
    }

    #[test]
    fn test_canonical_output_reparses_to_same_string() {
        for smiles in ["CCO", "c1ccc2ccccc2c1", "C[NH3+].[Cl-]", "CC(C)(C)c1ccncc1", "*CCO", "C1CC2CCC1C2"] {
            let first = canon(smiles);
            assert_eq!(canon(&first), first, "unstable canonical form for {}", smiles);
        }
    }

    #[test]
    fn test_kekule_and_aromatic_spellings_agree() {
        assert_eq!(canon("C1=CC=CC=C1"), "c1ccccc1");
        assert_eq!(canon("c1ccccc1"), "c1ccccc1");
        assert_eq!(canon("C1=CC=NC=C1"), canon("c1ccncc1"));
        assert_eq!(canon("C1=CNC=C1"), canon("c1cc[nH]c1"));
        assert_eq!(canon("CC1=CC=CC=C1O"), canon("Oc1ccccc1C"));
        assert_eq!(canon("C1=CC=C2C=CC=CC2=C1"), canon("c1ccc2ccccc2c1"));
    }

    #[test]
    fn test_distinguishes_isomers() {
        assert_ne!(canon("CCO"), canon("COC"));
        assert_ne!(canon("Cc1ccccc1C"), canon("Cc1cccc(C)c1"));
    }

    #[test]
    fn test_bracket_tokens() {
        assert!(canon("[NH4+]").contains("[NH4+]"));
        assert!(canon("c1cc[nH]c1").contains("[nH]"));
        assert!(canon("[13CH4]").contains("[13CH4]"));
    }

    #[test]
    fn test_structure_key_layout() {
        let key = structure_key(&canon("CCO"));
        assert_eq!(key.len(), 27);
        let blocks: Vec<&str> = key.split('-').collect();
        assert_eq!(blocks.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![14, 10, 1]);
        assert!(key.chars().all(|c| c == '-' || c.is_ascii_uppercase()));
        assert_eq!(key, structure_key(&canon("OCC")));
    }
}
