//! Kekulization of aromatic input and Hückel ring perception, so that the
//! Kekulé and aromatic spellings of one structure end up as the same graph.

use std::collections::{BTreeSet, VecDeque};

use super::molecule::{Atom, BondOrder, Molecule};

/// Upper bound on matching attempts before a ring system is given up on.
const MATCH_BUDGET: usize = 100_000;

/// Valences an atom may reach once its charge is taken into account.
fn charged_valences(atom: &Atom) -> Vec<u8> {
    let Some(element) = atom.element else {
        return Vec::new();
    };
    let charge = i16::from(atom.charge);
    element
        .valences
        .iter()
        .filter_map(|v| {
            let v = i16::from(*v);
            let adjusted = match element.symbol {
                "B" => v - charge,
                "C" | "Si" | "Ge" => v - charge.abs(),
                _ => v + charge,
            };
            u8::try_from(adjusted).ok()
        })
        .collect()
}

fn used_valence(mol: &Molecule, atom: usize) -> u8 {
    mol.neighbors(atom)
        .iter()
        .map(|(_, b)| mol.bonds[*b].order.valence())
        .sum::<u8>()
        + mol.atoms[atom].total_h()
}

fn bond_index(mol: &Molecule, a: usize, b: usize) -> Option<usize> {
    mol.neighbors(a).iter().find(|(n, _)| *n == b).map(|(_, bond)| *bond)
}

fn is_huckel(electrons: u32) -> bool {
    electrons % 4 == 2
}

impl Molecule {
    /// Replaces aromatic bonds with explicit single and double bonds and
    /// clears the aromatic flags. Fails when some aromatic atom cannot get a
    /// valid valence, which is the case for `c1cccc1` or `c1ccnc1`.
    pub fn kekulize(&mut self) -> Result<(), String> {
        let n = self.atom_count();
        let mut needs_pi = vec![false; n];
        for (i, needs) in needs_pi.iter_mut().enumerate() {
            let atom = &self.atoms[i];
            if !atom.aromatic || atom.is_wildcard() {
                continue;
            }
            let used = used_valence(self, i);
            let spare = charged_valences(atom)
                .into_iter()
                .find(|v| *v >= used)
                .map(|v| v - used);
            match spare {
                Some(0) => {}
                Some(1) => *needs = true,
                _ => {
                    return Err(format!(
                        "aromatic {} at atom {} has no valid valence",
                        atom.symbol(),
                        i + 1
                    ));
                }
            }
        }

        let mut mate = vec![None; n];
        let mut budget = MATCH_BUDGET;
        if !self.match_pi(&needs_pi, &mut mate, &mut budget) {
            return Err("aromatic system cannot be kekulized".to_string());
        }

        for (index, bond) in self.bonds.iter_mut().enumerate() {
            if bond.order == BondOrder::Aromatic {
                bond.order = if mate[bond.a] == Some(index) {
                    BondOrder::Double
                } else {
                    BondOrder::Single
                };
            }
        }
        for atom in &mut self.atoms {
            atom.aromatic = false;
        }
        Ok(())
    }

    /// Pairs every atom that still needs a double bond with an aromatic
    /// neighbor. Most constrained atom first, backtracking on dead ends.
    fn match_pi(&self, needs_pi: &[bool], mate: &mut [Option<usize>], budget: &mut usize) -> bool {
        let mut best: Option<(usize, Vec<(usize, usize)>)> = None;
        for i in 0..self.atom_count() {
            if !needs_pi[i] || mate[i].is_some() {
                continue;
            }
            let options: Vec<(usize, usize)> = self
                .neighbors(i)
                .iter()
                .copied()
                .filter(|(j, b)| {
                    needs_pi[*j] && mate[*j].is_none() && self.bonds[*b].order == BondOrder::Aromatic
                })
                .collect();
            if options.is_empty() {
                return false;
            }
            if best.as_ref().map_or(true, |(_, o)| options.len() < o.len()) {
                best = Some((i, options));
            }
        }

        let Some((i, options)) = best else {
            return true;
        };
        for (j, bond) in options {
            if *budget == 0 {
                return false;
            }
            *budget -= 1;
            mate[i] = Some(bond);
            mate[j] = Some(bond);
            if self.match_pi(needs_pi, mate, budget) {
                return true;
            }
            mate[i] = None;
            mate[j] = None;
        }
        false
    }

    /// Shortest cycle through every ring bond, each ring once, as atom paths
    /// in ring order.
    pub fn small_rings(&self) -> Vec<Vec<usize>> {
        let mut seen = BTreeSet::new();
        let mut rings = Vec::new();
        for bond in 0..self.bonds.len() {
            let Some(path) = self.shortest_path_avoiding(bond) else {
                continue;
            };
            let mut key = path.clone();
            key.sort_unstable();
            if seen.insert(key) {
                rings.push(path);
            }
        }
        rings
    }

    fn shortest_path_avoiding(&self, bond: usize) -> Option<Vec<usize>> {
        let (start, goal) = (self.bonds[bond].a, self.bonds[bond].b);
        let mut parent = vec![None; self.atom_count()];
        let mut seen = vec![false; self.atom_count()];
        let mut queue = VecDeque::from([start]);
        seen[start] = true;

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut path = vec![goal];
                let mut at = goal;
                while let Some(p) = parent[at] {
                    path.push(p);
                    at = p;
                }
                return Some(path);
            }
            for (next, via) in self.neighbors(current) {
                if *via == bond || seen[*next] {
                    continue;
                }
                seen[*next] = true;
                parent[*next] = Some(current);
                queue.push_back(*next);
            }
        }
        None
    }

    /// Electrons an atom gives to a ring's pi system, or `None` when it
    /// cannot sit in an aromatic ring at all.
    fn pi_electrons(&self, atom: usize) -> Option<u32> {
        let a = &self.atoms[atom];
        let element = a.element?;
        let mut ring_double = 0;
        let mut exocyclic_hetero = false;

        for (n, b) in self.neighbors(atom) {
            match self.bonds[*b].order {
                BondOrder::Double if self.is_ring_bond(*b) => ring_double += 1,
                BondOrder::Double => {
                    let to = &self.atoms[*n];
                    if to.is("O") || to.is("N") || to.is("S") {
                        exocyclic_hetero = true;
                    } else {
                        return None;
                    }
                }
                BondOrder::Single => {}
                _ => return None,
            }
        }

        match (ring_double, exocyclic_hetero) {
            (0, true) => return Some(0),
            (1, false) => return Some(1),
            (0, false) => {}
            _ => return None,
        }

        let lone_pair = match element.symbol {
            "N" | "P" | "As" => a.charge <= 0,
            "O" | "S" | "Se" | "Te" => a.charge == 0,
            "C" => a.charge == -1,
            _ => false,
        };
        if lone_pair {
            Some(2)
        } else if (element.is("C") && a.charge == 1) || (element.is("B") && a.charge == 0) {
            Some(0)
        } else {
            None
        }
    }

    /// Marks atoms and bonds of 4n+2 rings aromatic. Single rings are tried
    /// first, then pairs of rings fused on one bond.
    pub fn perceive_aromaticity(&mut self) {
        let rings = self.small_rings();
        let electrons: Vec<Option<u32>> = (0..self.atom_count()).map(|i| self.pi_electrons(i)).collect();
        let count = |atoms: &[usize]| -> Option<u32> { atoms.iter().map(|a| electrons[*a]).sum() };

        let mut marked_atoms = vec![false; self.atom_count()];
        let mut marked_bonds = vec![false; self.bonds.len()];
        let mut mark = |ring: &[usize]| {
            for (k, a) in ring.iter().enumerate() {
                let b = ring[(k + 1) % ring.len()];
                marked_atoms[*a] = true;
                if let Some(index) = bond_index(self, *a, b) {
                    marked_bonds[index] = true;
                }
            }
        };

        let single: Vec<bool> = rings.iter().map(|r| count(r.as_slice()).map_or(false, is_huckel)).collect();
        for (ring, aromatic) in rings.iter().zip(&single) {
            if *aromatic {
                mark(ring.as_slice());
            }
        }

        for (x, first) in rings.iter().enumerate() {
            for (y, second) in rings.iter().enumerate().skip(x + 1) {
                if single[x] && single[y] {
                    continue;
                }
                let shared: Vec<usize> = first.iter().copied().filter(|a| second.contains(a)).collect();
                if shared.len() != 2 || bond_index(self, shared[0], shared[1]).is_none() {
                    continue;
                }
                let union: Vec<usize> = first
                    .iter()
                    .chain(second)
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if count(union.as_slice()).map_or(false, is_huckel) {
                    mark(first.as_slice());
                    mark(second.as_slice());
                }
            }
        }

        for (atom, aromatic) in self.atoms.iter_mut().zip(marked_atoms) {
            atom.aromatic = aromatic;
        }
        for (bond, aromatic) in self.bonds.iter_mut().zip(marked_bonds) {
            if aromatic {
                bond.order = BondOrder::Aromatic;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::chem::molecule::BondOrder;
    use crate::chem::smiles::parse_smiles;

    fn aromatic_atoms(smiles: &str) -> usize {
        parse_smiles(smiles).unwrap().atoms.iter().filter(|a| a.aromatic).count()
    }

    #[test]
    fn test_kekule_and_aromatic_benzene_agree() {
        for smiles in ["C1=CC=CC=C1", "c1ccccc1"] {
            let mol = parse_smiles(smiles).unwrap();
            assert!(mol.atoms.iter().all(|a| a.aromatic && a.total_h() == 1), "{}", smiles);
            assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic), "{}", smiles);
        }
    }

    #[test]
    fn test_heteroaromatic_rings() {
        assert_eq!(aromatic_atoms("C1=CC=NC=C1"), 6);
        assert_eq!(aromatic_atoms("C1=CNC=C1"), 5);
        assert_eq!(aromatic_atoms("C1=COC=C1"), 5);
        assert_eq!(aromatic_atoms("C1=CSC=C1"), 5);
        assert_eq!(aromatic_atoms("C[n+]1ccccc1"), 6);
    }

    #[test]
    fn test_fused_rings() {
        assert_eq!(aromatic_atoms("C1=CC=C2C=CC=CC2=C1"), 10);
        // azulene is only aromatic as a whole, neither ring is on its own
        assert_eq!(aromatic_atoms("c1ccc2cccc2cc1"), 10);
    }

    #[test]
    fn test_pyridone_keeps_exocyclic_double_bond() {
        let mol = parse_smiles("O=C1C=CNC=C1").unwrap();
        assert_eq!(mol.atoms.iter().filter(|a| a.aromatic).count(), 6);
        assert!(!mol.atoms[0].aromatic);
        assert_eq!(mol.bond_between(0, 1).map(|b| b.order), Some(BondOrder::Double));
    }

    #[test]
    fn test_non_aromatic_rings() {
        assert_eq!(aromatic_atoms("C1=CCC=C1"), 0);
        assert_eq!(aromatic_atoms("C1=CC=C1"), 0);
        assert_eq!(aromatic_atoms("C1=CC=CC=CC=C1"), 0);
        assert_eq!(aromatic_atoms("C1CCCCC1"), 0);
        assert_eq!(aromatic_atoms("O=C1C=CC(=O)C=C1"), 0);
    }

    #[test]
    fn test_biphenyl_link_stays_single() {
        let mol = parse_smiles("c1ccccc1-c1ccccc1").unwrap();
        assert_eq!(mol.atoms.iter().filter(|a| a.aromatic).count(), 12);
        assert_eq!(mol.bond_between(5, 6).map(|b| b.order), Some(BondOrder::Single));
    }

    #[test]
    fn test_unkekulizable_input_rejected() {
        for bad in ["c1cccc1", "c1ccnc1", "c1ccccc1c", "[c]1ccccc1", "c1cccccc1"] {
            assert!(parse_smiles(bad).is_err(), "expected {:?} to be rejected", bad);
        }
    }
}
