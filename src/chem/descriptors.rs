use std::collections::BTreeMap;

use super::element;
use super::molecule::{BondOrder, Molecule};

/// Average molecular weight including implicit hydrogens.
pub fn molecular_weight(mol: &Molecule) -> f64 {
    let h = element::hydrogen().mass;
    mol.atoms
        .iter()
        .map(|a| a.mass() + f64::from(a.total_h()) * h)
        .sum()
}

/// Hill-order formula (`C`, `H`, then alphabetical; alphabetical throughout
/// when there is no carbon), wildcards as `*`, net charge as a suffix.
pub fn molecular_formula(mol: &Molecule) -> String {
    let mut counts: BTreeMap<&'static str, u32> = BTreeMap::new();
    let mut wildcards = 0u32;
    let mut charge = 0i32;

    for atom in &mol.atoms {
        charge += i32::from(atom.charge);
        match atom.element {
            Some(e) => *counts.entry(e.symbol).or_insert(0) += 1,
            None => wildcards += 1,
        }
        if atom.total_h() > 0 {
            *counts.entry("H").or_insert(0) += u32::from(atom.total_h());
        }
    }

    let mut formula = String::new();
    let mut push = |symbol: &str, n: u32| {
        formula.push_str(symbol);
        if n > 1 {
            formula.push_str(&n.to_string());
        }
    };

    if let Some(c) = counts.remove("C") {
        push("C", c);
        if let Some(h) = counts.remove("H") {
            push("H", h);
        }
    }
    for (symbol, n) in &counts {
        push(*symbol, *n);
    }
    if wildcards > 0 {
        push("*", wildcards);
    }

    match charge {
        0 => {}
        1 => formula.push('+'),
        -1 => formula.push('-'),
        c if c > 0 => formula.push_str(&format!("+{}", c)),
        c => formula.push_str(&format!("-{}", -c)),
    }
    formula
}

/// Lipinski donors: N with at least one H, neutral O or S with exactly one.
pub fn h_bond_donors(mol: &Molecule) -> u32 {
    mol.atoms
        .iter()
        .filter(|a| {
            (a.is("N") && a.total_h() > 0)
                || ((a.is("O") || a.is("S")) && a.charge == 0 && a.total_h() == 1)
        })
        .count() as u32
}

fn double_bonded_to_hetero(mol: &Molecule, atom: usize) -> bool {
    mol.neighbors(atom).iter().any(|(n, b)| {
        mol.bonds[*b].order == BondOrder::Double
            && ["O", "N", "P", "S"].iter().any(|s| mol.atoms[*n].is(s))
    })
}

fn bond_sum(mol: &Molecule, atom: usize) -> u8 {
    mol.neighbors(atom)
        .iter()
        .map(|(_, b)| mol.bonds[*b].order.valence())
        .sum::<u8>()
        + mol.atoms[atom].total_h()
}

/// Lipinski acceptors: hydroxyl and ether O/S, anionic O/S, trivalent
/// non-amide N, pyridine-type n, furan/thiophene o/s, and F.
pub fn h_bond_acceptors(mol: &Molecule) -> u32 {
    (0..mol.atom_count())
        .filter(|&i| {
            let a = &mol.atoms[i];
            if a.is("F") {
                return true;
            }
            if a.is("O") || a.is("S") {
                if a.aromatic {
                    return a.charge == 0;
                }
                if a.charge < 0 {
                    return true;
                }
                if a.charge > 0 || bond_sum(mol, i) != 2 {
                    return false;
                }
                if a.total_h() == 1 {
                    return !mol
                        .neighbors(i)
                        .iter()
                        .any(|(n, _)| double_bonded_to_hetero(mol, *n));
                }
                return a.total_h() == 0;
            }
            if a.is("N") {
                if a.aromatic {
                    return a.charge == 0 && a.total_h() == 0 && mol.degree(i) == 2;
                }
                if a.charge != 0 || bond_sum(mol, i) != 3 {
                    return false;
                }
                return !mol.neighbors(i).iter().any(|(n, b)| {
                    mol.bonds[*b].order == BondOrder::Single && double_bonded_to_hetero(mol, *n)
                });
            }
            false
        })
        .count() as u32
}

#[derive(Default)]
struct BondCounts {
    single: u8,
    double: u8,
    triple: u8,
    aromatic: u8,
}

fn bond_counts(mol: &Molecule, atom: usize) -> BondCounts {
    let mut counts = BondCounts::default();
    for (_, b) in mol.neighbors(atom) {
        match mol.bonds[*b].order {
            BondOrder::Single => counts.single += 1,
            BondOrder::Double => counts.double += 1,
            BondOrder::Triple | BondOrder::Quadruple => counts.triple += 1,
            BondOrder::Aromatic => counts.aromatic += 1,
        }
    }
    counts
}

fn nitrogen_psa(nbrs: usize, h: u8, chg: i8, in3: bool, c: &BondCounts) -> f64 {
    let contribution = match (nbrs, h, chg) {
        (1, 0, 0) if c.triple == 1 => Some(23.79),
        (1, 1, 0) if c.double == 1 => Some(23.85),
        (1, 2, 0) if c.single == 1 => Some(26.02),
        (1, 2, 1) if c.double == 1 => Some(25.59),
        (1, 3, 1) if c.single == 1 => Some(27.64),
        (2, 0, 0) if c.single == 1 && c.double == 1 => Some(12.36),
        (2, 0, 0) if c.triple == 1 && c.double == 1 => Some(13.60),
        (2, 1, 0) if c.single == 2 && in3 => Some(21.94),
        (2, 1, 0) if c.single == 2 => Some(12.03),
        (2, 0, 1) if c.triple == 1 && c.single == 1 => Some(4.36),
        (2, 1, 1) if c.double == 1 && c.single == 1 => Some(13.97),
        (2, 2, 1) if c.single == 2 => Some(16.61),
        (2, 0, 0) if c.aromatic == 2 => Some(12.89),
        (2, 1, 0) if c.aromatic == 2 => Some(15.79),
        (2, 1, 1) if c.aromatic == 2 => Some(14.14),
        (3, 0, 0) if c.single == 3 && in3 => Some(3.01),
        (3, 0, 0) if c.single == 3 => Some(3.24),
        (3, 0, 0) if c.single == 1 && c.double == 2 => Some(11.68),
        (3, 0, 1) if c.single == 2 && c.double == 1 => Some(3.01),
        (3, 1, 1) if c.single == 3 => Some(4.44),
        (3, 0, 0) if c.aromatic == 3 => Some(4.41),
        (3, 0, 0) if c.single == 1 && c.aromatic == 2 => Some(4.93),
        (3, 0, 0) if c.double == 1 && c.aromatic == 2 => Some(8.39),
        (3, 0, 1) if c.aromatic == 3 => Some(4.10),
        (3, 0, 1) if c.single == 1 && c.aromatic == 2 => Some(3.88),
        (4, 0, 1) if c.single == 4 => Some(0.0),
        _ => None,
    };
    contribution.unwrap_or_else(|| (30.5 - nbrs as f64 * 8.2 + f64::from(h) * 1.5).max(0.0))
}

fn oxygen_psa(nbrs: usize, h: u8, chg: i8, in3: bool, c: &BondCounts) -> f64 {
    let contribution = match (nbrs, h, chg) {
        (1, 0, 0) if c.double == 1 => Some(17.07),
        (1, 1, 0) if c.single == 1 => Some(20.23),
        (1, 0, -1) if c.single == 1 => Some(23.06),
        (2, 0, 0) if c.single == 2 && in3 => Some(12.53),
        (2, 0, 0) if c.single == 2 => Some(9.23),
        (2, 0, 0) if c.aromatic == 2 => Some(13.14),
        _ => None,
    };
    contribution.unwrap_or_else(|| (28.5 - nbrs as f64 * 8.6 + f64::from(h) * 1.5).max(0.0))
}

/// Topological polar surface area from Ertl's N and O fragment contributions.
pub fn tpsa(mol: &Molecule) -> f64 {
    (0..mol.atom_count())
        .map(|i| {
            let a = &mol.atoms[i];
            let counts = bond_counts(mol, i);
            let nbrs = mol.degree(i);
            let in3 = mol.in_three_ring(i);
            if a.is("N") {
                nitrogen_psa(nbrs, a.total_h(), a.charge, in3, &counts)
            } else if a.is("O") {
                oxygen_psa(nbrs, a.total_h(), a.charge, in3, &counts)
            } else {
                0.0
            }
        })
        .sum()
}

fn has_aromatic_neighbor(mol: &Molecule, atom: usize) -> bool {
    mol.neighbors(atom).iter().any(|(n, _)| mol.atoms[*n].aromatic)
}

fn is_aliphatic_hetero(mol: &Molecule, atom: usize) -> bool {
    let a = &mol.atoms[atom];
    !a.aromatic && ["N", "O", "P", "S", "F", "Cl", "Br", "I"].iter().any(|s| a.is(s))
}

fn hydrogen_logp(mol: &Molecule, i: usize) -> f64 {
    let a = &mol.atoms[i];
    match a.symbol() {
        "C" => 0.1230,
        "N" => 0.2142,
        "O" => {
            let acidic = mol.neighbors(i).iter().any(|(n, _)| {
                let other = &mol.atoms[*n];
                other.is("O")
                    || other.is("S")
                    || (other.is("C") && !other.aromatic && bond_counts(mol, *n).double > 0)
            });
            if acidic {
                0.2980
            } else if mol.neighbors(i).iter().any(|(n, _)| mol.atoms[*n].is("N")) {
                0.2142
            } else {
                -0.2677
            }
        }
        _ => -0.2677,
    }
}

fn aromatic_carbon_logp(mol: &Molecule, i: usize) -> f64 {
    let a = &mol.atoms[i];
    let counts = bond_counts(mol, i);
    if a.total_h() > 0 {
        return 0.1581;
    }
    if counts.aromatic >= 3 {
        return 0.2955;
    }
    let substituent = mol
        .neighbors(i)
        .iter()
        .find(|(_, b)| mol.bonds[*b].order != BondOrder::Aromatic);
    let Some((n, b)) = substituent else {
        return 0.2713;
    };
    let other = &mol.atoms[*n];
    if mol.bonds[*b].order == BondOrder::Double {
        return -0.8186;
    }
    if other.aromatic {
        return 0.2713;
    }
    match other.symbol() {
        "C" => 0.1360,
        "N" => 0.4619,
        "O" => 0.5437,
        "S" => 0.1893,
        "F" => 0.0,
        "Cl" => 0.2450,
        "Br" => 0.1980,
        "I" => 0.0,
        "*" | "P" => 0.2713,
        _ => -0.5443,
    }
}

fn carbon_logp(mol: &Molecule, i: usize) -> f64 {
    let a = &mol.atoms[i];
    if a.aromatic {
        return aromatic_carbon_logp(mol, i);
    }

    let counts = bond_counts(mol, i);
    if counts.triple > 0 {
        return 0.0017;
    }
    if counts.double > 0 {
        if double_bonded_to_hetero(mol, i) {
            return -0.2783;
        }
        let conjugated = has_aromatic_neighbor(mol, i)
            || mol.neighbors(i).iter().any(|(n, b)| {
                mol.bonds[*b].order == BondOrder::Double && has_aromatic_neighbor(mol, *n)
            });
        return if conjugated { 0.2640 } else { 0.1551 };
    }

    let hetero = mol.neighbors(i).iter().any(|(n, _)| is_aliphatic_hetero(mol, *n));
    let aromatic = mol.neighbors(i).iter().find(|(n, _)| mol.atoms[*n].aromatic);
    match (a.total_h(), hetero, aromatic) {
        (2..=4, true, _) => -0.2035,
        (_, true, _) => -0.2051,
        (3..=4, false, Some((n, _))) if mol.atoms[*n].is("C") => 0.08452,
        (3..=4, false, Some(_)) => -0.1444,
        (2, false, Some(_)) => -0.0516,
        (1, false, Some(_)) => 0.1193,
        (0, false, Some(_)) => -0.0967,
        (2..=4, false, None) => 0.1441,
        _ => 0.0,
    }
}

fn nitrogen_logp(mol: &Molecule, i: usize) -> f64 {
    let a = &mol.atoms[i];
    let counts = bond_counts(mol, i);
    if a.aromatic {
        return if a.charge > 0 { -1.1190 } else { -0.3239 };
    }
    if a.charge > 0 {
        return if a.total_h() > 0 {
            -1.9500
        } else if counts.triple > 0 {
            0.2887
        } else {
            -0.3396
        };
    }
    if a.charge < 0 {
        return 0.2887;
    }
    if counts.triple > 0 {
        return 0.01508;
    }
    if counts.double > 0 {
        return if a.total_h() > 0 { 0.08387 } else { 0.1836 };
    }
    let on_aromatic = has_aromatic_neighbor(mol, i);
    match (a.total_h(), on_aromatic) {
        (0, false) => -0.3187,
        (0, true) => -0.4458,
        (1, false) => -0.7096,
        (1, true) => -0.5188,
        (2, false) => -1.0190,
        (2, true) => -1.0270,
        _ => -0.4806,
    }
}

fn carbonyl_oxygen_logp(mol: &Molecule, i: usize) -> f64 {
    let Some((partner, _)) = mol
        .neighbors(i)
        .iter()
        .find(|(_, b)| mol.bonds[*b].order == BondOrder::Double)
    else {
        return -0.1188;
    };
    let p = &mol.atoms[*partner];
    if p.is("N") || p.is("O") {
        return 0.0335;
    }
    if !p.is("C") {
        return -0.1188;
    }
    if p.aromatic {
        return 0.1788;
    }
    let others: Vec<usize> = mol
        .neighbors(*partner)
        .iter()
        .map(|(n, _)| *n)
        .filter(|n| *n != i)
        .collect();
    let hetero = others
        .iter()
        .filter(|n| mol.atoms[**n].element.map(|e| e.is_hetero()).unwrap_or(false))
        .count();
    if hetero >= 2 {
        0.4833
    } else if others.iter().any(|n| mol.atoms[*n].aromatic) {
        0.1129
    } else {
        -0.1526
    }
}

fn oxygen_logp(mol: &Molecule, i: usize) -> f64 {
    let a = &mol.atoms[i];
    let counts = bond_counts(mol, i);
    if a.aromatic {
        return 0.1552;
    }
    if counts.double > 0 {
        return carbonyl_oxygen_logp(mol, i);
    }
    if a.charge < 0 {
        let Some((n, _)) = mol.neighbors(i).first() else {
            return -1.1890;
        };
        let other = &mol.atoms[*n];
        return if other.is("N") {
            0.0335
        } else if other.is("S") {
            -0.3339
        } else if other.is("C") && double_bonded_to_hetero(mol, *n) {
            -1.3260
        } else {
            -1.1890
        };
    }
    if a.total_h() > 0 {
        return -0.2893;
    }
    if has_aromatic_neighbor(mol, i) {
        -0.4195
    } else {
        -0.0684
    }
}

/// Octanol/water partition coefficient from Wildman-Crippen atom type
/// contributions. Rare types (metals, boron, exotic charges) fall back to
/// the nearest common type.
pub fn crippen_logp(mol: &Molecule) -> f64 {
    (0..mol.atom_count())
        .map(|i| {
            let a = &mol.atoms[i];
            if a.is_wildcard() {
                return 0.0;
            }
            let own = match a.symbol() {
                "C" => carbon_logp(mol, i),
                "N" => nitrogen_logp(mol, i),
                "O" => oxygen_logp(mol, i),
                "F" => 0.4202,
                "Cl" => 0.6895,
                "Br" => 0.8456,
                "I" => 0.8857,
                "S" if a.aromatic => 0.6237,
                "S" => 0.6482,
                "P" => 0.8612,
                "H" => 0.1230,
                _ => 0.0,
            };
            own + f64::from(a.total_h()) * hydrogen_logp(mol, i)
        })
        .sum()
}
