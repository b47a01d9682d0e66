//! 3D coordinates by distance geometry followed by a small force-field
//! clean-up, written out as a V2000 MOL block.

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::molecule::{BondOrder, Molecule};
use super::ChemError;

pub const DEFAULT_SEED: u64 = 0x5eed_c0de;
const MAX_ATTEMPTS: u64 = 5;
const FAR: f64 = 100.0;
const MAX_BOND_DEVIATION: f64 = 0.3;
/// Larger structures are reported without 3D coordinates.
pub const MAX_EMBED_HEAVY_ATOMS: usize = 100;

type Coords = Vec<[f64; 3]>;

#[derive(Debug, Clone, Copy)]
struct Term {
    i: usize,
    j: usize,
    lower: f64,
    upper: f64,
    weight: f64,
}

fn radius(mol: &Molecule, atom: usize) -> f64 {
    mol.atoms[atom].element.map(|e| e.covalent_radius).unwrap_or(0.75)
}

fn bond_length(mol: &Molecule, bond: usize) -> f64 {
    let b = &mol.bonds[bond];
    let factor = match b.order {
        BondOrder::Single => 1.0,
        BondOrder::Double => 0.87,
        BondOrder::Triple => 0.79,
        BondOrder::Quadruple => 0.75,
        BondOrder::Aromatic => 0.92,
    };
    (radius(mol, b.a) + radius(mol, b.b)) * factor
}

/// Ideal bond angle at a centre atom, in degrees, from its bond orders.
fn bond_angle(mol: &Molecule, center: usize) -> f64 {
    let orders: Vec<BondOrder> = mol
        .neighbors(center)
        .iter()
        .map(|(_, b)| mol.bonds[*b].order)
        .collect();
    let doubles = orders.iter().filter(|o| **o == BondOrder::Double).count();
    if orders.contains(&BondOrder::Triple) || doubles >= 2 {
        180.0
    } else if doubles == 1 || orders.contains(&BondOrder::Aromatic) {
        120.0
    } else {
        109.47
    }
}

struct Bounds {
    lower: Vec<Vec<f64>>,
    upper: Vec<Vec<f64>>,
    bonds: Vec<Term>,
    angles: Vec<Term>,
}

fn bounds(mol: &Molecule) -> Bounds {
    let n = mol.atom_count();
    let mut lower = vec![vec![0.0; n]; n];
    let mut upper = vec![vec![FAR; n]; n];
    for i in 0..n {
        upper[i][i] = 0.0;
        for j in 0..n {
            if i != j {
                lower[i][j] = 0.8 * (radius(mol, i) + radius(mol, j) + 1.0);
            }
        }
    }

    let mut bonds = Vec::new();
    for (index, bond) in mol.bonds.iter().enumerate() {
        let length = bond_length(mol, index);
        let term = Term { i: bond.a, j: bond.b, lower: length - 0.01, upper: length + 0.01, weight: 10.0 };
        bonds.push(term);
    }

    let mut angles = Vec::new();
    for center in 0..n {
        let theta = bond_angle(mol, center).to_radians();
        let around = mol.neighbors(center);
        for (k, (a, ba)) in around.iter().enumerate() {
            for (b, bb) in &around[k + 1..] {
                if mol.bond_between(*a, *b).is_some() {
                    continue;
                }
                let (la, lb) = (bond_length(mol, *ba), bond_length(mol, *bb));
                let d = (la * la + lb * lb - 2.0 * la * lb * theta.cos()).sqrt();
                angles.push(Term { i: *a, j: *b, lower: d - 0.05, upper: d + 0.05, weight: 2.0 });
            }
        }
    }

    for t in bonds.iter().chain(&angles) {
        lower[t.i][t.j] = t.lower;
        lower[t.j][t.i] = t.lower;
        upper[t.i][t.j] = t.upper;
        upper[t.j][t.i] = t.upper;
    }

    smooth(&mut lower, &mut upper);
    Bounds { lower, upper, bonds, angles }
}

/// Triangle smoothing of the bounds matrix. Inconsistent pairs are clamped
/// so the lower bound never exceeds the upper one.
fn smooth(lower: &mut [Vec<f64>], upper: &mut [Vec<f64>]) {
    let n = lower.len();
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let via = upper[i][k] + upper[k][j];
                if upper[i][j] > via {
                    upper[i][j] = via;
                }
                let floor = (lower[i][k] - upper[k][j]).max(lower[j][k] - upper[k][i]);
                if lower[i][j] < floor {
                    lower[i][j] = floor;
                }
            }
        }
    }
    for i in 0..n {
        for j in 0..n {
            if lower[i][j] > upper[i][j] {
                lower[i][j] = upper[i][j];
            }
        }
    }
}

fn random_distances(b: &Bounds, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = b.lower.len();
    let mut d = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i + 1..n {
            let value = b.lower[i][j] + rng.gen::<f64>() * (b.upper[i][j] - b.lower[i][j]);
            d[i][j] = value;
            d[j][i] = value;
        }
    }
    d
}

/// Dominant eigenpair of a symmetric matrix by power iteration on a shifted
/// copy, so the largest algebraic eigenvalue wins.
fn top_eigenpair(m: &[Vec<f64>], shift: f64, rng: &mut StdRng) -> (f64, Vec<f64>) {
    let n = m.len();
    let mut v: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut lambda = 0.0;
    for _ in 0..1000 {
        let mut next: Vec<f64> = (0..n)
            .map(|i| (0..n).map(|j| m[i][j] * v[j]).sum::<f64>() + shift * v[i])
            .collect();
        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-12 {
            break;
        }
        next.iter_mut().for_each(|x| *x /= norm);
        let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
        v = next;
        lambda = norm - shift;
        if delta < 1e-10 {
            break;
        }
    }
    (lambda, v)
}

fn coordinates_from_distances(d: &[Vec<f64>], rng: &mut StdRng) -> Coords {
    let n = d.len();
    let nf = n as f64;
    let total: f64 = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| d[i][j] * d[i][j])
        .sum();
    let d0: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| d[i][j] * d[i][j]).sum::<f64>() / nf - total / (nf * nf))
        .collect();
    let mut g: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| (d0[i] + d0[j] - d[i][j] * d[i][j]) / 2.0).collect())
        .collect();

    let shift = g
        .iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max);

    let mut coords = vec![[0.0; 3]; n];
    for axis in 0..3 {
        let (lambda, v) = top_eigenpair(&g, shift, rng);
        let scale = if lambda > 1e-6 { lambda.sqrt() } else { 0.0 };
        for i in 0..n {
            coords[i][axis] = if scale > 0.0 { v[i] * scale } else { rng.gen_range(-0.5..0.5) };
        }
        for i in 0..n {
            for j in 0..n {
                g[i][j] -= lambda * v[i] * v[j];
            }
        }
    }
    coords
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn evaluate(coords: &[[f64; 3]], terms: &[Term], mut grad: Option<&mut Coords>) -> f64 {
    let mut energy = 0.0;
    for t in terms {
        let d = distance(&coords[t.i], &coords[t.j]).max(1e-6);
        let violation = if d > t.upper {
            d - t.upper
        } else if d < t.lower {
            d - t.lower
        } else {
            continue;
        };
        energy += t.weight * violation * violation;
        if let Some(g) = grad.as_deref_mut() {
            let f = 2.0 * t.weight * violation / d;
            for axis in 0..3 {
                let delta = f * (coords[t.i][axis] - coords[t.j][axis]);
                g[t.i][axis] += delta;
                g[t.j][axis] -= delta;
            }
        }
    }
    energy
}

/// Gradient descent with an adaptive step. Returns the final energy.
fn minimize(coords: &mut Coords, terms: &[Term], iterations: usize) -> f64 {
    let mut rate = 0.02;
    let mut energy = evaluate(coords, terms, None);
    for _ in 0..iterations {
        if energy < 1e-8 {
            break;
        }
        let mut grad = vec![[0.0; 3]; coords.len()];
        evaluate(coords, terms, Some(&mut grad));
        let trial: Coords = coords
            .iter()
            .zip(&grad)
            .map(|(p, g)| [p[0] - rate * g[0], p[1] - rate * g[1], p[2] - rate * g[2]])
            .collect();
        let next = evaluate(&trial, terms, None);
        if next.is_finite() && next < energy {
            *coords = trial;
            energy = next;
            rate *= 1.2;
        } else {
            rate *= 0.5;
            if rate < 1e-10 {
                break;
            }
        }
    }
    energy
}

fn geometry_terms(b: &Bounds) -> Vec<Term> {
    let n = b.lower.len();
    let mut terms = Vec::with_capacity(n * n / 2);
    for i in 0..n {
        for j in i + 1..n {
            terms.push(Term { i, j, lower: b.lower[i][j], upper: b.upper[i][j], weight: 1.0 });
        }
    }
    terms
}

fn force_field_terms(mol: &Molecule, b: &Bounds) -> Vec<Term> {
    let n = mol.atom_count();
    let mut terms: Vec<Term> = b.bonds.iter().chain(&b.angles).copied().collect();
    let mut near = vec![vec![false; n]; n];
    for t in &terms {
        near[t.i][t.j] = true;
        near[t.j][t.i] = true;
    }
    for i in 0..n {
        for j in i + 1..n {
            if !near[i][j] {
                let contact = 0.75 * (radius(mol, i) + radius(mol, j) + 1.6);
                terms.push(Term { i, j, lower: contact, upper: f64::INFINITY, weight: 0.2 });
            }
        }
    }
    terms
}

fn embed_coordinates(mol: &Molecule, seed: u64) -> Result<Coords, ChemError> {
    let n = mol.atom_count();
    if n == 0 {
        return Err(ChemError::Embedding("empty structure".to_string()));
    }
    if n == 1 {
        return Ok(vec![[0.0; 3]]);
    }

    let b = bounds(mol);
    let dg = geometry_terms(&b);
    let ff = force_field_terms(mol, &b);

    for attempt in 0..MAX_ATTEMPTS {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(attempt));
        let d = random_distances(&b, &mut rng);
        let mut coords = coordinates_from_distances(&d, &mut rng);
        minimize(&mut coords, &dg, 500);
        minimize(&mut coords, &ff, 500);

        let finite = coords.iter().all(|p| p.iter().all(|x| x.is_finite()));
        let worst = b
            .bonds
            .iter()
            .map(|t| {
                let d = distance(&coords[t.i], &coords[t.j]);
                (d - (t.lower + t.upper) / 2.0).abs()
            })
            .fold(0.0, f64::max);
        if finite && worst < MAX_BOND_DEVIATION {
            return Ok(coords);
        }
    }
    Err(ChemError::Embedding(format!(
        "no geometry within bounds after {} attempts",
        MAX_ATTEMPTS
    )))
}

pub fn write_molblock(mol: &Molecule, coords: &[[f64; 3]]) -> String {
    let mut block = String::from("\n  chemview        3D\n\n");
    block.push_str(&format!(
        "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000\n",
        mol.atom_count(),
        mol.bonds.len()
    ));
    for (atom, p) in mol.atoms.iter().zip(coords) {
        block.push_str(&format!(
            "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0\n",
            p[0],
            p[1],
            p[2],
            atom.symbol()
        ));
    }
    for bond in &mol.bonds {
        block.push_str(&format!(
            "{:>3}{:>3}{:>3}  0\n",
            bond.a + 1,
            bond.b + 1,
            bond.order.mdl_code()
        ));
    }
    let charged: Vec<(usize, i8)> = mol
        .atoms
        .iter()
        .enumerate()
        .filter(|(_, a)| a.charge != 0)
        .map(|(i, a)| (i + 1, a.charge))
        .collect();
    for chunk in charged.chunks(8) {
        block.push_str(&format!("M  CHG{:>3}", chunk.len()));
        for (index, charge) in chunk {
            block.push_str(&format!(" {:>3} {:>3}", index, charge));
        }
        block.push('\n');
    }
    block.push_str("M  END\n");
    block
}

/// MOL block with hydrogens made explicit and 3D coordinates.
pub fn embed_molblock(mol: &Molecule, seed: u64) -> Result<String, ChemError> {
    if mol.has_wildcard() {
        return Err(ChemError::Embedding(
            "structure contains unresolved wildcard atoms".to_string(),
        ));
    }
    let heavy = mol.atoms.iter().filter(|a| !a.is("H")).count();
    if heavy > MAX_EMBED_HEAVY_ATOMS {
        return Err(ChemError::Embedding(format!(
            "{} heavy atoms, more than the {} that are embedded",
            heavy, MAX_EMBED_HEAVY_ATOMS
        )));
    }
    let full = mol.with_explicit_hydrogens();
    let coords = embed_coordinates(&full, seed)?;
    Ok(write_molblock(&full, &coords))
}
