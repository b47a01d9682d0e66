//! 2D depiction. Coordinates come from stress majorization over topological
//! distances, one connected component at a time, and are rendered as a
//! transparent SVG with black atom labels.

use std::collections::VecDeque;

use super::molecule::{BondOrder, Molecule};

pub type Point = (f64, f64);

/// Pixels per bond length at natural size.
const BOND_PX: f64 = 20.0;
const SCALE: f64 = 2.0;
const MARGIN: f64 = 1.0;
const COMPONENT_GAP: f64 = 1.5;
const MAX_ITERATIONS: usize = 300;
const LABEL_COLOR: &str = "#000000";

fn distances_from(mol: &Molecule, local: &[usize], source: usize, n: usize, component: &[usize]) -> Vec<usize> {
    let mut dist = vec![usize::MAX; n];
    let mut queue = VecDeque::new();
    dist[source] = 0;
    queue.push_back(source);
    while let Some(current) = queue.pop_front() {
        for (next, _) in mol.neighbors(component[current]) {
            let k = local[*next];
            if dist[k] == usize::MAX {
                dist[k] = dist[current] + 1;
                queue.push_back(k);
            }
        }
    }
    dist
}

fn walk_order(mol: &Molecule, local: &[usize], component: &[usize]) -> Vec<usize> {
    let mut seen = vec![false; component.len()];
    let mut order = Vec::with_capacity(component.len());
    let mut stack = vec![0];
    while let Some(current) = stack.pop() {
        if seen[current] {
            continue;
        }
        seen[current] = true;
        order.push(current);
        for (next, _) in mol.neighbors(component[current]).iter().rev() {
            if !seen[local[*next]] {
                stack.push(local[*next]);
            }
        }
    }
    order
}

fn layout_component(mol: &Molecule, component: &[usize]) -> Vec<Point> {
    let n = component.len();
    if n == 1 {
        return vec![(0.0, 0.0)];
    }

    let mut local = vec![usize::MAX; mol.atom_count()];
    for (k, atom) in component.iter().enumerate() {
        local[*atom] = k;
    }
    let dist: Vec<Vec<usize>> = (0..n)
        .map(|s| distances_from(mol, &local, s, n, component))
        .collect();

    // zigzag start along a depth-first walk
    let mut pos = vec![(0.0, 0.0); n];
    for (k, i) in walk_order(mol, &local, component).into_iter().enumerate() {
        pos[i] = (k as f64 * 0.866, if k % 2 == 0 { 0.0 } else { 0.5 });
    }

    for _ in 0..MAX_ITERATIONS {
        let mut moved: f64 = 0.0;
        for i in 0..n {
            let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = dist[i][j] as f64;
                let target = if dist[i][j] == 1 { 1.0 } else { d * 0.866 };
                let w = 1.0 / (d * d);
                let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                let len = (dx * dx + dy * dy).sqrt().max(1e-6);
                sx += w * (pos[j].0 + target * dx / len);
                sy += w * (pos[j].1 + target * dy / len);
                sw += w;
            }
            let next = (sx / sw, sy / sw);
            moved = moved.max((next.0 - pos[i].0).abs() + (next.1 - pos[i].1).abs());
            pos[i] = next;
        }
        if moved < 1e-4 {
            break;
        }
    }
    pos
}

/// 2D coordinates in bond-length units, components placed left to right.
pub fn layout(mol: &Molecule) -> Vec<Point> {
    let mut coords = vec![(0.0, 0.0); mol.atom_count()];
    let mut cursor = 0.0;
    for component in mol.components() {
        let local = layout_component(mol, &component);
        let min_x = local.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = local.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let mid_y = local.iter().map(|p| p.1).sum::<f64>() / local.len() as f64;
        for (atom, p) in component.iter().zip(local) {
            coords[*atom] = (p.0 - min_x + cursor, p.1 - mid_y);
        }
        cursor += max_x - min_x + COMPONENT_GAP;
    }
    coords
}

fn atom_label(mol: &Molecule, atom: usize) -> Option<String> {
    let a = &mol.atoms[atom];
    if a.is("C") && a.charge == 0 && a.isotope.is_none() && mol.degree(atom) > 0 {
        return None;
    }
    let mut label = String::new();
    if let Some(isotope) = a.isotope {
        label.push_str(&isotope.to_string());
    }
    label.push_str(a.symbol());
    match a.total_h() {
        0 => {}
        1 => label.push('H'),
        n => label.push_str(&format!("H{}", n)),
    }
    match a.charge {
        0 => {}
        1 => label.push('+'),
        -1 => label.push('-'),
        c if c > 0 => label.push_str(&format!("{}+", c)),
        c => label.push_str(&format!("{}-", -c)),
    }
    Some(label)
}

fn line(svg: &mut String, a: Point, b: Point, dashed: bool) {
    svg.push_str(&format!(
        "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"#000000\" stroke-width=\"{:.1}\"{}/>\n",
        a.0,
        a.1,
        b.0,
        b.1,
        SCALE,
        if dashed { " stroke-dasharray=\"6,4\"" } else { "" }
    ));
}

fn shifted(p: Point, normal: Point, by: f64) -> Point {
    (p.0 + normal.0 * by, p.1 + normal.1 * by)
}

/// Side of the bond its other neighbours sit on, so the inner line of an
/// aromatic bond is drawn inside the ring.
fn inner_side(mol: &Molecule, px: &[Point], a: usize, b: usize, normal: Point) -> f64 {
    let mid = ((px[a].0 + px[b].0) / 2.0, (px[a].1 + px[b].1) / 2.0);
    let side: f64 = mol
        .neighbors(a)
        .iter()
        .chain(mol.neighbors(b))
        .filter(|(n, _)| *n != a && *n != b)
        .map(|(n, _)| (px[*n].0 - mid.0) * normal.0 + (px[*n].1 - mid.1) * normal.1)
        .sum();
    if side < 0.0 { -1.0 } else { 1.0 }
}

pub fn render_svg(mol: &Molecule) -> String {
    let unit = BOND_PX * SCALE;
    let coords = layout(mol);

    let min_x = coords.iter().map(|p| p.0).fold(0.0, f64::min);
    let max_x = coords.iter().map(|p| p.0).fold(0.0, f64::max);
    let min_y = coords.iter().map(|p| p.1).fold(0.0, f64::min);
    let max_y = coords.iter().map(|p| p.1).fold(0.0, f64::max);
    let width = (max_x - min_x + 2.0 * MARGIN) * unit;
    let height = (max_y - min_y + 2.0 * MARGIN) * unit;

    let px: Vec<Point> = coords
        .iter()
        .map(|p| ((p.0 - min_x + MARGIN) * unit, (p.1 - min_y + MARGIN) * unit))
        .collect();
    let labels: Vec<Option<String>> = (0..mol.atom_count()).map(|i| atom_label(mol, i)).collect();

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{:.0}\" height=\"{:.0}\" viewBox=\"0 0 {:.0} {:.0}\">\n",
        width, height, width, height
    );

    let trim = 0.3 * unit;
    let gap = 0.16 * unit;
    for bond in &mol.bonds {
        let (mut a, mut b) = (px[bond.a], px[bond.b]);
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = (dx * dx + dy * dy).sqrt().max(1e-6);
        let (ux, uy) = (dx / len, dy / len);
        if labels[bond.a].is_some() {
            a = (a.0 + ux * trim, a.1 + uy * trim);
        }
        if labels[bond.b].is_some() {
            b = (b.0 - ux * trim, b.1 - uy * trim);
        }
        let normal = (-uy, ux);

        match bond.order {
            BondOrder::Single => line(&mut svg, a, b, false),
            BondOrder::Double => {
                line(&mut svg, shifted(a, normal, gap / 2.0), shifted(b, normal, gap / 2.0), false);
                line(&mut svg, shifted(a, normal, -gap / 2.0), shifted(b, normal, -gap / 2.0), false);
            }
            BondOrder::Triple | BondOrder::Quadruple => {
                line(&mut svg, a, b, false);
                line(&mut svg, shifted(a, normal, gap), shifted(b, normal, gap), false);
                line(&mut svg, shifted(a, normal, -gap), shifted(b, normal, -gap), false);
            }
            BondOrder::Aromatic => {
                line(&mut svg, a, b, false);
                let side = inner_side(mol, &px, bond.a, bond.b, normal) * gap;
                let inset = (ux * len * 0.15, uy * len * 0.15);
                let ia = shifted((a.0 + inset.0, a.1 + inset.1), normal, side);
                let ib = shifted((b.0 - inset.0, b.1 - inset.1), normal, side);
                line(&mut svg, ia, ib, true);
            }
        }
    }

    let font = 0.55 * unit;
    for (i, label) in labels.iter().enumerate() {
        if let Some(text) = label {
            svg.push_str(&format!(
                "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"sans-serif\" font-size=\"{:.0}\" text-anchor=\"middle\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
                px[i].0, px[i].1, font, LABEL_COLOR, text
            ));
        }
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::smiles::parse_smiles;

    fn dist(a: Point, b: Point) -> f64 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }

    #[test]
    fn test_chain_bonds_have_unit_length() {
        let mol = parse_smiles("CCCC").unwrap();
        let coords = layout(&mol);
        for bond in &mol.bonds {
            let d = dist(coords[bond.a], coords[bond.b]);
            assert!((d - 1.0).abs() < 0.1, "bond length {}", d);
        }
    }

    #[test]
    fn test_ring_atoms_do_not_overlap() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        let coords = layout(&mol);
        for i in 0..coords.len() {
            for j in i + 1..coords.len() {
                assert!(dist(coords[i], coords[j]) > 0.5);
            }
        }
    }

    #[test]
    fn test_components_are_separated() {
        let mol = parse_smiles("C.C").unwrap();
        let coords = layout(&mol);
        assert!(dist(coords[0], coords[1]) >= COMPONENT_GAP);
    }

    #[test]
    fn test_svg_is_transparent_with_black_labels() {
        let svg = render_svg(&parse_smiles("CCO").unwrap());
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(!svg.contains("<rect"));
        assert!(svg.contains(">OH</text>"));
        assert!(svg.contains("fill=\"#000000\""));
        assert_eq!(svg.matches("<text").count(), 1);
    }

    #[test]
    fn test_aromatic_bonds_get_dashed_inner_line() {
        let svg = render_svg(&parse_smiles("c1ccccc1").unwrap());
        assert_eq!(svg.matches("<line").count(), 12);
        assert_eq!(svg.matches("stroke-dasharray").count(), 6);
    }

    #[test]
    fn test_charged_and_isolated_atoms_are_labelled() {
        let svg = render_svg(&parse_smiles("C[NH3+].[Cl-]").unwrap());
        assert!(svg.contains(">NH3+</text>"));
        assert!(svg.contains(">Cl-</text>"));
        let methane = render_svg(&parse_smiles("C").unwrap());
        assert!(methane.contains(">CH4</text>"));
    }
}
