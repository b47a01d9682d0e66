mod aromaticity;
pub mod canon;
pub mod depict;
pub mod descriptors;
pub mod element;
pub mod embed;
pub mod molecule;
pub mod smiles;

use thiserror::Error;
use tracing::warn;

pub use molecule::{Atom, Bond, BondOrder, Molecule};
pub use smiles::parse_smiles;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChemError {
    #[error("invalid SMILES at position {position}: {reason}")]
    Parse { position: usize, reason: String },

    #[error("3D embedding failed: {0}")]
    Embedding(String),
}

/// Everything the success payload reports about a structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub canonical_smiles: String,
    pub structure_key: String,
    pub svg: String,
    pub mol_weight: f64,
    pub formula: String,
    pub logp: f64,
    pub h_donors: u32,
    pub h_acceptors: u32,
    pub tpsa: f64,
    /// MOL block with 3D coordinates, empty when embedding failed.
    pub sdf: String,
}

/// Chemistry collaborator used by the recognition pipeline. `parse` is the
/// cheap validity check applied to OSRA candidates, `describe` the full
/// enrichment run after a structure has been accepted.
pub trait ChemToolkit: Send + Sync {
    fn parse(&self, smiles: &str) -> Result<Molecule, ChemError>;

    fn describe(&self, smiles: &str) -> Result<Descriptors, ChemError>;
}

pub struct NativeToolkit {
    embed_seed: u64,
}

impl NativeToolkit {
    pub fn new() -> Self {
        Self { embed_seed: embed::DEFAULT_SEED }
    }

    pub fn with_seed(embed_seed: u64) -> Self {
        Self { embed_seed }
    }
}

impl Default for NativeToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl ChemToolkit for NativeToolkit {
    fn parse(&self, smiles: &str) -> Result<Molecule, ChemError> {
        parse_smiles(smiles)
    }

    fn describe(&self, smiles: &str) -> Result<Descriptors, ChemError> {
        let mol = parse_smiles(smiles)?;
        let canonical = canon::canonical_smiles(&mol);

        let sdf = match embed::embed_molblock(&mol, self.embed_seed) {
            Ok(block) => block,
            Err(e) => {
                warn!("3D structure unavailable for {}: {}", smiles, e);
                String::new()
            }
        };

        Ok(Descriptors {
            structure_key: canon::structure_key(&canonical),
            canonical_smiles: canonical,
            svg: depict::render_svg(&mol),
            mol_weight: descriptors::molecular_weight(&mol),
            formula: descriptors::molecular_formula(&mol),
            logp: descriptors::crippen_logp(&mol),
            h_donors: descriptors::h_bond_donors(&mol),
            h_acceptors: descriptors::h_bond_acceptors(&mol),
            tpsa: descriptors::tpsa(&mol),
            sdf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_ethanol() {
        let d = NativeToolkit::new().describe("CCO").unwrap();
        assert_eq!(d.formula, "C2H6O");
        assert_eq!(format!("{:.3}", d.mol_weight), "46.069");
        assert_eq!(format!("{:.2}", d.tpsa), "20.23");
        assert_eq!(d.h_donors, 1);
        assert_eq!(d.h_acceptors, 1);
        assert!(d.svg.starts_with("<svg"));
        assert!(d.sdf.contains("V2000"));
        assert!(d.sdf.trim_end().ends_with("M  END"));
        assert_eq!(d.structure_key.len(), 27);
    }

    #[test]
    fn test_kekule_and_aromatic_benzene_share_identifiers() {
        let toolkit = NativeToolkit::new();
        let kekule = toolkit.describe("C1=CC=CC=C1").unwrap();
        let aromatic = toolkit.describe("c1ccccc1").unwrap();
        assert_eq!(kekule.canonical_smiles, aromatic.canonical_smiles);
        assert_eq!(kekule.structure_key, aromatic.structure_key);
        assert_eq!(format!("{:.3}", kekule.logp), format!("{:.3}", aromatic.logp));
        assert_eq!(kekule.formula, "C6H6");
    }

    #[test]
    fn test_wildcard_keeps_descriptors_without_3d() {
        let d = NativeToolkit::new().describe("*CCO").unwrap();
        assert!(d.sdf.is_empty());
        assert_eq!(d.formula, "C2H5O*");
        assert!(d.svg.contains("*"));
    }

    #[test]
    fn test_large_structure_skips_3d() {
        let chain = "C".repeat(embed::MAX_EMBED_HEAVY_ATOMS + 1);
        let d = NativeToolkit::new().describe(&chain).unwrap();
        assert!(d.sdf.is_empty());
        assert!(!d.svg.is_empty());
    }

    #[test]
    fn test_describe_rejects_invalid_input() {
        assert!(matches!(
            NativeToolkit::new().describe("C1CC"),
            Err(ChemError::Parse { .. })
        ));
    }
}
