use crate::core::models::residue::HetFlag;
use phf::{Set, phf_set};

static WATER_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "HOH", "WAT", "H2O", "DOD",
};

static STANDARD_AMINO_ACIDS: Set<&'static str> = phf_set! {
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE",
    "LEU", "LYS", "MET", "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL",
};

static STANDARD_NUCLEOTIDES: Set<&'static str> = phf_set! {
    "A", "C", "G", "U", "DA", "DC", "DG", "DT", "DU",
};

pub fn is_water(res_name: &str) -> bool {
    WATER_RESIDUE_NAMES.contains(res_name.trim())
}

pub fn is_standard_amino_acid(res_name: &str) -> bool {
    STANDARD_AMINO_ACIDS.contains(res_name.trim())
}

pub fn is_standard_nucleotide(res_name: &str) -> bool {
    STANDARD_NUCLEOTIDES.contains(res_name.trim())
}

/// Classifies a residue for id construction: polymer residues get a blank
/// flag, hetero-group waters get the water flag, and every other hetero
/// group is tagged with its residue name so ligands never collide with
/// polymer positions.
pub fn het_flag(hetero: bool, res_name: &str) -> HetFlag {
    if !hetero {
        HetFlag::None
    } else if is_water(res_name) {
        HetFlag::Water
    } else {
        HetFlag::Het(res_name.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_water_names() {
        assert!(is_water("HOH"));
        assert!(is_water("WAT"));
        assert!(is_water(" HOH "));
        assert!(!is_water("GLC"));
        assert!(!is_water("hoh"));
    }

    #[test]
    fn recognizes_standard_amino_acids() {
        assert!(is_standard_amino_acid("ALA"));
        assert!(is_standard_amino_acid("TRP"));
        assert!(!is_standard_amino_acid("MSE"));
        assert!(!is_standard_amino_acid(""));
    }

    #[test]
    fn recognizes_standard_nucleotides() {
        assert!(is_standard_nucleotide("DA"));
        assert!(is_standard_nucleotide("U"));
        assert!(!is_standard_nucleotide("DX"));
    }

    #[test]
    fn het_flag_classification() {
        assert_eq!(het_flag(false, "ALA"), HetFlag::None);
        assert_eq!(het_flag(true, "HOH"), HetFlag::Water);
        assert_eq!(het_flag(true, "GLC"), HetFlag::Het("GLC".to_string()));
        // Polymer records stay blank even for water-like names.
        assert_eq!(het_flag(false, "HOH"), HetFlag::None);
    }
}
