use super::load;
use crate::cli::InfoArgs;
use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use macromol::core::io::ParserOptions;
use macromol::core::models::structure::Structure;
use macromol::core::utils::residues::{is_standard_amino_acid, is_standard_nucleotide};
use tracing::info;

pub fn run(args: &InfoArgs, options: &ParserOptions) -> Result<()> {
    let progress = if args.inputs.len() > 1 {
        let bar = ProgressBar::new(args.inputs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .expect("progress template is valid"),
        );
        Some(bar)
    } else {
        None
    };

    for path in &args.inputs {
        if let Some(bar) = &progress {
            bar.set_message(path.display().to_string());
        }
        let loaded = load(path, options)?;
        print_summary(path.display().to_string().as_str(), loaded.structure());
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    Ok(())
}

fn print_summary(source: &str, structure: &Structure) {
    info!(source, "loaded structure");

    let models = structure.len();
    let chains = structure.chains_iter().count();
    let residues = structure.residues_iter().count();
    let atoms = structure.atoms_iter().count();
    let disordered_residues = structure
        .chains_iter()
        .flat_map(|(_, chain)| chain.residue_entries())
        .filter(|(_, entry)| entry.is_disordered())
        .count();
    let disordered_atoms = structure
        .residues_iter()
        .flat_map(|(_, residue)| residue.atom_entries())
        .filter(|(_, entry)| entry.is_disordered())
        .count();
    let amino_acids = structure
        .residues_iter()
        .filter(|(_, residue)| is_standard_amino_acid(&residue.name))
        .count();
    let nucleotides = structure
        .residues_iter()
        .filter(|(_, residue)| is_standard_nucleotide(&residue.name))
        .count();

    println!("{} ({})", source, structure.id());
    println!("  models:   {}", models);
    println!("  chains:   {}", chains);
    for (_, chain) in structure.chains_iter() {
        println!("    {:<4} {} residues", chain.id, chain.len());
    }
    println!(
        "  residues: {} ({} amino acid, {} nucleotide, {} disordered)",
        residues, amino_acids, nucleotides, disordered_residues
    );
    println!("  atoms:    {} ({} disordered)", atoms, disordered_atoms);
}
