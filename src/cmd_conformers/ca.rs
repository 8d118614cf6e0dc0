use clap::*;
use conformers::libs::pairwise::ClusterConfig;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    super::structure_args(
        Command::new("ca")
            .about("Build and cache CA distance matrices")
            .after_help(
                r###"
Builds the CA distance matrix of every chain on the UniProt residue axis and
caches it in --ca-dir. Matrices already cached are reused unless --force.

Output is a TSV of chain, matrix dimension and observed residue count.

Notes:
* Only *.cif and *.cif.gz files are read; the structure id is the file name
  up to the first `_` or `.`, e.g. 1atp_updated.cif -> 1atp
* The mmCIF must carry SIFTS UniProt numbering (pdbx_sifts_xref_db_num)

Examples:
1. Two chains of one structure:
   conformers ca -u P01901 -m 1atp_updated.cif A B -c ca_mats/

2. Rebuild the matrices of an updated entry:
   conformers ca -u P01901 -m 1atp_updated.cif A -m 2adp_updated.cif A -c ca_mats/ -i 2adp

"###,
            ),
    )
    .arg(
        Arg::new("outfile")
            .long("outfile")
            .short('o')
            .num_args(1)
            .default_value("stdout")
            .help("Output filename. [stdout] for screen"),
    )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let set = super::conformer_set(args, ClusterConfig::default())?;
    let mut writer = conformers::writer(args.get_one::<String>("outfile").unwrap())?;

    let chains = set.distance_matrices()?;
    for chain in &chains {
        writer.write_fmt(format_args!(
            "{}\t{}\t{}\n",
            chain.id,
            chain.matrix.nrows(),
            chain.residues.len()
        ))?;
    }
    writer.flush()?;

    Ok(())
}
