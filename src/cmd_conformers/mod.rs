//! Subcommand modules for the `conformers` binary.

use clap::*;
use conformers::libs::pairwise::{ClusterConfig, ConformerSet};
use conformers::libs::store::FsStore;

pub mod ca;
pub mod cluster;
pub mod purge;
pub mod view;

pub fn arg_unp() -> Arg {
    Arg::new("unp")
        .long("unp")
        .short('u')
        .num_args(1)
        .required(true)
        .help("UniProt accession the chains are numbered against")
}

pub fn arg_ca_dir() -> Arg {
    Arg::new("ca_dir")
        .long("ca-dir")
        .short('c')
        .num_args(1)
        .required(true)
        .help("Directory of cached CA distance matrices")
}

pub fn arg_dd_dir() -> Arg {
    Arg::new("dd_dir")
        .long("dd-dir")
        .short('d')
        .num_args(1)
        .help("Directory of cached distance difference matrices. Defaults to --ca-dir")
}

/// Arguments shared by the subcommands that load structures.
pub fn structure_args(cmd: Command) -> Command {
    cmd.arg(arg_unp())
        .arg(
            Arg::new("mmcif")
                .long("mmcif")
                .short('m')
                .num_args(2..)
                .action(ArgAction::Append)
                .required(true)
                .value_name("FILE CHAIN")
                .help("Updated mmCIF file followed by its chain labels. Can be repeated"),
        )
        .arg(arg_ca_dir())
        .arg(arg_dd_dir())
        .arg(
            Arg::new("nproc")
                .long("nproc")
                .short('n')
                .num_args(1)
                .default_value("1")
                .value_parser(value_parser!(usize))
                .help("Number of threads, used for more than 20 chains"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .short('f')
                .action(ArgAction::SetTrue)
                .help("Recompute matrices that are already cached"),
        )
        .arg(
            Arg::new("updated")
                .long("updated")
                .short('i')
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Structure ids whose cached matrices are removed first"),
        )
}

pub fn store(args: &ArgMatches) -> anyhow::Result<FsStore> {
    let ca_dir = args.get_one::<String>("ca_dir").unwrap();
    let dd_dir = args
        .get_one::<String>("dd_dir")
        .unwrap_or(ca_dir);
    FsStore::new(ca_dir, dd_dir)
}

/// Build the set of chains named by `--mmcif`, after purging `--updated`.
pub fn conformer_set(
    args: &ArgMatches,
    config: ClusterConfig,
) -> anyhow::Result<ConformerSet<FsStore>> {
    let accession = args.get_one::<String>("unp").unwrap();
    let config = ClusterConfig {
        nproc: *args.get_one::<usize>("nproc").unwrap(),
        force: args.get_flag("force"),
        ..config
    };

    let mut set = ConformerSet::new(accession, store(args)?, config);
    for values in args.get_occurrences::<String>("mmcif").unwrap() {
        let values: Vec<&String> = values.collect();
        let chains: Vec<String> = values[1..].iter().map(|s| s.to_string()).collect();
        set.add_structure(values[0], &chains);
    }
    if set.chains().is_empty() {
        return Err(anyhow::anyhow!("No mmCIF files among the --mmcif arguments"));
    }
    log::info!(
        "Loaded {} chains from {} files for {}",
        set.chains().len(),
        args.get_occurrences::<String>("mmcif").unwrap().count(),
        accession
    );

    if let Some(ids) = args.get_many::<String>("updated") {
        let ids: Vec<String> = ids.cloned().collect();
        set.remove_entries(&ids)?;
    }

    Ok(set)
}
