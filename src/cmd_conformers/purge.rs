use clap::*;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("purge")
        .about("Remove cached matrices of updated structures")
        .after_help(
            r###"
Removes every cached CA distance matrix of the given structures and every
difference matrix of the accession that involves them. They are rebuilt on
the next `ca` or `cluster` run.

Examples:
1. A structure was re-released:
   conformers purge -u P01901 -c ca_mats/ -d dd_mats/ 1atp

"###,
        )
        .arg(super::arg_unp())
        .arg(super::arg_ca_dir())
        .arg(super::arg_dd_dir())
        .arg(
            Arg::new("ids")
                .required(true)
                .num_args(1..)
                .index(1)
                .help("Structure ids, e.g. 1atp"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    use conformers::libs::store::MatrixStore;

    let accession = args.get_one::<String>("unp").unwrap();
    let store = super::store(args)?;

    for id in args.get_many::<String>("ids").unwrap() {
        let removed = store.remove_structure(accession, id)?;
        log::info!("Removed {} cached matrices of {}", removed, id);
    }

    Ok(())
}
