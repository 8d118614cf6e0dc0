extern crate clap;
use clap::*;

mod cmd_conformers;

fn main() -> anyhow::Result<()> {
    let app = Command::new("conformers")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`conformers` - Conformational states of protein chains")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log debug messages"),
        )
        .subcommand(cmd_conformers::ca::make_subcommand())
        .subcommand(cmd_conformers::cluster::make_subcommand())
        .subcommand(cmd_conformers::purge::make_subcommand())
        .subcommand(cmd_conformers::view::make_subcommand())
        .after_help(
            r###"Subcommands:

* Matrices:
    * ca    - Build and cache CA distance matrices
    * purge - Remove cached matrices of updated structures
    * view  - Print cached matrices

* Clustering:
    * cluster - Cluster chains of one UniProt accession into conformers

Log messages go to stderr. RUST_LOG overrides the level set by --verbose.

"###,
        );

    let matches = app.get_matches();

    let level = if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    // Check which subcommand the user ran...
    match matches.subcommand() {
        Some(("ca", sub_matches)) => cmd_conformers::ca::execute(sub_matches),
        Some(("cluster", sub_matches)) => cmd_conformers::cluster::execute(sub_matches),
        Some(("purge", sub_matches)) => cmd_conformers::purge::execute(sub_matches),
        Some(("view", sub_matches)) => cmd_conformers::view::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
