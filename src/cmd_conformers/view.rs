use clap::*;
use conformers::libs::linalg::find_max;
use conformers::libs::store::load_matrix;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("view")
        .about("Print cached matrices")
        .after_help(
            r###"
Prints cached CA distance, distance difference or score matrices as TSV.
Values are stored with one decimal; missing residues show up as NaN.

Examples:
1. One CA distance matrix:
   conformers view ca_mats/1atp_A_ca_distance_matrix.gz

2. The largest difference over a set of matrices:
   conformers view dd_mats/P01901_*_dd_matrix.gz --max

"###,
        )
        .arg(
            Arg::new("infiles")
                .required(true)
                .num_args(1..)
                .index(1)
                .help("Matrix file(s) to print"),
        )
        .arg(
            Arg::new("max")
                .long("max")
                .action(ArgAction::SetTrue)
                .help("Print only the largest element over all matrices"),
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
    let mut writer = conformers::writer(args.get_one::<String>("outfile").unwrap())?;
    let is_max = args.get_flag("max");

    let mut max = 0.0;
    for infile in args.get_many::<String>("infiles").unwrap() {
        let record = load_matrix(std::path::Path::new(infile))?;

        if is_max {
            max = find_max(&record.matrix, max);
            continue;
        }

        for row in record.matrix.row_iter() {
            let line = row
                .iter()
                .map(|&v| (v as f32).to_string())
                .collect::<Vec<_>>()
                .join("\t");
            writer.write_fmt(format_args!("{}\n", line))?;
        }
    }

    if is_max {
        writer.write_fmt(format_args!("{}\n", max as f32))?;
    }
    writer.flush()?;

    Ok(())
}
