use clap::*;
use conformers::libs::conformer::Clustering;
use conformers::libs::pairwise::ClusterConfig;
use std::path::Path;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    super::structure_args(
        Command::new("cluster")
            .about("Cluster chains of one UniProt accession into conformers")
            .after_help(
                r###"
Compares the CA distance matrices of all chain pairs, scores each pair by the
sum of distance differences above --dd-cutoff, and clusters the score matrix
with average linkage. The tree is cut at --cutoff times the highest merge
distance.

Files written to --save, prefixed with the accession:
* _sum_based_clustering_results.csv  UNP_ACC,PDBe_ID,CHAIN_ID,CONFORMER_ID
* _score_matrix.gz                    pairwise scores, see `conformers view`
* _label_matrix.json                  pair labels of the score matrix
* _linkage_matrix.json                merge history
* _linkage_matx_label_list.json       chain order of the matrices
* _chain_label_scores.json            pair label -> score
* _dendrogram.nwk                     with --newick
* _representatives.csv                with --representatives

Examples:
1. Cluster four chains:
   conformers cluster -u P01901 \
       -m 1atp_updated.cif A B -m 2adp_updated.cif A -m 3amp_updated.cif A \
       -c ca_mats/ -d dd_mats/ -s results/

2. Use 8 threads and a tighter cut:
   conformers cluster -u P01901 -m ... -c ca_mats/ -s results/ -n 8 --cutoff 0.5

"###,
            ),
    )
    .arg(
        Arg::new("save")
            .long("save")
            .short('s')
            .num_args(1)
            .required(true)
            .help("Directory of the clustering results"),
    )
    .arg(
        Arg::new("cutoff")
            .long("cutoff")
            .num_args(1)
            .default_value("0.7")
            .value_parser(value_parser!(f64))
            .help("Cut the tree at this fraction of the highest merge distance"),
    )
    .arg(
        Arg::new("dd_cutoff")
            .long("dd-cutoff")
            .num_args(1)
            .default_value("3.0")
            .value_parser(value_parser!(f64))
            .help("Distance differences below this are ignored"),
    )
    .arg(
        Arg::new("representatives")
            .long("representatives")
            .action(ArgAction::SetTrue)
            .help("Select a representative chain per conformer. Slow"),
    )
    .arg(
        Arg::new("newick")
            .long("newick")
            .action(ArgAction::SetTrue)
            .help("Also write the dendrogram as Newick"),
    )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let out_dir = Path::new(args.get_one::<String>("save").unwrap());
    let config = ClusterConfig {
        cutoff_fraction: *args.get_one::<f64>("cutoff").unwrap(),
        dd_cutoff: *args.get_one::<f64>("dd_cutoff").unwrap(),
        ..Default::default()
    };

    let set = super::conformer_set(args, config)?;

    let chains = set.distance_matrices()?;
    let scores = set.score_matrix(&chains)?;
    let clustering = Clustering::new(set.accession(), scores, set.config().cutoff_fraction);
    log::info!(
        "{} chains of {} form {} conformer(s)",
        clustering.chains().len(),
        set.accession(),
        clustering.n_conformers()
    );

    clustering.write_artifacts(out_dir, args.get_flag("newick"))?;

    if args.get_flag("representatives") {
        let representatives = clustering.select_representatives(&chains)?;
        for rep in &representatives {
            log::info!("Conformer {}: {}", rep.conformer, rep.chain);
        }
        clustering.write_representatives(out_dir, &representatives)?;
    }

    Ok(())
}
