use assert_cmd::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn cluster_cmd(ca_dir: &Path, out_dir: &Path) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("conformers")?;
    cmd.arg("cluster")
        .arg("-u")
        .arg("P12345")
        .arg("-m")
        .arg("tests/mmcif/1abc_updated.cif")
        .arg("A")
        .arg("-m")
        .arg("tests/mmcif/2abc_updated.cif.gz")
        .arg("A")
        .arg("-m")
        .arg("tests/mmcif/3abc_updated.cif")
        .arg("A")
        .arg("-m")
        .arg("tests/mmcif/4abc_updated.cif")
        .arg("A")
        .arg("-c")
        .arg(ca_dir)
        .arg("-s")
        .arg(out_dir);
    Ok(cmd)
}

#[test]
fn command_cluster() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let ca_dir = temp.path().join("ca");
    let out_dir = temp.path().join("results");

    let output = cluster_cmd(&ca_dir, &out_dir)?.output()?;
    assert!(output.status.success());

    let table = std::fs::read_to_string(out_dir.join("P12345_sum_based_clustering_results.csv"))?;
    assert_eq!(
        table,
        "UNP_ACC,PDBe_ID,CHAIN_ID,CONFORMER_ID\n\
         P12345,1abc,A,0\n\
         P12345,2abc,A,0\n\
         P12345,3abc,A,1\n\
         P12345,4abc,A,1\n"
    );

    for name in [
        "P12345_score_matrix.gz",
        "P12345_label_matrix.json",
        "P12345_linkage_matrix.json",
        "P12345_linkage_matx_label_list.json",
        "P12345_chain_label_scores.json",
    ] {
        assert!(out_dir.join(name).is_file(), "{}", name);
    }
    assert!(!out_dir.join("P12345_dendrogram.nwk").exists());

    // 4 CA matrices and 6 difference matrices share the directory
    assert_eq!(std::fs::read_dir(&ca_dir)?.count(), 10);
    assert!(ca_dir
        .join("P12345_1abc_A_to_3abc_A_dd_matrix.gz")
        .is_file());

    let scores: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        out_dir.join("P12345_chain_label_scores.json"),
    )?)?;
    assert_eq!(scores["1abc_A_to_2abc_A"], 0.0);
    assert!(scores["1abc_A_to_3abc_A"].as_f64().unwrap() > 100.0);

    Ok(())
}

#[test]
fn command_cluster_cached() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let ca_dir = temp.path().join("ca");
    let out_dir = temp.path().join("results");

    assert!(cluster_cmd(&ca_dir, &out_dir)?.output()?.status.success());
    let first = std::fs::read_to_string(out_dir.join("P12345_chain_label_scores.json"))?;

    assert!(cluster_cmd(&ca_dir, &out_dir)?.output()?.status.success());
    let second = std::fs::read_to_string(out_dir.join("P12345_chain_label_scores.json"))?;
    assert_eq!(first, second);

    let mut cmd = cluster_cmd(&ca_dir, &out_dir)?;
    assert!(cmd.arg("--force").output()?.status.success());
    let forced = std::fs::read_to_string(out_dir.join("P12345_chain_label_scores.json"))?;
    assert_eq!(first, forced);

    Ok(())
}

#[test]
fn command_cluster_extras() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let ca_dir = temp.path().join("ca");
    let dd_dir = temp.path().join("dd");
    let out_dir = temp.path().join("results");

    let mut cmd = cluster_cmd(&ca_dir, &out_dir)?;
    let output = cmd
        .arg("-d")
        .arg(&dd_dir)
        .arg("--newick")
        .arg("--representatives")
        .arg("-n")
        .arg("2")
        .output()?;
    assert!(output.status.success());

    assert_eq!(std::fs::read_dir(&ca_dir)?.count(), 4);
    assert_eq!(std::fs::read_dir(&dd_dir)?.count(), 6);

    let nwk = std::fs::read_to_string(out_dir.join("P12345_dendrogram.nwk"))?;
    assert!(nwk.starts_with("((1abc_A:0,2abc_A:0):"));
    assert!(nwk.contains("(3abc_A:0,4abc_A:0):"));
    assert!(nwk.trim_end().ends_with(';'));

    let reps = std::fs::read_to_string(out_dir.join("P12345_representatives.csv"))?;
    let lines: Vec<&str> = reps.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "PDBe_ID,CHAIN_ID,CONFORMER_ID,REPRESENTATIVE");
    assert_eq!(lines[1], "1abc,A,0,true");
    assert_eq!(lines[2], "2abc,A,0,false");
    assert_eq!(lines[3], "3abc,A,1,true");
    assert_eq!(lines[4], "4abc,A,1,false");

    Ok(())
}

#[test]
fn command_cluster_single_state() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let out_dir = temp.path().join("results");

    let mut cmd = Command::cargo_bin("conformers")?;
    let output = cmd
        .arg("cluster")
        .arg("-u")
        .arg("P12345")
        .arg("-m")
        .arg("tests/mmcif/1abc_updated.cif")
        .arg("A")
        .arg("B")
        .arg("-m")
        .arg("tests/mmcif/2abc_updated.cif.gz")
        .arg("A")
        .arg("-c")
        .arg(temp.path().join("ca"))
        .arg("-s")
        .arg(&out_dir)
        .output()?;
    assert!(output.status.success());

    let table = std::fs::read_to_string(out_dir.join("P12345_sum_based_clustering_results.csv"))?;
    assert_eq!(table.lines().count(), 4);
    assert!(table.lines().skip(1).all(|line| line.ends_with(",0")));

    let linkage: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        out_dir.join("P12345_linkage_matrix.json"),
    )?)?;
    assert_eq!(linkage["leaves"], 3);
    assert_eq!(linkage["records"].as_array().unwrap().len(), 0);

    Ok(())
}
