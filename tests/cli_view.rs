use assert_cmd::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn build_ca(dir: &std::path::Path) -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("conformers")?;
    let output = cmd
        .arg("ca")
        .arg("-u")
        .arg("P12345")
        .arg("-m")
        .arg("tests/mmcif/1abc_updated.cif")
        .arg("A")
        .arg("-m")
        .arg("tests/mmcif/2abc_updated.cif.gz")
        .arg("A")
        .arg("-c")
        .arg(dir)
        .output()?;
    assert!(output.status.success());
    Ok(())
}

#[test]
fn command_view() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    build_ca(temp.path())?;

    let mut cmd = Command::cargo_bin("conformers")?;
    let output = cmd
        .arg("view")
        .arg(temp.path().join("1abc_A_ca_distance_matrix.gz"))
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout.lines().count(), 12);
    let first: Vec<&str> = stdout.lines().next().unwrap().split('\t').collect();
    assert_eq!(first.len(), 12);
    assert_eq!(first[0], "0");
    assert_eq!(first[11], "41.8");

    // residue 1 is not observed in 2abc
    let mut cmd = Command::cargo_bin("conformers")?;
    let output = cmd
        .arg("view")
        .arg(temp.path().join("2abc_A_ca_distance_matrix.gz"))
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("NaN\tNaN\t"));

    Ok(())
}

#[test]
fn command_view_max() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    build_ca(temp.path())?;

    let mut cmd = Command::cargo_bin("conformers")?;
    let output = cmd
        .arg("view")
        .arg(temp.path().join("1abc_A_ca_distance_matrix.gz"))
        .arg(temp.path().join("2abc_A_ca_distance_matrix.gz"))
        .arg("--max")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout, "41.8\n");

    Ok(())
}

#[test]
fn command_view_corrupt() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("bad.gz");
    std::fs::write(&path, "not a matrix")?;

    let mut cmd = Command::cargo_bin("conformers")?;
    let output = cmd.arg("view").arg(&path).output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)?.contains("malformed matrix file"));

    Ok(())
}
