//! Flat conformer assignment of the chains of one accession, representative
//! selection, and the result files.

use crate::libs::linalg::{matrix_trim, median_matrix};
use crate::libs::linkage::{cluster_agglomerative, Linkage};
use crate::libs::pairwise::{ChainMatrix, PairScores};
use crate::libs::residue::ChainId;
use crate::libs::store::{save_matrix, MatrixRecord};
use anyhow::Context;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of the result table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConformerRow {
    pub accession: String,
    pub structure: String,
    pub chain: String,
    pub conformer: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Representative {
    pub conformer: usize,
    pub chain: ChainId,
    /// Entries equal to the conformer's median matrix
    pub matches: usize,
}

/// Clustering outcome for one accession.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub accession: String,
    pub scores: PairScores,
    pub linkage: Linkage,
    /// Conformer id per chain, in score matrix order
    pub labels: Vec<usize>,
    pub cutoff_fraction: f64,
    pub threshold: f64,
}

impl Clustering {
    pub fn new(accession: &str, scores: PairScores, cutoff_fraction: f64) -> Self {
        log::info!("Clustering {} chains of {}", scores.chains.len(), accession);
        let clusters = cluster_agglomerative(&scores.scores, cutoff_fraction);

        Self {
            accession: accession.to_string(),
            scores,
            linkage: clusters.linkage,
            labels: clusters.labels,
            cutoff_fraction,
            threshold: clusters.threshold,
        }
    }

    pub fn chains(&self) -> &[ChainId] {
        &self.scores.chains
    }

    pub fn n_conformers(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    pub fn rows(&self) -> Vec<ConformerRow> {
        self.chains()
            .iter()
            .zip(self.labels.iter())
            .map(|(id, &conformer)| ConformerRow {
                accession: self.accession.clone(),
                structure: id.structure.clone(),
                chain: id.chain.clone(),
                conformer,
            })
            .collect()
    }

    /// Member chains of each conformer, in chain order.
    pub fn by_conformer(&self) -> BTreeMap<usize, Vec<ChainId>> {
        let mut groups: BTreeMap<usize, Vec<ChainId>> = BTreeMap::new();
        for (id, &conformer) in self.chains().iter().zip(self.labels.iter()) {
            groups.entry(conformer).or_default().push(id.clone());
        }
        groups
    }

    /// One representative per conformer: the member whose (truncated) Cα
    /// matrix agrees most often with the elementwise median of all members.
    /// The first member wins ties.
    pub fn select_representatives(
        &self,
        matrices: &[ChainMatrix],
    ) -> anyhow::Result<Vec<Representative>> {
        log::info!("Selecting representatives of {} conformers", self.n_conformers());
        let by_id: HashMap<&ChainId, &ChainMatrix> = matrices.iter().map(|m| (&m.id, m)).collect();

        let mut representatives = vec![];
        for (conformer, members) in self.by_conformer() {
            let member_matrices = members
                .iter()
                .map(|id| {
                    by_id
                        .get(id)
                        .map(|m| &m.matrix)
                        .with_context(|| format!("No CA distance matrix for {}", id))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let smallest = member_matrices.iter().map(|m| m.nrows()).min().unwrap_or(0);
            let trimmed = member_matrices
                .iter()
                .map(|m| matrix_trim(m, smallest as i64))
                .collect::<Result<Vec<_>, _>>()?;
            let median = median_matrix(&trimmed.iter().collect::<Vec<_>>());

            let mut best: Option<Representative> = None;
            for (id, matrix) in members.iter().zip(trimmed.iter()) {
                let matches = matrix
                    .iter()
                    .zip(median.iter())
                    .filter(|(v, m)| v == m)
                    .count();
                log::debug!("{}: {} entries at the median", id, matches);

                if best.as_ref().map_or(true, |b| matches > b.matches) {
                    best = Some(Representative {
                        conformer,
                        chain: id.clone(),
                        matches,
                    });
                }
            }
            representatives.extend(best);
        }

        Ok(representatives)
    }

    //----------------------------
    // Output
    //----------------------------
    fn artifact(&self, out_dir: &Path, suffix: &str) -> PathBuf {
        out_dir.join(format!("{}_{}", self.accession, suffix))
    }

    /// Write the result table, the score matrix with its labels, the linkage
    /// and the score dictionary into `out_dir`. Returns the paths written.
    pub fn write_artifacts(&self, out_dir: &Path, newick: bool) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("could not create {}", out_dir.display()))?;
        let mut written = vec![];

        let path = self.artifact(out_dir, "sum_based_clustering_results.csv");
        let mut writer = csv::Writer::from_writer(std::fs::File::create(&path)?);
        writer.write_record(["UNP_ACC", "PDBe_ID", "CHAIN_ID", "CONFORMER_ID"])?;
        for row in self.rows() {
            writer.write_record([
                row.accession,
                row.structure,
                row.chain,
                row.conformer.to_string(),
            ])?;
        }
        writer.flush()?;
        written.push(path);

        let path = self.artifact(out_dir, "score_matrix.gz");
        save_matrix(&path, &MatrixRecord::new(self.scores.scores.clone()))?;
        written.push(path);

        let path = self.artifact(out_dir, "label_matrix.json");
        write_json(&path, &self.scores.labels)?;
        written.push(path);

        let path = self.artifact(out_dir, "linkage_matrix.json");
        write_json(&path, &self.linkage)?;
        written.push(path);

        let names = self.chain_names();
        let path = self.artifact(out_dir, "linkage_matx_label_list.json");
        write_json(&path, &names)?;
        written.push(path);

        let path = self.artifact(out_dir, "chain_label_scores.json");
        write_json(&path, &self.scores.by_label)?;
        written.push(path);

        if newick {
            let path = self.artifact(out_dir, "dendrogram.nwk");
            let mut writer = crate::libs::io::writer(&path.display().to_string())?;
            writeln!(writer, "{}", self.linkage.to_newick(&names))?;
            writer.flush()?;
            written.push(path);
        }

        for path in &written {
            log::info!("Saved {}", path.display());
        }
        Ok(written)
    }

    /// Every chain with its conformer and whether it represents it.
    pub fn write_representatives(
        &self,
        out_dir: &Path,
        representatives: &[Representative],
    ) -> anyhow::Result<PathBuf> {
        let path = self.artifact(out_dir, "representatives.csv");
        let mut writer = csv::Writer::from_writer(std::fs::File::create(&path)?);
        writer.write_record(["PDBe_ID", "CHAIN_ID", "CONFORMER_ID", "REPRESENTATIVE"])?;
        for (id, &conformer) in self.chains().iter().zip(self.labels.iter()) {
            let chosen = representatives.iter().any(|r| &r.chain == id);
            writer.write_record([
                id.structure.clone(),
                id.chain.clone(),
                conformer.to_string(),
                chosen.to_string(),
            ])?;
        }
        writer.flush()?;

        log::info!("Saved {}", path.display());
        Ok(path)
    }

    fn chain_names(&self) -> Vec<String> {
        self.chains().iter().map(|id| id.to_string()).collect()
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut writer = crate::libs::io::writer(&path.display().to_string())?;
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("could not write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::linkage::CUTOFF_FRACTION;
    use crate::libs::store::load_matrix;
    use indexmap::IndexMap;
    use nalgebra::DMatrix;
    use tempfile::TempDir;

    fn ids() -> Vec<ChainId> {
        vec![
            ChainId::new("1abc", "A"),
            ChainId::new("2abc", "A"),
            ChainId::new("3abc", "A"),
            ChainId::new("3abc", "B"),
        ]
    }

    fn pair_scores(values: &[f64]) -> PairScores {
        let chains = ids();
        let m = chains.len();
        let mut scores = DMatrix::zeros(m, m);
        let mut labels = vec![vec![String::new(); m]; m];
        let mut by_label = IndexMap::new();

        let mut k = 0;
        for i in 0..m {
            for j in (i + 1)..m {
                let label = format!("{}_to_{}", chains[i], chains[j]);
                scores[(i, j)] = values[k];
                scores[(j, i)] = values[k];
                labels[i][j] = label.clone();
                by_label.insert(label, values[k]);
                k += 1;
            }
        }

        PairScores {
            chains,
            scores,
            labels,
            by_label,
        }
    }

    // 1abc_A with 3abc_A, 2abc_A with 3abc_B
    fn two_states() -> Clustering {
        let scores = pair_scores(&[90.0, 1.0, 95.0, 92.0, 2.0, 91.0]);
        Clustering::new("P12345", scores, CUTOFF_FRACTION)
    }

    #[test]
    fn assignment_table() {
        let clustering = two_states();
        assert_eq!(clustering.n_conformers(), 2);

        let rows = clustering.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].accession, "P12345");
        assert_eq!(
            rows.iter().map(|r| r.conformer).collect::<Vec<_>>(),
            vec![0, 1, 0, 1]
        );
        assert_eq!(rows[3].structure, "3abc");
        assert_eq!(rows[3].chain, "B");

        let groups = clustering.by_conformer();
        assert_eq!(groups[&0], vec![ChainId::new("1abc", "A"), ChainId::new("3abc", "A")]);
        assert_eq!(groups[&1], vec![ChainId::new("2abc", "A"), ChainId::new("3abc", "B")]);
    }

    #[test]
    fn all_zero_is_one_conformer() {
        let clustering = Clustering::new("P12345", pair_scores(&[0.0; 6]), CUTOFF_FRACTION);
        assert_eq!(clustering.n_conformers(), 1);
        assert_eq!(clustering.labels, vec![0; 4]);
        assert!(clustering.linkage.records.is_empty());
    }

    #[test]
    fn representatives() -> anyhow::Result<()> {
        let clustering = two_states();

        let base = DMatrix::from_fn(4, 4, |i, j| (i as f64 - j as f64).abs() * 3.8);
        let shifted = base.map(|v| v + 1.0);
        let mut noisy = base.clone();
        noisy[(0, 3)] = 99.0;

        let matrices = vec![
            // conformer 0: 1abc_A has a longer axis and is trimmed to 4x4
            ChainMatrix {
                id: ChainId::new("1abc", "A"),
                matrix: DMatrix::from_fn(6, 6, |i, j| (i as f64 - j as f64).abs() * 4.0),
                residues: (1..=6).collect(),
            },
            ChainMatrix {
                id: ChainId::new("3abc", "A"),
                matrix: base.clone(),
                residues: (1..=4).collect(),
            },
            ChainMatrix {
                id: ChainId::new("2abc", "A"),
                matrix: noisy,
                residues: (1..=4).collect(),
            },
            ChainMatrix {
                id: ChainId::new("3abc", "B"),
                matrix: shifted,
                residues: (1..=4).collect(),
            },
        ];

        let reps = clustering.select_representatives(&matrices)?;
        assert_eq!(reps.len(), 2);

        // with two members every entry is the mean, ties go to the first
        assert_eq!(reps[0].conformer, 0);
        assert_eq!(reps[0].chain, ChainId::new("1abc", "A"));
        assert_eq!(reps[1].conformer, 1);
        assert_eq!(reps[1].chain, ChainId::new("2abc", "A"));

        // a missing matrix is an error
        assert!(clustering.select_representatives(&matrices[..3]).is_err());

        Ok(())
    }

    #[test]
    fn representative_of_three() -> anyhow::Result<()> {
        let chains = vec![
            ChainId::new("1abc", "A"),
            ChainId::new("2abc", "A"),
            ChainId::new("3abc", "A"),
        ];
        let scores = PairScores {
            chains: chains.clone(),
            scores: DMatrix::zeros(3, 3),
            labels: vec![vec![String::new(); 3]; 3],
            by_label: IndexMap::new(),
        };
        let clustering = Clustering::new("P12345", scores, CUTOFF_FRACTION);

        let matrices: Vec<ChainMatrix> = [1.0, 2.0, 3.0]
            .iter()
            .zip(chains.iter())
            .map(|(&v, id)| ChainMatrix {
                id: id.clone(),
                matrix: DMatrix::from_element(3, 3, v),
                residues: (1..=3).collect(),
            })
            .collect();

        let reps = clustering.select_representatives(&matrices)?;
        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].chain, ChainId::new("2abc", "A"));
        assert_eq!(reps[0].matches, 9);

        Ok(())
    }

    #[test]
    fn artifacts() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let out_dir = temp.path().join("results");
        let clustering = two_states();

        let written = clustering.write_artifacts(&out_dir, true)?;
        assert_eq!(written.len(), 7);
        for path in &written {
            assert!(path.is_file(), "{}", path.display());
        }

        let table =
            std::fs::read_to_string(out_dir.join("P12345_sum_based_clustering_results.csv"))?;
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "UNP_ACC,PDBe_ID,CHAIN_ID,CONFORMER_ID");
        assert_eq!(lines[1], "P12345,1abc,A,0");
        assert_eq!(lines[4], "P12345,3abc,B,1");

        let scores = load_matrix(&out_dir.join("P12345_score_matrix.gz"))?;
        assert_eq!(scores.matrix, clustering.scores.scores);

        let labels: Vec<Vec<String>> = serde_json::from_str(&std::fs::read_to_string(
            out_dir.join("P12345_label_matrix.json"),
        )?)?;
        assert_eq!(labels[0][1], "1abc_A_to_2abc_A");

        let linkage: Linkage = serde_json::from_str(&std::fs::read_to_string(
            out_dir.join("P12345_linkage_matrix.json"),
        )?)?;
        assert_eq!(linkage, clustering.linkage);

        let names: Vec<String> = serde_json::from_str(&std::fs::read_to_string(
            out_dir.join("P12345_linkage_matx_label_list.json"),
        )?)?;
        assert_eq!(names, vec!["1abc_A", "2abc_A", "3abc_A", "3abc_B"]);

        let dict: IndexMap<String, f64> = serde_json::from_str(&std::fs::read_to_string(
            out_dir.join("P12345_chain_label_scores.json"),
        )?)?;
        assert_eq!(dict.len(), 6);
        assert_eq!(dict["1abc_A_to_3abc_A"], 1.0);

        let nwk = std::fs::read_to_string(out_dir.join("P12345_dendrogram.nwk"))?;
        assert!(nwk.starts_with("((1abc_A:1,3abc_A:1):91,(2abc_A:2,3abc_B:2):90);"));
        assert!(nwk.trim_end().ends_with(';'));

        Ok(())
    }

    #[test]
    fn representative_table() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let clustering = two_states();
        let reps = vec![
            Representative {
                conformer: 0,
                chain: ChainId::new("3abc", "A"),
                matches: 16,
            },
            Representative {
                conformer: 1,
                chain: ChainId::new("2abc", "A"),
                matches: 16,
            },
        ];

        let path = clustering.write_representatives(temp.path(), &reps)?;
        let table = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "PDBe_ID,CHAIN_ID,CONFORMER_ID,REPRESENTATIVE");
        assert_eq!(lines[1], "1abc,A,0,false");
        assert_eq!(lines[2], "2abc,A,1,true");
        assert_eq!(lines[3], "3abc,A,0,true");

        Ok(())
    }
}
