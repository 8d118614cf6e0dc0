//! All-vs-all comparison of the chains of one accession.
//!
//! Two parallel phases run on a per-run rayon pool: one Cα distance matrix
//! per chain, then one distance-difference score per unordered chain pair.
//! Both phases go through a [`MatrixStore`] so repeated runs reuse earlier
//! work.

use crate::libs::atom::{structure_id, AtomTable};
use crate::libs::linalg::{self, apply_cutoff, ca_matrix, distance_difference, quantize_matrix};
use crate::libs::residue::{ChainCoords, ChainId};
use crate::libs::store::{CacheKey, MatrixRecord, MatrixStore};
use anyhow::Context;
use indexmap::IndexMap;
use itertools::Itertools;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Fraction of the highest merge distance where the tree is cut
    pub cutoff_fraction: f64,
    /// Distance differences below this are noise
    pub dd_cutoff: f64,
    /// Diagonals left out of the score
    pub res_mask: usize,
    pub nproc: usize,
    /// Up to this many chains everything runs on a single thread
    pub serial_max_chains: usize,
    /// Recompute matrices even when cached
    pub force: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cutoff_fraction: crate::libs::linkage::CUTOFF_FRACTION,
            dd_cutoff: linalg::DD_CUTOFF,
            res_mask: linalg::RES_MASK,
            nproc: 10,
            serial_max_chains: 20,
            force: false,
        }
    }
}

/// Cα distance matrix of one chain on the reference axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainMatrix {
    pub id: ChainId,
    pub matrix: DMatrix<f64>,
    /// Reference residues actually observed
    pub residues: BTreeSet<usize>,
}

/// The symmetric score matrix and its labels, rows in chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScores {
    pub chains: Vec<ChainId>,
    pub scores: DMatrix<f64>,
    /// `{a}_to_{b}` above the diagonal, empty elsewhere
    pub labels: Vec<Vec<String>>,
    /// Score of every compared pair, in dispatch order
    pub by_label: IndexMap<String, f64>,
}

/// ```
/// use conformers::libs::pairwise::pair_label;
/// use conformers::libs::residue::ChainId;
/// let label = pair_label(&ChainId::new("1atp", "A"), &ChainId::new("2adp", "B"));
/// assert_eq!(label, "1atp_A_to_2adp_B");
/// ```
pub fn pair_label(a: &ChainId, b: &ChainId) -> String {
    format!("{}_to_{}", a, b)
}

#[derive(Debug, Clone)]
struct StructureEntry {
    path: String,
    chains: Vec<String>,
}

/// Chains of one accession together with the matrix store they share.
pub struct ConformerSet<S: MatrixStore> {
    accession: String,
    structures: IndexMap<String, StructureEntry>,
    store: S,
    config: ClusterConfig,
}

impl<S: MatrixStore> ConformerSet<S> {
    pub fn new(accession: &str, store: S, config: ClusterConfig) -> Self {
        Self {
            accession: accession.to_string(),
            structures: IndexMap::new(),
            store,
            config,
        }
    }

    pub fn accession(&self) -> &str {
        &self.accession
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register chains of an mmCIF file. Files not named `*.cif`/`*.cif.gz`
    /// are skipped and `false` is returned.
    pub fn add_structure(&mut self, path: &str, chains: &[String]) -> bool {
        let structure = match structure_id(path) {
            Some(id) => id,
            None => {
                log::debug!("Skipping {}, not an mmCIF file", path);
                return false;
            }
        };

        let entry = self
            .structures
            .entry(structure)
            .or_insert_with(|| StructureEntry {
                path: path.to_string(),
                chains: vec![],
            });
        for chain in chains {
            if !entry.chains.contains(chain) {
                entry.chains.push(chain.clone());
            }
        }
        true
    }

    /// All chains, in registration order. This is the row order of every
    /// matrix built from the set.
    pub fn chains(&self) -> Vec<ChainId> {
        self.structures
            .iter()
            .flat_map(|(structure, entry)| {
                entry
                    .chains
                    .iter()
                    .map(move |chain| ChainId::new(structure, chain))
            })
            .collect()
    }

    /// Small inputs are not worth a thread pool.
    pub fn pool_size(&self) -> usize {
        if self.chains().len() <= self.config.serial_max_chains {
            1
        } else {
            self.config.nproc.max(1)
        }
    }

    /// Forget every cached matrix that depends on the given structures.
    pub fn remove_entries(&self, structures: &[String]) -> anyhow::Result<usize> {
        let mut removed = 0;
        for structure in structures {
            let n = self.store.remove_structure(&self.accession, structure)?;
            log::info!("Removed {} cached matrices of {}", n, structure);
            removed += n;
        }
        Ok(removed)
    }

    fn pool(&self) -> anyhow::Result<rayon::ThreadPool> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size())
            .build()?;
        Ok(pool)
    }

    //----------------------------
    // Phase 1
    //----------------------------
    /// Cα distance matrices of all chains, in chain order.
    pub fn distance_matrices(&self) -> anyhow::Result<Vec<ChainMatrix>> {
        let tasks: Vec<(ChainId, &str)> = self
            .structures
            .iter()
            .flat_map(|(structure, entry)| {
                entry
                    .chains
                    .iter()
                    .map(move |chain| (ChainId::new(structure, chain), entry.path.as_str()))
            })
            .collect();

        log::info!(
            "Computing CA distance matrices of {} chains on {} thread(s)",
            tasks.len(),
            self.pool_size()
        );
        let pool = self.pool()?;
        pool.install(|| {
            tasks
                .par_iter()
                .map(|(id, path)| self.chain_matrix(id, path))
                .collect()
        })
    }

    fn chain_matrix(&self, id: &ChainId, path: &str) -> anyhow::Result<ChainMatrix> {
        let key = CacheKey::Distance(id.clone());
        if !self.config.force {
            if let Some(record) = self.store.load(&key)? {
                log::debug!("Loaded CA distance matrix of {}", id);
                return Ok(ChainMatrix {
                    id: id.clone(),
                    matrix: record.matrix,
                    residues: record.residues,
                });
            }
        }

        log::debug!("Building CA distance matrix of {}", id);
        let table = AtomTable::from_path(path)?;
        let coords = ChainCoords::from_table(&table, &id.chain, &self.accession)
            .with_context(|| format!("Chain {} of {}", id.chain, path))?;
        let aligned = coords.fill_missing();

        let record = MatrixRecord {
            matrix: quantize_matrix(&ca_matrix(&aligned.x, &aligned.y, &aligned.z)),
            residues: aligned.observed,
        };
        if let Err(err) = self.store.save(&key, &record) {
            log::warn!("{}", err);
        }

        Ok(ChainMatrix {
            id: id.clone(),
            matrix: record.matrix,
            residues: record.residues,
        })
    }

    //----------------------------
    // Phase 2
    //----------------------------
    /// Score every unordered pair of `chains` and assemble the full matrix.
    pub fn score_matrix(&self, chains: &[ChainMatrix]) -> anyhow::Result<PairScores> {
        let m = chains.len();
        let pairs: Vec<(usize, usize)> = (0..m).tuple_combinations().collect();

        log::info!(
            "Computing {} distance difference matrices on {} thread(s)",
            pairs.len(),
            self.pool_size()
        );
        let pool = self.pool()?;
        let values: Vec<f64> = pool.install(|| {
            pairs
                .par_iter()
                .map(|&(i, j)| self.pair_score(&chains[i], &chains[j]))
                .collect::<anyhow::Result<Vec<_>>>()
        })?;

        let mut result = PairScores {
            chains: chains.iter().map(|c| c.id.clone()).collect(),
            scores: DMatrix::zeros(m, m),
            labels: vec![vec![String::new(); m]; m],
            by_label: IndexMap::with_capacity(pairs.len()),
        };
        for (&(i, j), &value) in pairs.iter().zip(values.iter()) {
            let label = pair_label(&chains[i].id, &chains[j].id);
            result.scores[(i, j)] = value;
            result.scores[(j, i)] = value;
            result.labels[i][j] = label.clone();
            result.by_label.insert(label, value);
        }

        Ok(result)
    }

    fn pair_score(&self, a: &ChainMatrix, b: &ChainMatrix) -> anyhow::Result<f64> {
        let key = CacheKey::difference(&self.accession, &a.id, &b.id);

        let cached = if self.config.force {
            None
        } else {
            self.store.load(&key)?
        };
        // stored before the noise floor
        let dd = match cached {
            Some(record) => {
                log::debug!("Loaded {}", key.name());
                record.matrix
            }
            None => {
                let dd = quantize_matrix(&distance_difference(&a.matrix, &b.matrix)?);
                if let Err(err) = self.store.save(&key, &MatrixRecord::new(dd.clone())) {
                    log::warn!("{}", err);
                }
                dd
            }
        };
        let dd = apply_cutoff(&dd, self.config.dd_cutoff);

        let value = linalg::score(&dd, &a.residues, &b.residues, self.config.res_mask);
        log::debug!("{}: {}", pair_label(&a.id, &b.id), value);
        Ok(value)
    }
}
