//! Cα selection and alignment of a chain onto the reference axis.

use crate::libs::atom::AtomTable;
use crate::libs::error::ConformerError;
use std::collections::BTreeSet;

/// A chain of one structure, e.g. `1atp_A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    pub structure: String,
    pub chain: String,
}

impl ChainId {
    pub fn new(structure: &str, chain: &str) -> Self {
        Self {
            structure: structure.to_string(),
            chain: chain.to_string(),
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}_{}", self.structure, self.chain)
    }
}

/// Cα coordinates of one chain, one entry per observed reference residue in
/// chain order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainCoords {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    /// Reference residue numbers, parallel to the coordinate lists
    pub residues: Vec<usize>,
}

/// Coordinates laid out on the dense reference axis `1..=max(observed)`.
/// Position `i` holds residue `i + 1`; gaps are `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedChain {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    /// The complete axis `1..=max(observed)`
    pub axis: Vec<usize>,
    /// What was actually observed, without the gap filling
    pub observed: BTreeSet<usize>,
}

impl ChainCoords {
    /// Pick the Cα atoms of `chain` out of an atom table.
    ///
    /// Only `ATOM` records named `CA` with a defined reference number are
    /// used, and the first record of each reference residue wins.
    pub fn from_table(
        table: &AtomTable,
        chain: &str,
        accession: &str,
    ) -> Result<Self, ConformerError> {
        if !table.has_reference {
            return Err(ConformerError::MissingNumbering {
                accession: accession.to_string(),
                structure: table.structure.clone(),
            });
        }

        let mut coords = ChainCoords::default();
        let mut seen = BTreeSet::new();
        for record in &table.records {
            if record.group != "ATOM" || record.atom != "CA" || record.chain != chain {
                continue;
            }
            let residue = match record.reference {
                Some(r) if r >= 1 => r as usize,
                _ => continue,
            };
            if !seen.insert(residue) {
                continue;
            }

            coords.x.push(record.x);
            coords.y.push(record.y);
            coords.z.push(record.z);
            coords.residues.push(residue);
        }

        if coords.residues.is_empty() {
            return Err(ConformerError::structure(
                &table.structure,
                format!("no CA atoms with reference numbering in chain {}", chain),
            ));
        }

        Ok(coords)
    }

    /// Fill internal and N-terminal gaps with `NaN` so that position `i`
    /// holds reference residue `i + 1`. Nothing is added after the highest
    /// observed residue.
    ///
    /// ```
    /// use conformers::libs::residue::ChainCoords;
    /// let coords = ChainCoords {
    ///     x: vec![3.0, 4.0],
    ///     y: vec![0.0, 0.0],
    ///     z: vec![0.0, 0.0],
    ///     residues: vec![3, 4],
    /// };
    /// let aligned = coords.fill_missing();
    /// assert_eq!(aligned.axis, vec![1, 2, 3, 4]);
    /// assert!(aligned.x[0].is_nan() && aligned.x[1].is_nan());
    /// assert_eq!(aligned.x[2], 3.0);
    /// ```
    pub fn fill_missing(&self) -> AlignedChain {
        let end = self.residues.iter().copied().max().unwrap_or(0);

        let mut aligned = AlignedChain {
            x: vec![f64::NAN; end],
            y: vec![f64::NAN; end],
            z: vec![f64::NAN; end],
            axis: (1..=end).collect(),
            observed: self.residues.iter().copied().collect(),
        };
        for (i, &residue) in self.residues.iter().enumerate() {
            aligned.x[residue - 1] = self.x[i];
            aligned.y[residue - 1] = self.y[i];
            aligned.z[residue - 1] = self.z[i];
        }

        aligned
    }
}
