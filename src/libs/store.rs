//! Keyed cache of Cα distance and distance-difference matrices.
//!
//! Matrices are written as a gzipped binary record holding only the upper
//! triangle (diagonal included) as `f32` rounded to one decimal:
//!
//! ```text
//! u32 magic | u32 dim | u32 n_residues | u32 residue... | f32 upper[i][j>=i]...
//! ```
//!
//! All integers and floats are little endian. The observed residue list is
//! empty for difference matrices, which are stored before the noise floor is
//! applied.

use crate::libs::error::ConformerError;
use crate::libs::linalg::quantize;
use crate::libs::residue::ChainId;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nalgebra::DMatrix;
use std::collections::{BTreeSet, HashMap};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MATRIX_MAGIC: u32 = 0x584D4343; // "CCMX"

const CA_SUFFIX: &str = "_ca_distance_matrix.gz";
const DD_SUFFIX: &str = "_dd_matrix.gz";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Cα distance matrix of one chain
    Distance(ChainId),
    /// Distance-difference matrix of an unordered chain pair
    Difference {
        accession: String,
        a: ChainId,
        b: ChainId,
    },
}

impl CacheKey {
    /// Key of the pair `{a, b}`; the two chains are stored in sorted order.
    pub fn difference(accession: &str, a: &ChainId, b: &ChainId) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        CacheKey::Difference {
            accession: accession.to_string(),
            a: a.clone(),
            b: b.clone(),
        }
    }

    /// File name of the entry.
    ///
    /// ```
    /// use conformers::libs::residue::ChainId;
    /// use conformers::libs::store::CacheKey;
    /// let a = ChainId::new("2adp", "B");
    /// let b = ChainId::new("1atp", "A");
    /// assert_eq!(
    ///     CacheKey::Distance(a.clone()).name(),
    ///     "2adp_B_ca_distance_matrix.gz"
    /// );
    /// assert_eq!(
    ///     CacheKey::difference("P12345", &a, &b).name(),
    ///     "P12345_1atp_A_to_2adp_B_dd_matrix.gz"
    /// );
    /// ```
    pub fn name(&self) -> String {
        match self {
            CacheKey::Distance(id) => format!("{}{}", id, CA_SUFFIX),
            CacheKey::Difference { accession, a, b } => {
                format!("{}_{}_to_{}{}", accession, a, b, DD_SUFFIX)
            }
        }
    }

    /// Whether the entry depends on `structure` under `accession`. Distance
    /// matrices do not depend on the accession.
    pub fn involves(&self, accession: &str, structure: &str) -> bool {
        match self {
            CacheKey::Distance(id) => id.structure == structure,
            CacheKey::Difference { accession: acc, a, b } => {
                acc == accession && (a.structure == structure || b.structure == structure)
            }
        }
    }
}

/// A cached square matrix plus, for Cα matrices, the residues observed in
/// the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRecord {
    pub matrix: DMatrix<f64>,
    pub residues: BTreeSet<usize>,
}

impl MatrixRecord {
    pub fn new(matrix: DMatrix<f64>) -> Self {
        Self {
            matrix,
            residues: BTreeSet::new(),
        }
    }
}

/// Shared key-value store of matrices. Implementations must tolerate
/// concurrent writers of the same key.
pub trait MatrixStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> anyhow::Result<Option<MatrixRecord>>;

    fn save(&self, key: &CacheKey, record: &MatrixRecord) -> Result<(), ConformerError>;

    /// Drop every entry that depends on `structure`, returning how many went.
    fn remove_structure(&self, accession: &str, structure: &str) -> anyhow::Result<usize>;
}

//----------------------------
// Filesystem
//----------------------------
/// Cα matrices in one directory, difference matrices in another (possibly
/// the same).
#[derive(Debug, Clone)]
pub struct FsStore {
    ca_dir: PathBuf,
    dd_dir: PathBuf,
}

impl FsStore {
    pub fn new(ca_dir: impl Into<PathBuf>, dd_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let store = Self {
            ca_dir: ca_dir.into(),
            dd_dir: dd_dir.into(),
        };
        std::fs::create_dir_all(&store.ca_dir)?;
        std::fs::create_dir_all(&store.dd_dir)?;
        Ok(store)
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        match key {
            CacheKey::Distance(_) => self.ca_dir.join(key.name()),
            CacheKey::Difference { .. } => self.dd_dir.join(key.name()),
        }
    }

    fn remove_matching<F>(dir: &Path, matches: F) -> anyhow::Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let mut removed = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if path.is_file() && matches(&name) {
                log::debug!("Removing {}", path.display());
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl MatrixStore for FsStore {
    fn load(&self, key: &CacheKey) -> anyhow::Result<Option<MatrixRecord>> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(load_matrix(&path)?))
    }

    fn save(&self, key: &CacheKey, record: &MatrixRecord) -> Result<(), ConformerError> {
        save_matrix(&self.path(key), record)
    }

    fn remove_structure(&self, accession: &str, structure: &str) -> anyhow::Result<usize> {
        let ca_prefix = format!("{}_", structure);
        let mut removed = Self::remove_matching(&self.ca_dir, |name| {
            name.starts_with(&ca_prefix) && name.ends_with(CA_SUFFIX)
        })?;

        let dd_prefix = format!("{}_", accession);
        removed += Self::remove_matching(&self.dd_dir, |name| {
            name.strip_prefix(&dd_prefix)
                .and_then(|rest| rest.strip_suffix(DD_SUFFIX))
                .and_then(|pair| pair.split_once("_to_"))
                .map_or(false, |(a, b)| {
                    a.starts_with(&ca_prefix) || b.starts_with(&ca_prefix)
                })
        })?;

        Ok(removed)
    }
}

//----------------------------
// Memory
//----------------------------
/// Process-local store, nothing touches the disk.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: Mutex<HashMap<CacheKey, MatrixRecord>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatrixStore for MemStore {
    fn load(&self, key: &CacheKey) -> anyhow::Result<Option<MatrixRecord>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("matrix store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &CacheKey, record: &MatrixRecord) -> Result<(), ConformerError> {
        let mut entries = self.entries.lock().map_err(|_| ConformerError::CacheIo {
            key: key.name(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "matrix store lock poisoned"),
        })?;
        entries.insert(key.clone(), record.clone());
        Ok(())
    }

    fn remove_structure(&self, accession: &str, structure: &str) -> anyhow::Result<usize> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("matrix store lock poisoned"))?;
        let before = entries.len();
        entries.retain(|key, _| !key.involves(accession, structure));
        Ok(before - entries.len())
    }
}

//----------------------------
// Format
//----------------------------
/// Write `record` to `path` atomically: the data goes to a temporary file in
/// the same directory which is then renamed over the target.
pub fn save_matrix(path: &Path, record: &MatrixRecord) -> Result<(), ConformerError> {
    let cache_err = |source: std::io::Error| ConformerError::CacheIo {
        key: path.display().to_string(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(cache_err)?;

    let mut gz = GzEncoder::new(BufWriter::new(tmp), Compression::default());
    encode(record, &mut gz).map_err(cache_err)?;
    let tmp = gz
        .finish()
        .map_err(cache_err)?
        .into_inner()
        .map_err(|e| cache_err(e.into_error()))?;

    tmp.persist(path).map_err(|e| cache_err(e.error))?;
    Ok(())
}

pub fn load_matrix(path: &Path) -> Result<MatrixRecord, ConformerError> {
    let format_err = |message: String| ConformerError::MatrixFormat {
        path: path.display().to_string(),
        message,
    };

    let file = std::fs::File::open(path).map_err(|e| format_err(e.to_string()))?;
    let mut reader = BufReader::new(MultiGzDecoder::new(file));
    decode(&mut reader).map_err(format_err)
}

pub fn encode<W: Write>(record: &MatrixRecord, writer: &mut W) -> std::io::Result<()> {
    let n = record.matrix.nrows();
    if record.matrix.ncols() != n {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "only square matrices can be stored",
        ));
    }

    writer.write_all(&MATRIX_MAGIC.to_le_bytes())?;
    writer.write_all(&(n as u32).to_le_bytes())?;
    writer.write_all(&(record.residues.len() as u32).to_le_bytes())?;
    for &residue in &record.residues {
        writer.write_all(&(residue as u32).to_le_bytes())?;
    }
    for i in 0..n {
        for j in i..n {
            let value = quantize(record.matrix[(i, j)]) as f32;
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Read a record back, mirroring the stored upper triangle into the full
/// symmetric matrix.
pub fn decode<R: Read>(reader: &mut R) -> Result<MatrixRecord, String> {
    let magic = read_u32(reader)?;
    if magic != MATRIX_MAGIC {
        return Err(format!("bad magic number {:#x}", magic));
    }

    let n = read_u32(reader)? as usize;
    let n_residues = read_u32(reader)? as usize;
    n.checked_mul(n).ok_or_else(|| format!("dimension {} too large", n))?;

    let mut residues = BTreeSet::new();
    for _ in 0..n_residues {
        residues.insert(read_u32(reader)? as usize);
    }

    // read what is there before sizing the matrix
    let mut upper = vec![];
    for i in 0..n {
        for j in i..n {
            let mut buf = [0u8; 4];
            reader
                .read_exact(&mut buf)
                .map_err(|e| format!("truncated at [{}, {}]: {}", i, j, e))?;
            upper.push(f32::from_le_bytes(buf) as f64);
        }
    }

    let mut matrix = DMatrix::zeros(n, n);
    let mut values = upper.into_iter();
    for i in 0..n {
        for j in i..n {
            let value = values.next().unwrap_or(f64::NAN);
            matrix[(i, j)] = value;
            matrix[(j, i)] = value;
        }
    }

    Ok(MatrixRecord { matrix, residues })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, String> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| format!("truncated header: {}", e))?;
    Ok(u32::from_le_bytes(buf))
}
