use thiserror::Error;

/// Failures raised while turning structures into clustered conformers.
#[derive(Error, Debug)]
pub enum ConformerError {
    /// Required atom data is absent or unreadable. The chain cannot take part
    /// in clustering.
    #[error("structure {structure}: {message}")]
    StructureFormat { structure: String, message: String },

    /// The reference numbering column is missing from an updated mmCIF.
    #[error(
        "structure {structure} has no SIFTS UniProt numbering (pdbx_sifts_xref_db_num), \
         which is needed to cluster {accession}. Re-fetch the updated mmCIF once it has \
         been updated upstream and repeat clustering for {accession}"
    )]
    MissingNumbering {
        accession: String,
        structure: String,
    },

    #[error("{0}")]
    Index(String),

    /// Writing a cache entry failed. The matrix is still usable in memory.
    #[error("could not save matrix {key}")]
    CacheIo {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed matrix file {path}: {message}")]
    MatrixFormat { path: String, message: String },
}

impl ConformerError {
    pub fn structure(structure: &str, message: impl Into<String>) -> Self {
        ConformerError::StructureFormat {
            structure: structure.to_string(),
            message: message.into(),
        }
    }
}
