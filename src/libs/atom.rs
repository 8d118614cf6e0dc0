//! Atom records of one structure, read from the `_atom_site` loop of an
//! (updated) mmCIF file.
//!
//! Only the columns needed for conformer clustering are kept. Coordinates are
//! parsed eagerly; the reference residue number (`pdbx_sifts_xref_db_num`) is
//! optional because not every mmCIF carries SIFTS annotations.

use crate::libs::error::ConformerError;
use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref RE_MMCIF: Regex = Regex::new(r"^(?P<id>[^_.]+)[^/\\]*\.cif(\.gz)?$").unwrap();
}

const GROUP: &str = "group_PDB";
const ATOM: &str = "label_atom_id";
const CHAIN: &str = "label_asym_id";
const X: &str = "Cartn_x";
const Y: &str = "Cartn_y";
const Z: &str = "Cartn_z";
const REFERENCE: &str = "pdbx_sifts_xref_db_num";

#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    /// `ATOM` or `HETATM`
    pub group: String,
    pub atom: String,
    pub chain: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Residue number on the reference sequence, `None` for the `?`/`.` sentinels
    pub reference: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct AtomTable {
    pub structure: String,
    pub records: Vec<AtomRecord>,
    /// False when the reference numbering column is absent altogether
    pub has_reference: bool,
}

/// Structure id encoded in an mmCIF file name, `None` for anything that is
/// not `*.cif` or `*.cif.gz`.
///
/// ```
/// use conformers::libs::atom::structure_id;
/// assert_eq!(structure_id("data/1atp_updated.cif").as_deref(), Some("1atp"));
/// assert_eq!(structure_id("2adp.cif.gz").as_deref(), Some("2adp"));
/// assert_eq!(structure_id("3amp.pdb"), None);
/// ```
pub fn structure_id(path: &str) -> Option<String> {
    let name = Path::new(path).file_name()?.to_str()?;
    RE_MMCIF
        .captures(name)
        .map(|caps| caps["id"].to_string())
}

impl AtomTable {
    /// Load the atom table of an (optionally gzipped) mmCIF file.
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        let structure = structure_id(path)
            .with_context(|| format!("{} is not an mmCIF file", path))?;
        let text = crate::libs::io::read_to_string(path)?;
        let table = Self::from_mmcif(&structure, &text)?;
        Ok(table)
    }

    /// ```
    /// use conformers::libs::atom::AtomTable;
    /// let text = "data_1TST
    /// loop_
    /// _atom_site.group_PDB
    /// _atom_site.label_atom_id
    /// _atom_site.label_asym_id
    /// _atom_site.Cartn_x
    /// _atom_site.Cartn_y
    /// _atom_site.Cartn_z
    /// _atom_site.pdbx_sifts_xref_db_num
    /// ATOM N  A 0.0 1.0 2.0 5
    /// ATOM CA A 1.0 1.0 2.0 5
    /// ATOM CA A 2.0 1.0 2.0 ?
    /// #
    /// ";
    /// let table = AtomTable::from_mmcif("1tst", text).unwrap();
    /// assert_eq!(table.records.len(), 3);
    /// assert!(table.has_reference);
    /// assert_eq!(table.records[1].reference, Some(5));
    /// assert_eq!(table.records[2].reference, None);
    /// ```
    pub fn from_mmcif(structure: &str, text: &str) -> Result<Self, ConformerError> {
        let (columns, tokens) = atom_site_loop(text)
            .ok_or_else(|| ConformerError::structure(structure, "no _atom_site loop found"))?;

        let index_of = |name: &str| columns.iter().position(|c| c == name);
        let mut required = vec![];
        let mut missing = vec![];
        for name in [GROUP, ATOM, CHAIN, X, Y, Z] {
            match index_of(name) {
                Some(i) => required.push(i),
                None => missing.push(name),
            }
        }
        if !missing.is_empty() {
            return Err(ConformerError::structure(
                structure,
                format!("missing _atom_site column(s): {}", missing.join(", ")),
            ));
        }
        let reference = index_of(REFERENCE);

        if tokens.len() % columns.len() != 0 {
            return Err(ConformerError::structure(
                structure,
                format!(
                    "_atom_site holds {} values, not a multiple of {} columns",
                    tokens.len(),
                    columns.len()
                ),
            ));
        }

        let coord = |value: &str| {
            value.parse::<f64>().map_err(|_| {
                ConformerError::structure(structure, format!("invalid coordinate '{}'", value))
            })
        };

        let mut records = Vec::with_capacity(tokens.len() / columns.len());
        for row in tokens.chunks(columns.len()) {
            let reference = match reference {
                Some(i) if row[i] != "?" && row[i] != "." => {
                    Some(row[i].parse::<i64>().map_err(|_| {
                        ConformerError::structure(
                            structure,
                            format!("invalid reference residue number '{}'", row[i]),
                        )
                    })?)
                }
                _ => None,
            };
            records.push(AtomRecord {
                group: row[required[0]].clone(),
                atom: row[required[1]].clone(),
                chain: row[required[2]].clone(),
                x: coord(&row[required[3]])?,
                y: coord(&row[required[4]])?,
                z: coord(&row[required[5]])?,
                reference,
            });
        }

        Ok(Self {
            structure: structure.to_string(),
            records,
            has_reference: reference.is_some(),
        })
    }
}

/// Column names (without the `_atom_site.` prefix) and the flat value stream
/// of the `_atom_site` loop.
fn atom_site_loop(text: &str) -> Option<(Vec<String>, Vec<String>)> {
    let mut lines = text.lines().peekable();

    // seek to a loop_ whose first item is _atom_site.
    loop {
        let line = lines.next()?.trim();
        if line != "loop_" {
            continue;
        }
        while let Some(next) = lines.peek() {
            let next = next.trim();
            if next.is_empty() || next.starts_with('#') {
                lines.next();
            } else {
                break;
            }
        }
        if lines.peek()?.trim().starts_with("_atom_site.") {
            break;
        }
    }

    let mut columns = vec![];
    while let Some(line) = lines.peek() {
        let line = line.trim();
        match line.strip_prefix("_atom_site.") {
            Some(name) => {
                columns.push(name.to_string());
                lines.next();
            }
            None => break,
        }
    }

    let mut tokens = vec![];
    let mut text_field: Option<String> = None;
    for line in lines {
        // multi-line text fields are delimited by ';' in the first column
        if let Some(field) = text_field.as_mut() {
            if line.starts_with(';') {
                tokens.push(std::mem::take(field));
                text_field = None;
            } else {
                if !field.is_empty() {
                    field.push('\n');
                }
                field.push_str(line);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix(';') {
            text_field = Some(rest.to_string());
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#')
            || trimmed.starts_with('_')
            || trimmed.starts_with("loop_")
            || trimmed.starts_with("data_")
        {
            break;
        }
        tokenize(trimmed, &mut tokens);
    }

    if columns.is_empty() {
        None
    } else {
        Some((columns, tokens))
    }
}

/// Split a data line into values. A quote only closes a quoted value when it
/// is followed by whitespace, so `'O5''` style names survive.
fn tokenize(line: &str, tokens: &mut Vec<String>) {
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        if chars[i] == '\'' || chars[i] == '"' {
            let quote = chars[i];
            let start = i + 1;
            let mut end = start;
            while end < len
                && !(chars[end] == quote && (end + 1 == len || chars[end + 1].is_whitespace()))
            {
                end += 1;
            }
            tokens.push(chars[start..end].iter().collect());
            i = end + 1;
            continue;
        }

        let start = i;
        while i < len && !chars[i].is_whitespace() {
            i += 1;
        }
        tokens.push(chars[start..i].iter().collect());
    }
}
