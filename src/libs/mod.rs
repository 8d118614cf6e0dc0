pub mod atom;
pub mod conformer;
pub mod error;
pub mod io;
pub mod linalg;
pub mod linkage;
pub mod pairwise;
pub mod residue;
pub mod store;
