//! Cα distance matrices, distance-difference matrices and the clustering score.
//!
//! All matrices are square `DMatrix<f64>` on the reference axis, with `NaN`
//! marking residues absent from a chain.

use crate::libs::error::ConformerError;
use nalgebra::DMatrix;
use std::collections::BTreeSet;

/// Default noise floor for distance differences, in Å
pub const DD_CUTOFF: f64 = 3.0;

/// Default number of diagonals ignored when scoring
pub const RES_MASK: usize = 1;

/// ```
/// use conformers::libs::linalg::euclidean;
/// assert_eq!(euclidean([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]), 5.0);
/// assert!(euclidean([f64::NAN, 0.0, 0.0], [3.0, 4.0, 0.0]).is_nan());
/// ```
pub fn euclidean(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Pairwise Euclidean distances between all points. Entries involving a
/// `NaN` coordinate are `NaN`.
pub fn ca_matrix(x: &[f64], y: &[f64], z: &[f64]) -> DMatrix<f64> {
    assert!(
        x.len() == y.len() && y.len() == z.len(),
        "coordinate lists differ in length"
    );

    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| euclidean([x[i], y[i], z[i]], [x[j], y[j], z[j]]))
}

/// Keep the first `end` rows and columns of a square matrix.
///
/// ```
/// use conformers::libs::linalg::matrix_trim;
/// use nalgebra::DMatrix;
/// let m = DMatrix::from_fn(9, 9, |i, j| (i * 9 + j) as f64);
/// let trimmed = matrix_trim(&m, 4).unwrap();
/// assert_eq!(trimmed.shape(), (4, 4));
/// assert_eq!(trimmed[(3, 2)], 29.0);
/// assert!(matrix_trim(&m, 0).is_err());
/// ```
pub fn matrix_trim(matrix: &DMatrix<f64>, end: i64) -> Result<DMatrix<f64>, ConformerError> {
    if end <= 0 {
        return Err(ConformerError::Index(
            "Index to trim end matrix rows and columns must be positive".to_string(),
        ));
    }

    let keep = (end as usize).min(matrix.nrows()).min(matrix.ncols());
    Ok(matrix.view((0, 0), (keep, keep)).into_owned())
}

/// Truncate the larger of two square matrices from its tail so that both end
/// up the size of the smaller one.
pub fn trim_to_smallest(
    m1: &DMatrix<f64>,
    m2: &DMatrix<f64>,
) -> Result<(DMatrix<f64>, DMatrix<f64>), ConformerError> {
    let smallest = m1.nrows().min(m2.nrows()) as i64;

    if m1.nrows() as i64 > smallest {
        Ok((matrix_trim(m1, smallest)?, m2.clone()))
    } else {
        Ok((m1.clone(), matrix_trim(m2, smallest)?))
    }
}

/// Elementwise `|m1 - m2|`; `NaN` propagates.
pub fn abs_diff(m1: &DMatrix<f64>, m2: &DMatrix<f64>) -> DMatrix<f64> {
    m1.zip_map(m2, |a, b| (a - b).abs())
}

/// Zero every entry below `cutoff`. `NaN` entries are kept.
pub fn apply_cutoff(matrix: &DMatrix<f64>, cutoff: f64) -> DMatrix<f64> {
    matrix.map(|v| if v < cutoff { 0.0 } else { v })
}

/// Distance-difference matrix of two Cα distance matrices that may differ in
/// size, before any noise floor.
pub fn distance_difference(
    ca1: &DMatrix<f64>,
    ca2: &DMatrix<f64>,
) -> Result<DMatrix<f64>, ConformerError> {
    let (ca1, ca2) = trim_to_smallest(ca1, ca2)?;
    Ok(abs_diff(&ca1, &ca2))
}

/// Thresholded distance-difference matrix of two Cα distance matrices that
/// may differ in size.
pub fn difference_matrix(
    ca1: &DMatrix<f64>,
    ca2: &DMatrix<f64>,
    cutoff: f64,
) -> Result<DMatrix<f64>, ConformerError> {
    Ok(apply_cutoff(&distance_difference(ca1, ca2)?, cutoff))
}

/// Entries with `j - i >= res_mask`, row by row. With `numeric` the `NaN`
/// entries are dropped.
pub fn upper_triangle(matrix: &DMatrix<f64>, res_mask: usize, numeric: bool) -> Vec<f64> {
    let mut values = vec![];
    for i in 0..matrix.nrows() {
        for j in (i + res_mask)..matrix.ncols() {
            let v = matrix[(i, j)];
            if numeric && v.is_nan() {
                continue;
            }
            values.push(v);
        }
    }
    values
}

/// Number of reference residues observed in both chains.
pub fn overlap(r1: &BTreeSet<usize>, r2: &BTreeSet<usize>) -> usize {
    r1.intersection(r2).count()
}

/// Dissimilarity of two chains: the sum of the thresholded upper triangle of
/// their distance-difference matrix, scaled by `overlap² / (|r1| · |r2|)`.
///
/// ```
/// use conformers::libs::linalg::score;
/// use nalgebra::DMatrix;
/// use std::collections::BTreeSet;
/// let dd = DMatrix::from_row_slice(3, 3, &[
///     0.0, 4.0, 5.0,
///     4.0, 0.0, 6.0,
///     5.0, 6.0, 0.0,
/// ]);
/// let r1: BTreeSet<usize> = [1, 2, 3].into();
/// let r2: BTreeSet<usize> = [2, 3].into();
/// // 15 * 2^2 / (3 * 2)
/// assert_eq!(score(&dd, &r1, &r2, 1), 10.0);
/// ```
pub fn score(
    dd: &DMatrix<f64>,
    r1: &BTreeSet<usize>,
    r2: &BTreeSet<usize>,
    res_mask: usize,
) -> f64 {
    let shared = overlap(r1, r2);
    if shared == 0 {
        return 0.0;
    }

    let sum: f64 = upper_triangle(dd, res_mask, true).iter().sum();
    (shared * shared) as f64 / (r1.len() * r2.len()) as f64 * sum
}

/// Largest non-`NaN` element, or `starting_max` if nothing beats it.
pub fn find_max(matrix: &DMatrix<f64>, starting_max: f64) -> f64 {
    matrix
        .iter()
        .filter(|v| !v.is_nan())
        .fold(starting_max, |acc, &v| acc.max(v))
}

/// Round to the precision matrices are stored with: one decimal, single
/// precision.
pub fn quantize(value: f64) -> f64 {
    ((value * 10.0).round() / 10.0) as f32 as f64
}

pub fn quantize_matrix(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    matrix.map(quantize)
}

/// Elementwise median of equally sized matrices. An entry is `NaN` if any
/// of the inputs is `NaN` there; even counts average the two middle values.
pub fn median_matrix(matrices: &[&DMatrix<f64>]) -> DMatrix<f64> {
    let (nrows, ncols) = matrices.first().map(|m| m.shape()).unwrap_or((0, 0));

    let mut column = Vec::with_capacity(matrices.len());
    DMatrix::from_fn(nrows, ncols, |i, j| {
        column.clear();
        column.extend(matrices.iter().map(|m| m[(i, j)]));
        if column.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        column.sort_by(|a, b| a.total_cmp(b));

        let mid = column.len() / 2;
        if column.len() % 2 == 1 {
            column[mid]
        } else {
            (column[mid - 1] + column[mid]) / 2.0
        }
    })
}
