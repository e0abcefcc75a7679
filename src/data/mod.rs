//! Dataset loading and synthetic binary patterns.

use ndarray::{s, Array2};
use std::fs;
use std::path::Path;

use crate::core::{RbmError, RbmResult};

/// Every bars-and-stripes image of a `side × side` grid, flattened row-major.
///
/// Each image has either whole rows on (stripes) or whole columns on (bars). The
/// blank and full images appear once, giving `2^(side+1) - 2` distinct rows.
///
/// # Errors
/// - `InvalidParameter` if `side` is 0 or larger than 16
pub fn bars_and_stripes(side: usize) -> RbmResult<Array2<f64>> {
    if side == 0 || side > 16 {
        return Err(RbmError::InvalidParameter(format!(
            "Bars-and-stripes side must be in 1..=16, got {}",
            side
        )));
    }

    let full = (1usize << side) - 1;
    let mut rows: Vec<f64> = Vec::new();
    let mut count = 0;
    for mask in 0..=full {
        // stripes: row r lit when bit r is set
        for r in 0..side {
            for _ in 0..side {
                rows.push(((mask >> r) & 1) as f64);
            }
        }
        count += 1;

        if mask == 0 || mask == full {
            continue;
        }
        // bars: column c lit when bit c is set
        for _ in 0..side {
            for c in 0..side {
                rows.push(((mask >> c) & 1) as f64);
            }
        }
        count += 1;
    }

    Array2::from_shape_vec((count, side * side), rows)
        .map_err(|e| RbmError::DimensionMismatch(e.to_string()))
}

/// Parse a matrix of visible vectors: one row per line, values separated by
/// commas and/or whitespace. Blank lines and `#` comments are skipped.
///
/// # Errors
/// - `InvalidParameter` for unparsable values or values outside [0, 1]
/// - `DimensionMismatch` for ragged rows or an empty file
pub fn parse_matrix(text: &str) -> RbmResult<Array2<f64>> {
    let mut values = Vec::new();
    let mut width: Option<usize> = None;
    let mut rows = 0;

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row: Vec<f64> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(|field| {
                let value: f64 = field.parse().map_err(|_| {
                    RbmError::InvalidParameter(format!(
                        "Line {}: cannot parse {:?}",
                        line_no + 1,
                        field
                    ))
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(RbmError::InvalidParameter(format!(
                        "Line {}: value {} outside [0, 1]",
                        line_no + 1,
                        value
                    )));
                }
                Ok(value)
            })
            .collect::<RbmResult<_>>()?;

        match width {
            None => width = Some(row.len()),
            Some(w) if w != row.len() => {
                return Err(RbmError::DimensionMismatch(format!(
                    "Line {}: expected {} values, got {}",
                    line_no + 1,
                    w,
                    row.len()
                )));
            }
            Some(_) => {}
        }
        values.extend(row);
        rows += 1;
    }

    let width = width.ok_or_else(|| RbmError::DimensionMismatch("No data rows".to_string()))?;
    Array2::from_shape_vec((rows, width), values)
        .map_err(|e| RbmError::DimensionMismatch(e.to_string()))
}

/// Load a matrix file; see [`parse_matrix`] for the format.
pub fn load_matrix_csv<P: AsRef<Path>>(path: P) -> RbmResult<Array2<f64>> {
    let text = fs::read_to_string(path)?;
    parse_matrix(&text)
}

/// Split rows into (train, eval), holding out the last `eval_fraction` of rows.
///
/// At least one row stays in the training set.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn train_eval_split(data: &Array2<f64>, eval_fraction: f64) -> (Array2<f64>, Array2<f64>) {
    let n = data.nrows();
    let fraction = eval_fraction.clamp(0.0, 1.0);
    let eval_count = ((n as f64 * fraction).round() as usize).min(n.saturating_sub(1));
    let split = n - eval_count;
    (
        data.slice(s![..split, ..]).to_owned(),
        data.slice(s![split.., ..]).to_owned(),
    )
}
