//! Math utilities shared by propagation, training and evaluation.

use ndarray::{Array1, Array2, Axis};

pub mod serde_float;

/// Logistic function `1 / (1 + e^-x)`, no clamping.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Apply [`sigmoid`] elementwise, consuming the pre-activations.
pub fn sigmoid_matrix(mut x: Array2<f64>) -> Array2<f64> {
    x.mapv_inplace(sigmoid);
    x
}

/// Mean over the batch axis: one value per column.
///
/// An empty batch yields zeros rather than NaN; callers reject empty batches first.
pub fn column_mean(x: &Array2<f64>) -> Array1<f64> {
    x.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()))
}

/// Frobenius norm of a matrix.
pub fn frobenius_norm(x: &Array2<f64>) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Compute L2 norm of a vector.
pub fn l2_norm(x: &Array1<f64>) -> f64 {
    x.dot(x).sqrt()
}

/// True when every entry is finite.
pub fn all_finite<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sigmoid_values() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert_abs_diff_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-12);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
    }

    #[test]
    fn test_column_mean() {
        let x = ndarray::arr2(&[[1.0, 2.0], [3.0, 6.0]]);
        assert_eq!(column_mean(&x), ndarray::arr1(&[2.0, 4.0]));

        let empty = Array2::<f64>::zeros((0, 3));
        assert_eq!(column_mean(&empty), Array1::<f64>::zeros(3));
    }

    #[test]
    fn test_norms() {
        let x = ndarray::arr1(&[3.0, 4.0]);
        assert_abs_diff_eq!(l2_norm(&x), 5.0, epsilon = 1e-12);
        let m = ndarray::arr2(&[[3.0, 0.0], [0.0, 4.0]]);
        assert_abs_diff_eq!(frobenius_norm(&m), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[0.0, 1.0]));
        assert!(!all_finite(&[0.0, f64::NAN]));
        assert!(!all_finite(&[f64::NEG_INFINITY]));
    }
}
