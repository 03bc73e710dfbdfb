//! Dense linear algebra helpers for small symmetric systems.
//!
//! The matrices here are covariance-sized (tens of rows), so plain
//! `O(n^3)` routines on `ndarray` are more than fast enough and keep the
//! dependency surface small.

use ndarray::{Array1, Array2};

/// Lower-triangular Cholesky factor of a symmetric matrix.
///
/// Returns `None` when the matrix is not positive definite (a pivot is
/// non-positive or non-finite).
#[must_use]
pub fn cholesky(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return None;
    }
    let mut lower = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[(i, j)];
            for k in 0..j {
                sum -= lower[(i, k)] * lower[(j, k)];
            }
            if i == j {
                if !(sum.is_finite() && sum > 0.0) {
                    return None;
                }
                lower[(i, j)] = sum.sqrt();
            } else {
                lower[(i, j)] = sum / lower[(j, j)];
            }
        }
    }
    Some(lower)
}

/// Whether the minimum eigenvalue of a symmetric matrix exceeds `shift`.
///
/// Uses the fact that Cholesky succeeds exactly on positive-definite
/// matrices: `A - shift*I` is positive definite iff `lambda_min(A) > shift`.
#[must_use]
pub fn min_eigenvalue_exceeds(matrix: &Array2<f64>, shift: f64) -> bool {
    let n = matrix.nrows();
    let mut shifted = matrix.clone();
    for i in 0..n {
        shifted[(i, i)] -= shift;
    }
    cholesky(&shifted).is_some()
}

/// Matrix inverse by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `None` for singular (or numerically singular) input.
#[must_use]
pub fn inverse(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return None;
    }

    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        // Partial pivot: largest magnitude in this column.
        let mut pivot_row = col;
        let mut pivot_val = a[(col, col)].abs();
        for row in (col + 1)..n {
            let v = a[(row, col)].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = row;
            }
        }
        if !pivot_val.is_finite() || pivot_val < 1e-14 {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap((col, k), (pivot_row, k));
                inv.swap((col, k), (pivot_row, k));
            }
        }

        let pivot = a[(col, col)];
        for k in 0..n {
            a[(col, k)] /= pivot;
            inv[(col, k)] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                let a_ck = a[(col, k)];
                let i_ck = inv[(col, k)];
                a[(row, k)] -= factor * a_ck;
                inv[(row, k)] -= factor * i_ck;
            }
        }
    }

    Some(inv)
}

/// Force exact symmetry: `(A + A^T) / 2`.
#[must_use]
pub fn symmetrize(matrix: &Array2<f64>) -> Array2<f64> {
    let n = matrix.nrows();
    let mut out = matrix.clone();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            out[(i, j)] = avg;
            out[(j, i)] = avg;
        }
    }
    out
}

/// Quadratic form `w^T A w`.
#[must_use]
pub fn quadratic_form(matrix: &Array2<f64>, w: &Array1<f64>) -> f64 {
    w.dot(&matrix.dot(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_cholesky_reconstructs() {
        let a = arr2(&[[4.0, 2.0, 0.6], [2.0, 5.0, 1.5], [0.6, 1.5, 2.0]]);
        let l = cholesky(&a).unwrap();
        let rebuilt = l.dot(&l.t());
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rebuilt[(i, j)], a[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = arr2(&[[1.0, 2.0], [2.0, 1.0]]); // eigenvalues 3, -1
        assert!(cholesky(&a).is_none());
    }

    #[test]
    fn test_min_eigenvalue_probe() {
        let a = arr2(&[[2.0, 0.0], [0.0, 0.5]]);
        assert!(min_eigenvalue_exceeds(&a, 0.4));
        assert!(!min_eigenvalue_exceeds(&a, 0.6));
    }

    #[test]
    fn test_inverse_identity_product() {
        let a = arr2(&[[3.0, 1.0, 0.0], [1.0, 4.0, 1.0], [0.0, 1.0, 5.0]]);
        let inv = inverse(&a).unwrap();
        let product = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[(i, j)], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_inverse_singular_is_none() {
        let a = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        assert!(inverse(&a).is_none());
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        // Zero leading pivot forces a row swap.
        let a = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let inv = inverse(&a).unwrap();
        assert_relative_eq!(inv[(0, 1)], 1.0);
        assert_relative_eq!(inv[(1, 0)], 1.0);
        assert_relative_eq!(inv[(0, 0)], 0.0);
    }

    #[test]
    fn test_quadratic_form() {
        let a = arr2(&[[2.0, 0.0], [0.0, 3.0]]);
        let w = ndarray::arr1(&[1.0, 2.0]);
        assert_relative_eq!(quadratic_form(&a, &w), 2.0 + 12.0);
    }
}
