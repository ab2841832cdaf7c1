// src/utils/linalg.rs

//! Symmetric positive-definite solves for the weighted least-squares fits.

use ndarray::{Array1, Array2};

/// First ridge penalty tried when the unregularized system is singular.
const FALLBACK_RIDGE: f64 = 1e-6;
const MAX_FALLBACK_STEPS: usize = 12;

/// Solves `(a + alpha I) x = b`, raising `alpha` while the system stays
/// singular: from `FALLBACK_RIDGE` when it starts at zero, then x10 per step.
///
/// Returns the solution with the penalty that produced it, or `None` once the
/// steps run out.
pub fn solve_ridge(a: &Array2<f64>, b: &Array1<f64>, alpha: f64) -> Option<(Array1<f64>, f64)> {
    let n = a.nrows();
    let mut alpha = alpha;
    for _ in 0..=MAX_FALLBACK_STEPS {
        let system = a + &(Array2::<f64>::eye(n) * alpha);
        if let Some(solution) = solve_spd(&system, b) {
            return Some((solution, alpha));
        }
        alpha = if alpha <= 0.0 { FALLBACK_RIDGE } else { alpha * 10.0 };
    }
    None
}

/// Solves `a x = b` for symmetric positive-definite `a`.
///
/// Returns `None` when `a` is not (numerically) positive definite, which the
/// caller treats as a singular system.
pub fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return None;
    }
    if a.nrows() == 0 {
        return Some(Array1::zeros(0));
    }

    #[cfg(feature = "linalg")]
    {
        use ndarray_linalg::SolveH;
        if !is_positive_definite(a) {
            return None;
        }
        a.solveh(b).ok()
    }
    #[cfg(not(feature = "linalg"))]
    {
        cholesky_solve(a, b)
    }
}

#[cfg(feature = "linalg")]
fn is_positive_definite(a: &Array2<f64>) -> bool {
    cholesky_factor(a).is_some()
}

/// Lower-triangular `l` with `l * l^T == a`, or `None` if a pivot collapses.
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let max_diag = a.diag().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if max_diag == 0.0 || !max_diag.is_finite() {
        return None;
    }
    let tolerance = f64::EPSILON * max_diag * n as f64;

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= tolerance {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

#[cfg_attr(feature = "linalg", allow(dead_code))]
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let l = cholesky_factor(a)?;
    let n = b.len();

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }

    // L^T x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn solves_small_spd_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_spd(&a, &b).expect("system is positive definite");
        // 4x + 2y = 2, 2x + 3y = 1  =>  x = 0.5, y = 0
        assert_abs_diff_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_singular_matrix() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![1.0, 1.0];
        assert!(solve_spd(&a, &b).is_none());
        assert!(solve_spd(&Array2::zeros((3, 3)), &Array1::zeros(3)).is_none());
    }

    #[test]
    fn one_by_one_system() {
        let x = solve_spd(&array![[2.0]], &array![3.0]).expect("positive scalar");
        assert_abs_diff_eq!(x[0], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn ridge_steps_past_a_singular_system() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![1.0, 1.0];
        let (x, alpha) = solve_ridge(&a, &b, 0.0).expect("ridge makes it definite");
        assert!(alpha >= FALLBACK_RIDGE);
        assert_abs_diff_eq!(x[0], x[1], epsilon = 1e-9);

        let (_, kept) = solve_ridge(&array![[2.0]], &array![1.0], 0.5).unwrap();
        assert_eq!(kept, 0.5);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        assert!(solve_spd(&array![[1.0, 0.0], [0.0, 1.0]], &array![1.0]).is_none());
    }
}
