//! Closed-form ridge solves, `(G + alpha I) w = Dx`.
//!
//! The two entry points differ in how they treat the caller's Gram matrix:
//!
//! * [`solve_shifted_in_place`] borrows the matrix mutably and loads `alpha`
//!   onto its diagonal through a [`ShiftedDiagonal`] guard, which puts the
//!   original diagonal back when it drops, whether the solve succeeded or not.
//!   LAPACK overwrites the matrix it factorises, so the shifted system is
//!   loaded into a [`RidgeWorkspace`] that the caller keeps for the whole
//!   batch. A batch therefore allocates one `n x n` buffer, not one
//!   regularised copy per sample.
//! * [`solve_shared`] borrows the matrix read-only and regularises a scratch
//!   copy. A Gram matrix shared by a whole batch is never written, not even
//!   transiently; it is factorised once and every row of the code buffer is
//!   solved against that factor where it lies.

use crate::linalg::SpdFactor;
use crate::primitives::Real;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};
use ndarray_linalg::error::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RidgeError {
    #[error("Gram matrix must be square, but has shape {rows}x{cols}.")]
    NonSquareGram { rows: usize, cols: usize },

    #[error("{name} has {found} features, but the Gram matrix has {expected}.")]
    FeatureMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "The regularised Gram matrix is not positive definite (Cholesky factorisation failed): {0}"
    )]
    NotPositiveDefinite(#[from] LinalgError),
}

/// Mutable borrow of a Gram matrix whose diagonal carries `+alpha` while the
/// guard is alive.
///
/// The original diagonal is saved on construction and written back verbatim
/// on drop, so the caller gets a bit-identical matrix back.
pub struct ShiftedDiagonal<'a, T: Real> {
    gram: ArrayViewMut2<'a, T>,
    original: Array1<T>,
}

impl<'a, T: Real> ShiftedDiagonal<'a, T> {
    pub fn new(mut gram: ArrayViewMut2<'a, T>, alpha: T) -> Self {
        let original = gram.diag().to_owned();
        gram.diag_mut().mapv_inplace(|d| d + alpha);
        Self { gram, original }
    }

    pub fn view(&self) -> ArrayView2<'_, T> {
        self.gram.view()
    }
}

impl<T: Real> Drop for ShiftedDiagonal<'_, T> {
    fn drop(&mut self) {
        self.gram.diag_mut().assign(&self.original);
    }
}

/// Reusable buffers for a run of same-sized closed-form solves.
///
/// Buffers are resized only when the feature count changes.
pub struct RidgeWorkspace<T: Real> {
    matrix: Array2<T>,
    rhs: Array1<T>,
}

impl<T: Real> RidgeWorkspace<T> {
    pub fn new(n_features: usize) -> Self {
        Self {
            matrix: Array2::zeros((n_features, n_features)),
            rhs: Array1::zeros(n_features),
        }
    }

    fn fit(&mut self, n_features: usize) {
        if self.matrix.dim() != (n_features, n_features) {
            self.matrix = Array2::zeros((n_features, n_features));
        }
        if self.rhs.len() != n_features {
            self.rhs = Array1::zeros(n_features);
        }
    }
}

/// Solves `(G + alpha I) out = rhs` by shifting `G`'s diagonal in place.
///
/// `gram` is restored before this function returns, including on error.
/// `out` is only written once the solve has succeeded.
pub fn solve_shifted_in_place<T: Real>(
    gram: ArrayViewMut2<'_, T>,
    alpha: T,
    rhs: ArrayView1<'_, T>,
    mut out: ArrayViewMut1<'_, T>,
    workspace: &mut RidgeWorkspace<T>,
) -> Result<(), RidgeError> {
    let n_features = check_square(gram.dim())?;
    check_features("Dx", n_features, rhs.len())?;
    check_features("code", n_features, out.len())?;
    workspace.fit(n_features);

    let shifted = ShiftedDiagonal::new(gram, alpha);
    workspace.matrix.assign(&shifted.view());
    drop(shifted);

    let matrix = std::mem::replace(&mut workspace.matrix, Array2::zeros((0, 0)));
    let factor = SpdFactor::factorize_into(matrix)?;
    workspace.rhs.assign(&rhs);
    let solved = factor.solve_in_place(&mut workspace.rhs);
    workspace.matrix = factor.into_matrix();
    solved?;

    out.assign(&workspace.rhs);
    Ok(())
}

/// Solves `(G + alpha I) W' = Dx'` for every row of `dx`, writing into `code`.
///
/// `gram` is only read. Rows of `code` are overwritten with the matching rows
/// of `dx` and then solved in place against a single factorisation.
pub fn solve_shared<T: Real>(
    gram: ArrayView2<'_, T>,
    alpha: T,
    dx: ArrayView2<'_, T>,
    mut code: ArrayViewMut2<'_, T>,
) -> Result<(), RidgeError> {
    let n_features = check_square(gram.dim())?;
    check_features("Dx", n_features, dx.ncols())?;
    check_features("code", n_features, code.ncols())?;

    let mut regularized = gram.to_owned();
    regularized.diag_mut().mapv_inplace(|d| d + alpha);
    let factor = SpdFactor::factorize_into(regularized)?;

    code.assign(&dx);
    for mut row in code.rows_mut() {
        factor.solve_in_place(&mut row)?;
    }
    Ok(())
}

fn check_square((rows, cols): (usize, usize)) -> Result<usize, RidgeError> {
    if rows != cols {
        return Err(RidgeError::NonSquareGram { rows, cols });
    }
    Ok(rows)
}

fn check_features(name: &'static str, expected: usize, found: usize) -> Result<(), RidgeError> {
    if expected != found {
        return Err(RidgeError::FeatureMismatch {
            name,
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{ShapeBuilder, array};

    #[test]
    fn diagonal_system_without_regularisation() {
        let mut gram = Array2::from_diag(&array![1.0, 2.0, 3.0]);
        let dx = array![1.0, 2.0, 3.0];
        let mut code = Array1::zeros(3);
        let mut workspace = RidgeWorkspace::new(3);
        solve_shifted_in_place(gram.view_mut(), 0.0, dx.view(), code.view_mut(), &mut workspace)
            .unwrap();
        for &c in code.iter() {
            assert_abs_diff_eq!(c, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn guard_restores_exact_diagonal() {
        let original = array![[0.3, 0.1], [0.1, 0.7]];
        let mut gram = original.clone();
        {
            let shifted = ShiftedDiagonal::new(gram.view_mut(), 0.1);
            assert_abs_diff_eq!(shifted.view()[[0, 0]], 0.4, epsilon = 1e-15);
            assert_abs_diff_eq!(shifted.view()[[1, 1]], 0.8, epsilon = 1e-15);
            assert_eq!(shifted.view()[[0, 1]], 0.1);
        }
        assert_eq!(gram, original);
    }

    #[test]
    fn failed_factorisation_still_restores_matrix() {
        let original = array![[1.0, 3.0], [3.0, 1.0]];
        let mut gram = original.clone();
        let dx = array![1.0, 1.0];
        let mut code = array![7.0, 7.0];
        let mut workspace = RidgeWorkspace::new(2);
        let err = solve_shifted_in_place(
            gram.view_mut(),
            0.5,
            dx.view(),
            code.view_mut(),
            &mut workspace,
        )
        .unwrap_err();
        assert!(matches!(err, RidgeError::NotPositiveDefinite(_)));
        assert_eq!(gram, original);
        assert_eq!(code, array![7.0, 7.0]);

        // the workspace stays usable after a failed factorisation
        let mut gram = array![[2.0, 0.0], [0.0, 4.0]];
        solve_shifted_in_place(gram.view_mut(), 0.0, dx.view(), code.view_mut(), &mut workspace)
            .unwrap();
        assert_abs_diff_eq!(code[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(code[1], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn workspace_is_reused_across_samples_and_resized_on_demand() {
        let mut workspace = RidgeWorkspace::new(2);
        let buffer = workspace.matrix.as_ptr();
        for scale in [1.0, 2.0, 4.0] {
            let mut gram = array![[scale, 0.0], [0.0, scale]];
            let dx = array![scale, 2.0 * scale];
            let mut code = Array1::zeros(2);
            solve_shifted_in_place(
                gram.view_mut(),
                0.0,
                dx.view(),
                code.view_mut(),
                &mut workspace,
            )
            .unwrap();
            assert_abs_diff_eq!(code[0], 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(code[1], 2.0, epsilon = 1e-12);
        }
        assert_eq!(workspace.matrix.as_ptr(), buffer);

        let mut gram = Array2::from_diag(&array![1.0, 1.0, 1.0]);
        let dx = array![3.0, 2.0, 1.0];
        let mut code = Array1::zeros(3);
        solve_shifted_in_place(gram.view_mut(), 1.0, dx.view(), code.view_mut(), &mut workspace)
            .unwrap();
        assert_eq!(workspace.matrix.dim(), (3, 3));
        assert_abs_diff_eq!(code[0], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn shared_solve_leaves_gram_untouched() {
        let gram = array![[2.0, 0.5], [0.5, 1.0]];
        let snapshot = gram.clone();
        let dx = array![[1.0, 0.0], [0.0, 1.0], [2.5, -1.0]];
        let mut code = Array2::zeros((3, 2));
        solve_shared(gram.view(), 0.25, dx.view(), code.view_mut()).unwrap();
        assert_eq!(gram, snapshot);

        let mut regularized = gram.clone();
        regularized.diag_mut().mapv_inplace(|d| d + 0.25);
        let reconstructed = code.dot(&regularized);
        for (a, b) in reconstructed.iter().zip(dx.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn shared_solve_handles_column_major_code() {
        let gram = array![[2.0, 0.5], [0.5, 1.0]];
        let dx = array![[1.0, 0.0], [2.5, -1.0]];
        let mut code = Array2::zeros((2, 2).f());
        solve_shared(gram.view(), 0.0, dx.view(), code.view_mut()).unwrap();

        let reconstructed = code.dot(&gram);
        for (a, b) in reconstructed.iter().zip(dx.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let gram = Array2::<f64>::eye(3);
        let dx = Array2::<f64>::zeros((2, 2));
        let mut code = Array2::<f64>::zeros((2, 3));
        let err = solve_shared(gram.view(), 1.0, dx.view(), code.view_mut()).unwrap_err();
        assert!(matches!(
            err,
            RidgeError::FeatureMismatch {
                name: "Dx",
                expected: 3,
                found: 2
            }
        ));
    }
}
