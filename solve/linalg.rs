//! Thin layer over the dense linear-algebra backend.
//!
//! The solvers only ever need four kernels: a dot product, an axpy, an
//! absolute sum and a symmetric positive-definite solve. They are routed
//! through here so the element type picks the matching BLAS/LAPACK entry
//! point (`s*` for `f32`, `d*` for `f64`).

use crate::primitives::Real;
use ndarray::{Array2, ArrayBase, Data, DataMut, Ix1, OwnedRepr};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{CholeskyFactorized, FactorizeCInto, Norm, SolveC, UPLO};

#[inline]
pub fn dot<T, S1, S2>(x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> T
where
    T: Real,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
{
    x.dot(y)
}

/// `y += alpha * x`
#[inline]
pub fn axpy<T, S1, S2>(alpha: T, x: &ArrayBase<S1, Ix1>, y: &mut ArrayBase<S2, Ix1>)
where
    T: Real,
    S1: Data<Elem = T>,
    S2: DataMut<Elem = T>,
{
    y.scaled_add(alpha, x);
}

/// Sum of absolute values (the L1 norm).
#[inline]
pub fn asum<T, S>(x: &ArrayBase<S, Ix1>) -> T
where
    T: Real,
    S: Data<Elem = T>,
{
    x.norm_l1()
}

/// Lower Cholesky factor of a symmetric positive-definite matrix.
///
/// The factorisation is computed in the storage of the matrix it is given,
/// and [`SpdFactor::into_matrix`] hands that storage back so a caller can
/// reuse one buffer across many solves. Only the lower triangle of the input
/// is read. A matrix that is not positive definite fails with the LAPACK
/// `potrf` info code carried in the returned `LinalgError`.
pub struct SpdFactor<T: Real> {
    inner: CholeskyFactorized<OwnedRepr<T>>,
}

impl<T: Real> SpdFactor<T> {
    pub fn factorize_into(a: Array2<T>) -> Result<Self, LinalgError> {
        let inner = a.factorizec_into(UPLO::Lower)?;
        Ok(Self { inner })
    }

    /// Overwrites `b` with the solution of `A x = b`.
    ///
    /// Unit-stride vectors are solved where they lie; a strided view goes
    /// through a temporary because LAPACK needs contiguous right-hand sides.
    pub fn solve_in_place<S>(&self, b: &mut ArrayBase<S, Ix1>) -> Result<(), LinalgError>
    where
        S: DataMut<Elem = T>,
    {
        if b.is_standard_layout() {
            self.inner.solvec_inplace(b)?;
        } else {
            let mut contiguous = b.to_owned();
            self.inner.solvec_inplace(&mut contiguous)?;
            b.assign(&contiguous);
        }
        Ok(())
    }

    /// Returns the buffer holding the factor.
    pub fn into_matrix(self) -> Array2<T> {
        self.inner.factor
    }
}
