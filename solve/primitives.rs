use ndarray::{ArrayBase, Data, Ix1, ScalarOperand};
use ndarray_linalg::{Lapack, Scalar};

/// Floating-point element type accepted by the solvers.
///
/// Implemented for `f32` and `f64`. The `Lapack` bound selects the matching
/// single- or double-precision LAPACK routines for the Cholesky solve.
pub trait Real: Lapack + Scalar<Real = Self> + PartialOrd + ScalarOperand + Send + Sync {
    /// Widens to `f64` for reporting.
    fn as_f64(self) -> f64;
}

impl Real for f32 {
    fn as_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Real for f64 {
    fn as_f64(self) -> f64 {
        self
    }
}

/// Converts an `f64` constant (tolerance, penalty) into `T`.
#[inline]
pub fn cast<T: Real>(value: f64) -> T {
    <T as Scalar>::real(value)
}

#[inline]
pub fn fabs<T: Real>(x: T) -> T {
    Scalar::abs(x)
}

/// Ordinary maximum of two values.
#[inline]
pub fn fmax<T: Real>(x: T, y: T) -> T {
    if x > y { x } else { y }
}

/// Returns -1, 0 or +1. An exact zero (of either sign) maps to 0.
#[inline]
pub fn fsign<T: Real>(f: T) -> T {
    if f == T::zero() {
        T::zero()
    } else if f > T::zero() {
        T::one()
    } else {
        -T::one()
    }
}

/// Largest absolute value of `x`; zero for an empty vector.
///
/// This is the dual norm of the L1 penalty when the code is unconstrained.
pub fn abs_max<T, S>(x: &ArrayBase<S, Ix1>) -> T
where
    T: Real,
    S: Data<Elem = T>,
{
    x.iter().fold(T::zero(), |acc, &v| fmax(acc, fabs(v)))
}

/// Largest raw value of `x`; negative infinity for an empty vector.
///
/// Under a non-negativity constraint only positive correlations can activate a
/// coordinate, so the dual norm is the signed maximum rather than `abs_max`.
pub fn max<T, S>(x: &ArrayBase<S, Ix1>) -> T
where
    T: Real,
    S: Data<Elem = T>,
{
    let mut iter = x.iter();
    match iter.next() {
        Some(&first) => iter.fold(first, |acc, &v| fmax(acc, v)),
        None => -cast::<T>(f64::INFINITY),
    }
}
