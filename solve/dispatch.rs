//! Batch entry points: pick a solver per call and run it for every sample.
//!
//! The algorithm is chosen once per call from `(alpha, l1_ratio)` by
//! [`Strategy::select`]:
//!
//! * `l1_ratio == 0` is a pure ridge problem and goes to the closed-form
//!   Cholesky solve in [`crate::ridge`].
//! * anything else runs [`crate::cd::enet_coordinate_descent_gram`] with
//!   L1 weight `alpha * l1_ratio` and L2 weight `alpha * (1 - l1_ratio)`.
//!
//! Two batch layouts are supported. With one Gram matrix per sample
//! ([`enet_regression_multi_gram`]) the matrices are borrowed mutably because
//! the ridge branch shifts each diagonal in place and restores it. With one
//! shared Gram matrix ([`enet_regression_single_gram`]) the matrix is only
//! ever read.
//!
//! Every shape is validated before any code row is written.

use crate::cd::{CdError, CdOutcome, enet_coordinate_descent_gram};
use crate::config::{ConfigError, SolverConfig};
use crate::primitives::{Real, cast, fmax};
use crate::ridge::{self, RidgeError, RidgeWorkspace};
use ndarray::{ArrayView2, ArrayViewMut2, ArrayViewMut3, Axis};
use thiserror::Error;

/// The solver a call is routed to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Strategy<T> {
    /// `(G + alpha I) w = Dx`, solved by Cholesky. The solution is exact and
    /// unconstrained, so `positive` does not apply and entries may be negative.
    ClosedFormRidge { alpha: T },
    /// Elastic net by coordinate descent with the given L1 and L2 weights.
    CoordinateDescent { l1: T, l2: T },
}

impl<T: Real> Strategy<T> {
    pub fn select(alpha: T, l1_ratio: T) -> Result<Self, RegressionError> {
        let zero = T::zero();
        let one = T::one();
        if !(alpha >= zero && alpha < cast::<T>(f64::INFINITY)) {
            return Err(RegressionError::InvalidAlpha(alpha.to_string()));
        }
        if !(l1_ratio >= zero && l1_ratio <= one) {
            return Err(RegressionError::InvalidL1Ratio(l1_ratio.to_string()));
        }
        if l1_ratio == zero {
            Ok(Strategy::ClosedFormRidge { alpha })
        } else {
            Ok(Strategy::CoordinateDescent {
                l1: alpha * l1_ratio,
                l2: alpha * (one - l1_ratio),
            })
        }
    }
}

/// Starting point of the coordinate-descent branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Initialization {
    /// Code rows are overwritten with `Dx` before solving.
    #[default]
    Correlation,
    /// Code rows are used as they are, e.g. the codes of the previous epoch.
    WarmStart,
}

/// Regularisation and solver settings of one dispatcher call.
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionParams<T> {
    pub alpha: T,
    pub l1_ratio: T,
    pub positive: bool,
    pub solver: SolverConfig,
    pub init: Initialization,
}

impl<T: Real> RegressionParams<T> {
    pub fn new(alpha: T, l1_ratio: T) -> Self {
        Self {
            alpha,
            l1_ratio,
            positive: false,
            solver: SolverConfig::default(),
            init: Initialization::default(),
        }
    }

    /// Constrains coordinate-descent codes to be non-negative.
    ///
    /// Only the coordinate-descent branch honours this. With `l1_ratio == 0`
    /// the closed-form ridge solve runs and its codes can have negative
    /// entries whatever this flag says.
    pub fn positive(mut self, positive: bool) -> Self {
        self.positive = positive;
        self
    }

    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn init(mut self, init: Initialization) -> Self {
        self.init = init;
        self
    }

    pub fn strategy(&self) -> Result<Strategy<T>, RegressionError> {
        Strategy::select(self.alpha, self.l1_ratio)
    }
}

/// Result of solving one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleOutcome<T> {
    /// Solved exactly by the closed-form ridge branch.
    Ridge,
    CoordinateDescent(CdOutcome<T>),
}

impl<T> SampleOutcome<T> {
    pub fn converged(&self) -> bool {
        match self {
            SampleOutcome::Ridge => true,
            SampleOutcome::CoordinateDescent(outcome) => outcome.converged(),
        }
    }
}

/// Per-sample diagnostics of a dispatcher call, in batch order.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport<T> {
    pub strategy: Strategy<T>,
    pub outcomes: Vec<SampleOutcome<T>>,
}

impl<T: Real> BatchReport<T> {
    pub fn all_converged(&self) -> bool {
        self.outcomes.iter().all(SampleOutcome::converged)
    }

    /// Largest final duality gap over the coordinate-descent samples, or
    /// `None` when the ridge branch ran or the batch was empty.
    pub fn max_gap(&self) -> Option<T> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                SampleOutcome::CoordinateDescent(cd) => Some(cd.gap),
                SampleOutcome::Ridge => None,
            })
            .reduce(fmax)
    }
}

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("alpha must be finite and non-negative, but was {0}.")]
    InvalidAlpha(String),

    #[error("l1_ratio must lie in [0, 1], but was {0}.")]
    InvalidL1Ratio(String),

    #[error("Batch size mismatch: the code buffer has {expected} rows, but {name} has {found}.")]
    BatchSizeMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Gram matrices must be square, but have shape {rows}x{cols}.")]
    NonSquareGram { rows: usize, cols: usize },

    #[error("Gram matrices have zero features; there is nothing to solve.")]
    EmptyFeatures,

    #[error("{name} rows have {found} features, but the Gram matrix has {expected}.")]
    FeatureMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid solver configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Closed-form ridge solve failed{}: {source}", describe_sample(.sample))]
    Ridge {
        sample: Option<usize>,
        source: RidgeError,
    },

    #[error("Coordinate descent failed for sample {sample}: {source}")]
    CoordinateDescent { sample: usize, source: CdError },
}

fn describe_sample(sample: &Option<usize>) -> String {
    match sample {
        Some(index) => format!(" for sample {index}"),
        None => " for the shared Gram matrix".to_string(),
    }
}

/// Solves every sample against its own Gram matrix.
///
/// `gram` has shape `(batch_size, n_features, n_features)`; `dx`, `y` and
/// `code` have shape `(batch_size, n_features)`. In the ridge branch each
/// `gram[i]` has `alpha` added to its diagonal for the duration of its solve
/// and is handed back unchanged, also when the solve fails.
pub fn enet_regression_multi_gram<T: Real>(
    mut gram: ArrayViewMut3<'_, T>,
    dx: ArrayView2<'_, T>,
    y: ArrayView2<'_, T>,
    mut code: ArrayViewMut2<'_, T>,
    params: &RegressionParams<T>,
) -> Result<BatchReport<T>, RegressionError> {
    let strategy = params.strategy()?;
    params.solver.validate()?;

    let (gram_batch, rows, cols) = gram.dim();
    let batch_size = code.nrows();
    check_batch("gram", batch_size, gram_batch)?;
    let n_features = check_gram(rows, cols)?;
    check_rows(n_features, batch_size, dx, y, code.view())?;

    log::info!(
        "Multi-gram regression: {} samples x {} features, strategy {:?}",
        batch_size,
        n_features,
        strategy
    );

    let mut outcomes = Vec::with_capacity(batch_size);
    match strategy {
        Strategy::ClosedFormRidge { alpha } => {
            let mut workspace = RidgeWorkspace::new(n_features);
            for i in 0..batch_size {
                ridge::solve_shifted_in_place(
                    gram.index_axis_mut(Axis(0), i),
                    alpha,
                    dx.row(i),
                    code.row_mut(i),
                    &mut workspace,
                )
                .map_err(|source| RegressionError::Ridge {
                    sample: Some(i),
                    source,
                })?;
                outcomes.push(SampleOutcome::Ridge);
            }
        }
        Strategy::CoordinateDescent { l1, l2 } => {
            if params.init == Initialization::Correlation {
                code.assign(&dx);
            }
            for i in 0..batch_size {
                let outcome = enet_coordinate_descent_gram(
                    code.row_mut(i),
                    l1,
                    l2,
                    gram.index_axis(Axis(0), i),
                    dx.row(i),
                    y.row(i),
                    params.positive,
                    &params.solver,
                )
                .map_err(|source| RegressionError::CoordinateDescent { sample: i, source })?;
                outcomes.push(SampleOutcome::CoordinateDescent(outcome));
            }
        }
    }

    Ok(finish(strategy, outcomes))
}

/// Solves every sample against one shared Gram matrix.
///
/// `gram` has shape `(n_features, n_features)` and is never written. The
/// ridge branch factorises a regularised copy once and solves all
/// `batch_size` right-hand sides with it; the coordinate-descent branch runs
/// once per sample against the unregularised matrix.
pub fn enet_regression_single_gram<T: Real>(
    gram: ArrayView2<'_, T>,
    dx: ArrayView2<'_, T>,
    y: ArrayView2<'_, T>,
    mut code: ArrayViewMut2<'_, T>,
    params: &RegressionParams<T>,
) -> Result<BatchReport<T>, RegressionError> {
    let strategy = params.strategy()?;
    params.solver.validate()?;

    let (rows, cols) = gram.dim();
    let batch_size = code.nrows();
    let n_features = check_gram(rows, cols)?;
    check_rows(n_features, batch_size, dx, y, code.view())?;

    log::info!(
        "Single-gram regression: {} samples x {} features, strategy {:?}",
        batch_size,
        n_features,
        strategy
    );

    if batch_size == 0 {
        return Ok(finish(strategy, Vec::new()));
    }

    let mut outcomes = Vec::with_capacity(batch_size);
    match strategy {
        Strategy::ClosedFormRidge { alpha } => {
            ridge::solve_shared(gram, alpha, dx, code.view_mut()).map_err(|source| {
                RegressionError::Ridge {
                    sample: None,
                    source,
                }
            })?;
            outcomes.resize(batch_size, SampleOutcome::Ridge);
        }
        Strategy::CoordinateDescent { l1, l2 } => {
            if params.init == Initialization::Correlation {
                code.assign(&dx);
            }
            for i in 0..batch_size {
                let outcome = enet_coordinate_descent_gram(
                    code.row_mut(i),
                    l1,
                    l2,
                    gram,
                    dx.row(i),
                    y.row(i),
                    params.positive,
                    &params.solver,
                )
                .map_err(|source| RegressionError::CoordinateDescent { sample: i, source })?;
                outcomes.push(SampleOutcome::CoordinateDescent(outcome));
            }
        }
    }

    Ok(finish(strategy, outcomes))
}

fn finish<T: Real>(strategy: Strategy<T>, outcomes: Vec<SampleOutcome<T>>) -> BatchReport<T> {
    let report = BatchReport { strategy, outcomes };
    if !report.all_converged() {
        let stalled = report
            .outcomes
            .iter()
            .filter(|outcome| !outcome.converged())
            .count();
        log::warn!(
            "{} of {} samples did not reach the duality-gap threshold.",
            stalled,
            report.outcomes.len()
        );
    }
    report
}

fn check_batch(name: &'static str, expected: usize, found: usize) -> Result<(), RegressionError> {
    if expected != found {
        return Err(RegressionError::BatchSizeMismatch {
            name,
            expected,
            found,
        });
    }
    Ok(())
}

fn check_gram(rows: usize, cols: usize) -> Result<usize, RegressionError> {
    if rows != cols {
        return Err(RegressionError::NonSquareGram { rows, cols });
    }
    if rows == 0 {
        return Err(RegressionError::EmptyFeatures);
    }
    Ok(rows)
}

fn check_rows<T: Real>(
    n_features: usize,
    batch_size: usize,
    dx: ArrayView2<'_, T>,
    y: ArrayView2<'_, T>,
    code: ArrayView2<'_, T>,
) -> Result<(), RegressionError> {
    check_batch("Dx", batch_size, dx.nrows())?;
    check_batch("y", batch_size, y.nrows())?;
    for (name, found) in [("Dx", dx.ncols()), ("y", y.ncols()), ("code", code.ncols())] {
        if found != n_features {
            return Err(RegressionError::FeatureMismatch {
                name,
                expected: n_features,
                found,
            });
        }
    }
    Ok(())
}
