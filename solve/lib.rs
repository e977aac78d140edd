#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Sparse-coding solvers over Gram matrices.
//!
//! Given a Gram matrix `G` (or one per sample) and correlation vectors `Dx`,
//! the dispatchers in [`dispatch`] compute code vectors minimising
//!
//! ```text
//! 1/2 w'Gw - Dx'w + alpha * l1_ratio * |w|_1 + alpha * (1 - l1_ratio) / 2 * |w|_2^2
//! ```
//!
//! either with a Cholesky solve (`l1_ratio == 0`) or with cyclic coordinate
//! descent stopped on a duality-gap criterion. [`batch_weight`] provides the
//! decay schedule an online dictionary learner uses to blend mini-batches.

pub mod batch_weight;
pub mod cd;
pub mod config;
pub mod dispatch;
pub mod linalg;
pub mod primitives;
pub mod problem;
pub mod ridge;

pub use batch_weight::batch_weight;
pub use cd::{CdOutcome, CdStatus, enet_coordinate_descent_gram};
pub use config::{Layout, Precision, SolverConfig};
pub use dispatch::{
    BatchReport, Initialization, RegressionError, RegressionParams, SampleOutcome, Strategy,
    enet_regression_multi_gram, enet_regression_single_gram,
};
pub use primitives::Real;
pub use problem::{Problem, ProblemError, Solution};
