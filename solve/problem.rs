//! Regression batches described in TOML, and their solutions.
//!
//! A problem file carries everything one dispatcher call needs:
//!
//! ```toml
//! layout = "single"        # or "multi"
//! precision = "f64"        # or "f32"
//! alpha = 0.5
//! l1_ratio = 1.0
//! positive = false
//! gram = [[1.0, 0.2], [0.2, 1.0]]       # layout = "single"
//! # grams = [[[...]], [[...]]]          # layout = "multi", one per sample
//! dx = [[0.3, -0.1], [1.0, 0.4]]
//! y = [[0.5, 0.2], [1.2, 0.1]]
//! # code = [[...]]                      # optional warm start
//!
//! [solver]
//! max_iter = 100
//! tol = 1e-2
//! ```
//!
//! The element type named by `precision` is picked at runtime and the
//! matching monomorphised solver runs; results are always reported in `f64`.

use crate::cd::CdStatus;
use crate::config::{ConfigError, Layout, Precision, SolverConfig};
use crate::dispatch::{
    BatchReport, Initialization, RegressionError, RegressionParams, SampleOutcome, Strategy,
    enet_regression_multi_gram, enet_regression_single_gram,
};
use crate::primitives::{Real, cast};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Problem {
    pub layout: Layout,
    #[serde(default)]
    pub precision: Precision,
    pub alpha: f64,
    pub l1_ratio: f64,
    #[serde(default)]
    pub positive: bool,
    /// Shared Gram matrix, required when `layout = "single"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gram: Option<Vec<Vec<f64>>>,
    /// One Gram matrix per sample, required when `layout = "multi"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grams: Option<Vec<Vec<Vec<f64>>>>,
    pub dx: Vec<Vec<f64>>,
    pub y: Vec<Vec<f64>>,
    /// Starting codes. When present the coordinate-descent branch warm-starts
    /// from them instead of from `dx`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Error, Debug)]
pub enum ProblemError {
    #[error("Failed to read or write problem file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML problem file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize solution to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Layout {layout:?} requires the `{field}` field.")]
    MissingGram { layout: Layout, field: &'static str },
    #[error("`{name}` is ragged: row {row} has {found} entries, expected {expected}.")]
    Ragged {
        name: &'static str,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("The problem has no samples.")]
    NoSamples,
    #[error("Invalid solver table: {0}")]
    Config(#[from] ConfigError),
    #[error("Regression failed: {0}")]
    Regression(#[from] RegressionError),
}

impl Problem {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProblemError> {
        let toml_string = fs::read_to_string(path)?;
        Self::parse(&toml_string)
    }

    /// Parses and validates a problem.
    pub fn parse(toml_string: &str) -> Result<Self, ProblemError> {
        let problem: Problem = toml::from_str(toml_string)?;
        problem.validate()?;
        Ok(problem)
    }

    /// Checks what can be checked without building arrays: a non-empty batch,
    /// the Gram field the layout needs and a usable solver table. Penalties
    /// and shapes are checked by the dispatcher.
    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.dx.is_empty() {
            return Err(ProblemError::NoSamples);
        }
        let (present, field) = match self.layout {
            Layout::Single => (self.gram.is_some(), "gram"),
            Layout::Multi => (self.grams.is_some(), "grams"),
        };
        if !present {
            return Err(ProblemError::MissingGram {
                layout: self.layout,
                field,
            });
        }
        self.solver.validate()?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProblemError> {
        write_toml(self, path)
    }

    /// Runs the dispatcher for this batch at the configured precision.
    pub fn solve(&self) -> Result<Solution, ProblemError> {
        log::info!(
            "Solving {:?}-gram problem in {:?} with {} samples",
            self.layout,
            self.precision,
            self.dx.len()
        );
        match self.precision {
            Precision::F32 => self.solve_as::<f32>(),
            Precision::F64 => self.solve_as::<f64>(),
        }
    }

    fn solve_as<T: Real>(&self) -> Result<Solution, ProblemError> {
        self.validate()?;
        let dx = to_array2::<T>("dx", &self.dx)?;
        let y = to_array2::<T>("y", &self.y)?;
        let (mut code, init) = match &self.code {
            Some(rows) => (to_array2::<T>("code", rows)?, Initialization::WarmStart),
            None => (Array2::zeros(dx.raw_dim()), Initialization::Correlation),
        };

        let params = RegressionParams::new(cast::<T>(self.alpha), cast::<T>(self.l1_ratio))
            .positive(self.positive)
            .solver(self.solver)
            .init(init);

        let report = match self.layout {
            Layout::Single => {
                let rows = self.gram.as_ref().ok_or(ProblemError::MissingGram {
                    layout: self.layout,
                    field: "gram",
                })?;
                let gram = to_array2::<T>("gram", rows)?;
                enet_regression_single_gram(
                    gram.view(),
                    dx.view(),
                    y.view(),
                    code.view_mut(),
                    &params,
                )?
            }
            Layout::Multi => {
                let blocks = self.grams.as_ref().ok_or(ProblemError::MissingGram {
                    layout: self.layout,
                    field: "grams",
                })?;
                let mut grams = to_array3::<T>("grams", blocks)?;
                enet_regression_multi_gram(
                    grams.view_mut(),
                    dx.view(),
                    y.view(),
                    code.view_mut(),
                    &params,
                )?
            }
        };

        Ok(Solution::from_report(&code, &report))
    }
}

/// Which branch produced a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolvedBy {
    ClosedFormRidge,
    CoordinateDescent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleStatus {
    /// Exact closed-form solution.
    Solved,
    Converged,
    MaxIterationsReached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub status: SampleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_iter: Option<usize>,
}

/// Solved codes plus per-sample diagnostics, in batch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub solved_by: SolvedBy,
    pub code: Vec<Vec<f64>>,
    pub samples: Vec<SampleSummary>,
}

impl Solution {
    pub fn from_report<T: Real>(code: &Array2<T>, report: &BatchReport<T>) -> Self {
        let solved_by = match report.strategy {
            Strategy::ClosedFormRidge { .. } => SolvedBy::ClosedFormRidge,
            Strategy::CoordinateDescent { .. } => SolvedBy::CoordinateDescent,
        };
        let code = code
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&v| v.as_f64()).collect())
            .collect();
        let samples = report
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                SampleOutcome::Ridge => SampleSummary {
                    status: SampleStatus::Solved,
                    gap: None,
                    n_iter: None,
                },
                SampleOutcome::CoordinateDescent(cd) => SampleSummary {
                    status: match cd.status {
                        CdStatus::Converged => SampleStatus::Converged,
                        CdStatus::MaxIterationsReached => SampleStatus::MaxIterationsReached,
                    },
                    gap: Some(cd.gap.as_f64()),
                    n_iter: Some(cd.n_iter),
                },
            })
            .collect();
        Self {
            solved_by,
            code,
            samples,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ProblemError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProblemError> {
        write_toml(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProblemError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }
}

fn write_toml<S: Serialize>(value: &S, path: impl AsRef<Path>) -> Result<(), ProblemError> {
    let toml_string = toml::to_string_pretty(value)?;
    let mut file = BufWriter::new(fs::File::create(path)?);
    file.write_all(toml_string.as_bytes())?;
    file.flush()?;
    Ok(())
}

fn to_array2<T: Real>(name: &'static str, rows: &[Vec<f64>]) -> Result<Array2<T>, ProblemError> {
    let n_cols = rows.first().map_or(0, Vec::len);
    for (row, values) in rows.iter().enumerate() {
        if values.len() != n_cols {
            return Err(ProblemError::Ragged {
                name,
                row,
                expected: n_cols,
                found: values.len(),
            });
        }
    }
    Ok(Array2::from_shape_fn((rows.len(), n_cols), |(i, j)| {
        cast::<T>(rows[i][j])
    }))
}

fn to_array3<T: Real>(
    name: &'static str,
    blocks: &[Vec<Vec<f64>>],
) -> Result<Array3<T>, ProblemError> {
    let n_rows = blocks.first().map_or(0, Vec::len);
    let n_cols = blocks
        .first()
        .and_then(|block| block.first())
        .map_or(0, Vec::len);
    for (index, block) in blocks.iter().enumerate() {
        if block.len() != n_rows {
            return Err(ProblemError::Ragged {
                name,
                row: index,
                expected: n_rows,
                found: block.len(),
            });
        }
        for values in block {
            if values.len() != n_cols {
                return Err(ProblemError::Ragged {
                    name,
                    row: index,
                    expected: n_cols,
                    found: values.len(),
                });
            }
        }
    }
    Ok(Array3::from_shape_fn(
        (blocks.len(), n_rows, n_cols),
        |(b, i, j)| cast::<T>(blocks[b][i][j]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SINGLE: &str = r#"
layout = "single"
alpha = 0.0
l1_ratio = 0.0
gram = [[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0]]
dx = [[1.0, 2.0, 3.0]]
y = [[1.0, 1.0, 1.0]]
"#;

    #[test]
    fn single_gram_file_solves_diagonal_system() {
        let problem = Problem::parse(SINGLE).unwrap();
        assert_eq!(problem.precision, Precision::F64);
        assert_eq!(problem.solver, SolverConfig::default());

        let solution = problem.solve().unwrap();
        assert_eq!(solution.solved_by, SolvedBy::ClosedFormRidge);
        assert_eq!(solution.samples[0].status, SampleStatus::Solved);
        for &value in &solution.code[0] {
            assert_abs_diff_eq!(value, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn single_precision_runs_the_same_path() {
        let mut problem = Problem::parse(SINGLE).unwrap();
        problem.precision = Precision::F32;
        problem.alpha = 1000.0;
        problem.l1_ratio = 1.0;
        let solution = problem.solve().unwrap();
        assert_eq!(solution.solved_by, SolvedBy::CoordinateDescent);
        assert_eq!(solution.code[0], vec![0.0, 0.0, 0.0]);
        assert_eq!(solution.samples[0].status, SampleStatus::Converged);
        assert_eq!(solution.samples[0].n_iter, Some(1));
    }

    #[test]
    fn missing_gram_for_layout_is_reported() {
        let mut problem = Problem::parse(SINGLE).unwrap();
        problem.layout = Layout::Multi;
        assert!(matches!(
            problem.solve(),
            Err(ProblemError::MissingGram {
                layout: Layout::Multi,
                field: "grams"
            })
        ));
    }

    #[test]
    fn validation_rejects_incomplete_problems() {
        let missing = SINGLE.replace("gram = ", "# gram = ");
        assert!(matches!(
            Problem::parse(&missing),
            Err(ProblemError::MissingGram {
                layout: Layout::Single,
                field: "gram"
            })
        ));

        let no_samples = "layout = \"single\"\nalpha = 1.0\nl1_ratio = 0.5\n\
                          gram = [[1.0]]\ndx = []\ny = []\n";
        assert!(matches!(
            Problem::parse(no_samples),
            Err(ProblemError::NoSamples)
        ));

        let zero_budget = format!("{SINGLE}\n[solver]\nmax_iter = 0\n");
        assert!(matches!(
            Problem::parse(&zero_budget),
            Err(ProblemError::Config(ConfigError::ZeroIterations))
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut problem = Problem::parse(SINGLE).unwrap();
        problem.dx = vec![vec![1.0, 2.0, 3.0], vec![1.0]];
        problem.y = vec![vec![1.0; 3], vec![1.0; 3]];
        assert!(matches!(
            problem.solve(),
            Err(ProblemError::Ragged {
                name: "dx",
                row: 1,
                expected: 3,
                found: 1
            })
        ));
    }

    #[test]
    fn solution_survives_a_file_round_trip() {
        let problem = Problem::parse(SINGLE).unwrap();
        let solution = problem.solve().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.toml");
        solution.save(&path).unwrap();
        assert_eq!(Solution::load(&path).unwrap(), solution);
    }
}
