use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejections raised before any numerical work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Stimulus probability must lie in the open interval (0, 1), got {0}.")]
    ProbabilityOutOfRange(f64),

    #[error(
        "Correlation coefficient rho{index} must lie in the open interval (-1, 1), got {value}. \
        The stimulus-conditional covariance is singular or indefinite otherwise."
    )]
    CorrelationOutOfRange { index: usize, value: f64 },

    #[error("Invalid solver configuration: {0}")]
    InvalidConfig(String),
}

/// Number of response dimensions a mixture lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    One,
    Two,
}

impl Dimension {
    pub fn as_usize(self) -> usize {
        match self {
            Dimension::One => 1,
            Dimension::Two => 2,
        }
    }
}

/// Stimulus probability and the per-stimulus noise correlations of the
/// two-neuron population.
///
/// Construction is the only place the open-interval constraints are checked,
/// so a `ModelParams` in hand always describes positive-definite covariances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    p: f64,
    rho1: f64,
    rho2: f64,
}

impl ModelParams {
    pub fn new(p: f64, rho1: f64, rho2: f64) -> Result<Self, ParameterError> {
        validate_probability(p)?;
        validate_correlation(1, rho1)?;
        validate_correlation(2, rho2)?;
        Ok(Self { p, rho1, rho2 })
    }

    /// Equal correlations under both stimuli.
    pub fn symmetric(p: f64, rho: f64) -> Result<Self, ParameterError> {
        Self::new(p, rho, rho)
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    pub fn rho1(&self) -> f64 {
        self.rho1
    }

    pub fn rho2(&self) -> f64 {
        self.rho2
    }
}

pub fn validate_probability(p: f64) -> Result<(), ParameterError> {
    // NaN fails both comparisons.
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(ParameterError::ProbabilityOutOfRange(p))
    }
}

pub fn validate_correlation(index: usize, rho: f64) -> Result<(), ParameterError> {
    if rho > -1.0 && rho < 1.0 && 1.0 - rho * rho > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::CorrelationOutOfRange { index, value: rho })
    }
}

pub fn default_abs_tol() -> f64 {
    1e-6
}

pub fn default_rel_tol() -> f64 {
    1e-3
}

pub fn default_domain_half_width() -> f64 {
    5.0
}

pub fn default_max_evals() -> usize {
    50_000
}

pub fn default_max_bracket_expansions() -> usize {
    64
}

pub fn default_max_minimizer_iterations() -> usize {
    1000
}

pub fn default_initial_subdivisions() -> usize {
    4
}

pub fn default_parallel_threshold() -> usize {
    256
}

/// Numerical settings shared by the integrator, the bracket search and the
/// bounded minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,
    /// Half-width of the truncated response box `[-w, w]^d`.
    #[serde(default = "default_domain_half_width")]
    pub domain_half_width: f64,
    /// Integrand points allowed per integral before returning the best estimate.
    #[serde(default = "default_max_evals")]
    pub max_evals: usize,
    /// Cells per axis of the integrator's starting grid.
    #[serde(default = "default_initial_subdivisions")]
    pub initial_subdivisions: usize,
    #[serde(default = "default_max_bracket_expansions")]
    pub max_bracket_expansions: usize,
    #[serde(default = "default_max_minimizer_iterations")]
    pub max_minimizer_iterations: usize,
    /// Centre of the initial theta seeds `seed - 0.5`, `seed + 0.5`, `seed + 1.5`.
    #[serde(default)]
    pub theta_seed: f64,
    /// Batches with at least this many points are evaluated on the rayon pool.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            abs_tol: default_abs_tol(),
            rel_tol: default_rel_tol(),
            domain_half_width: default_domain_half_width(),
            max_evals: default_max_evals(),
            initial_subdivisions: default_initial_subdivisions(),
            max_bracket_expansions: default_max_bracket_expansions(),
            max_minimizer_iterations: default_max_minimizer_iterations(),
            theta_seed: 0.0,
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ParameterError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ParameterError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {v}"
                )))
            }
        };
        let nonnegative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(ParameterError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {v}"
                )))
            }
        };
        nonnegative("abs_tol", self.abs_tol)?;
        nonnegative("rel_tol", self.rel_tol)?;
        if self.abs_tol == 0.0 && self.rel_tol == 0.0 {
            return Err(ParameterError::InvalidConfig(
                "abs_tol and rel_tol cannot both be zero".to_string(),
            ));
        }
        positive("domain_half_width", self.domain_half_width)?;
        if !self.theta_seed.is_finite() {
            return Err(ParameterError::InvalidConfig(format!(
                "theta_seed must be finite, got {}",
                self.theta_seed
            )));
        }
        if self.max_evals == 0 {
            return Err(ParameterError::InvalidConfig(
                "max_evals must be at least 1".to_string(),
            ));
        }
        if !(1..=64).contains(&self.initial_subdivisions) {
            return Err(ParameterError::InvalidConfig(format!(
                "initial_subdivisions must lie in 1..=64, got {}",
                self.initial_subdivisions
            )));
        }
        if self.max_minimizer_iterations == 0 {
            return Err(ParameterError::InvalidConfig(
                "max_minimizer_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Integration box for `dim`, as (lower, upper) corner vectors.
    pub fn domain(&self, dim: Dimension) -> (Vec<f64>, Vec<f64>) {
        let n = dim.as_usize();
        (
            vec![-self.domain_half_width; n],
            vec![self.domain_half_width; n],
        )
    }
}
