//! Information and information-loss quantities of the two-population model.
//!
//! The correlated pair of neurons responds to stimulus 1 (probability `p`)
//! and stimulus 2 through a bivariate Gaussian mixture; a third, independent
//! neuron sees the stimuli with the labels swapped, i.e. a univariate mixture
//! with first-stimulus probability `1 - p`. The joint decoder that ignores noise
//! correlations is the reference family with isotropic precision `theta`.
//!
//! - `info_total`: mutual information carried by both populations.
//! - `descriptive_loss`: loss of the independence-assuming decoder at `theta = 1`.
//! - `joint_loss`: the same loss minimized over `theta` (the communication loss).
//! - `single_frame_loss`, `single_letter_loss`, `parallel_loss`: zero in this model.
//! - `destructive_interference`: `joint_loss - parallel_loss`.

use crate::cubature::{BatchIntegrand, CubatureError, CubatureOptions, integrate};
use crate::integrand::{GaussianMixture, InfoIntegrand, LossIntegrand};
use crate::minimize::{Bracket, SearchError, bracket_minimum, brent_minimize};
use crate::types::{Dimension, ModelParams, ParameterError, SolverConfig};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LossError {
    #[error("Invalid parameter: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Integration failed: {0}")]
    Integration(#[from] CubatureError),

    #[error("Minimization over theta failed: {0}")]
    Search(#[from] SearchError),

    #[error("Model parameter `{0}` has not been set.")]
    Unconfigured(&'static str),
}

/// One integrated information quantity with its integration diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InformationReport {
    /// Nats.
    pub value: f64,
    pub error_estimate: f64,
    pub evals: usize,
    pub converged: bool,
}

/// Minimized communication loss and how it was found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointLossReport {
    /// Nats.
    pub loss: f64,
    /// Minimizing decoding temperature.
    pub theta: f64,
    pub bracket: Bracket,
    pub iterations: usize,
    pub objective_evals: usize,
    pub converged: bool,
}

fn integrate_over_box<I>(
    integrand: &I,
    dim: Dimension,
    config: &SolverConfig,
) -> Result<InformationReport, LossError>
where
    I: BatchIntegrand,
{
    let (lower, upper) = config.domain(dim);
    let res = integrate(
        integrand,
        &lower,
        &upper,
        &CubatureOptions::from_config(config),
    )?;
    Ok(InformationReport {
        value: res.value,
        error_estimate: res.error,
        evals: res.evals,
        converged: res.converged,
    })
}

fn mutual_information(
    mixture: &GaussianMixture,
    config: &SolverConfig,
) -> Result<InformationReport, LossError> {
    config.validate()?;
    let integrand = InfoIntegrand::new(mixture, config.parallel_threshold);
    let mut report = integrate_over_box(&integrand, mixture.dim(), config)?;
    // The integral is -H(S|R); adding H(S) gives I(S;R).
    report.value += mixture.stimulus_entropy();
    Ok(report)
}

/// Mutual information between the stimulus and the correlated pair's response.
pub fn info_2d(
    params: &ModelParams,
    config: &SolverConfig,
) -> Result<InformationReport, LossError> {
    mutual_information(&GaussianMixture::bivariate(params), config)
}

/// Mutual information carried by a single unit-variance neuron whose first
/// stimulus has probability `q`.
pub fn info_1d(q: f64, config: &SolverConfig) -> Result<InformationReport, LossError> {
    mutual_information(&GaussianMixture::univariate(q)?, config)
}

/// Information transmitted by both populations together.
pub fn info_total(params: &ModelParams, config: &SolverConfig) -> Result<f64, LossError> {
    let pair = info_2d(params, config)?;
    let single = info_1d(1.0 - params.p(), config)?;
    Ok(pair.value + single.value)
}

/// The composite loss `loss2D(p, rho1, rho2, theta) + loss1D(1 - p, theta)` as
/// a reusable function of `theta`.
pub struct CommunicationObjective<'a> {
    pair: GaussianMixture,
    single: GaussianMixture,
    config: &'a SolverConfig,
    evals: usize,
}

impl<'a> CommunicationObjective<'a> {
    pub fn new(params: &ModelParams, config: &'a SolverConfig) -> Result<Self, LossError> {
        config.validate()?;
        Ok(Self {
            pair: GaussianMixture::bivariate(params),
            single: GaussianMixture::univariate(1.0 - params.p())?,
            config,
            evals: 0,
        })
    }

    /// Number of `theta` values evaluated so far.
    pub fn evals(&self) -> usize {
        self.evals
    }

    pub fn evaluate(&mut self, theta: f64) -> Result<f64, LossError> {
        self.evals += 1;
        let config = self.config;
        let pair = LossIntegrand::new(&self.pair, theta, config.parallel_threshold);
        let single = LossIntegrand::new(&self.single, theta, config.parallel_threshold);
        let (pair_res, single_res) = rayon::join(
            || integrate_over_box(&pair, Dimension::Two, config),
            || integrate_over_box(&single, Dimension::One, config),
        );
        let (pair_res, single_res) = (pair_res?, single_res?);
        let value = pair_res.value + single_res.value;
        log::debug!(
            "[joint-loss] theta={:.8e} loss2d={:.6e} (err {:.2e}) loss1d={:.6e} (err {:.2e})",
            theta,
            pair_res.value,
            pair_res.error_estimate,
            single_res.value,
            single_res.error_estimate
        );
        Ok(value)
    }
}

/// Loss of the independence-assuming decoder used at its nominal temperature
/// `theta = 1`, without re-optimizing it.
pub fn descriptive_loss(params: &ModelParams, config: &SolverConfig) -> Result<f64, LossError> {
    CommunicationObjective::new(params, config)?.evaluate(1.0)
}

/// Minimizes the composite loss over `theta`: bracket expansion from the
/// configured seeds, then Brent's method inside the bracket.
pub fn joint_loss_report(
    params: &ModelParams,
    config: &SolverConfig,
) -> Result<JointLossReport, LossError> {
    let mut objective = CommunicationObjective::new(params, config)?;
    let mut f = |theta: f64| objective.evaluate(theta);
    let bracket = bracket_minimum(&mut f, config.theta_seed, config.max_bracket_expansions)?;
    let minimum = brent_minimize(
        &mut f,
        &bracket,
        config.abs_tol,
        config.rel_tol,
        config.max_minimizer_iterations,
    )?;
    let objective_evals = objective.evals();
    log::debug!(
        "[joint-loss] p={} rho1={} rho2={} theta*={:.6e} loss={:.6e} after {} objective evaluations",
        params.p(),
        params.rho1(),
        params.rho2(),
        minimum.theta,
        minimum.value,
        objective_evals
    );
    Ok(JointLossReport {
        loss: minimum.value,
        theta: minimum.theta,
        bracket,
        iterations: minimum.iterations,
        objective_evals,
        converged: minimum.converged,
    })
}

/// Communication information loss of the joint decoder that ignores noise
/// correlations.
pub fn joint_loss(params: &ModelParams, config: &SolverConfig) -> Result<f64, LossError> {
    Ok(joint_loss_report(params, config)?.loss)
}

/// Loss when each population's frame is decoded on its own.
///
/// Zero by modelling assumption: every population is decoded with its own
/// exact likelihood, so nothing is lost before the populations are combined.
pub fn single_frame_loss(_params: &ModelParams) -> f64 {
    0.0
}

/// Loss of decoding each response letter separately. Zero in this model, as
/// for [`single_frame_loss`].
pub fn single_letter_loss(_params: &ModelParams) -> f64 {
    0.0
}

/// Loss of the parallel decoder that combines per-population posteriors.
/// Zero in this model: the populations carry independent streams.
pub fn parallel_loss(_params: &ModelParams) -> f64 {
    0.0
}

/// Part of the joint-decoder loss not explained by parallel decoding.
pub fn destructive_interference(
    params: &ModelParams,
    config: &SolverConfig,
) -> Result<f64, LossError> {
    Ok(joint_loss(params, config)? - parallel_loss(params))
}
