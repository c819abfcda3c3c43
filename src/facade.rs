//! Memoizing front end over the quantity functions.
//!
//! A [`LossModel`] carries the two free parameters of the symmetric model, the
//! stimulus probability and the shared noise correlation, and caches every
//! quantity it has computed under the `(p, rho)` key it was computed for.
//! Setting a parameter never touches the cache: it only changes which key the
//! next request looks up, so returning to an earlier setting is free.

use crate::quantities::{self, JointLossReport, LossError};
use crate::types::{
    ModelParams, ParameterError, SolverConfig, validate_correlation, validate_probability,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Every exposed quantity for one parameter setting, in nats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantitySet {
    pub p: f64,
    pub rho1: f64,
    pub rho2: f64,
    pub info_total: f64,
    pub descriptive_loss: f64,
    pub joint_loss: f64,
    pub theta: f64,
    pub single_frame_loss: f64,
    pub single_letter_loss: f64,
    pub parallel_loss: f64,
    pub destructive_interference: f64,
    pub converged: bool,
}

impl QuantitySet {
    /// Computes every quantity from scratch.
    pub fn evaluate(params: &ModelParams, config: &SolverConfig) -> Result<Self, LossError> {
        let info_total = quantities::info_total(params, config)?;
        let descriptive_loss = quantities::descriptive_loss(params, config)?;
        let report = quantities::joint_loss_report(params, config)?;
        Ok(Self::assemble(params, info_total, descriptive_loss, &report))
    }

    fn assemble(
        params: &ModelParams,
        info_total: f64,
        descriptive_loss: f64,
        report: &JointLossReport,
    ) -> Self {
        let parallel_loss = quantities::parallel_loss(params);
        Self {
            p: params.p(),
            rho1: params.rho1(),
            rho2: params.rho2(),
            info_total,
            descriptive_loss,
            joint_loss: report.loss,
            theta: report.theta,
            single_frame_loss: quantities::single_frame_loss(params),
            single_letter_loss: quantities::single_letter_loss(params),
            parallel_loss,
            destructive_interference: report.loss - parallel_loss,
            converged: report.converged,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CacheEntry {
    info_total: Option<f64>,
    descriptive_loss: Option<f64>,
    joint: Option<JointLossReport>,
}

type CacheKey = (u64, u64);

pub struct LossModel {
    probability: Option<f64>,
    correlation: Option<f64>,
    config: SolverConfig,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl Default for LossModel {
    fn default() -> Self {
        Self {
            probability: None,
            correlation: None,
            config: SolverConfig::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl LossModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SolverConfig) -> Result<Self, ParameterError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn probability(&self) -> Option<f64> {
        self.probability
    }

    pub fn correlation(&self) -> Option<f64> {
        self.correlation
    }

    /// Out-of-range values are rejected and leave the current setting in place.
    pub fn set_probability(&mut self, p: f64) -> Result<(), ParameterError> {
        validate_probability(p)?;
        self.probability = Some(p);
        Ok(())
    }

    pub fn set_correlation(&mut self, rho: f64) -> Result<(), ParameterError> {
        validate_correlation(1, rho)?;
        self.correlation = Some(rho);
        Ok(())
    }

    pub fn params(&self) -> Result<ModelParams, LossError> {
        let p = self.probability.ok_or(LossError::Unconfigured("probability"))?;
        let rho = self.correlation.ok_or(LossError::Unconfigured("correlation"))?;
        Ok(ModelParams::symmetric(p, rho)?)
    }

    /// Number of parameter settings with at least one cached quantity.
    pub fn cached_settings(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn info_total(&self) -> Result<f64, LossError> {
        self.cached(
            |entry| entry.info_total,
            |params, config| quantities::info_total(params, config),
            |entry, value| entry.info_total = Some(value),
        )
    }

    pub fn descriptive_loss(&self) -> Result<f64, LossError> {
        self.cached(
            |entry| entry.descriptive_loss,
            |params, config| quantities::descriptive_loss(params, config),
            |entry, value| entry.descriptive_loss = Some(value),
        )
    }

    pub fn joint_loss_report(&self) -> Result<JointLossReport, LossError> {
        self.cached(
            |entry| entry.joint,
            |params, config| quantities::joint_loss_report(params, config),
            |entry, report| entry.joint = Some(report),
        )
    }

    pub fn joint_loss(&self) -> Result<f64, LossError> {
        Ok(self.joint_loss_report()?.loss)
    }

    pub fn single_frame_loss(&self) -> Result<f64, LossError> {
        Ok(quantities::single_frame_loss(&self.params()?))
    }

    pub fn single_letter_loss(&self) -> Result<f64, LossError> {
        Ok(quantities::single_letter_loss(&self.params()?))
    }

    pub fn parallel_loss(&self) -> Result<f64, LossError> {
        Ok(quantities::parallel_loss(&self.params()?))
    }

    pub fn destructive_interference(&self) -> Result<f64, LossError> {
        Ok(self.joint_loss()? - self.parallel_loss()?)
    }

    /// Every quantity for the current setting, reusing whatever is cached.
    pub fn evaluate_all(&self) -> Result<QuantitySet, LossError> {
        let params = self.params()?;
        let info_total = self.info_total()?;
        let descriptive_loss = self.descriptive_loss()?;
        let report = self.joint_loss_report()?;
        Ok(QuantitySet::assemble(
            &params,
            info_total,
            descriptive_loss,
            &report,
        ))
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        // Entries are written whole, so a poisoned map is still consistent.
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached<T, Get, Compute, Put>(
        &self,
        get: Get,
        compute: Compute,
        put: Put,
    ) -> Result<T, LossError>
    where
        T: Copy,
        Get: Fn(&CacheEntry) -> Option<T>,
        Compute: FnOnce(&ModelParams, &SolverConfig) -> Result<T, LossError>,
        Put: FnOnce(&mut CacheEntry, T),
    {
        let params = self.params()?;
        let key = (params.p().to_bits(), params.rho1().to_bits());
        if let Some(hit) = self.lock_cache().get(&key).and_then(get) {
            return Ok(hit);
        }
        // The lock is not held while integrating.
        let value = compute(&params, &self.config)?;
        put(self.lock_cache().entry(key).or_default(), value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_parameters_are_reported() {
        let mut model = LossModel::new();
        assert_eq!(
            model.joint_loss(),
            Err(LossError::Unconfigured("probability"))
        );
        model.set_probability(0.4).unwrap();
        assert_eq!(
            model.info_total(),
            Err(LossError::Unconfigured("correlation"))
        );
        assert_eq!(
            model.parallel_loss(),
            Err(LossError::Unconfigured("correlation"))
        );
        assert_eq!(model.cached_settings(), 0);
    }

    #[test]
    fn out_of_range_values_are_rejected_without_clamping() {
        let mut model = LossModel::new();
        model.set_probability(0.3).unwrap();
        assert_eq!(
            model.set_probability(1.0),
            Err(ParameterError::ProbabilityOutOfRange(1.0))
        );
        assert!(model.set_correlation(-1.0).is_err());
        assert!(model.set_correlation(1.5).is_err());
        assert_eq!(model.probability(), Some(0.3));
        assert_eq!(model.correlation(), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SolverConfig {
            max_evals: 0,
            ..SolverConfig::default()
        };
        assert!(LossModel::with_config(cfg).is_err());
    }

    #[test]
    fn quantities_are_cached_per_setting() {
        let mut model = LossModel::new();
        model.set_probability(0.3).unwrap();
        model.set_correlation(0.2).unwrap();
        let first = model.descriptive_loss().unwrap();
        assert_eq!(model.cached_settings(), 1);
        assert_eq!(model.descriptive_loss().unwrap(), first);

        model.set_correlation(0.0).unwrap();
        let uncorrelated = model.descriptive_loss().unwrap();
        assert_eq!(model.cached_settings(), 2);
        assert!(uncorrelated.abs() < 1e-9);

        model.set_correlation(0.2).unwrap();
        assert_eq!(model.descriptive_loss().unwrap(), first);
        assert_eq!(model.cached_settings(), 2);
    }
}
