//! Pointwise information densities of a two-component Gaussian mixture.
//!
//! Component 0 is the response distribution under the first stimulus
//! (probability `p`, mean `+1` on every axis, correlation `rho1`); component 1
//! belongs to the second stimulus (probability `1 - p`, mean `-1`, correlation
//! `rho2`). Both have unit marginal variance. With
//! `w_k(x) = P(s_k) N(x; mu_k, Sigma_k)` and `W = w_0 + w_1`:
//!
//! - information density: `sum_k w_k ln w_k - W ln W`, whose integral is `-H(S|R)`;
//! - loss density against the independence-assuming decoder with precision
//!   `theta`, `r_k(x) = P(s_k) exp(-theta |x - mu_k|^2 / 2)` and `R = r_0 + r_1`:
//!   `sum_k w_k ln(w_k / r_k) - W ln(W / R)`.
//!
//! Any non-finite intermediate (a weight underflowing to zero under a
//! diverging logarithm, an overflowing ratio) makes the sample contribute
//! exactly zero.

use crate::cubature::{BatchIntegrand, evaluate_rows};
use crate::types::{Dimension, ModelParams, ParameterError, validate_probability};
use ndarray::{ArrayView2, ArrayViewMut1};
use std::f64::consts::PI;

const MEANS: [f64; 2] = [1.0, -1.0];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Component {
    mean: f64,
    /// Stimulus probability; also the weight of the reference component.
    prior: f64,
    /// Prior times the Gaussian normalising constant.
    scale: f64,
    /// `1 / (1 - rho^2)`.
    precision: f64,
    /// `rho / (1 - rho^2)`; multiplies the cross term in 2D.
    coupling: f64,
}

impl Component {
    fn new(dim: Dimension, mean: f64, prior: f64, rho: f64) -> Self {
        match dim {
            Dimension::One => Self {
                mean,
                prior,
                scale: prior / (2.0 * PI).sqrt(),
                precision: 1.0,
                coupling: 0.0,
            },
            Dimension::Two => {
                let precision = 1.0 / (1.0 - rho * rho);
                Self {
                    mean,
                    prior,
                    scale: prior * precision.sqrt() / (2.0 * PI),
                    precision,
                    coupling: rho * precision,
                }
            }
        }
    }

    /// Returns `-|x - mu|^2 / 2` and the product of the centred coordinates.
    #[inline]
    fn centred(&self, x: &[f64]) -> (f64, f64) {
        let mut sq = 0.0;
        let mut prod = 1.0;
        for &xi in x {
            let c = xi - self.mean;
            sq += c * c;
            prod *= c;
        }
        (-0.5 * sq, prod)
    }

    #[inline]
    fn weight_from(&self, half_sq: f64, prod: f64) -> f64 {
        let cross = if self.coupling == 0.0 {
            0.0
        } else {
            self.coupling * prod
        };
        self.scale * (self.precision * half_sq + cross).exp()
    }
}

/// Two-component Gaussian mixture over one or two response dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    dim: Dimension,
    components: [Component; 2],
}

impl GaussianMixture {
    /// The correlated two-neuron population.
    pub fn bivariate(params: &ModelParams) -> Self {
        let p = params.p();
        Self {
            dim: Dimension::Two,
            components: [
                Component::new(Dimension::Two, MEANS[0], p, params.rho1()),
                Component::new(Dimension::Two, MEANS[1], 1.0 - p, params.rho2()),
            ],
        }
    }

    /// A single neuron whose first stimulus occurs with probability `q`.
    pub fn univariate(q: f64) -> Result<Self, ParameterError> {
        validate_probability(q)?;
        Ok(Self {
            dim: Dimension::One,
            components: [
                Component::new(Dimension::One, MEANS[0], q, 0.0),
                Component::new(Dimension::One, MEANS[1], 1.0 - q, 0.0),
            ],
        })
    }

    pub fn dim(&self) -> Dimension {
        self.dim
    }

    /// `w_k(x)`: stimulus probability times the conditional response density.
    pub fn weighted_density(&self, component: usize, x: &[f64]) -> f64 {
        let c = &self.components[component];
        let (half_sq, prod) = c.centred(x);
        c.weight_from(half_sq, prod)
    }

    /// Stimulus entropy `H(S)` in nats.
    pub fn stimulus_entropy(&self) -> f64 {
        self.components
            .iter()
            .map(|c| -c.prior * c.prior.ln())
            .sum()
    }

    /// `sum_k w_k ln w_k - W ln W` at `x`.
    pub fn info_density(&self, x: &[f64]) -> f64 {
        let mut acc = 0.0;
        let mut total = 0.0;
        for c in &self.components {
            let (half_sq, prod) = c.centred(x);
            let w = c.weight_from(half_sq, prod);
            total += w;
            acc += w * w.ln();
            if !acc.is_finite() {
                return 0.0;
            }
        }
        let value = acc - total * total.ln();
        if value.is_finite() { value } else { 0.0 }
    }

    /// `sum_k w_k ln(w_k / r_k) - W ln(W / R)` at `x` for reference precision `theta`.
    pub fn loss_density(&self, x: &[f64], theta: f64) -> f64 {
        let mut acc = 0.0;
        let mut total = 0.0;
        let mut reference = 0.0;
        for c in &self.components {
            let (half_sq, prod) = c.centred(x);
            let w = c.weight_from(half_sq, prod);
            let r = c.prior * (theta * half_sq).exp();
            total += w;
            reference += r;
            acc += w * (w / r).ln();
            if !acc.is_finite() {
                return 0.0;
            }
        }
        let value = acc - total * (total / reference).ln();
        if value.is_finite() { value } else { 0.0 }
    }
}

/// Batched [`GaussianMixture::info_density`].
#[derive(Debug, Clone, Copy)]
pub struct InfoIntegrand<'a> {
    mixture: &'a GaussianMixture,
    parallel_threshold: usize,
}

impl<'a> InfoIntegrand<'a> {
    pub fn new(mixture: &'a GaussianMixture, parallel_threshold: usize) -> Self {
        Self {
            mixture,
            parallel_threshold,
        }
    }
}

impl BatchIntegrand for InfoIntegrand<'_> {
    fn dim(&self) -> usize {
        self.mixture.dim().as_usize()
    }

    fn evaluate(&self, points: ArrayView2<'_, f64>, out: ArrayViewMut1<'_, f64>) {
        let parallel = points.nrows() >= self.parallel_threshold;
        evaluate_rows(points, out, parallel, &|x: &[f64]| {
            self.mixture.info_density(x)
        });
    }
}

/// Batched [`GaussianMixture::loss_density`] at a fixed `theta`.
#[derive(Debug, Clone, Copy)]
pub struct LossIntegrand<'a> {
    mixture: &'a GaussianMixture,
    theta: f64,
    parallel_threshold: usize,
}

impl<'a> LossIntegrand<'a> {
    pub fn new(mixture: &'a GaussianMixture, theta: f64, parallel_threshold: usize) -> Self {
        Self {
            mixture,
            theta,
            parallel_threshold,
        }
    }
}

impl BatchIntegrand for LossIntegrand<'_> {
    fn dim(&self) -> usize {
        self.mixture.dim().as_usize()
    }

    fn evaluate(&self, points: ArrayView2<'_, f64>, out: ArrayViewMut1<'_, f64>) {
        let parallel = points.nrows() >= self.parallel_threshold;
        let theta = self.theta;
        evaluate_rows(points, out, parallel, &|x: &[f64]| {
            self.mixture.loss_density(x, theta)
        });
    }
}
