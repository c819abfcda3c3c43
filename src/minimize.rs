//! One-dimensional derivative-free minimization: geometric bracket expansion
//! followed by Brent's golden-section / parabolic-interpolation search.
//!
//! Objectives are fallible (`FnMut(f64) -> Result<f64, E>`) so that errors
//! raised while evaluating them propagate unchanged; search failures are
//! converted into the caller's error type through `From<SearchError>`.

use serde::Serialize;
use thiserror::Error;

/// `(3 - sqrt(5)) / 2`: fraction of the larger sub-interval taken by a golden step.
const GOLDEN: f64 = 0.381_966_011_250_105_1;
const SQRT_EPSILON: f64 = 1.490_116_119_384_765_6e-8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error(
        "No bracketing triple found after {expansions} expansions (last trial theta = {last_theta:.6e}); the objective keeps decreasing."
    )]
    BracketNotFound { expansions: usize, last_theta: f64 },

    #[error("Objective returned a non-finite value at theta = {theta:.6e}.")]
    NonFiniteObjective { theta: f64 },

    #[error(
        "Points ({lower}, {middle}, {upper}) do not bracket a minimum: the middle must be strictly inside and not above either end."
    )]
    InvalidBracket { lower: f64, middle: f64, upper: f64 },
}

/// Three ordered points with the lowest objective value in the middle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bracket {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    pub f_lower: f64,
    pub f_middle: f64,
    pub f_upper: f64,
}

impl Bracket {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn is_valid(&self) -> bool {
        self.lower < self.middle
            && self.middle < self.upper
            && self.f_middle <= self.f_lower
            && self.f_middle <= self.f_upper
    }
}

fn finite_value<E>(theta: f64, value: f64) -> Result<f64, E>
where
    E: From<SearchError>,
{
    if value.is_finite() && theta.is_finite() {
        Ok(value)
    } else {
        Err(SearchError::NonFiniteObjective { theta }.into())
    }
}

/// Expands the seeds `seed - 0.5`, `seed + 0.5`, `seed + 1.5` until the middle
/// point is no higher than both ends.
///
/// While the left end is lower than the middle, the window moves left: the old
/// left point becomes the middle and the new left point sits twice the previous
/// left gap further out. The right side is handled symmetrically. Both phases
/// together perform at most `max_expansions` steps.
pub fn bracket_minimum<F, E>(
    objective: &mut F,
    seed: f64,
    max_expansions: usize,
) -> Result<Bracket, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<SearchError>,
{
    let mut eval = |theta: f64| -> Result<f64, E> {
        let value = objective(theta)?;
        finite_value(theta, value)
    };

    let (mut a, mut m, mut b) = (seed - 0.5, seed + 0.5, seed + 1.5);
    let mut fa = eval(a)?;
    let mut fm = eval(m)?;
    let mut fb = eval(b)?;
    let mut expansions = 0usize;

    while fa < fm {
        if expansions >= max_expansions {
            return Err(SearchError::BracketNotFound {
                expansions,
                last_theta: a,
            }
            .into());
        }
        let gap = 2.0 * (m - a);
        (b, fb) = (m, fm);
        (m, fm) = (a, fa);
        a = m - gap;
        fa = eval(a)?;
        expansions += 1;
        log::debug!("[bracket] expand left: ({a:.6e}, {m:.6e}, {b:.6e}) f_left={fa:.6e} f_mid={fm:.6e}");
    }

    while fb < fm {
        if expansions >= max_expansions {
            return Err(SearchError::BracketNotFound {
                expansions,
                last_theta: b,
            }
            .into());
        }
        let gap = 2.0 * (b - m);
        (a, fa) = (m, fm);
        (m, fm) = (b, fb);
        b = m + gap;
        fb = eval(b)?;
        expansions += 1;
        log::debug!("[bracket] expand right: ({a:.6e}, {m:.6e}, {b:.6e}) f_mid={fm:.6e} f_right={fb:.6e}");
    }

    Ok(Bracket {
        lower: a,
        middle: m,
        upper: b,
        f_lower: fa,
        f_middle: fm,
        f_upper: fb,
    })
}

/// Outcome of [`brent_minimize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinimizeResult {
    pub theta: f64,
    pub value: f64,
    /// Final enclosing interval.
    pub lower: f64,
    pub upper: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Working state of Brent's method: the best point `x`, the second and third
/// best `w` and `v`. `d` is the last step taken and `e` the one before it (or
/// the span a golden step was taken from).
struct BrentState {
    lower: f64,
    upper: f64,
    x: f64,
    fx: f64,
    w: f64,
    fw: f64,
    v: f64,
    fv: f64,
    d: f64,
    e: f64,
}

impl BrentState {
    fn new(bracket: &Bracket, probe: f64, f_probe: f64) -> Self {
        Self {
            lower: bracket.lower,
            upper: bracket.upper,
            x: bracket.middle,
            fx: bracket.f_middle,
            w: probe,
            fw: f_probe,
            v: probe,
            fv: f_probe,
            d: 0.0,
            e: 0.0,
        }
    }

    /// Next trial point: a parabolic step through `(v, w, x)` when it is
    /// acceptable, a golden-section step into the larger half otherwise.
    fn propose(&mut self) -> f64 {
        let x = self.x;
        let tol = SQRT_EPSILON * x.abs() + 1e-10;
        let midpoint = 0.5 * (self.lower + self.upper);
        let mut d = self.d;
        let mut e = self.e;
        let (mut p, mut q, mut r) = (0.0, 0.0, 0.0);

        if e.abs() > tol {
            r = (x - self.w) * (self.fx - self.fv);
            q = (x - self.v) * (self.fx - self.fw);
            p = (x - self.v) * q - (x - self.w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            r = e;
            e = d;
        }

        if p.abs() < (0.5 * q * r).abs() && p > q * (self.lower - x) && p < q * (self.upper - x) {
            d = p / q;
            let u = x + d;
            // Keep parabolic trials away from the bracket ends.
            if (u - self.lower) < 2.0 * tol || (self.upper - u) < 2.0 * tol {
                d = if x < midpoint { tol } else { -tol };
            }
        } else {
            e = if x < midpoint {
                self.upper - x
            } else {
                self.lower - x
            };
            d = GOLDEN * e;
        }

        self.e = e;
        self.d = d;
        if d.abs() >= tol {
            x + d
        } else {
            x + tol.copysign(d)
        }
    }

    fn accept(&mut self, u: f64, fu: f64) {
        if fu <= self.fx {
            if u < self.x {
                self.upper = self.x;
            } else {
                self.lower = self.x;
            }
            (self.v, self.fv) = (self.w, self.fw);
            (self.w, self.fw) = (self.x, self.fx);
            (self.x, self.fx) = (u, fu);
        } else {
            if u < self.x {
                self.lower = u;
            } else {
                self.upper = u;
            }
            if fu <= self.fw || self.w == self.x {
                (self.v, self.fv) = (self.w, self.fw);
                (self.w, self.fw) = (u, fu);
            } else if fu <= self.fv || self.v == self.x || self.v == self.w {
                (self.v, self.fv) = (u, fu);
            }
        }
    }
}

/// Minimizes `objective` inside `bracket` with Brent's method.
///
/// Stops once `upper - lower <= abs_tol + rel_tol * |theta|`, or after
/// `max_iterations` trial points, in which case the best point seen so far is
/// returned with `converged == false`. Non-finite objective values are treated
/// as `+inf`, so they only ever shrink the interval.
pub fn brent_minimize<F, E>(
    objective: &mut F,
    bracket: &Bracket,
    abs_tol: f64,
    rel_tol: f64,
    max_iterations: usize,
) -> Result<MinimizeResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<SearchError>,
{
    if !bracket.is_valid() {
        return Err(SearchError::InvalidBracket {
            lower: bracket.lower,
            middle: bracket.middle,
            upper: bracket.upper,
        }
        .into());
    }

    let probe = bracket.lower + GOLDEN * bracket.width();
    let f_probe = sanitize(objective(probe)?);
    let mut state = BrentState::new(bracket, probe, f_probe);
    if f_probe < state.fx {
        // The probe already beats the middle; make it the incumbent.
        let (x, fx) = (state.x, state.fx);
        (state.x, state.fx) = (probe, f_probe);
        (state.w, state.fw) = (x, fx);
        (state.v, state.fv) = (x, fx);
        if x < probe {
            state.lower = x;
        } else {
            state.upper = x;
        }
    }

    let converged_at =
        |s: &BrentState| s.upper - s.lower <= abs_tol + rel_tol * s.x.abs();

    let mut iterations = 0usize;
    let mut converged = converged_at(&state);
    while !converged && iterations < max_iterations {
        let u = state.propose();
        let fu = sanitize(objective(u)?);
        state.accept(u, fu);
        iterations += 1;
        converged = converged_at(&state);
        log::debug!(
            "[brent] iter={} theta={:.8e} f={:.8e} interval=[{:.6e}, {:.6e}]",
            iterations,
            state.x,
            state.fx,
            state.lower,
            state.upper
        );
    }

    if !converged {
        log::warn!(
            "[brent] iteration cap {} reached with interval width {:.3e}; returning best point theta={:.6e}",
            max_iterations,
            state.upper - state.lower,
            state.x
        );
    }

    Ok(MinimizeResult {
        theta: state.x,
        value: state.fx,
        lower: state.lower,
        upper: state.upper,
        iterations,
        converged,
    })
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() { f64::INFINITY } else { value }
}
