//! Adaptive h-cubature on 1- and 2-dimensional boxes.
//!
//! # Rules
//!
//! - 1D: 15-point Gauss-Kronrod with the embedded 7-point Gauss rule as error
//!   reference, with QUADPACK's error rescaling.
//! - 2D: degree-7 Genz-Malik rule (17 points) with its embedded degree-5 rule as
//!   error reference. Regions split along the axis with the largest fourth
//!   difference, or the widest axis when the differences tie.
//!
//! # Subdivision
//!
//! The box is first cut into a uniform grid of `initial_subdivisions` cells
//! per axis; every cell is evaluated before the first adaptive split.
//! Regions live in a max-heap keyed by error. Each round pops the worst
//! regions until the error left in the heap would already meet the tolerance,
//! bisects all of them, and evaluates every new point in a single batched call
//! to the integrand. The loop stops when
//! `error <= max(abs_tol, rel_tol * |value|)` or when another round would
//! exceed the point budget; budget exhaustion is not an error, the best
//! estimate is returned with `converged == false`.

use crate::types::SolverConfig;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Zip, s};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;

const MAX_DIM: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CubatureError {
    #[error("Only 1- and 2-dimensional domains are supported, got dimension {0}.")]
    UnsupportedDimension(usize),

    #[error(
        "Domain bounds disagree with the integrand: lower has {lower} entries, upper has {upper}, integrand expects {expected}."
    )]
    DimensionMismatch {
        lower: usize,
        upper: usize,
        expected: usize,
    },

    #[error("Domain axis {axis} is empty or non-finite: [{lower}, {upper}].")]
    EmptyDomain { axis: usize, lower: f64, upper: f64 },
}

/// An integrand evaluated on batches of points.
///
/// `points` has one row per point and `dim()` columns; `out` has one slot per
/// row. Implementations must be pure: the same point always yields the same
/// value regardless of which batch it arrives in.
pub trait BatchIntegrand: Sync {
    fn dim(&self) -> usize;

    fn evaluate(&self, points: ArrayView2<'_, f64>, out: ArrayViewMut1<'_, f64>);
}

/// Adapter turning a scalar closure over a coordinate slice into a batch integrand.
pub struct Pointwise<F> {
    dim: usize,
    parallel: bool,
    f: F,
}

impl<F> Pointwise<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    pub fn new(dim: usize, f: F) -> Self {
        Self {
            dim,
            parallel: false,
            f,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl<F> BatchIntegrand for Pointwise<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn dim(&self) -> usize {
        self.dim
    }

    fn evaluate(&self, points: ArrayView2<'_, f64>, out: ArrayViewMut1<'_, f64>) {
        evaluate_rows(points, out, self.parallel, &self.f);
    }
}

/// Writes `f(row)` into `out` for every row of `points`, optionally on the rayon pool.
pub fn evaluate_rows<F>(
    points: ArrayView2<'_, f64>,
    out: ArrayViewMut1<'_, f64>,
    use_parallel: bool,
    f: &F,
) where
    F: Fn(&[f64]) -> f64 + Sync,
{
    debug_assert_eq!(points.nrows(), out.len());
    let dim = points.ncols().min(MAX_DIM);
    let eval_row = |slot: &mut f64, row: ArrayView1<'_, f64>| {
        let mut coords = [0.0_f64; MAX_DIM];
        for (c, &v) in coords.iter_mut().zip(row.iter()) {
            *c = v;
        }
        *slot = f(&coords[..dim]);
    };

    let zip = Zip::from(out).and(points.rows());
    if use_parallel {
        zip.par_for_each(eval_row);
    } else {
        zip.for_each(eval_row);
    }
}

/// Tolerances and budget for one call to [`integrate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubatureOptions {
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub max_evals: usize,
    /// Cells per axis of the starting grid; values below 1 act as 1.
    pub initial_subdivisions: usize,
}

impl CubatureOptions {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            abs_tol: config.abs_tol,
            rel_tol: config.rel_tol,
            max_evals: config.max_evals,
            initial_subdivisions: config.initial_subdivisions,
        }
    }

    fn accepts(&self, value: f64, error: f64) -> bool {
        error <= self.abs_tol.max(self.rel_tol * value.abs())
    }
}

impl Default for CubatureOptions {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationResult {
    pub value: f64,
    pub error: f64,
    /// Integrand points evaluated.
    pub evals: usize,
    pub regions: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    center: [f64; MAX_DIM],
    half_width: [f64; MAX_DIM],
    value: f64,
    error: f64,
    split_axis: usize,
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Region {}

impl PartialOrd for Region {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Region {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error.total_cmp(&other.error)
    }
}

impl Region {
    fn bisect(&self) -> (Region, Region) {
        let axis = self.split_axis;
        let mut left = *self;
        let mut right = *self;
        let h = 0.5 * self.half_width[axis];
        left.half_width[axis] = h;
        right.half_width[axis] = h;
        left.center[axis] = self.center[axis] - h;
        right.center[axis] = self.center[axis] + h;
        (left, right)
    }

    fn volume(&self, dim: usize) -> f64 {
        self.half_width[..dim].iter().map(|h| 2.0 * h).product()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    GaussKronrod15,
    GenzMalik,
}

// Gauss-Kronrod 15 abscissae, descending, last is the centre.
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];
const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_18,
    0.140_653_259_715_525_92,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_83,
];
// 7-point Gauss weights for XGK[1], XGK[3], XGK[5], XGK[7].
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

// Genz-Malik generators (squared) for d = 2.
const GM_LAMBDA2_SQ: f64 = 9.0 / 70.0;
const GM_LAMBDA4_SQ: f64 = 9.0 / 10.0;
const GM_LAMBDA5_SQ: f64 = 9.0 / 19.0;

impl Rule {
    fn for_dim(dim: usize) -> Result<Self, CubatureError> {
        match dim {
            1 => Ok(Rule::GaussKronrod15),
            2 => Ok(Rule::GenzMalik),
            other => Err(CubatureError::UnsupportedDimension(other)),
        }
    }

    fn dim(self) -> usize {
        match self {
            Rule::GaussKronrod15 => 1,
            Rule::GenzMalik => 2,
        }
    }

    fn points_per_region(self) -> usize {
        match self {
            Rule::GaussKronrod15 => 15,
            Rule::GenzMalik => 17,
        }
    }

    /// Writes this rule's nodes for `region` into consecutive rows of `rows`.
    fn fill_points(self, region: &Region, mut rows: ArrayViewMut2<'_, f64>) {
        let c = region.center;
        let h = region.half_width;
        match self {
            Rule::GaussKronrod15 => {
                rows[[0, 0]] = c[0];
                for (j, &x) in XGK[..7].iter().enumerate() {
                    rows[[1 + 2 * j, 0]] = c[0] - h[0] * x;
                    rows[[2 + 2 * j, 0]] = c[0] + h[0] * x;
                }
            }
            Rule::GenzMalik => {
                let l2 = GM_LAMBDA2_SQ.sqrt();
                let l4 = GM_LAMBDA4_SQ.sqrt();
                let l5 = GM_LAMBDA5_SQ.sqrt();
                let mut set = |row: usize, x: f64, y: f64| {
                    rows[[row, 0]] = x;
                    rows[[row, 1]] = y;
                };
                set(0, c[0], c[1]);
                // Axis points at lambda2 then lambda4: (-x, +x, -y, +y).
                for (base, l) in [(1, l2), (5, l4)] {
                    set(base, c[0] - l * h[0], c[1]);
                    set(base + 1, c[0] + l * h[0], c[1]);
                    set(base + 2, c[0], c[1] - l * h[1]);
                    set(base + 3, c[0], c[1] + l * h[1]);
                }
                // Off-axis points at lambda4 then the lambda5 corners.
                for (base, l) in [(9, l4), (13, l5)] {
                    set(base, c[0] - l * h[0], c[1] - l * h[1]);
                    set(base + 1, c[0] + l * h[0], c[1] - l * h[1]);
                    set(base + 2, c[0] - l * h[0], c[1] + l * h[1]);
                    set(base + 3, c[0] + l * h[0], c[1] + l * h[1]);
                }
            }
        }
    }

    /// Applies the rule to the integrand values of one region, filling in its
    /// estimate, error and preferred split axis.
    fn estimate(self, region: &mut Region, vals: &[f64]) {
        match self {
            Rule::GaussKronrod15 => gauss_kronrod_estimate(region, vals),
            Rule::GenzMalik => genz_malik_estimate(region, vals),
        }
    }
}

fn gauss_kronrod_estimate(region: &mut Region, vals: &[f64]) {
    let half = region.half_width[0];
    let f_center = vals[0];
    let mut kronrod = WGK[7] * f_center;
    let mut gauss = WG[3] * f_center;
    let mut abs_sum = WGK[7] * f_center.abs();
    for j in 0..7 {
        let pair = vals[1 + 2 * j] + vals[2 + 2 * j];
        kronrod += WGK[j] * pair;
        abs_sum += WGK[j] * (vals[1 + 2 * j].abs() + vals[2 + 2 * j].abs());
        if j % 2 == 1 {
            gauss += WG[j / 2] * pair;
        }
    }
    let mean = 0.5 * kronrod;
    let mut asc = WGK[7] * (f_center - mean).abs();
    for j in 0..7 {
        asc += WGK[j] * ((vals[1 + 2 * j] - mean).abs() + (vals[2 + 2 * j] - mean).abs());
    }

    let result_abs = abs_sum * half;
    let result_asc = asc * half;
    let mut err = ((kronrod - gauss) * half).abs();
    if result_asc != 0.0 && err != 0.0 {
        err = result_asc * (200.0 * err / result_asc).powf(1.5).min(1.0);
    }
    if result_abs > f64::MIN_POSITIVE / (50.0 * f64::EPSILON) {
        err = err.max(50.0 * f64::EPSILON * result_abs);
    }

    region.value = kronrod * half;
    region.error = err;
    region.split_axis = 0;
}

fn genz_malik_estimate(region: &mut Region, vals: &[f64]) {
    let d = 2.0_f64;
    let w1 = (12824.0 - 9120.0 * d + 400.0 * d * d) / 19683.0;
    let w2 = 980.0 / 6561.0;
    let w3 = (1820.0 - 400.0 * d) / 19683.0;
    let w4 = 200.0 / 19683.0;
    let w5 = 6859.0 / 19683.0 / 4.0;
    let e1 = (729.0 - 950.0 * d + 50.0 * d * d) / 729.0;
    let e2 = 245.0 / 486.0;
    let e3 = (265.0 - 100.0 * d) / 1458.0;
    let e4 = 25.0 / 729.0;

    let f0 = vals[0];
    let sum2: f64 = vals[1..5].iter().sum();
    let sum3: f64 = vals[5..9].iter().sum();
    let sum4: f64 = vals[9..13].iter().sum();
    let sum5: f64 = vals[13..17].iter().sum();

    let volume = region.volume(2);
    let degree7 = volume * (w1 * f0 + w2 * sum2 + w3 * sum3 + w4 * sum4 + w5 * sum5);
    let degree5 = volume * (e1 * f0 + e2 * sum2 + e3 * sum3 + e4 * sum4);

    // Fourth divided differences along each axis pick the split direction.
    let ratio = GM_LAMBDA2_SQ / GM_LAMBDA4_SQ;
    let fourth_diff = |axis: usize| {
        let inner = vals[1 + 2 * axis] + vals[2 + 2 * axis] - 2.0 * f0;
        let outer = vals[5 + 2 * axis] + vals[6 + 2 * axis] - 2.0 * f0;
        (inner - ratio * outer).abs()
    };
    let diffs = [fourth_diff(0), fourth_diff(1)];
    let widest = if region.half_width[1] > region.half_width[0] {
        1
    } else {
        0
    };
    let scale = diffs[0].max(diffs[1]);
    let split_axis = if (diffs[0] - diffs[1]).abs() <= 1e-10 * scale || !scale.is_finite() {
        widest
    } else if diffs[1] > diffs[0] {
        1
    } else {
        0
    };

    region.value = degree7;
    region.error = (degree7 - degree5).abs();
    region.split_axis = split_axis;
}

/// Evaluates the rule on every region in `regions` with one batched integrand call.
fn evaluate_regions<I>(rule: Rule, integrand: &I, regions: &mut [Region])
where
    I: BatchIntegrand + ?Sized,
{
    let per = rule.points_per_region();
    let mut points = Array2::<f64>::zeros((per * regions.len(), rule.dim()));
    for (k, region) in regions.iter().enumerate() {
        rule.fill_points(region, points.slice_mut(s![k * per..(k + 1) * per, ..]));
    }
    let mut values = Array1::<f64>::zeros(points.nrows());
    integrand.evaluate(points.view(), values.view_mut());
    let values = values.as_slice().unwrap_or(&[]);
    for (k, region) in regions.iter_mut().enumerate() {
        rule.estimate(region, &values[k * per..(k + 1) * per]);
    }
}

fn heap_totals(heap: &BinaryHeap<Region>) -> (f64, f64) {
    heap.iter()
        .fold((0.0, 0.0), |(v, e), r| (v + r.value, e + r.error))
}

/// Cuts `root` into `splits` equal cells along each of its `dim` axes.
fn initial_grid(root: &Region, dim: usize, splits: usize) -> Vec<Region> {
    let cells = (0..dim).fold(1usize, |n, _| n.saturating_mul(splits));
    (0..cells)
        .map(|cell| {
            let mut region = *root;
            let mut rest = cell;
            for axis in 0..dim {
                let i = rest % splits;
                rest /= splits;
                let h = root.half_width[axis] / splits as f64;
                let lower = root.center[axis] - root.half_width[axis];
                region.half_width[axis] = h;
                region.center[axis] = lower + (2 * i + 1) as f64 * h;
            }
            region
        })
        .collect()
}

/// Integrates `integrand` over the box `[lower, upper]`.
pub fn integrate<I>(
    integrand: &I,
    lower: &[f64],
    upper: &[f64],
    options: &CubatureOptions,
) -> Result<IntegrationResult, CubatureError>
where
    I: BatchIntegrand + ?Sized,
{
    let dim = integrand.dim();
    let rule = Rule::for_dim(dim)?;
    if lower.len() != dim || upper.len() != dim {
        return Err(CubatureError::DimensionMismatch {
            lower: lower.len(),
            upper: upper.len(),
            expected: dim,
        });
    }
    let mut root = Region {
        center: [0.0; MAX_DIM],
        half_width: [0.0; MAX_DIM],
        value: 0.0,
        error: 0.0,
        split_axis: 0,
    };
    for axis in 0..dim {
        let (lo, hi) = (lower[axis], upper[axis]);
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(CubatureError::EmptyDomain {
                axis,
                lower: lo,
                upper: hi,
            });
        }
        root.center[axis] = 0.5 * (lo + hi);
        root.half_width[axis] = 0.5 * (hi - lo);
    }

    let per = rule.points_per_region();
    let mut roots = initial_grid(&root, dim, options.initial_subdivisions.max(1));
    evaluate_regions(rule, integrand, &mut roots);
    let mut evals = per * roots.len();
    let mut heap: BinaryHeap<Region> = roots.into_iter().collect();

    let mut rounds = 0usize;
    let converged = loop {
        let (value, error) = heap_totals(&heap);
        if options.accepts(value, error) {
            break true;
        }
        if evals + 2 * per > options.max_evals {
            break false;
        }

        let mut remaining = error;
        let mut batch = Vec::new();
        while let Some(worst) = heap.pop() {
            remaining -= worst.error;
            let (left, right) = worst.bisect();
            batch.push(left);
            batch.push(right);
            if options.accepts(value, remaining) || evals + per * (batch.len() + 2) > options.max_evals
            {
                break;
            }
        }
        evaluate_regions(rule, integrand, &mut batch);
        evals += per * batch.len();
        rounds += 1;
        log::debug!(
            "[cubature] dim={} round={} split={} regions={} evals={} err={:.3e}",
            dim,
            rounds,
            batch.len() / 2,
            heap.len() + batch.len(),
            evals,
            error
        );
        heap.extend(batch);
    };

    let (value, error) = heap_totals(&heap);
    if !converged {
        log::warn!(
            "[cubature] dim={} budget of {} points exhausted: value={:.6e} err={:.3e}",
            dim,
            options.max_evals,
            value,
            error
        );
    }
    Ok(IntegrationResult {
        value,
        error,
        evals,
        regions: heap.len(),
        converged,
    })
}
