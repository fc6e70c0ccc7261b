//! Ordered mixture container and its arithmetic.
//!
//! A [`Dist`] is a sequence of components sorted by position key. The
//! mixture is the arithmetic sum of its components; components may overlap
//! spatially. Convolution is the Cartesian product of pairwise component
//! convolutions and can grow the component count multiplicatively, so
//! callers that need a bound apply [`crate::reduce::reduce`] afterwards.
//!
//! Scalar summaries (mean, variance, tail probability, quantiles) are
//! conditional on total mass, so they remain meaningful for unnormalized
//! intermediates.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

use crate::MASS_EPSILON;
use crate::alias::AliasTable;
use crate::component::{BinShape, Component, TailSide};
use crate::error::{Error, Result};

/// Number of CDF buckets used by [`Dist::max_of`].
const MAX_OF_RESOLUTION: usize = 200;

/// Bins used by the Gaussian constructor.
const NORMAL_BINS: usize = 20;

/// Bins used by the exponential constructor.
const EXPONENTIAL_BINS: usize = 50;

/// A one-dimensional probability distribution as an ordered mixture of
/// atoms, bins, and parametric tails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    components: Vec<Component>,
}

impl Dist {
    /// The empty distribution (zero components, zero mass).
    pub fn empty() -> Self {
        Self { components: Vec::new() }
    }

    /// Build from components, establishing the position-key order.
    pub fn from_components(mut components: Vec<Component>) -> Self {
        components.sort_by(|x, y| x.sort_key().total_cmp(&y.sort_key()));
        Self { components }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn into_components(self) -> Vec<Component> {
        self.components
    }

    /// Total probability mass across all components.
    pub fn total_mass(&self) -> f64 {
        self.components.iter().map(Component::weight).sum()
    }

    /// Rescale masses so the total is 1, when the total is positive and
    /// outside tolerance.
    pub fn normalize(&mut self) {
        let total = self.total_mass();
        if total > 0.0 && (total - 1.0).abs() > MASS_EPSILON {
            let inv = 1.0 / total;
            for c in &mut self.components {
                c.scale_weight(inv);
            }
        }
    }

    /// Consuming variant of [`Dist::normalize`].
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Point mass at `x` with probability 1.
    pub fn constant(x: f64) -> Result<Self> {
        Ok(Self { components: vec![Component::atom(x, 1.0)?] })
    }

    /// Single uniform bin over `[min, max]` with mass 1.
    pub fn uniform(min: f64, max: f64) -> Result<Self> {
        Ok(Self { components: vec![Component::uniform_bin(min, max, 1.0)?] })
    }

    /// Explicit bin constructor with caller-chosen mass.
    pub fn bin(a: f64, b: f64, p: f64) -> Result<Self> {
        Ok(Self { components: vec![Component::uniform_bin(a, b, p)?] })
    }

    /// Gaussian approximated by 20 uniform bins across `mean ± 4σ`, with
    /// masses proportional to the PDF at bin midpoints.
    pub fn normal(mean: f64, sd: f64) -> Result<Self> {
        if !mean.is_finite() {
            return Err(Error::Argument(format!("mean must be finite, got {mean}")));
        }
        if !sd.is_finite() || sd <= 0.0 {
            return Err(Error::Argument(format!("sigma must be finite and > 0, got {sd}")));
        }
        let pdf = Normal::new(mean, sd)
            .map_err(|e| Error::Argument(format!("invalid normal parameters: {e}")))?;
        let lo = mean - 4.0 * sd;
        let width = 8.0 * sd / NORMAL_BINS as f64;
        let mut components = Vec::with_capacity(NORMAL_BINS);
        for i in 0..NORMAL_BINS {
            let a = lo + i as f64 * width;
            let b = a + width;
            let mid = (a + b) / 2.0;
            components.push(Component::uniform_bin(a, b, pdf.pdf(mid))?);
        }
        Ok(Self { components }.normalized())
    }

    /// Atoms from `(value, weight)` pairs. Weights must be non-negative with
    /// a positive total; the result is *not* normalized.
    pub fn discrete(pairs: &[(f64, f64)]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::Argument("discrete requires at least one (value, weight) pair".into()));
        }
        let mut components = Vec::with_capacity(pairs.len());
        let mut total = 0.0;
        for &(x, w) in pairs {
            components.push(Component::atom(x, w)?);
            total += w;
        }
        if total <= 0.0 {
            return Err(Error::Argument(format!("total weight must be > 0, got {total}")));
        }
        Ok(Self::from_components(components))
    }

    /// Exponential with rate `lambda`: 50 bins over `[0, 7/λ]`, bin mass
    /// `exp(−λa) − exp(−λb)`, normalized.
    pub fn exponential(lambda: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(Error::Argument(format!("lambda must be finite and > 0, got {lambda}")));
        }
        let hi = 7.0 / lambda;
        let width = hi / EXPONENTIAL_BINS as f64;
        let mut components = Vec::with_capacity(EXPONENTIAL_BINS);
        for i in 0..EXPONENTIAL_BINS {
            let a = i as f64 * width;
            let b = a + width;
            let mass = (-lambda * a).exp() - (-lambda * b).exp();
            components.push(Component::uniform_bin(a, b, mass)?);
        }
        Ok(Self { components }.normalized())
    }

    /// Poisson atoms `k = 0..` via the PMF recurrence, stopping once the
    /// cumulative mass exceeds `1 − 1e−5` or `k` reaches `limit`.
    pub fn poisson(lambda: f64, limit: usize) -> Result<Self> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(Error::Argument(format!("lambda must be finite and >= 0, got {lambda}")));
        }
        let mut components = Vec::new();
        let mut pmf = (-lambda).exp();
        let mut cumulative = 0.0;
        for k in 0..=limit {
            components.push(Component::atom(k as f64, pmf)?);
            cumulative += pmf;
            if cumulative > 1.0 - 1e-5 {
                break;
            }
            pmf *= lambda / (k as f64 + 1.0);
        }
        Ok(Self { components }.normalized())
    }

    /// Binomial atoms `k = 0..=n` via the PMF recurrence. `n` must not
    /// exceed `limit`.
    pub fn binomial(n: usize, p: f64, limit: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Argument(format!("p must be in [0, 1], got {p}")));
        }
        if n > limit {
            return Err(Error::Argument(format!(
                "binomial n={n} exceeds the component limit {limit}"
            )));
        }
        if p == 0.0 {
            return Self::constant(0.0);
        }
        if p == 1.0 {
            return Self::constant(n as f64);
        }
        let mut components = Vec::with_capacity(n + 1);
        let mut pmf = (1.0 - p).powi(n as i32);
        let ratio = p / (1.0 - p);
        for k in 0..=n {
            components.push(Component::atom(k as f64, pmf)?);
            pmf *= ratio * (n - k) as f64 / (k as f64 + 1.0);
        }
        Ok(Self { components }.normalized())
    }

    // -----------------------------------------------------------------------
    // Arithmetic
    // -----------------------------------------------------------------------

    /// Independent sum `self ⊕ other`: Cartesian product of pairwise
    /// component convolutions. Pairs involving a tail are dropped (mass
    /// loss, documented). The result is unreduced and may carry up to
    /// `k₁·k₂` components.
    pub fn convolve(&self, other: &Dist) -> Dist {
        if self.is_empty() || other.is_empty() {
            return Dist::empty();
        }
        let mut out = Vec::with_capacity(self.len() * other.len());
        for c1 in &self.components {
            for c2 in &other.components {
                if let Some(c) = c1.convolve(c2) {
                    out.push(c);
                }
            }
        }
        Dist::from_components(out)
    }

    /// `self ⊕ scale(other, −1)`.
    pub fn subtract(&self, other: &Dist) -> Dist {
        self.convolve(&other.scale(-1.0))
    }

    /// Scale positions by `k`. Tails are left positionally unchanged
    /// (documented approximation); scaling by zero collapses atoms and bins
    /// to point mass at the origin.
    pub fn scale(&self, k: f64) -> Dist {
        if k == 0.0 {
            let components = self
                .components
                .iter()
                .map(|c| match c {
                    tail @ Component::Tail { .. } => tail.clone(),
                    other => Component::Atom { x: 0.0, p: other.weight() },
                })
                .collect();
            return Dist::from_components(components);
        }
        Dist::from_components(self.components.iter().map(|c| c.scale_value(k)).collect())
    }

    /// Translate every component by `dx`.
    pub fn shift(&self, dx: f64) -> Dist {
        Dist::from_components(self.components.iter().map(|c| c.shift(dx)).collect())
    }

    /// Mixture `(1−p)·self + p·other`.
    pub fn mix(&self, other: &Dist, p: f64) -> Result<Dist> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Argument(format!("mixture weight must be in [0, 1], got {p}")));
        }
        let mut out = Vec::with_capacity(self.len() + other.len());
        for c in &self.components {
            let mut c = c.clone();
            c.scale_weight(1.0 - p);
            out.push(c);
        }
        for c in &other.components {
            let mut c = c.clone();
            c.scale_weight(p);
            out.push(c);
        }
        Ok(Dist::from_components(out))
    }

    /// Distribution of `1/X`. Coarse where exactness is impossible: bins
    /// straddling zero collapse each half to an atom at the reciprocal of
    /// the half's midpoint; tails collapse to an atom at the reciprocal of
    /// their conditional mean. Mass sitting exactly at zero is dropped.
    pub fn reciprocal(&self) -> Dist {
        let mut out = Vec::with_capacity(self.len());
        for c in &self.components {
            match c {
                Component::Atom { x, p } => {
                    if *x != 0.0 {
                        out.push(Component::Atom { x: 1.0 / x, p: *p });
                    }
                }
                Component::Bin { a, b, p, shape, .. } => {
                    if *a > 0.0 || *b < 0.0 {
                        let (na, nb) = (1.0 / b, 1.0 / a);
                        out.push(Component::Bin {
                            a: na,
                            b: nb,
                            p: *p,
                            repr: (na + nb) / 2.0,
                            shape: *shape,
                        });
                    } else {
                        // Straddles zero: one atom per half at the
                        // mid-reciprocal.
                        let width = b - a;
                        if *a < 0.0 {
                            out.push(Component::Atom { x: 2.0 / a, p: p * (-a) / width });
                        }
                        if *b > 0.0 {
                            out.push(Component::Atom { x: 2.0 / b, p: p * b / width });
                        }
                    }
                }
                tail @ Component::Tail { mass, .. } => {
                    let m = tail.center();
                    if m != 0.0 {
                        out.push(Component::Atom { x: 1.0 / m, p: *mass });
                    }
                }
            }
        }
        Dist::from_components(out)
    }

    /// Elementwise power with a scalar exponent: atoms map through `powf`,
    /// bin endpoints map and re-sort, tails pass unchanged.
    pub fn power(&self, exponent: f64) -> Result<Dist> {
        let mut out = Vec::with_capacity(self.len());
        for c in &self.components {
            match c {
                Component::Atom { x, p } => {
                    let nx = x.powf(exponent);
                    if !nx.is_finite() {
                        return Err(Error::Argument(format!(
                            "power produced a non-finite value: {x}^{exponent}"
                        )));
                    }
                    out.push(Component::Atom { x: nx, p: *p });
                }
                Component::Bin { a, b, p, shape, .. } => {
                    let (pa, pb) = (a.powf(exponent), b.powf(exponent));
                    if !pa.is_finite() || !pb.is_finite() {
                        return Err(Error::Argument(format!(
                            "power produced a non-finite bin: [{a}, {b}]^{exponent}"
                        )));
                    }
                    let (na, nb) = if pa <= pb { (pa, pb) } else { (pb, pa) };
                    if na == nb {
                        out.push(Component::Atom { x: na, p: *p });
                    } else {
                        out.push(Component::Bin {
                            a: na,
                            b: nb,
                            p: *p,
                            repr: (na + nb) / 2.0,
                            shape: *shape,
                        });
                    }
                }
                tail @ Component::Tail { .. } => out.push(tail.clone()),
            }
        }
        Ok(Dist::from_components(out))
    }

    // -----------------------------------------------------------------------
    // Summaries
    // -----------------------------------------------------------------------

    /// Mean, conditional on total mass. Bins contribute their
    /// representative point (the midpoint for ordinary uniform bins, the
    /// merge centroid after reduction). Zero-mass distributions yield 0.
    pub fn mean(&self) -> f64 {
        let total = self.total_mass();
        if total <= 0.0 {
            return 0.0;
        }
        let sum: f64 = self.components.iter().map(|c| c.center() * c.weight()).sum();
        sum / total
    }

    /// Variance, conditional on total mass: between-component spread plus
    /// each component's internal variance (uniform bin `w²/12`, exponential
    /// tail `1/λ²`).
    pub fn variance(&self) -> f64 {
        let total = self.total_mass();
        if total <= 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let sum: f64 = self
            .components
            .iter()
            .map(|c| {
                let internal = match c {
                    Component::Atom { .. } => 0.0,
                    Component::Bin { a, b, .. } => (b - a) * (b - a) / 12.0,
                    tail @ Component::Tail { .. } => {
                        tail.lambda().map(|l| 1.0 / (l * l)).unwrap_or(0.0)
                    }
                };
                ((c.center() - mean).powi(2) + internal) * c.weight()
            })
            .sum();
        sum / total
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `P(X > x)`, conditional on total mass. Bins contribute a linear
    /// overlap fraction; exponential tails contribute their closed form.
    pub fn prob_gt(&self, x: f64) -> f64 {
        let total = self.total_mass();
        if total <= 0.0 {
            return 0.0;
        }
        let mut prob = 0.0;
        for c in &self.components {
            match c {
                Component::Atom { x: ax, p } => {
                    if *ax > x {
                        prob += p;
                    }
                }
                Component::Bin { a, b, p, .. } => {
                    if *a > x {
                        prob += p;
                    } else if *b > x {
                        prob += p * (b - x) / (b - a);
                    }
                }
                tail @ Component::Tail { side, x0, mass, .. } => {
                    let Some(lambda) = tail.lambda() else {
                        if *x0 > x {
                            prob += mass;
                        }
                        continue;
                    };
                    match side {
                        TailSide::Right => {
                            if x < *x0 {
                                prob += mass;
                            } else {
                                prob += mass * (-(x - x0) * lambda).exp();
                            }
                        }
                        TailSide::Left => {
                            if x < *x0 {
                                prob += mass * (1.0 - (-(x0 - x) * lambda).exp());
                            }
                        }
                    }
                }
            }
        }
        prob / total
    }

    /// Quantile at `q ∈ [0, 1]`: walk the ordered components accumulating
    /// mass, interpolating linearly inside a uniform bin and inverting the
    /// CDF analytically inside an exponential tail.
    pub fn quantile(&self, q: f64) -> f64 {
        let total = self.total_mass();
        if total <= 0.0 || self.components.is_empty() {
            return 0.0;
        }
        let target = q.clamp(0.0, 1.0) * total;
        let mut cumulative = 0.0;
        for c in &self.components {
            let w = c.weight();
            if w <= 0.0 {
                continue;
            }
            if cumulative + w >= target {
                let need = target - cumulative;
                return match c {
                    Component::Atom { x, .. } => *x,
                    Component::Bin { a, b, .. } => a + (need / w) * (b - a),
                    tail @ Component::Tail { side, x0, .. } => match tail.lambda() {
                        Some(lambda) => match side {
                            // Mass below x inside a left tail: w·e^{−λ(x0−x)}.
                            TailSide::Left => x0 + (need / w).max(f64::MIN_POSITIVE).ln() / lambda,
                            // Mass below x inside a right tail: w·(1−e^{−λ(x−x0)}).
                            TailSide::Right => {
                                let frac = (1.0 - need / w).max(f64::MIN_POSITIVE);
                                x0 - frac.ln() / lambda
                            }
                        },
                        None => *x0,
                    },
                };
            }
            cumulative += w;
        }
        // Numerical slack pushed the target past the last component.
        self.components.last().map(|c| c.end()).unwrap_or(0.0)
    }

    /// Median (quantile 0.5).
    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }

    // -----------------------------------------------------------------------
    // Sampling
    // -----------------------------------------------------------------------

    /// Draw `n` values with a deterministic seed (Vose alias table, O(1)
    /// per draw).
    pub fn sample_n(&self, n: usize, seed: u64) -> Vec<f64> {
        let table = AliasTable::new(self.components.clone());
        if table.is_empty() {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| table.sample(&mut rng)).collect()
    }

    /// Empirical distribution of `n` draws: one atom of mass `1/n` per
    /// sample.
    pub fn resample(&self, n: usize, seed: u64) -> Result<Dist> {
        if n == 0 {
            return Err(Error::Argument("resample requires n > 0".into()));
        }
        if self.is_empty() {
            return Ok(Dist::empty());
        }
        let p = 1.0 / n as f64;
        let components =
            self.sample_n(n, seed).into_iter().map(|x| Component::Atom { x, p }).collect();
        Ok(Dist::from_components(components))
    }

    // -----------------------------------------------------------------------
    // Order statistics / partitioning
    // -----------------------------------------------------------------------

    /// Distribution of the maximum of `n` i.i.d. copies, via pointwise CDF
    /// exponentiation over a fixed-resolution grid spanning the finite
    /// support (atoms and bins).
    pub fn max_of(&self, n: usize) -> Result<Dist> {
        if n == 0 {
            return Err(Error::Argument("max_of requires n >= 1".into()));
        }
        if self.is_empty() || n == 1 {
            return Ok(self.clone());
        }
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for c in &self.components {
            if !c.is_tail() {
                lo = lo.min(c.start());
                hi = hi.max(c.end());
            }
        }
        if !lo.is_finite() || !hi.is_finite() {
            // Tail-only support: nothing to discretize over.
            return Ok(self.clone());
        }
        if lo == hi {
            return Dist::constant(lo);
        }

        let step = (hi - lo) / MAX_OF_RESOLUTION as f64;
        let power = n as f64;
        let mut prev_cdf = (1.0 - self.prob_gt(lo)).powf(power);
        let mut components = Vec::with_capacity(MAX_OF_RESOLUTION);
        for i in 1..=MAX_OF_RESOLUTION {
            let x = lo + i as f64 * step;
            let cdf = (1.0 - self.prob_gt(x)).powf(power);
            let mass = cdf - prev_cdf;
            if mass > 0.0 {
                components.push(Component::uniform_bin(x - step, x, mass)?);
            }
            prev_cdf = cdf;
        }
        if components.is_empty() {
            return Dist::constant(hi);
        }
        Ok(Dist::from_components(components).normalized())
    }

    /// Partition into the `≤ x` part and the `> x` part. Bins split
    /// proportionally by width; exponential tails split by their closed
    /// form (the unbounded side re-anchors at the cut by memorylessness).
    /// Masses are preserved, not renormalized.
    pub fn split_at(&self, x: f64) -> (Dist, Dist) {
        let mut below = Vec::new();
        let mut above = Vec::new();
        for c in &self.components {
            match c {
                Component::Atom { x: ax, .. } => {
                    if *ax <= x {
                        below.push(c.clone());
                    } else {
                        above.push(c.clone());
                    }
                }
                Component::Bin { a, b, p, shape, .. } => {
                    if *b <= x {
                        below.push(c.clone());
                    } else if *a > x {
                        above.push(c.clone());
                    } else {
                        let width = b - a;
                        let left_frac = (x - a) / width;
                        let left_p = p * left_frac;
                        if x > *a && left_p > 0.0 {
                            below.push(Component::Bin {
                                a: *a,
                                b: x,
                                p: left_p,
                                repr: (a + x) / 2.0,
                                shape: *shape,
                            });
                        }
                        let right_p = p - left_p;
                        if x < *b && right_p > 0.0 {
                            above.push(Component::Bin {
                                a: x,
                                b: *b,
                                p: right_p,
                                repr: (x + b) / 2.0,
                                shape: *shape,
                            });
                        }
                    }
                }
                tail @ Component::Tail { side, x0, mass, family, params, cap } => {
                    let Some(lambda) = tail.lambda() else {
                        // Pass-through families are indivisible; route by
                        // anchor.
                        if *x0 <= x {
                            below.push(c.clone());
                        } else {
                            above.push(c.clone());
                        }
                        continue;
                    };
                    match side {
                        TailSide::Right => {
                            if *x0 > x {
                                above.push(c.clone());
                            } else {
                                let d = x - x0;
                                let surviving = mass * (-lambda * d).exp();
                                let cut = mass - surviving;
                                if cut > 0.0 && d > 0.0 {
                                    below.push(Component::Bin {
                                        a: *x0,
                                        b: x,
                                        p: cut,
                                        repr: truncated_exp_mean(*x0, x, lambda, TailSide::Right),
                                        shape: BinShape::Uniform,
                                    });
                                }
                                if surviving > 0.0 {
                                    above.push(Component::Tail {
                                        side: TailSide::Right,
                                        x0: x,
                                        mass: surviving,
                                        family: *family,
                                        params: params.clone(),
                                        cap: *cap,
                                    });
                                }
                            }
                        }
                        TailSide::Left => {
                            if *x0 <= x {
                                below.push(c.clone());
                            } else {
                                let d = x0 - x;
                                let surviving = mass * (-lambda * d).exp();
                                let cut = mass - surviving;
                                if surviving > 0.0 {
                                    below.push(Component::Tail {
                                        side: TailSide::Left,
                                        x0: x,
                                        mass: surviving,
                                        family: *family,
                                        params: params.clone(),
                                        cap: *cap,
                                    });
                                }
                                if cut > 0.0 && d > 0.0 {
                                    above.push(Component::Bin {
                                        a: x,
                                        b: *x0,
                                        p: cut,
                                        repr: truncated_exp_mean(x, *x0, lambda, TailSide::Left),
                                        shape: BinShape::Uniform,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        (Dist::from_components(below), Dist::from_components(above))
    }
}

/// Conditional mean of an exponential tail truncated to `[a, b]`, clamped
/// into the interval. `side` names the tail the segment was cut from.
fn truncated_exp_mean(a: f64, b: f64, lambda: f64, side: TailSide) -> f64 {
    let d = b - a;
    let denom = 1.0 - (-lambda * d).exp();
    if denom <= 0.0 {
        return (a + b) / 2.0;
    }
    let offset = 1.0 / lambda - d * (-lambda * d).exp() / denom;
    let mean = match side {
        TailSide::Right => a + offset,
        TailSide::Left => b - offset,
    };
    mean.clamp(a, b)
}
