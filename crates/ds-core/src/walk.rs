//! Random-walk operators: geometric sums, repeated convolution, and ruin
//! probability.
//!
//! These compose the component algebra, the reducer, and alias sampling:
//! every intermediate convolution is safety-reduced to the caller's
//! component limit (with the sign boundary pinned), so unbounded
//! expressions stay tractable.
//!
//! Randomized paths are deterministic via per-trial seeding
//! (`seed + trial_idx` hash-mix), independent of threading.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::alias::AliasTable;
use crate::dist::Dist;
use crate::error::{Error, Result};
use crate::flat::flatten;
use crate::reduce::{ReduceOpts, reduce};
use crate::traits::RuinKernel;

/// Cap on geometric-sum terms regardless of mass coverage.
const GEOM_SUM_MAX_TERMS: usize = 2000;

/// Emitted-mass threshold at which the geometric sum stops.
const GEOM_SUM_MASS_STOP: f64 = 0.9999;

/// Step count above which ruin probability switches to Monte Carlo.
pub const RUIN_EXACT_MAX_STEPS: usize = 300;

/// Survival mass below which the exact ruin iteration stops early.
const RUIN_SURVIVAL_FLOOR: f64 = 1e-9;

/// Counter-based trial RNG. Same `(seed, trial)` → same draw sequence.
///
/// Uses a fast hash-mix to decorrelate nearby `(seed, trial)` pairs.
#[inline]
pub fn trial_rng(seed: u64, trial: u64) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_mul(2654435761).wrapping_add(trial))
}

/// Safety check: reduce only when the component count exceeds the target,
/// so distributions already under the cap keep their exact masses.
fn checked(d: Dist, opts: &ReduceOpts) -> Dist {
    if d.len() > opts.target { reduce(&d, opts) } else { d }
}

/// Sum of a geometrically distributed number of i.i.d. copies of `d`:
/// `Σ_{k≥0} (1−p)·p^k · d^{*k}` with `d^{*0} = δ₀`.
///
/// Terms are emitted until the cumulative emitted mass exceeds 0.9999 or
/// the term cap is hit; the running convolution is safety-reduced after
/// every step.
pub fn geom_sum(d: &Dist, p: f64, limit: usize) -> Result<Dist> {
    if !(0.0..1.0).contains(&p) {
        return Err(Error::Argument(format!("geometric parameter must be in [0, 1), got {p}")));
    }
    let opts = ReduceOpts::safety(limit);
    let mut running = Dist::constant(0.0)?;
    let mut out = Vec::new();
    let mut emitted = 0.0;
    let mut weight = 1.0 - p;

    for _ in 0..GEOM_SUM_MAX_TERMS {
        for c in running.components() {
            let mut c = c.clone();
            c.scale_weight(weight);
            out.push(c);
        }
        emitted += weight;
        if emitted > GEOM_SUM_MASS_STOP {
            break;
        }
        weight *= p;
        running = checked(running.convolve(d), &opts);
        if running.is_empty() {
            // Convolving with an empty distribution stays empty; nothing
            // further to emit.
            break;
        }
    }

    Ok(checked(Dist::from_components(out), &opts))
}

/// Distribution of `n` i.i.d. copies of `d` summed, by binary
/// exponentiation over convolution. `n = 0` is the point mass at 0.
pub fn repeat_add(d: &Dist, n: usize, limit: usize) -> Result<Dist> {
    let opts = ReduceOpts::safety(limit);
    let mut result: Option<Dist> = None;
    let mut base = d.clone();
    let mut n = n;
    while n > 0 {
        if n & 1 == 1 {
            result = Some(match result {
                Some(acc) => checked(acc.convolve(&base), &opts),
                None => base.clone(),
            });
        }
        n >>= 1;
        if n > 0 {
            base = checked(base.convolve(&base), &opts);
        }
    }
    match result {
        Some(r) => Ok(r),
        None => Dist::constant(0.0),
    }
}

/// Probability that a random walk starting at `w0` with i.i.d. increments
/// from `step` hits ≤ 0 within `t` steps.
///
/// Exact split-at-zero iteration up to [`RUIN_EXACT_MAX_STEPS`]; seeded
/// Monte Carlo beyond, optionally delegated to an accelerated
/// [`RuinKernel`].
pub fn ruin_prob(
    step: &Dist,
    w0: f64,
    t: usize,
    limit: usize,
    kernel: Option<&dyn RuinKernel>,
    seed: u64,
) -> Result<f64> {
    if w0 <= 0.0 {
        return Ok(1.0);
    }
    if t == 0 || step.is_empty() {
        return Ok(0.0);
    }
    if t <= RUIN_EXACT_MAX_STEPS {
        ruin_exact(step, w0, t, limit)
    } else {
        let trials = ((1e7 / t as f64) as u32).clamp(1000, 10_000);
        match kernel {
            Some(k) => {
                let flat = flatten(step.components());
                Ok(k.ruin_count(&flat, w0, t as u32, trials, seed) as f64 / trials as f64)
            }
            None => Ok(ruin_monte_carlo(step, w0, t, trials, seed)),
        }
    }
}

fn ruin_exact(step: &Dist, w0: f64, t: usize, limit: usize) -> Result<f64> {
    let opts = ReduceOpts::safety(limit);
    let mut surviving = Dist::constant(w0)?;
    let mut survival = 1.0;
    let mut ruined = 0.0;

    for _ in 0..t {
        let next = checked(surviving.convolve(step), &opts);
        let (failed, alive) = next.split_at(0.0);
        let total = failed.total_mass() + alive.total_mass();
        if total <= 0.0 {
            break;
        }
        let failure_mass = failed.total_mass() / total;
        ruined += survival * failure_mass;
        survival *= 1.0 - failure_mass;
        if survival < RUIN_SURVIVAL_FLOOR {
            break;
        }
        surviving = alive.normalized();
    }
    Ok(ruined)
}

/// Reference Monte Carlo trial loop, sequential but per-trial seeded so
/// the parallel kernel can reproduce it bit-for-bit.
fn ruin_monte_carlo(step: &Dist, w0: f64, t: usize, trials: u32, seed: u64) -> f64 {
    let table = AliasTable::new(step.components().to_vec());
    let mut ruined = 0u32;
    for trial in 0..trials {
        let mut rng = trial_rng(seed, trial as u64);
        let mut wealth = w0;
        for _ in 0..t {
            wealth += table.sample(&mut rng);
            if wealth <= 0.0 {
                ruined += 1;
                break;
            }
        }
    }
    ruined as f64 / trials as f64
}
