//! Boundary-aware size reduction of a mixture to a target component count.
//!
//! Repeated convolution grows component counts multiplicatively; this
//! module compresses a distribution back below a cap while preserving mass
//! and the probability-weighted centroid. Components are ranked by an
//! importance metric (mass times distance from an impact center, plus a
//! width penalty for bins); the least important adjacent pairs merge first.
//!
//! Two constraints shape every merge:
//! - tails are never merged, and
//! - no merged bin may span a boundary point. Ruin analysis passes
//!   boundary 0 so the sign of wealth survives reduction intact.

use serde::{Deserialize, Serialize};

use crate::DEFAULT_MAX_COMPONENTS;
use crate::component::{BinShape, Component};
use crate::dist::Dist;

/// Reduction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceOpts {
    /// Target component count (≥ 1).
    pub target: usize,
    /// Impact center: components far from it are more important.
    pub center: f64,
    /// Weight of a bin's width in its importance.
    pub width_weight: f64,
    /// Valley threshold: consecutive runs of components below this
    /// importance merge eagerly before the greedy phase.
    pub valley: Option<f64>,
    /// Points no merged bin may span.
    pub boundaries: Vec<f64>,
}

impl Default for ReduceOpts {
    fn default() -> Self {
        Self {
            target: DEFAULT_MAX_COMPONENTS,
            center: 0.0,
            width_weight: 1.0,
            valley: None,
            boundaries: Vec::new(),
        }
    }
}

impl ReduceOpts {
    /// Options used by post-operation safety checks: reduce to `limit`
    /// around impact center 0 with the sign boundary pinned.
    pub fn safety(limit: usize) -> Self {
        Self { target: limit.max(1), boundaries: vec![0.0], ..Self::default() }
    }

    fn boundary_in_span(&self, start: f64, end: f64) -> bool {
        self.boundaries.iter().any(|&b| start <= b && b <= end)
    }
}

/// Importance of a component under the metric. Tails are infinitely
/// important (never merged).
pub fn importance(c: &Component, center: f64, width_weight: f64) -> f64 {
    match c {
        Component::Atom { x, p } => p * (x - center).abs(),
        Component::Bin { a, b, p, repr, .. } => {
            p * ((repr - center).abs() + width_weight * (b - a))
        }
        Component::Tail { .. } => f64::INFINITY,
    }
}

/// Reduce `dist` to at most `opts.target` components, boundaries
/// permitting. When every adjacent pair is blocked by a tail or a
/// boundary, the result legitimately stays above the target.
pub fn reduce(dist: &Dist, opts: &ReduceOpts) -> Dist {
    let mut working = dist.clone();
    working.normalize();
    let mut components = split_at_boundaries(working.into_components(), &opts.boundaries);
    components.sort_by(|x, y| x.sort_key().total_cmp(&y.sort_key()));

    if let Some(valley) = opts.valley {
        components = valley_merge(components, valley, opts);
    }

    if components.len() > 1000.max(4 * opts.target) {
        components = bucket_reduce(components, opts);
        components.sort_by(|x, y| x.sort_key().total_cmp(&y.sort_key()));
    }

    greedy_merge(&mut components, opts);
    Dist::from_components(components)
}

/// Split every bin whose interior strictly contains a boundary point,
/// proportionally by width.
fn split_at_boundaries(components: Vec<Component>, boundaries: &[f64]) -> Vec<Component> {
    if boundaries.is_empty() {
        return components;
    }
    let mut out = Vec::with_capacity(components.len());
    for c in components {
        match c {
            Component::Bin { a, b, p, shape, .. } => {
                let mut cuts: Vec<f64> =
                    boundaries.iter().copied().filter(|&x| a < x && x < b).collect();
                if cuts.is_empty() {
                    out.push(Component::Bin { a, b, p, repr: (a + b) / 2.0, shape });
                    continue;
                }
                cuts.sort_by(f64::total_cmp);
                cuts.dedup();
                let width = b - a;
                let mut lo = a;
                for hi in cuts.into_iter().chain(std::iter::once(b)) {
                    out.push(Component::Bin {
                        a: lo,
                        b: hi,
                        p: p * (hi - lo) / width,
                        repr: (lo + hi) / 2.0,
                        shape,
                    });
                    lo = hi;
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Merge `m ≥ 2` non-tail components into a uniform bin spanning them,
/// with total probability and probability-weighted repr. Degenerate spans
/// (all atoms at one point) collapse to an atom.
fn merge_components(parts: &[Component]) -> Component {
    debug_assert!(parts.iter().all(|c| !c.is_tail()));
    let mut start = f64::INFINITY;
    let mut end = f64::NEG_INFINITY;
    let mut mass = 0.0;
    let mut centroid = 0.0;
    for c in parts {
        start = start.min(c.start());
        end = end.max(c.end());
        mass += c.weight();
        centroid += c.center() * c.weight();
    }
    let repr = if mass > 0.0 { centroid / mass } else { (start + end) / 2.0 };
    if start == end {
        Component::Atom { x: start, p: mass }
    } else {
        Component::Bin { a: start, b: end, p: mass, repr, shape: BinShape::Uniform }
    }
}

/// Eagerly merge sorted runs of components whose importance sits below the
/// valley threshold. The buffer flushes when a tail or an important
/// component interrupts the run, or when extending it would span a
/// boundary.
fn valley_merge(components: Vec<Component>, valley: f64, opts: &ReduceOpts) -> Vec<Component> {
    fn flush(buf: &mut Vec<Component>, out: &mut Vec<Component>) {
        if buf.len() >= 2 {
            out.push(merge_components(buf));
            buf.clear();
        } else {
            out.append(buf);
        }
    }

    let mut out = Vec::with_capacity(components.len());
    let mut buf: Vec<Component> = Vec::new();
    let mut buf_start: f64 = 0.0;
    let mut buf_end: f64 = 0.0;

    for c in components {
        if c.is_tail() || importance(&c, opts.center, opts.width_weight) >= valley {
            flush(&mut buf, &mut out);
            out.push(c);
            continue;
        }
        if !buf.is_empty() {
            let span_end = buf_end.max(c.end());
            if opts.boundary_in_span(buf_start, span_end) {
                flush(&mut buf, &mut out);
            }
        }
        if buf.is_empty() {
            buf_start = c.start();
            buf_end = c.end();
        } else {
            buf_end = buf_end.max(c.end());
        }
        buf.push(c);
    }
    flush(&mut buf, &mut out);
    out
}

/// Coarse pre-reduction for very large mixtures: merge non-tail components
/// into `2 × target` equal-width buckets by center, then re-split at
/// boundaries.
fn bucket_reduce(components: Vec<Component>, opts: &ReduceOpts) -> Vec<Component> {
    let (tails, rest): (Vec<_>, Vec<_>) = components.into_iter().partition(Component::is_tail);
    if rest.is_empty() {
        return tails;
    }

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for c in &rest {
        lo = lo.min(c.center());
        hi = hi.max(c.center());
    }

    let merged: Vec<Component> = if lo == hi {
        vec![merge_components(&rest)]
    } else {
        let n_buckets = 2 * opts.target.max(1);
        let width = (hi - lo) / n_buckets as f64;
        let mut buckets: Vec<Vec<Component>> = vec![Vec::new(); n_buckets];
        for c in rest {
            let idx = (((c.center() - lo) / width) as usize).min(n_buckets - 1);
            buckets[idx].push(c);
        }
        buckets
            .into_iter()
            .filter(|b| !b.is_empty())
            .map(|mut b| if b.len() == 1 { b.remove(0) } else { merge_components(&b) })
            .collect()
    };

    let mut out = split_at_boundaries(merged, &opts.boundaries);
    out.extend(tails);
    out
}

/// Repeatedly merge the adjacent pair with minimum combined importance
/// until the target is met or every pair is blocked.
fn greedy_merge(components: &mut Vec<Component>, opts: &ReduceOpts) {
    while components.len() > opts.target {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..components.len() - 1 {
            let (left, right) = (&components[i], &components[i + 1]);
            if left.is_tail() || right.is_tail() {
                continue;
            }
            if opts.boundary_in_span(left.start(), right.end()) {
                continue;
            }
            let cost = importance(left, opts.center, opts.width_weight)
                + importance(right, opts.center, opts.width_weight);
            if best.is_none_or(|(_, c)| cost < c) {
                best = Some((i, cost));
            }
        }
        let Some((i, _)) = best else {
            // Every pair blocked by a tail or boundary; stop above target.
            break;
        };
        let merged = merge_components(&components[i..=i + 1]);
        components[i] = merged;
        components.remove(i + 1);
    }
}
