//! Mixture components: atoms, bins, and parametric tails.
//!
//! A distribution is an ordered mixture of these three component kinds.
//! The set is closed under pairwise convolution: atom⊕atom is exact,
//! atom⊕bin is an exact shift, bin⊕bin is approximated by a
//! variance-matched uniform, and anything involving a tail is dropped
//! (documented mass loss).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Interior shape of a bin. Only `Uniform` carries arithmetic semantics;
/// the other shapes are preserved pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinShape {
    Uniform,
    Linear,
    Custom,
}

/// Which half-line a tail covers relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailSide {
    /// Covers `(-inf, x0]`.
    Left,
    /// Covers `[x0, +inf)`.
    Right,
}

/// Parametric decay family of a tail. Only `Exp` participates in
/// arithmetic; the rest are accepted pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailFamily {
    Exp,
    Geom,
    Pareto,
    Lognormal,
}

/// One component of a distribution mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Component {
    /// Point mass of probability `p` at `x`.
    Atom { x: f64, p: f64 },
    /// Mass `p` spread over `[a, b]` with representative point `repr`.
    Bin { a: f64, b: f64, p: f64, repr: f64, shape: BinShape },
    /// Semi-infinite parametric mass anchored at `x0`.
    Tail {
        side: TailSide,
        x0: f64,
        mass: f64,
        family: TailFamily,
        params: BTreeMap<String, f64>,
        cap: Option<f64>,
    },
}

impl Component {
    /// Validated atom constructor.
    pub fn atom(x: f64, p: f64) -> Result<Self> {
        if !x.is_finite() {
            return Err(Error::Argument(format!("atom position must be finite, got {x}")));
        }
        if !p.is_finite() || p < 0.0 {
            return Err(Error::Argument(format!("probability must be finite and >= 0, got {p}")));
        }
        Ok(Component::Atom { x, p })
    }

    /// Validated uniform-bin constructor with the default centered repr.
    pub fn uniform_bin(a: f64, b: f64, p: f64) -> Result<Self> {
        if !a.is_finite() || !b.is_finite() {
            return Err(Error::Argument(format!("bin edges must be finite, got [{a}, {b}]")));
        }
        if a >= b {
            return Err(Error::Argument(format!("bin requires a < b, got [{a}, {b}]")));
        }
        if !p.is_finite() || p < 0.0 {
            return Err(Error::Argument(format!("probability must be finite and >= 0, got {p}")));
        }
        Ok(Component::Bin { a, b, p, repr: (a + b) / 2.0, shape: BinShape::Uniform })
    }

    /// Validated exponential-tail constructor.
    pub fn exp_tail(side: TailSide, x0: f64, mass: f64, lambda: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(Error::Argument(format!("lambda must be finite and > 0, got {lambda}")));
        }
        if !mass.is_finite() || mass < 0.0 {
            return Err(Error::Argument(format!("mass must be finite and >= 0, got {mass}")));
        }
        let mut params = BTreeMap::new();
        params.insert("lambda".to_string(), lambda);
        Ok(Component::Tail { side, x0, mass, family: TailFamily::Exp, params, cap: None })
    }

    /// Probability mass carried by this component.
    #[inline]
    pub fn weight(&self) -> f64 {
        match self {
            Component::Atom { p, .. } => *p,
            Component::Bin { p, .. } => *p,
            Component::Tail { mass, .. } => *mass,
        }
    }

    /// Multiply this component's mass by `factor`, leaving position intact.
    #[inline]
    pub fn scale_weight(&mut self, factor: f64) {
        match self {
            Component::Atom { p, .. } => *p *= factor,
            Component::Bin { p, .. } => *p *= factor,
            Component::Tail { mass, .. } => *mass *= factor,
        }
    }

    /// Position key used to order components within a distribution.
    /// A left tail sorts as `-inf`; an atom at its `x`; a bin at its `a`;
    /// a right tail at its `x0`.
    #[inline]
    pub fn sort_key(&self) -> f64 {
        match self {
            Component::Atom { x, .. } => *x,
            Component::Bin { a, .. } => *a,
            Component::Tail { side: TailSide::Left, .. } => f64::NEG_INFINITY,
            Component::Tail { side: TailSide::Right, x0, .. } => *x0,
        }
    }

    /// Leftmost finite extent (`-inf` for a left tail).
    #[inline]
    pub fn start(&self) -> f64 {
        match self {
            Component::Atom { x, .. } => *x,
            Component::Bin { a, .. } => *a,
            Component::Tail { side: TailSide::Left, .. } => f64::NEG_INFINITY,
            Component::Tail { side: TailSide::Right, x0, .. } => *x0,
        }
    }

    /// Rightmost finite extent (`+inf` for a right tail).
    #[inline]
    pub fn end(&self) -> f64 {
        match self {
            Component::Atom { x, .. } => *x,
            Component::Bin { b, .. } => *b,
            Component::Tail { side: TailSide::Left, x0, .. } => *x0,
            Component::Tail { side: TailSide::Right, .. } => f64::INFINITY,
        }
    }

    /// Representative point: atom position, bin repr, tail conditional mean
    /// (exponential) or anchor (other families).
    #[inline]
    pub fn center(&self) -> f64 {
        match self {
            Component::Atom { x, .. } => *x,
            Component::Bin { repr, .. } => *repr,
            Component::Tail { side, x0, .. } => match self.lambda() {
                Some(l) => match side {
                    TailSide::Right => x0 + 1.0 / l,
                    TailSide::Left => x0 - 1.0 / l,
                },
                None => *x0,
            },
        }
    }

    /// Decay rate for exponential tails, `None` otherwise.
    #[inline]
    pub fn lambda(&self) -> Option<f64> {
        match self {
            Component::Tail { family: TailFamily::Exp, params, .. } => {
                params.get("lambda").copied()
            }
            _ => None,
        }
    }

    #[inline]
    pub fn is_tail(&self) -> bool {
        matches!(self, Component::Tail { .. })
    }

    /// Translate the component by `dx`.
    pub fn shift(&self, dx: f64) -> Component {
        match self {
            Component::Atom { x, p } => Component::Atom { x: x + dx, p: *p },
            Component::Bin { a, b, p, repr, shape } => Component::Bin {
                a: a + dx,
                b: b + dx,
                p: *p,
                repr: repr + dx,
                shape: *shape,
            },
            Component::Tail { side, x0, mass, family, params, cap } => Component::Tail {
                side: *side,
                x0: x0 + dx,
                mass: *mass,
                family: *family,
                params: params.clone(),
                cap: cap.map(|c| c + dx),
            },
        }
    }

    /// Scale the component's position by `k`. Bins keep well-ordered edges;
    /// tails are left positionally unchanged (documented approximation).
    pub fn scale_value(&self, k: f64) -> Component {
        match self {
            Component::Atom { x, p } => Component::Atom { x: x * k, p: *p },
            Component::Bin { a, b, p, repr, shape } => {
                let (na, nb) = if k >= 0.0 { (a * k, b * k) } else { (b * k, a * k) };
                Component::Bin { a: na, b: nb, p: *p, repr: repr * k, shape: *shape }
            }
            tail @ Component::Tail { .. } => tail.clone(),
        }
    }

    /// Pairwise convolution: the component of `X + Y` when `X` is drawn from
    /// `self` and `Y` from `other`, with mass `w(self) * w(other)`.
    ///
    /// `None` means the pair involved a tail and was dropped.
    pub fn convolve(&self, other: &Component) -> Option<Component> {
        match (self, other) {
            (Component::Atom { x: x1, p: p1 }, Component::Atom { x: x2, p: p2 }) => {
                Some(Component::Atom { x: x1 + x2, p: p1 * p2 })
            }
            (Component::Atom { x, p }, bin @ Component::Bin { .. })
            | (bin @ Component::Bin { .. }, Component::Atom { x, p }) => {
                let mut shifted = bin.shift(*x);
                shifted.scale_weight(*p);
                Some(shifted)
            }
            (
                Component::Bin { a: a1, b: b1, p: p1, .. },
                Component::Bin { a: a2, b: b2, p: p2, .. },
            ) => {
                // Uniform-of-uniforms is exactly triangular; approximate by a
                // uniform matching the first two moments.
                let v1 = (b1 - a1) * (b1 - a1) / 12.0;
                let v2 = (b2 - a2) * (b2 - a2) / 12.0;
                let width = (12.0 * (v1 + v2)).sqrt();
                let center = (a1 + b1) / 2.0 + (a2 + b2) / 2.0;
                Some(Component::Bin {
                    a: center - width / 2.0,
                    b: center + width / 2.0,
                    p: p1 * p2,
                    repr: center,
                    shape: BinShape::Uniform,
                })
            }
            _ => None,
        }
    }
}
