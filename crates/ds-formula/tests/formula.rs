//! End-to-end formula evaluation against a map-backed context.

use std::collections::HashMap;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ds_core::component::Component;
use ds_core::dist::Dist;
use ds_core::error::Error;
use ds_formula::{EmptyContext, EvalContext, as_scalar, evaluate};

#[derive(Default)]
struct MapContext {
    cells: HashMap<String, Dist>,
    limit: Option<usize>,
}

impl MapContext {
    fn with(cells: &[(&str, Dist)]) -> Self {
        Self {
            cells: cells.iter().map(|(id, d)| (id.to_string(), d.clone())).collect(),
            limit: None,
        }
    }
}

impl EvalContext for MapContext {
    fn resolve(&self, id: &str) -> Dist {
        self.cells.get(id).cloned().unwrap_or_else(Dist::empty)
    }

    fn component_limit(&self) -> Option<usize> {
        self.limit
    }
}

#[test]
fn mix_scenario() {
    let d = evaluate("MIX(0.1, CONST(0), CONST(100))", &EmptyContext).unwrap();
    assert_eq!(d.len(), 2);
    match d.components() {
        [Component::Atom { x: x0, p: p0 }, Component::Atom { x: x1, p: p1 }] => {
            assert_relative_eq!(*x0, 0.0);
            assert_abs_diff_eq!(*p0, 0.1, epsilon = 1e-9);
            assert_relative_eq!(*x1, 100.0);
            assert_abs_diff_eq!(*p1, 0.9, epsilon = 1e-9);
        }
        _ => panic!("expected two atoms"),
    }
}

#[test]
fn geom_sum_plus_one_mean() {
    // GEOM_SUM starts at zero copies (the k = 0 term is the point mass
    // at 0 with weight 1−p), so the mean here is 1 + 1500·p/(1−p)
    // ≈ 6395.7, slightly trimmed by the 0.9999 emission stop. The
    // alternative start-at-one-copy convention would give
    // 1 + 1500/(1−p) ≈ 7895.7 instead; DESIGN.md ("Geometric-sum
    // indexing") records why zero-copy is the convention implemented —
    // callers wanting the other one write ADD(D, GEOM_SUM(D, p)).
    let d = evaluate("ADD(CONST(1), GEOM_SUM(CONST(1500), 0.81))", &EmptyContext).unwrap();
    let mean = d.normalized().mean();
    assert!((6300.0..=6450.0).contains(&mean), "mean {mean}");
}

#[test]
fn uniform_plus_scalar() {
    let d = evaluate("UNIFORM(0, 10) + 5", &EmptyContext).unwrap();
    assert_eq!(d.len(), 1);
    match &d.components()[0] {
        Component::Bin { a, b, p, .. } => {
            assert_relative_eq!(*a, 5.0);
            assert_relative_eq!(*b, 15.0);
            assert_relative_eq!(*p, 1.0);
        }
        _ => panic!("expected bin"),
    }
}

#[test]
fn prob_gt_scenario() {
    let d = evaluate("PROB_GT(UNIFORM(0, 10), 8)", &EmptyContext).unwrap();
    assert_relative_eq!(as_scalar(&d).unwrap(), 0.2, epsilon = 1e-9);
}

#[test]
fn discrete_over_range() {
    let ctx = MapContext::with(&[
        ("A1", Dist::constant(10.0).unwrap()),
        ("B1", Dist::constant(0.5).unwrap()),
        ("A2", Dist::constant(20.0).unwrap()),
        ("B2", Dist::constant(0.5).unwrap()),
    ]);
    let d = evaluate("DISCRETE(A1:B2)", &ctx).unwrap();
    assert_eq!(d.len(), 2);
    let pairs: Vec<(f64, f64)> = d
        .components()
        .iter()
        .map(|c| match c {
            Component::Atom { x, p } => (*x, *p),
            _ => panic!("expected atoms"),
        })
        .collect();
    assert_eq!(pairs, vec![(10.0, 0.5), (20.0, 0.5)]);
}

#[test]
fn geom_sum_of_unit_constant() {
    let d = evaluate("GEOM_SUM(CONST(1), 0.5)", &EmptyContext).unwrap();
    let comps = d.components();
    assert_relative_eq!(comps[0].weight(), 0.5, epsilon = 1e-12);
    assert_relative_eq!(comps[1].weight(), 0.25, epsilon = 1e-12);
    assert_relative_eq!(comps[2].weight(), 0.125, epsilon = 1e-12);
}

#[test]
fn config_scopes_resample() {
    let d = evaluate("CONFIG(50, RESAMPLE(UNIFORM(0, 1), 20))", &EmptyContext).unwrap();
    assert_eq!(d.len(), 20);
}

#[test]
fn config_reduces_inside_scope() {
    // 20 samples against a local limit of 10: the safety check fires.
    let d = evaluate("CONFIG(10, RESAMPLE(UNIFORM(0, 1), 20))", &EmptyContext).unwrap();
    assert!(d.len() <= 10);
}

#[test]
fn config_restores_limit_after_scope() {
    // The outer RESAMPLE runs under the default limit again, not 10.
    let d = evaluate(
        "ADD(CONFIG(10, RESAMPLE(UNIFORM(0, 1), 20)), RESAMPLE(UNIFORM(0, 1), 50))",
        &EmptyContext,
    )
    .unwrap();
    assert!(d.len() <= 200);
    assert!(d.len() > 10);
}

#[test]
fn context_limit_bounds_arithmetic() {
    let mut ctx = MapContext::default();
    ctx.limit = Some(30);
    let d = evaluate("ADD(NORMAL(0, 1), NORMAL(5, 2))", &ctx).unwrap();
    assert!(d.len() <= 30, "got {} components", d.len());
}

#[test]
fn cell_reference_arithmetic() {
    let ctx = MapContext::with(&[("A1", Dist::constant(10.0).unwrap())]);
    let d = evaluate("A1 * 2", &ctx).unwrap();
    assert_relative_eq!(as_scalar(&d).unwrap(), 20.0);
}

#[test]
fn function_names_case_insensitive() {
    let d = evaluate("mean(uniform(0, 10))", &EmptyContext).unwrap();
    assert_relative_eq!(as_scalar(&d).unwrap(), 5.0);
}

#[test]
fn choice_normalizes() {
    let d = evaluate("CHOICE(1, 2, 3, 6)", &EmptyContext).unwrap();
    assert_abs_diff_eq!(d.total_mass(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(d.components()[0].weight(), 0.25, epsilon = 1e-12);
}

#[test]
fn discrete_keeps_raw_weights() {
    let d = evaluate("DISCRETE(1, 2, 3, 6)", &EmptyContext).unwrap();
    assert_relative_eq!(d.total_mass(), 8.0, epsilon = 1e-12);
}

#[test]
fn scalar_division_of_dist() {
    let d = evaluate("UNIFORM(2, 4) / 2", &EmptyContext).unwrap();
    match &d.components()[0] {
        Component::Bin { a, b, .. } => {
            assert_relative_eq!(*a, 1.0);
            assert_relative_eq!(*b, 2.0);
        }
        _ => panic!("expected bin"),
    }
}

#[test]
fn scalar_over_dist_uses_reciprocal() {
    let d = evaluate("DIV(1, UNIFORM(2, 4))", &EmptyContext).unwrap();
    match &d.components()[0] {
        Component::Bin { a, b, .. } => {
            assert_relative_eq!(*a, 0.25);
            assert_relative_eq!(*b, 0.5);
        }
        _ => panic!("expected bin"),
    }
}

#[test]
fn max_of_uniform() {
    let d = evaluate("MAX_OF(UNIFORM(0, 1), 5)", &EmptyContext).unwrap();
    assert_abs_diff_eq!(d.mean(), 5.0 / 6.0, epsilon = 0.01);
}

#[test]
fn repeat_add_dice() {
    let d = evaluate(
        "REPEAT_ADD(DISCRETE(1, 1, 2, 1, 3, 1, 4, 1, 5, 1, 6, 1), 10)",
        &EmptyContext,
    )
    .unwrap();
    assert_relative_eq!(d.normalized().mean(), 35.0, epsilon = 1e-6);
}

#[test]
fn ruin_prob_returns_scalar() {
    let d = evaluate(
        "RUIN_PROB(DISCRETE(0-1, 0.5, 1, 0.5), CONST(1), 2)",
        &EmptyContext,
    )
    .unwrap();
    assert_relative_eq!(as_scalar(&d).unwrap(), 0.5, epsilon = 1e-9);
}

#[test]
fn reduce_function_explicit() {
    let d = evaluate("REDUCE(RESAMPLE(NORMAL(0, 1), 100), 10)", &EmptyContext).unwrap();
    assert!(d.len() <= 12, "got {} components", d.len());
}

#[test]
fn unknown_function_error() {
    assert!(matches!(
        evaluate("FROBNICATE(1)", &EmptyContext),
        Err(Error::UnknownFunction(_))
    ));
}

#[test]
fn arity_error() {
    assert!(matches!(evaluate("UNIFORM(1)", &EmptyContext), Err(Error::Arity(_))));
    assert!(matches!(evaluate("CONST(1, 2)", &EmptyContext), Err(Error::Arity(_))));
}

#[test]
fn scalar_required_error() {
    assert!(matches!(
        evaluate("CONST(UNIFORM(0, 1))", &EmptyContext),
        Err(Error::Argument(_))
    ));
}

#[test]
fn invalid_domain_errors() {
    assert!(evaluate("NORMAL(0, 0)", &EmptyContext).is_err());
    assert!(evaluate("UNIFORM(5, 5)", &EmptyContext).is_err());
    assert!(evaluate("MIX(1.5, CONST(0), CONST(1))", &EmptyContext).is_err());
    assert!(evaluate("BINOMIAL(100000, 0.5)", &EmptyContext).is_err());
}

#[test]
fn binomial_within_config_limit() {
    // CONFIG can raise the cap enough to admit a large binomial.
    let d = evaluate("CONFIG(1000, BINOMIAL(500, 0.5))", &EmptyContext).unwrap();
    assert_relative_eq!(d.mean(), 250.0, epsilon = 1e-6);
}

#[test]
fn ref_is_identity() {
    let ctx = MapContext::with(&[("A1", Dist::uniform(0.0, 1.0).unwrap())]);
    let d = evaluate("REF(A1)", &ctx).unwrap();
    assert_eq!(d, ctx.resolve("A1"));
}

#[test]
fn empty_cell_propagates() {
    let d = evaluate("ADD(Q99, UNIFORM(0, 1))", &EmptyContext).unwrap();
    assert!(d.is_empty());
}

#[test]
fn power_on_atoms() {
    let d = evaluate("POWER(DISCRETE(2, 1, 3, 1), 2)", &EmptyContext).unwrap();
    let xs: Vec<f64> = d
        .components()
        .iter()
        .map(|c| match c {
            Component::Atom { x, .. } => *x,
            _ => panic!("expected atoms"),
        })
        .collect();
    assert_eq!(xs, vec![4.0, 9.0]);
}
