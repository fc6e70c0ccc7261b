//! Sheet lifecycle: edges, recomputation order, cycles, errors,
//! persistence.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use ds_core::component::Component;
use ds_formula::as_scalar;
use ds_graph::{CellStatus, Sheet, SheetConfig};

#[tokio::test]
async fn plain_number_becomes_atom() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "10").await;
    let cell = sheet.get_cell("A1");
    assert_eq!(cell.status, CellStatus::Ok);
    assert_relative_eq!(as_scalar(&cell.value).unwrap(), 10.0);
}

#[tokio::test]
async fn dependent_updates_on_upstream_change() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "10").await;
    sheet.set_input("A2", "=A1 * 2").await;
    assert_relative_eq!(as_scalar(&sheet.get_cell("A2").value).unwrap(), 20.0);

    sheet.set_input("A1", "50").await;
    let cell = sheet.get_cell("A2");
    assert_eq!(cell.status, CellStatus::Ok);
    assert_relative_eq!(as_scalar(&cell.value).unwrap(), 100.0);
}

#[tokio::test]
async fn chain_recomputes_in_topological_order() {
    let mut sheet = Sheet::new();
    sheet.set_input("C3", "1").await;
    sheet.set_input("C2", "=C3 + 1").await;
    sheet.set_input("C1", "=C2 + 1").await;
    assert_relative_eq!(as_scalar(&sheet.get_cell("C1").value).unwrap(), 3.0);

    sheet.set_input("C3", "10").await;
    assert_eq!(sheet.get_cell("C2").status, CellStatus::Ok);
    assert_eq!(sheet.get_cell("C1").status, CellStatus::Ok);
    assert_relative_eq!(as_scalar(&sheet.get_cell("C2").value).unwrap(), 11.0);
    assert_relative_eq!(as_scalar(&sheet.get_cell("C1").value).unwrap(), 12.0);
}

#[tokio::test]
async fn cycle_marks_both_cells_circular() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "=A2").await;
    sheet.set_input("A2", "=A1").await;
    assert_eq!(sheet.get_cell("A1").status, CellStatus::Circular);
    assert_eq!(sheet.get_cell("A2").status, CellStatus::Circular);
}

#[tokio::test]
async fn breaking_a_cycle_recovers() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "=A2").await;
    sheet.set_input("A2", "=A1").await;
    sheet.set_input("A1", "5").await;
    assert_eq!(sheet.get_cell("A1").status, CellStatus::Ok);
    assert_eq!(sheet.get_cell("A2").status, CellStatus::Ok);
    assert_relative_eq!(as_scalar(&sheet.get_cell("A2").value).unwrap(), 5.0);
}

#[tokio::test]
async fn error_keeps_previous_value_for_dependents() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "10").await;
    sheet.set_input("A2", "=A1 + 1").await;
    assert_relative_eq!(as_scalar(&sheet.get_cell("A2").value).unwrap(), 11.0);

    sheet.set_input("A1", "=NOSUCHFN(1)").await;
    let a1 = sheet.get_cell("A1");
    assert_eq!(a1.status, CellStatus::Error);
    assert!(a1.error.as_deref().unwrap_or_default().contains("Unknown function"));
    // Historical value survives; the dependent evaluates over it.
    assert_relative_eq!(as_scalar(&a1.value).unwrap(), 10.0);
    let a2 = sheet.get_cell("A2");
    assert_eq!(a2.status, CellStatus::Ok);
    assert_relative_eq!(as_scalar(&a2.value).unwrap(), 11.0);
}

#[tokio::test]
async fn garbage_number_is_error() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "10abc").await;
    assert_eq!(sheet.get_cell("A1").status, CellStatus::Error);
}

#[tokio::test]
async fn empty_input_is_empty_distribution() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "  ").await;
    let cell = sheet.get_cell("A1");
    assert_eq!(cell.status, CellStatus::Ok);
    assert!(cell.value.is_empty());
}

#[tokio::test]
async fn unchanged_input_is_a_noop() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "10").await;
    sheet.drain_dirty();
    sheet.set_input("A1", "10").await;
    assert!(sheet.drain_dirty().is_empty());
}

#[tokio::test]
async fn distribution_formula_flows_through_graph() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "=UNIFORM(0, 10)").await;
    sheet.set_input("A2", "=A1 + 5").await;
    let value = &sheet.get_cell("A2").value;
    match &value.components()[0] {
        Component::Bin { a, b, .. } => {
            assert_relative_eq!(*a, 5.0);
            assert_relative_eq!(*b, 15.0);
        }
        _ => panic!("expected bin"),
    }
}

#[tokio::test]
async fn listeners_notified_and_dirty_drains() {
    let mut sheet = Sheet::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    sheet.subscribe(move || {
        hits_clone.fetch_add(1, Ordering::Relaxed);
    });

    sheet.set_input("A1", "10").await;
    assert!(hits.load(Ordering::Relaxed) >= 1);

    let dirty = sheet.drain_dirty();
    assert!(dirty.iter().any(|c| c.id == "A1"));
    assert!(sheet.drain_dirty().is_empty());
}

#[tokio::test]
async fn dirty_set_grows_across_dependents() {
    let mut sheet = Sheet::new();
    sheet.set_input("A1", "1").await;
    sheet.set_input("A2", "=A1").await;
    sheet.set_input("A3", "=A2").await;
    sheet.drain_dirty();

    sheet.set_input("A1", "2").await;
    let dirty: Vec<String> = sheet.drain_dirty().into_iter().map(|c| c.id).collect();
    assert!(dirty.contains(&"A1".to_string()));
    assert!(dirty.contains(&"A2".to_string()));
    assert!(dirty.contains(&"A3".to_string()));
}

#[tokio::test]
async fn config_limit_applies_to_formulas() {
    let mut sheet = Sheet::new();
    sheet.set_global_config(SheetConfig { max_components: 25 });
    sheet.set_input("A1", "=ADD(NORMAL(0, 1), NORMAL(5, 2))").await;
    let cell = sheet.get_cell("A1");
    assert_eq!(cell.status, CellStatus::Ok);
    assert!(cell.value.len() <= 25, "got {} components", cell.value.len());
}

#[tokio::test]
async fn get_cell_creates_on_first_access() {
    let mut sheet = Sheet::new();
    let cell = sheet.get_cell("Z9");
    assert_eq!(cell.status, CellStatus::Ok);
    assert!(cell.value.is_empty());
    assert_eq!(sheet.iterate_cells().len(), 1);
}

#[tokio::test]
async fn round_trip_persistence() {
    let mut sheet = Sheet::new();
    sheet.set_global_config(SheetConfig { max_components: 64 });
    sheet.set_input("A1", "10").await;
    sheet.set_input("A2", "=A1 * 2").await;
    sheet.set_input("B1", "=NORMAL(0, 1)").await;
    sheet.set_input("B2", "").await;

    let json = sheet.to_json().unwrap();
    let mut restored = Sheet::new();
    restored.from_json(&json).await.unwrap();

    assert_eq!(restored.config().max_components, 64);
    for id in ["A1", "A2", "B1"] {
        let a = sheet.get_cell(id);
        let b = restored.get_cell(id);
        assert_eq!(a.input, b.input, "input mismatch for {id}");
        assert_eq!(a.value, b.value, "value mismatch for {id}");
        assert_eq!(b.status, CellStatus::Ok);
    }
    // Empty inputs are not persisted.
    assert!(!json.contains("B2"));
}

#[tokio::test]
async fn from_json_rejects_wrong_version() {
    let mut sheet = Sheet::new();
    let err = sheet
        .from_json(r#"{"version": 2, "config": {"maxComponents": 200}, "cells": {}}"#)
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn dist_kernels_match_pure_path() {
    let mut plain = Sheet::new();
    plain.set_input("A1", "=ADD(UNIFORM(0, 10), CONST(5))").await;

    let mut accelerated = Sheet::new();
    accelerated.set_dist_kernels(Arc::new(ds_compute::CpuKernels::new()));
    accelerated.set_input("A1", "=ADD(UNIFORM(0, 10), CONST(5))").await;

    assert_eq!(plain.get_cell("A1").value, accelerated.get_cell("A1").value);
}

#[tokio::test]
async fn ruin_prob_uses_plugged_kernel() {
    let mut sheet = Sheet::new();
    sheet.set_ruin_kernel(Arc::new(ds_compute::CpuKernels::new()));
    sheet
        .set_input("A1", "=RUIN_PROB(DISCRETE(0-1, 0.5, 1.5, 0.5), CONST(3), 400)")
        .await;
    let cell = sheet.get_cell("A1");
    assert_eq!(cell.status, CellStatus::Ok);
    let p = as_scalar(&cell.value).unwrap();
    assert!((0.0..=1.0).contains(&p));
}
