//! The reactive sheet: cell table, dependency edges, and incremental
//! topological recomputation.
//!
//! Recalculation is a logically sequential task. On input change it takes
//! the reachable-dependents closure, evaluates it in topological order,
//! and yields to the runtime every [`YIELD_BATCH`] evaluations so an
//! embedding UI stays responsive; listeners fire at every yield point and
//! once at the end. Cells left with unresolved in-degree when the queue
//! drains participated in a cycle.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ds_core::dist::Dist;
use ds_core::error::Error;
use ds_core::traits::{DistKernels, RuinKernel};
use ds_core::DEFAULT_MAX_COMPONENTS;
use ds_formula::EvalContext;

use crate::cell::{Cell, CellSnapshot, CellStatus, extract_refs};

/// Evaluations between cooperative yields.
const YIELD_BATCH: usize = 5;

/// Sheet-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfig {
    /// Cap on stored distribution size; the reducer enforces it after any
    /// expanding operation.
    pub max_components: usize,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self { max_components: DEFAULT_MAX_COMPONENTS }
    }
}

type Listener = Box<dyn Fn() + Send + Sync>;

/// A reactive grid of distribution-valued cells.
#[derive(Default)]
pub struct Sheet {
    pub(crate) cells: BTreeMap<String, Cell>,
    pub(crate) config: SheetConfig,
    dirty: BTreeSet<String>,
    listeners: Vec<Listener>,
    dist_kernels: Option<Arc<dyn DistKernels>>,
    ruin_kernel: Option<Arc<dyn RuinKernel>>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug accelerated bulk kernels for formula arithmetic.
    pub fn set_dist_kernels(&mut self, kernels: Arc<dyn DistKernels>) {
        self.dist_kernels = Some(kernels);
    }

    /// Plug an accelerated Monte Carlo backend for `RUIN_PROB`.
    pub fn set_ruin_kernel(&mut self, kernel: Arc<dyn RuinKernel>) {
        self.ruin_kernel = Some(kernel);
    }

    /// Update global configuration. Does not trigger recomputation.
    pub fn set_global_config(&mut self, config: SheetConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    /// Register a change listener, notified after every evaluation batch.
    pub fn subscribe<F: Fn() + Send + Sync + 'static>(&mut self, listener: F) {
        self.listeners.push(Box::new(listener));
    }

    /// Snapshot a cell, creating it on first access.
    pub fn get_cell(&mut self, id: &str) -> CellSnapshot {
        self.get_or_create(id).snapshot()
    }

    /// Snapshots of all cells in identifier order.
    pub fn iterate_cells(&self) -> Vec<CellSnapshot> {
        self.cells.values().map(Cell::snapshot).collect()
    }

    /// Snapshots of cells with pending observable changes; clears the
    /// dirty set.
    pub fn drain_dirty(&mut self) -> Vec<CellSnapshot> {
        let ids = std::mem::take(&mut self.dirty);
        ids.iter().filter_map(|id| self.cells.get(id).map(Cell::snapshot)).collect()
    }

    /// Set a cell's raw input and recompute its dependents. A no-op when
    /// the input is unchanged.
    pub async fn set_input(&mut self, id: &str, input: &str) {
        if self.get_or_create(id).input == input {
            return;
        }
        if let Some(cell) = self.cells.get_mut(id) {
            cell.input = input.to_string();
        }
        self.dirty.insert(id.to_string());
        self.refresh_edges(id, extract_refs(input));
        self.recalculate(id).await;
    }

    fn get_or_create(&mut self, id: &str) -> &mut Cell {
        self.cells.entry(id.to_string()).or_insert_with(|| Cell::new(id))
    }

    /// Replace the cell's dependency set, updating the reverse edges of
    /// cells it stopped or started referencing.
    fn refresh_edges(&mut self, id: &str, new_refs: BTreeSet<String>) {
        let old_refs =
            self.cells.get(id).map(|c| c.dependencies.clone()).unwrap_or_default();
        for stale in old_refs.difference(&new_refs) {
            if let Some(cell) = self.cells.get_mut(stale) {
                cell.dependents.remove(id);
            }
        }
        for fresh in new_refs.difference(&old_refs) {
            let owner = id.to_string();
            self.get_or_create(fresh).dependents.insert(owner);
        }
        if let Some(cell) = self.cells.get_mut(id) {
            cell.dependencies = new_refs;
        }
    }

    /// Evaluate the reachable-dependents closure of `start` in topological
    /// order, yielding cooperatively every few cells.
    async fn recalculate(&mut self, start: &str) {
        let closure = self.dependents_closure(start);
        tracing::debug!(start, cells = closure.len(), "recalculating");

        for id in &closure {
            if let Some(cell) = self.cells.get_mut(id)
                && cell.status != CellStatus::Circular
            {
                cell.status = CellStatus::Evaluating;
            }
        }
        self.dirty.extend(closure.iter().cloned());

        // Subgraph in-degree: how many of a cell's dependencies also await
        // evaluation in this closure. Cells outside the closure already
        // hold settled values.
        let mut in_degree: BTreeMap<String, usize> = closure
            .iter()
            .map(|id| {
                let n = self
                    .cells
                    .get(id)
                    .map(|c| c.dependencies.iter().filter(|d| closure.contains(*d)).count())
                    .unwrap_or(0);
                (id.clone(), n)
            })
            .collect();

        let mut ready: VecDeque<String> = in_degree
            .iter()
            .filter(|&(_, &n)| n == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut processed = 0usize;
        while let Some(id) = ready.pop_front() {
            self.evaluate_cell(&id);
            processed += 1;
            if processed % YIELD_BATCH == 0 {
                self.notify();
                tokio::task::yield_now().await;
            }
            let dependents: Vec<String> = self
                .cells
                .get(&id)
                .map(|c| c.dependents.iter().cloned().collect())
                .unwrap_or_default();
            for dep in dependents {
                if let Some(n) = in_degree.get_mut(&dep)
                    && *n > 0
                {
                    *n -= 1;
                    if *n == 0 {
                        ready.push_back(dep);
                    }
                }
            }
        }

        // Whatever still has incoming edges sat on a cycle.
        for (id, n) in in_degree {
            if n > 0 {
                tracing::warn!(cell = %id, "cycle detected");
                if let Some(cell) = self.cells.get_mut(&id) {
                    cell.status = CellStatus::Circular;
                }
                self.dirty.insert(id);
            }
        }

        self.notify();
    }

    /// Breadth-first closure over the dependents relation, including the
    /// starting cell.
    fn dependents_closure(&self, start: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !closure.insert(id.clone()) {
                continue;
            }
            if let Some(cell) = self.cells.get(&id) {
                for dep in &cell.dependents {
                    if !closure.contains(dep) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        closure
    }

    /// Evaluate one cell from its raw input: `=`-prefixed inputs are
    /// formulas, everything else is a strict number (empty → empty
    /// distribution). Failures keep the previous value as history.
    fn evaluate_cell(&mut self, id: &str) {
        let input = self.cells.get(id).map(|c| c.input.clone()).unwrap_or_default();
        let trimmed = input.trim();

        let result = if let Some(formula) = trimmed.strip_prefix('=') {
            let ctx = SheetContext { sheet: self };
            ds_formula::evaluate(formula, &ctx)
        } else if trimmed.is_empty() {
            Ok(Dist::empty())
        } else {
            match trimmed.parse::<f64>() {
                Ok(x) => Dist::constant(x),
                Err(_) => Err(Error::Parse(format!("not a number: '{trimmed}'"))),
            }
        };

        let cell = self.get_or_create(id);
        match result {
            Ok(value) => {
                cell.value = value;
                cell.status = CellStatus::Ok;
                cell.error = None;
            }
            Err(e) => {
                cell.status = CellStatus::Error;
                cell.error = Some(e.to_string());
            }
        }
        self.dirty.insert(id.to_string());
    }

    fn notify(&self) {
        for listener in &self.listeners {
            listener();
        }
    }
}

/// Formula resolution against the sheet. Reads the stored value whatever
/// the cell's status, so dependents of an errored cell see its previous
/// value (or the empty distribution).
struct SheetContext<'a> {
    sheet: &'a Sheet,
}

impl EvalContext for SheetContext<'_> {
    fn resolve(&self, id: &str) -> Dist {
        self.sheet.cells.get(id).map(|c| c.value.clone()).unwrap_or_else(Dist::empty)
    }

    fn component_limit(&self) -> Option<usize> {
        Some(self.sheet.config.max_components)
    }

    fn dist_kernels(&self) -> Option<&dyn DistKernels> {
        self.sheet.dist_kernels.as_deref()
    }

    fn ruin_kernel(&self) -> Option<&dyn RuinKernel> {
        self.sheet.ruin_kernel.as_deref()
    }
}
