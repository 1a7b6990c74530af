// tests/engine.rs
//
// The loop against scripted collaborators: one-period duopoly p = 100 - Q,
// cost 10. Baseline hands out 45 each, best responses are (90 - rivals) / 2,
// finalization echoes the pinned sales. Individual solves can be scripted to
// fail.

use std::cell::Cell;

use cournot_balance::{
    BestResponse, EngineState, EquilibriumError, EquilibriumOptions, IterationHistory,
    IterationSummary, ModelBuilder, Observer, Phase, SalesVector, SolveOutcome, SolvedModel,
    Solver, StrategicModel, StrategyState, SupplierId, SupplierUpdate, TerminationKind,
    run_cournot,
};

/* ──────────────────────────────────────────────────────────────────────────
Scripted collaborators
────────────────────────────────────────────────────────────────────────── */

#[derive(Clone, Debug, Default)]
struct MockModel {
    pinned: Vec<(SupplierId, SalesVector)>,
    all_pinned: bool,
    objective: Option<(SupplierId, String)>,
}

impl MockModel {
    fn pinned_value(&self, id: &str) -> Option<f64> {
        self.pinned
            .iter()
            .find(|(s, _)| s.as_str() == id)
            .map(|(_, q)| q[0])
    }
}

impl StrategicModel for MockModel {
    fn fix_competitors_sales(&mut self, state: &StrategyState, excluding: &SupplierId) {
        self.pinned = state
            .iter()
            .filter(|(id, _)| *id != excluding)
            .map(|(id, q)| (id.clone(), q.clone()))
            .collect();
    }

    fn fix_all_strategic_sales(&mut self, state: &StrategyState) {
        self.pinned = state.iter().map(|(id, q)| (id.clone(), q.clone())).collect();
        self.all_pinned = true;
    }

    fn define_strategic_objective(mut self, supplier: &SupplierId, co2_label: &str) -> Self {
        self.objective = Some((supplier.clone(), co2_label.to_owned()));
        self
    }
}

struct MockBuilder {
    suppliers: Vec<&'static str>,
    builds: Cell<usize>,
}

impl MockBuilder {
    fn new(suppliers: &[&'static str]) -> Self {
        Self {
            suppliers: suppliers.to_vec(),
            builds: Cell::new(0),
        }
    }
}

impl ModelBuilder for MockBuilder {
    type Config = ();
    type Model = MockModel;

    fn strategic_suppliers(&self, _config: &()) -> Vec<SupplierId> {
        self.suppliers.iter().copied().map(SupplierId::from).collect()
    }

    fn build_model(&self, _config: &()) -> MockModel {
        self.builds.set(self.builds.get() + 1);
        MockModel::default()
    }
}

#[derive(Clone, Debug)]
struct MockSolution {
    sales: Vec<(SupplierId, SalesVector)>,
}

impl SolvedModel for MockSolution {
    fn extract_sales_for_supplier(&self, supplier: &SupplierId) -> Option<SalesVector> {
        self.sales.iter().find(|(id, _)| id == supplier).map(|(_, q)| q.clone())
    }
}

type Respond = Box<dyn FnMut(usize, &MockModel) -> Option<SolveOutcome<MockSolution>>>;

/// Records every model it is given. `script` may override the duopoly answer
/// for any call by returning `Some`.
struct Script {
    suppliers: Vec<&'static str>,
    calls: Vec<MockModel>,
    script: Respond,
}

impl Script {
    fn new(suppliers: &[&'static str]) -> Self {
        Self::with(suppliers, |_, _| None)
    }

    fn with<F>(suppliers: &[&'static str], f: F) -> Self
    where
        F: FnMut(usize, &MockModel) -> Option<SolveOutcome<MockSolution>> + 'static,
    {
        Self {
            suppliers: suppliers.to_vec(),
            calls: Vec::new(),
            script: Box::new(f),
        }
    }

    fn duopoly(&self, model: &MockModel) -> MockSolution {
        let sales = match &model.objective {
            Some((me, _)) => {
                let rivals: f64 = model
                    .pinned
                    .iter()
                    .filter(|(id, _)| id != me)
                    .map(|(_, q)| q[0])
                    .sum();
                vec![(me.clone(), SalesVector::new(vec![((90.0 - rivals) / 2.0).max(0.0)]))]
            }
            None if model.all_pinned => model.pinned.clone(),
            None => self
                .suppliers
                .iter()
                .map(|s| (SupplierId::from(*s), SalesVector::new(vec![45.0])))
                .collect(),
        };
        MockSolution { sales }
    }
}

impl Solver<MockModel> for Script {
    type Solution = MockSolution;

    fn solve(&mut self, model: MockModel) -> SolveOutcome<MockSolution> {
        let call = self.calls.len();
        let scripted = (self.script)(call, &model);
        let outcome = scripted.unwrap_or_else(|| SolveOutcome::Optimal(self.duopoly(&model)));
        self.calls.push(model);
        outcome
    }
}

fn single(id: &str, values: Vec<f64>) -> SolveOutcome<MockSolution> {
    SolveOutcome::Optimal(MockSolution {
        sales: vec![(SupplierId::from(id), SalesVector::new(values))],
    })
}

fn opts() -> EquilibriumOptions {
    EquilibriumOptions::default().with_tol(1e-6).with_damping(0.5).with_max_iter(200)
}

/* ──────────────────────────────────────────────────────────────────────────
1) Phases, call counts, Gauss–Seidel visibility
────────────────────────────────────────────────────────────────────────── */

#[test]
fn converges_to_cournot_point_with_bounded_solves() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut solver = Script::new(&["A", "B"]);
    let eq = run_cournot(&builder, &(), &mut solver, opts(), &mut ()).expect("run succeeds");

    assert!(eq.is_converged());
    for id in ["A", "B"] {
        let q = eq.state().get(&SupplierId::from(id)).expect("present")[0];
        assert!((q - 30.0).abs() < 1e-4, "{id}: {q}");
    }

    let iters = eq.termination.iterations();
    assert_eq!(solver.calls.len(), 1 + 2 * iters + 1);
    assert_eq!(builder.builds.get(), solver.calls.len());
    assert_eq!(eq.history.len(), iters);
    assert!(eq.termination.max_change() < 1e-6);
}

#[test]
fn phases_reformulate_models_as_expected() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut solver = Script::new(&["A", "B"]);
    let opts = opts().with_co2_label("CO2e");
    run_cournot(&builder, &(), &mut solver, opts, &mut ()).expect("run succeeds");

    let first = &solver.calls[0];
    assert!(first.objective.is_none() && first.pinned.is_empty() && !first.all_pinned);

    let a = &solver.calls[1];
    assert_eq!(a.objective, Some((SupplierId::from("A"), "CO2e".to_owned())));
    assert_eq!(a.pinned.len(), 1);
    assert_eq!(a.pinned_value("B"), Some(45.0));
    assert_eq!(a.pinned_value("A"), None);

    let last = solver.calls.last().expect("finalization call");
    assert!(last.all_pinned && last.objective.is_none());
    assert_eq!(last.pinned.len(), 2);
}

#[test]
fn later_suppliers_see_updates_from_the_same_sweep() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut solver = Script::new(&["A", "B"]);
    run_cournot(&builder, &(), &mut solver, opts(), &mut ()).expect("run succeeds");

    // A: 0.5 * 22.5 + 0.5 * 45 = 33.75, already written when B solves.
    let b = &solver.calls[2];
    assert_eq!(b.objective.as_ref().map(|(s, _)| s.as_str()), Some("B"));
    assert_eq!(b.pinned_value("A"), Some(33.75));
}

#[test]
fn explicit_order_drives_processing() {
    let builder = MockBuilder::new(&["A", "B", "C"]);
    let mut solver = Script::new(&["A", "B", "C"]);
    let opts = opts().with_order(["C", "A", "B"]).with_max_iter(1);
    let engine = BestResponse::new(&builder, &(), &mut solver, opts).expect("valid");
    assert_eq!(engine.order(), ["C", "A", "B"].map(SupplierId::from).as_slice());
    assert_eq!(engine.suppliers(), ["A", "B", "C"].map(SupplierId::from).as_slice());
    let eq = engine.run(&mut ()).expect("run succeeds");

    let seen: Vec<_> = solver.calls[1..4]
        .iter()
        .map(|m| m.objective.as_ref().map(|(s, _)| s.as_str().to_owned()))
        .collect();
    assert_eq!(seen, ["C", "A", "B"].map(|s| Some(s.to_owned())));
    // State keeps configured order regardless of processing order.
    let ids: Vec<_> = eq.state().suppliers().map(SupplierId::as_str).collect();
    assert_eq!(ids, ["A", "B", "C"]);
}

/* ──────────────────────────────────────────────────────────────────────────
2) Budget exhaustion and engine lifecycle
────────────────────────────────────────────────────────────────────────── */

#[test]
fn exhausted_budget_is_reported_and_still_finalized() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut solver = Script::new(&["A", "B"]);
    let opts = opts().with_tol(1e-12).with_max_iter(2);
    let eq = run_cournot(&builder, &(), &mut solver, opts, &mut ()).expect("run succeeds");

    assert_eq!(eq.termination.kind(), TerminationKind::ExhaustedBudget);
    assert!(!eq.is_converged());
    assert_eq!(eq.termination.iterations(), 2);
    assert_eq!(eq.history.len(), 2);
    assert!(solver.calls.last().expect("finalization call").all_pinned);
    assert_eq!(eq.solution.sales.len(), 2);
}

#[test]
fn engine_state_follows_phases() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut engine = BestResponse::new(&builder, &(), Script::new(&["A", "B"]), opts()).expect("valid");
    assert_eq!(engine.engine_state(), EngineState::Initializing);

    let baseline = engine.initialize(&mut ()).expect("baseline");
    assert_eq!(baseline.state.get(&"A".into()).expect("A")[0], 45.0);

    let term = engine.iterate(baseline.state, &mut ()).expect("iterate");
    assert!(term.is_converged());
    assert_eq!(engine.engine_state(), EngineState::Converged);
    assert_eq!(engine.history().len(), term.iterations());

    let solution = engine.finalize(term.state()).expect("finalize");
    assert_eq!(solution.sales.len(), 2);
}

#[test]
fn sweep_at_fixed_point_changes_nothing() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut engine = BestResponse::new(&builder, &(), Script::new(&["A", "B"]), opts()).expect("valid");
    let mut state = StrategyState::from_entries([
        ("A".into(), SalesVector::new(vec![30.0])),
        ("B".into(), SalesVector::new(vec![30.0])),
    ])
    .expect("state");
    let before = state.clone();
    let summary = engine.sweep(&mut state, 1, &mut ()).expect("sweep");
    assert_eq!(summary.max_change, 0.0);
    assert_eq!(state, before);
}

/* ──────────────────────────────────────────────────────────────────────────
3) Observers
────────────────────────────────────────────────────────────────────────── */

#[derive(Default)]
struct Tally {
    baselines: usize,
    updates: Vec<(usize, String, f64)>,
    sweeps: Vec<IterationSummary>,
}

impl Observer for Tally {
    fn on_baseline(&mut self, state: &StrategyState) {
        assert_eq!(state.len(), 2);
        self.baselines += 1;
    }
    fn on_best_response(&mut self, update: &SupplierUpdate<'_>) {
        self.updates
            .push((update.iteration, update.supplier.to_string(), update.sales[0]));
    }
    fn on_iteration(&mut self, summary: &IterationSummary) {
        self.sweeps.push(*summary);
    }
}

#[test]
fn observers_see_every_update_in_order() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut tally = Tally::default();
    let eq = run_cournot(&builder, &(), Script::new(&["A", "B"]), opts(), &mut tally)
        .expect("run succeeds");

    assert_eq!(tally.baselines, 1);
    assert_eq!(tally.updates.len(), 2 * eq.termination.iterations());
    assert_eq!(tally.updates[0], (1, "A".to_owned(), 33.75));
    assert_eq!(tally.updates[1].1, "B");
    assert_eq!(tally.sweeps, eq.history);
}

#[test]
fn iteration_history_records_termination() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut history = IterationHistory::new();
    let eq = run_cournot(&builder, &(), Script::new(&["A", "B"]), opts(), &mut history)
        .expect("run succeeds");

    assert_eq!(history.summaries, eq.history);
    assert_eq!(
        history.termination,
        Some((TerminationKind::Converged, eq.termination.iterations()))
    );
    // First sweep: A moves 11.25, B moves (90 - 33.75) / 2 = 28.125 → 36.5625, i.e. 8.4375.
    assert!((history.summaries[0].max_change - 11.25).abs() < 1e-12);
    assert!((history.peak_change() - 11.25).abs() < 1e-12);
}

/* ──────────────────────────────────────────────────────────────────────────
4) Fatal errors carry their context
────────────────────────────────────────────────────────────────────────── */

#[test]
fn infeasible_baseline_stops_before_iteration() {
    let builder = MockBuilder::new(&["A", "B"]);
    let mut solver = Script::with(&["A", "B"], |call, _| (call == 0).then_some(SolveOutcome::Infeasible));
    let err = run_cournot(&builder, &(), &mut solver, opts(), &mut ()).unwrap_err();
    assert!(matches!(err, EquilibriumError::BaselineInfeasible));
    assert_eq!(err.phase(), Some(Phase::Baseline));
    assert_eq!(solver.calls.len(), 1);
}

#[test]
fn infeasible_subproblem_names_supplier_and_iteration() {
    let builder = MockBuilder::new(&["A", "B"]);
    // Calls: 0 baseline, 1-2 sweep 1, 3-4 sweep 2.
    let mut solver = Script::with(&["A", "B"], |call, _| (call == 4).then_some(SolveOutcome::Infeasible));
    let err = run_cournot(&builder, &(), &mut solver, opts(), &mut ()).unwrap_err();
    match &err {
        EquilibriumError::SubproblemInfeasible { supplier, iteration } => {
            assert_eq!(supplier.as_str(), "B");
            assert_eq!(*iteration, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.phase(), Some(Phase::Iteration));
    assert_eq!(solver.calls.len(), 5);
}

#[test]
fn solver_error_during_iteration_carries_context() {
    let builder = MockBuilder::new(&["A", "B"]);
    let solver = Script::with(&["A", "B"], |call, _| {
        (call == 3).then(|| SolveOutcome::SolverError("license expired".to_owned()))
    });
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Iteration));
    assert_eq!(err.supplier().map(SupplierId::as_str), Some("A"));
    assert_eq!(err.iteration(), Some(2));
    let msg = err.to_string();
    assert!(msg.contains("license expired"), "{msg}");
    assert!(msg.contains("iteration 2"), "{msg}");
}

#[test]
fn finalization_failures_are_fatal() {
    let builder = MockBuilder::new(&["A", "B"]);
    let solver = Script::with(&["A", "B"], |_, m| m.all_pinned.then_some(SolveOutcome::Infeasible));
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert!(matches!(err, EquilibriumError::FinalizationInfeasible));

    let solver = Script::with(&["A", "B"], |_, m| {
        m.all_pinned.then(|| SolveOutcome::SolverError("numerical trouble".to_owned()))
    });
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Finalization));
    assert!(err.supplier().is_none());
    assert!(err.iteration().is_none());
}

#[test]
fn non_finite_best_response_is_never_written() {
    let builder = MockBuilder::new(&["A", "B"]);
    let solver = Script::with(&["A", "B"], |call, _| (call == 3).then(|| single("A", vec![f64::NAN])));
    let mut engine = BestResponse::new(&builder, &(), solver, opts()).expect("valid");
    let mut state = engine.initialize(&mut ()).expect("baseline").state;

    engine.sweep(&mut state, 1, &mut ()).expect("first sweep is clean");
    let after_first = state.clone();

    let err = engine.sweep(&mut state, 2, &mut ()).unwrap_err();
    match err {
        EquilibriumError::NonFiniteUpdate { supplier, iteration, index, value } => {
            assert_eq!(supplier.as_str(), "A");
            assert_eq!(iteration, 2);
            assert_eq!(index, 0);
            assert!(value.is_nan());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(state, after_first);
}

#[test]
fn infinite_best_response_aborts_the_run() {
    let builder = MockBuilder::new(&["A", "B"]);
    let solver = Script::with(&["A", "B"], |call, _| (call == 2).then(|| single("B", vec![f64::INFINITY])));
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert!(matches!(err, EquilibriumError::NonFiniteUpdate { iteration: 1, .. }));
    assert_eq!(err.supplier().map(SupplierId::as_str), Some("B"));
}

#[test]
fn non_finite_baseline_is_rejected() {
    let builder = MockBuilder::new(&["A", "B"]);
    let solver = Script::with(&["A", "B"], |call, _| {
        (call == 0).then(|| {
            SolveOutcome::Optimal(MockSolution {
                sales: vec![
                    ("A".into(), SalesVector::new(vec![45.0])),
                    ("B".into(), SalesVector::new(vec![f64::NEG_INFINITY])),
                ],
            })
        })
    });
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert!(matches!(err, EquilibriumError::NonFiniteBaseline { index: 0, .. }));
    assert_eq!(err.phase(), Some(Phase::Baseline));
}

#[test]
fn missing_and_misshapen_sales_are_errors() {
    let builder = MockBuilder::new(&["A", "B"]);
    let solver = Script::with(&["A", "B"], |call, _| (call == 1).then(|| single("B", vec![1.0])));
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert!(matches!(err, EquilibriumError::MissingSales { .. }));
    assert_eq!(err.supplier().map(SupplierId::as_str), Some("A"));
    assert_eq!(err.iteration(), Some(1));

    let solver = Script::with(&["A", "B"], |call, _| (call == 1).then(|| single("A", vec![1.0, 2.0])));
    let err = run_cournot(&builder, &(), solver, opts(), &mut ()).unwrap_err();
    assert!(matches!(
        err,
        EquilibriumError::DimensionMismatch { expected: 1, found: 2, .. }
    ));
}

/* ──────────────────────────────────────────────────────────────────────────
5) Options and order validation happen before any solve
────────────────────────────────────────────────────────────────────────── */

#[test]
fn invalid_options_are_rejected_up_front() {
    let builder = MockBuilder::new(&["A", "B"]);
    for bad in [
        opts().with_damping(0.0),
        opts().with_damping(1.5),
        opts().with_tol(0.0),
        opts().with_tol(f64::NAN),
        opts().with_max_iter(0),
    ] {
        let mut solver = Script::new(&["A", "B"]);
        let err = run_cournot(&builder, &(), &mut solver, bad, &mut ()).unwrap_err();
        assert!(matches!(err, EquilibriumError::InvalidOptions(_)), "{err}");
        assert!(solver.calls.is_empty());
    }
}

#[test]
fn damping_of_one_is_allowed() {
    let builder = MockBuilder::new(&["A", "B"]);
    let eq = run_cournot(&builder, &(), Script::new(&["A", "B"]), opts().with_damping(1.0), &mut ())
        .expect("run succeeds");
    assert!(eq.is_converged());
}

#[test]
fn bad_orders_and_strategic_sets_are_rejected() {
    let builder = MockBuilder::new(&["A", "B"]);
    for order in [vec!["A"], vec!["A", "A"], vec!["A", "Z"], vec!["A", "B", "C"]] {
        let err = BestResponse::new(&builder, &(), Script::new(&["A", "B"]), opts().with_order(order))
            .err()
            .expect("order rejected");
        assert!(matches!(err, EquilibriumError::InvalidOrder(_)), "{err}");
    }

    let empty = MockBuilder::new(&[]);
    let err = BestResponse::new(&empty, &(), Script::new(&[]), opts()).err().expect("rejected");
    assert!(matches!(err, EquilibriumError::NoStrategicSuppliers));

    let dup = MockBuilder::new(&["A", "A"]);
    let err = BestResponse::new(&dup, &(), Script::new(&["A", "A"]), opts()).err().expect("rejected");
    assert!(matches!(err, EquilibriumError::DuplicateSupplier(_)));
}
