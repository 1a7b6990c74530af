// demos/duopoly.rs
// Run with:
//   cargo run --example duopoly

use cournot_balance::market::linear::{
    ClosedFormSolver, LinearMarket, LinearMarketConfig, PeriodDemand, SupplierSpec,
};
use cournot_balance::{EquilibriumOptions, IterationHistory, SupplierId, run_cournot};

fn main() {
    // p = 100 - (qA + qB), flat cost 10: competitive 45/45, Cournot 30/30.
    let market = LinearMarketConfig::new(
        "CO2",
        vec![PeriodDemand::new(100.0, 1.0)],
        vec![SupplierSpec::new("A", 10.0), SupplierSpec::new("B", 10.0)],
    );
    let options = EquilibriumOptions::default().with_tol(1e-6).with_damping(0.5);

    let mut history = IterationHistory::new();
    let eq = match run_cournot(&LinearMarket, &market, ClosedFormSolver::new(), options, &mut history) {
        Ok(eq) => eq,
        Err(e) => {
            eprintln!("duopoly failed: {e}");
            return;
        }
    };

    println!("== Duopoly ==");
    println!("termination -> {:?} after {}", eq.termination.kind(), eq.termination.iterations());
    for s in &history.summaries {
        println!("  sweep {:>2}: max change {:.6}", s.iteration, s.max_change);
    }
    for id in ["A", "B"].map(SupplierId::from) {
        let base = eq.baseline.get(&id).map(|s| s[0]).unwrap_or_default();
        let strat = eq.state().get(&id).map(|s| s[0]).unwrap_or_default();
        println!("{id}: central {base:.3} -> strategic {strat:.3}");
    }
    println!("price -> {:?}", eq.solution.prices);
}
