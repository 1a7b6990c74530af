// demos/co2_hub.rs
// Run with:
//   cargo run --example co2_hub
//
// Three CO2 suppliers over four seasons, one of them capacity-bound, against
// a fixed fringe of non-strategic supply. Results go to ./co2_hub_out.

use cournot_balance::market::linear::{
    ClosedFormSolver, LinearMarket, LinearMarketConfig, PeriodDemand, SupplierSpec,
};
use cournot_balance::report::{self, compare_prices, compare_sales};
use cournot_balance::{EquilibriumOptions, run_cournot};

fn main() {
    let seasons = [(140.0, 1.2, 5.0), (110.0, 1.0, 8.0), (90.0, 0.9, 8.0), (125.0, 1.1, 4.0)];
    let market = LinearMarketConfig::new(
        "CO2",
        seasons
            .iter()
            .map(|&(a, b, fringe)| PeriodDemand::new(a, b).with_non_strategic_supply(fringe))
            .collect(),
        vec![
            SupplierSpec::new("north_hub", 12.0).with_quadratic_cost(0.2),
            SupplierSpec::new("harbour", 18.0),
            SupplierSpec::new("inland", 9.0).with_capacity(25.0),
        ],
    );
    let options = EquilibriumOptions::default()
        .with_tol(1e-5)
        .with_max_iter(200)
        .with_order(["inland", "harbour", "north_hub"]);

    let eq = match run_cournot(&LinearMarket, &market, ClosedFormSolver::new(), options, &mut ()) {
        Ok(eq) => eq,
        Err(e) => {
            eprintln!("co2_hub failed in {:?}: {e}", e.phase());
            return;
        }
    };

    println!("== CO2 hub ==");
    println!("{:?} after {} sweeps", eq.termination.kind(), eq.termination.iterations());
    match compare_sales(&eq.baseline, eq.state()) {
        Ok(rows) => {
            for r in rows {
                println!(
                    "{:<10} season {} central {:>8.3} strategic {:>8.3} delta {:>+8.3}",
                    r.supplier.as_str(), r.index, r.central, r.strategic, r.delta
                );
            }
        }
        Err(e) => eprintln!("comparison failed: {e}"),
    }
    match compare_prices(&eq.baseline_solution.prices, &eq.solution.prices) {
        Ok(rows) => {
            for r in rows {
                println!(
                    "price  season {} central {:>8.3} strategic {:>8.3} delta {:>+8.3}",
                    r.period, r.central, r.strategic, r.delta
                );
            }
        }
        Err(e) => eprintln!("price comparison failed: {e}"),
    }
    for (id, profit) in &eq.solution.profits {
        println!("profit {id:<10} {profit:>10.2}");
    }

    if let Err(e) = report::export_results("co2_hub_out", &eq) {
        eprintln!("export failed: {e}");
    }
}
