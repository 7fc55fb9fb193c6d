//! Running the optimization pipeline on a problem file.
use dnrlib::criteria::Evaluation;
use dnrlib::optimizer::{ConfigOptimizer, OptimizerConfig, OptimizerEvent};
use dnrlib::search::SearchKind;
use dnrlib::stop::StopSignal;
use std::time::Instant;

use super::*;

impl Optimize {
    /// Command line flags override the optimizer settings of the file.
    fn apply_overrides(&self, config: &mut OptimizerConfig) {
        if let Some(t) = self.time_limit {
            config.time_limit_secs = Some(t);
        }
        if let Some(i) = self.max_iterations {
            config.max_iterations = Some(i);
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if self.no_aggregate {
            config.aggregate = false;
        }
        if let Some(gap) = self.gap {
            config.gap_tolerance = gap;
        }
        if let Some(kicks) = self.kicks {
            let kick_size = match config.search {
                SearchKind::IteratedDescent { kick_size, .. } => kick_size,
                SearchKind::SteepestDescent => 3,
            };
            config.search = SearchKind::IteratedDescent { kicks, kick_size };
        }
        if let Some(cost) = self.switching_cost {
            config.switching_cost = cost;
        }
        if self.reuse_flows {
            config.reuse_disaggregated_flows = true;
        }
    }

    pub fn run(self) {
        let file = read_problem(&self.path);
        let mut config = file.optimizer_config();
        self.apply_overrides(&mut config);
        let (_problem, start) = match file.prepare() {
            Ok(x) => x,
            Err(err) => fatal_error!(1, "Error while parsing problem: {}", err),
        };

        let stop = StopSignal::new();
        {
            let stop = stop.clone();
            if let Err(e) = ctrlc::set_handler(move || stop.trigger("interrupted")) {
                log::warn!("Cannot install the Ctrl-C handler: {e}");
            }
        }

        let mut optimizer = ConfigOptimizer::new(config);
        if !self.json {
            let start_time = Instant::now();
            optimizer.add_listener(move |event| match event {
                OptimizerEvent::BestFullSolutionFound { evaluation, .. } => {
                    eprintln!(
                        "{:>10.3}s {} {}",
                        start_time.elapsed().as_secs_f64(),
                        "New best:".green().bold(),
                        describe(evaluation)
                    );
                }
                OptimizerEvent::SubOptimizerStarted { name } => {
                    log::info!("Starting {name}");
                }
                OptimizerEvent::LocalOptimumFound { evaluation, .. } => {
                    log::debug!("Local optimum: {}", describe(evaluation));
                }
            });
        }

        let start_time = Instant::now();
        let result = match optimizer.optimize(start, &stop) {
            Ok(r) => r,
            Err(err) => fatal_error!(1, "Optimization failed: {}", err),
        };
        let elapsed = start_time.elapsed().as_secs_f64();
        let report = OptimizationReport::new(file.name.clone(), &result);

        if self.json {
            print_json(&report);
        } else {
            print_report(&report, elapsed);
        }
        if report.best.is_none() {
            fatal_error!(2, "No solution was verified");
        }
    }
}

fn describe(evaluation: &Evaluation) -> String {
    if evaluation.is_feasible() {
        format!("objective {:.6}", evaluation.objective)
    } else {
        format!(
            "infeasible ({}), objective {:.6}",
            evaluation.infeasibility, evaluation.objective
        )
    }
}

fn print_report(report: &OptimizationReport, elapsed: f64) {
    println!(
        "{:18}{}",
        "Problem Name:".bold(),
        report.name.as_deref().unwrap_or("-")
    );
    println!("{:18}{:.3} s", "Total time:".bold(), elapsed);
    println!(
        "{:18}{}",
        "Stop reason:".bold(),
        report.stop_reason.as_deref().unwrap_or("search finished")
    );
    println!("{:18}{}", "Published:".bold(), report.published);
    println!(
        "{:18}{} pushed, {} dropped, {} coalesced",
        "Candidates:".bold(),
        report.queue.pushed,
        report.queue.dropped,
        report.queue.coalesced
    );

    let Some(best) = &report.best else {
        return;
    };
    let evaluation = &best.evaluation;
    if evaluation.is_feasible() {
        println!("{:18}{}", "Feasible:".bold(), "yes".green());
    } else {
        println!("{:18}{}", "Feasible:".bold(), "no".red());
        for violation in &evaluation.violations {
            println!(
                "{:>18}{} (degree {:.4}){}",
                "",
                violation.constraint.yellow(),
                violation.degree,
                violation
                    .reason
                    .as_deref()
                    .map(|r| format!(": {r}"))
                    .unwrap_or_default()
            );
        }
    }
    println!("{:18}{:.6}", "Objective:".bold(), evaluation.objective);
    println!("{:18}{}", "Switching ops:".bold(), best.switching_operations);
    println!("{}", "Open lines:".bold());
    for period in &best.periods {
        println!("{:>18}{}", format!("{}: ", period.period), join_names(&period.open_lines));
    }
}
