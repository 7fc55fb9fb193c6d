//! Printing aggregation statistics.
use dnrlib::aggregation::NetworkAggregation;
use std::sync::Arc;

use super::*;

impl Aggregate {
    pub fn run(self) {
        let file = read_problem(&self.path);
        let network = match file.network() {
            Ok(x) => Arc::new(x),
            Err(err) => fatal_error!(1, "Error while parsing problem: {}", err),
        };
        let aggregation = match NetworkAggregation::new(network) {
            Ok(x) => x,
            Err(err) => fatal_error!(1, "Cannot aggregate the network: {}", err),
        };
        let summary = AggregationSummary::new(&aggregation);

        if self.json {
            print_json(&summary);
            return;
        }

        println!(
            "{:18}{}",
            "Problem Name:".bold(),
            file.name.as_deref().unwrap_or("-")
        );
        println!(
            "{:18}{} -> {}",
            "Buses:".bold(),
            summary.original_buses,
            summary.aggregate_buses
        );
        println!(
            "{:18}{} -> {}",
            "Lines:".bold(),
            summary.original_lines,
            summary.aggregate_lines
        );
        println!("{:18}{}", "Dead ends:".bold(), summary.removed_dead_ends);
        println!(
            "{:18}{} ({} with parallel parts)",
            "Merged lines:".bold(),
            summary.merged_lines,
            summary.parallel_lines
        );
        println!("{:18}{}", "Switchable:".bold(), summary.switchable_lines);

        if self.verbose {
            let original = aggregation.original();
            let aggregate = aggregation.aggregate();
            for merged in aggregation.merged_lines() {
                let lines = merged.part.original_lines();
                if lines.len() < 2 {
                    continue;
                }
                let names: Vec<String> = lines
                    .into_iter()
                    .map(|l| original.line(l).name.clone())
                    .collect();
                println!(
                    "{:>18}{}",
                    format!("{}: ", aggregate.line(merged.line).name),
                    join_names(&names)
                );
            }
        }
    }
}
