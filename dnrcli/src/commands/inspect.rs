//! Printing the topology of the initial settings.
use super::*;

impl Inspect {
    pub fn run(self) {
        let file = read_problem(&self.path);
        let (_problem, mut start) = match file.prepare() {
            Ok(x) => x,
            Err(err) => fatal_error!(1, "Error while parsing problem: {}", err),
        };
        let summary = match TopologySummary::new(&mut start) {
            Ok(x) => x,
            Err(err) => fatal_error!(1, "Cannot build the topology: {}", err),
        };

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
            "{:18}{} ({} providers, {} transformers)",
            "Buses:".bold(),
            summary.buses,
            summary.providers,
            summary.transformers
        );
        println!(
            "{:18}{} ({} switchable)",
            "Lines:".bold(),
            summary.lines,
            summary.switchable_lines
        );
        for period in &summary.periods {
            let status = if period.radial {
                "radial".green()
            } else {
                "not radial".red()
            };
            println!("{} {}", format!("Period {}:", period.period).bold(), status);
            println!("{:>18}{}", "Open lines: ", join_names(&period.open_lines));
            if !period.cycle_bridges.is_empty() {
                println!("{:>18}{}", "Cycle bridges: ", join_names(&period.cycle_bridges));
            }
            if !period.disconnected_buses.is_empty() {
                println!(
                    "{:>18}{}",
                    "Disconnected: ",
                    join_names(&period.disconnected_buses)
                );
            }
            if !period.invalid_transformers.is_empty() {
                println!(
                    "{:>18}{}",
                    "Bad transformers: ",
                    join_names(&period.invalid_transformers)
                );
            }
        }
    }
}
