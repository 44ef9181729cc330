//! flooding simulation across channel presets

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use ncflood_radio::{FloodingConfig, LossRate};
use ncflood_sim::{Scenario, SimulationPresets, SimulationReport};

const SEED: u64 = 0x5eed;

fn print_report(label: &str, report: &SimulationReport) {
    println!("  {}", label.bright_white().bold());
    println!(
        "    coverage {:>6.1}%   in time {:>6.1}%   coded {:>5.1}%   overhead {:>5.2}x",
        report.mean_coverage() * 100.0,
        report.in_time_ratio() * 100.0,
        report.coded_share() * 100.0,
        report.overhead()
    );
    println!(
        "    frames {}   deliveries {}   dropped {}   suppressed {}   loss estimate {:.3}",
        report.broadcasts,
        report.deliveries,
        report.channel_drops,
        report.totals.suppressed,
        report.mean_loss_estimate()
    );
}

fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "Rate-Decay Flooding Simulation".bright_blue().bold());
    println!("{}", "==============================".bright_blue());
    println!();

    let scenarios = vec![
        Scenario::grid(5, 5, 300.0),
        Scenario::random_area(40, 2_000.0, 2_000.0, SEED),
        Scenario::convoy(20, 120.0, 25.0).with_duration(Duration::from_secs(30)),
    ];
    let presets = SimulationPresets::all();

    let total = (scenarios.len() * presets.len() * 2) as u64;
    let progress = ProgressBar::new(total);
    progress.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?);

    let mut results = Vec::new();
    for scenario in &scenarios {
        for (preset, channel) in &presets {
            for loss_rate in [LossRate::Fixed(channel.loss_probability), LossRate::Auto] {
                progress.set_message(format!("{} / {}", scenario.name, preset));
                let flooding = FloodingConfig::default()
                    .with_range(channel.range)
                    .with_loss_rate(loss_rate);
                let mut sim = scenario.build(channel.clone(), flooding, SEED)?;
                sim.run_until(scenario.duration);
                results.push((scenario.name.clone(), *preset, loss_rate, sim.report()));
                progress.inc(1);
            }
        }
    }
    progress.finish_and_clear();

    let mut current = String::new();
    for (scenario, preset, loss_rate, report) in &results {
        if *scenario != current {
            println!("{}", format!("\n>>> {}", scenario).bright_green().bold());
            current = scenario.clone();
        }
        let mode = match loss_rate {
            LossRate::Fixed(p) => format!("fixed loss {:.2}", p),
            LossRate::Auto => "estimated loss".to_string(),
        };
        print_report(&format!("{} ({})", preset, mode), report);
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
