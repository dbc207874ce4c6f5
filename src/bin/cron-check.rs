use clap::Parser;
use colored::*;
use pattaya_api::cron_check::{check_dir, Check, CronReport, Verdict};
use std::{path::PathBuf, process};

#[derive(Parser)]
#[command(
    name = "cron-check",
    version = env!("CARGO_PKG_VERSION"),
    about = "Verify the scheduled-task configuration matches the expected layout"
)]
struct Cli {
    /// Directory holding server.toml and cron-tasks.toml
    #[arg(long, default_value = "config", env = "CRON_CONFIG_DIR")]
    config_dir: PathBuf,

    /// Timezone every job is expected to declare
    #[arg(long, default_value = "Asia/Bangkok")]
    timezone: String,

    /// Exit non-zero when the compliance score is below this percentage
    #[arg(long, default_value_t = 0)]
    min_score: u32,

    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

fn mark(passed: bool) -> ColoredString {
    if passed {
        "✓".green()
    } else {
        "✗".red()
    }
}

fn print_checks(title: &str, checks: &[Check]) {
    println!("\n{}", title.bold());
    for check in checks {
        println!("  {} {}", mark(check.passed), check.name);
    }
}

fn print_report(report: &CronReport) {
    println!("{}", "Verifying scheduled-task configuration...".bold());

    print_checks("Server configuration", &report.server);
    print_checks("Task file format", &report.format);

    println!("\n{}", "Jobs".bold());
    println!("  Found {} named jobs:", report.jobs.len());
    for job in &report.jobs {
        println!("    - {}", job);
    }

    println!("\n{}", "Rules".bold());
    for rule in &report.rules {
        println!("  {} \"{}\"", mark(rule.valid), rule.rule);
    }

    print_checks("Compliance", &report.compliance);
    print_checks("Best practices", &report.best_practices);

    let summary = format!(
        "Compliance score: {}% ({}/{})",
        report.score(),
        report.passed(),
        report.total()
    );
    println!("\n{}", summary.bold());

    match report.verdict() {
        Verdict::Excellent => println!("{}", "Configuration is fully compliant".green()),
        Verdict::Good => println!("{}", "Good; minor improvements could be made".yellow()),
        Verdict::NeedsUpdates => println!("{}", "Configuration needs updates".red()),
    }
}

fn main() {
    let cli = Cli::parse();

    let report = match check_dir(&cli.config_dir, &cli.timezone) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(2);
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                process::exit(2);
            }
        }
    } else {
        print_report(&report);
    }

    if report.score() < cli.min_score {
        process::exit(1);
    }
}
