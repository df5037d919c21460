use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use f1_warehouse::config::Config;
use f1_warehouse::error::PipelineError;
use f1_warehouse::logging;
use f1_warehouse::pipeline;

#[derive(Parser)]
#[command(name = "f1_warehouse")]
#[command(about = "Dimensional warehouse loader for Formula 1 race data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full load: extract, quality gate, build, store, verify
    Load,
    /// Re-run integrity checks against an existing warehouse
    Verify,
    /// Print per-table row counts of an existing warehouse
    Stats {
        /// Emit the counts as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    logging::init_logging();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            println!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Load => run_load(&config),
        Commands::Verify => run_verify(&config),
        Commands::Stats { json } => run_stats(&config, json),
    }
}

fn run_load(config: &Config) -> ExitCode {
    println!("🔄 Running warehouse load...");
    match pipeline::run_load(config) {
        Ok(summary) => {
            println!("\n📊 Warehouse row counts:");
            for (table, count) in summary.table_counts() {
                println!("   {table}: {count}");
            }
            if summary.warnings > 0 {
                println!("⚠️  {} integrity warning(s), see logs", summary.warnings);
            }
            println!("✅ Load complete: {}", summary.warehouse.display());
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(e),
    }
}

fn run_verify(config: &Config) -> ExitCode {
    println!("🔍 Verifying warehouse integrity...");
    match pipeline::run_verify(config) {
        Ok(report) => {
            for warning in &report.warnings {
                println!("⚠️  {warning}");
            }
            println!("✅ Integrity checks passed");
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(e),
    }
}

fn run_stats(config: &Config, json: bool) -> ExitCode {
    match pipeline::gather_stats(config) {
        Ok(counts) => {
            if json {
                let object: serde_json::Map<String, serde_json::Value> = counts
                    .into_iter()
                    .map(|(table, count)| (table, count.into()))
                    .collect();
                println!("{}", serde_json::Value::Object(object));
            } else {
                println!("📊 Warehouse row counts:");
                for (table, count) in counts {
                    println!("   {table}: {count}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(e),
    }
}

fn report_failure(e: PipelineError) -> ExitCode {
    error!("run failed: {}", e);
    match &e {
        PipelineError::Integrity(report) => {
            println!("❌ {e}");
            for violation in &report.violations {
                println!("   - {violation}");
            }
        }
        _ => println!("❌ {e}"),
    }
    ExitCode::FAILURE
}
