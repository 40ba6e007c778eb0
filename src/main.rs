use anyhow::{Context, Result};
use authstack::{config::Config, construct::App, stack, telemetry, StackProps};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "authstack",
    about = "Declare the identity-backed example API stack and synthesize its template"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write <stack>.template.json and <stack>.assets.json
    Synth {
        /// Output directory (overrides AUTHSTACK_OUTDIR)
        #[arg(long)]
        outdir: Option<PathBuf>,
    },
    /// Print the stack outputs as JSON
    Outputs,
    /// List configuration hazards found while assembling the stack
    Lint,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    telemetry::init(&config.telemetry);

    let props = StackProps {
        env: config.environment(),
        description: None,
    };
    let mut app = App::new();
    let outputs = stack::define_with_assets(&mut app, &config.stack_name, props, &config.asset_dir)
        .with_context(|| format!("Failed to define stack '{}'", config.stack_name))?;

    match cli.command {
        Commands::Synth { outdir } => {
            let outdir = outdir.unwrap_or_else(|| config.outdir.clone());
            let written = app.synth(&outdir)?;
            for path in &written {
                println!("{}", path.display());
            }
            info!(files = written.len(), "Synthesis complete");
        }
        Commands::Outputs => {
            println!("{}", serde_json::to_string_pretty(&outputs)?);
        }
        Commands::Lint => {
            let warnings = app
                .stack(&config.stack_name)
                .map(|s| s.warnings().to_vec())
                .unwrap_or_default();
            if warnings.is_empty() {
                println!("No hazards found");
            }
            for warning in &warnings {
                println!("[WARNING] {}: {}", warning.path, warning.message);
            }
        }
    }
    Ok(())
}
