use stressprobe::classifier::MarkerBank;
use stressprobe::protocol::{control_probe, generate_probes, Protocol, TemplateBanks};
use stressprobe::runner::Runner;
use stressprobe::target::{OpenAITarget, Target};
use stressprobe::SuiteConfig;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dotenv::dotenv;
use std::env;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "StressProbe")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a probe suite against an OpenAI-compatible backend
    Run {
        /// The hypothesis under test
        #[arg(short = 'H', long)]
        hypothesis: String,

        /// Stress protocol to generate probes with
        #[arg(short, long, value_enum, default_value_t = ProtocolArg::SafetyBoundary)]
        protocol: ProtocolArg,

        /// Number of experimental probes
        #[arg(short, long, default_value = "3")]
        count: usize,

        /// Skip the neutral control probe
        #[arg(long, default_value = "false")]
        no_control: bool,

        /// The backend model name (e.g., gpt-4)
        #[arg(short, long, default_value = "gpt-4")]
        model: String,

        /// Per-probe backend timeout in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,

        /// Absolute per-category delta beyond which the run counts as diverged
        #[arg(long, default_value = "0.3")]
        divergence_threshold: f64,

        #[arg(long, default_value = "5")]
        concurrency: usize,

        #[arg(short, long, default_value = "report.json")]
        output: String,
    },

    /// Print the deterministic probe suite as JSON without executing anything
    Generate {
        #[arg(short = 'H', long)]
        hypothesis: String,

        #[arg(short, long, value_enum, default_value_t = ProtocolArg::SafetyBoundary)]
        protocol: ProtocolArg,

        #[arg(short, long, default_value = "3")]
        count: usize,

        #[arg(long, default_value = "false")]
        no_control: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ProtocolArg {
    Conflict,
    Underspecification,
    Ambiguity,
    SafetyBoundary,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Conflict => Protocol::Conflict,
            ProtocolArg::Underspecification => Protocol::Underspecification,
            ProtocolArg::Ambiguity => Protocol::Ambiguity,
            ProtocolArg::SafetyBoundary => Protocol::SafetyBoundary,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let banks = TemplateBanks::default();

    match cli.command {
        Commands::Run {
            hypothesis,
            protocol,
            count,
            no_control,
            model,
            timeout_ms,
            divergence_threshold,
            concurrency,
            output,
        } => {
            println!("{}", "Initializing StressProbe...".bold().cyan());

            let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");

            let config = SuiteConfig {
                timeout_ms,
                divergence_threshold,
                ..SuiteConfig::default()
            };
            let markers = MarkerBank::default();

            let target: Arc<dyn Target> = Arc::new(OpenAITarget::new(api_key, model));

            let runner = Runner::new(concurrency);
            let report = runner
                .run(
                    target,
                    &hypothesis,
                    protocol.into(),
                    count,
                    !no_control,
                    &banks,
                    &markers,
                    &config,
                )
                .await?;

            println!("Probes executed: {}", report.probe_count);
            if let Some(most_common) = report.most_common_outcome {
                println!("Most common outcome: {}", most_common.as_str().bold());
            }
            println!("Stability score: {:.3}", report.stability_score);
            println!(
                "Fallback rate: {}",
                format!("{:.3}", report.fallback_rate).yellow()
            );
            if let Some(delta) = &report.delta_vs_control {
                let verdict = if delta.behavior_diverged {
                    "DIVERGED".red().bold()
                } else {
                    "within baseline".green()
                };
                println!("Delta vs control: {}", verdict);
            }

            let json = serde_json::to_string_pretty(&report)?;
            let mut file = File::create(&output)?;
            file.write_all(json.as_bytes())?;
            println!("Report saved to {}", output);
        }

        Commands::Generate {
            hypothesis,
            protocol,
            count,
            no_control,
        } => {
            let protocol: Protocol = protocol.into();
            let mut probes = generate_probes(&hypothesis, protocol, count, &banks)?;
            if !no_control {
                probes.push(control_probe(&hypothesis, protocol, &banks));
            }
            println!("{}", serde_json::to_string_pretty(&probes)?);
        }
    }

    Ok(())
}
