use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use visitgate_core::{sample_visits, DecisionEngine, Evaluation, IntakeSource, RuleTable};
use visitgate_enrichment::{EnrichmentClient, EnrichmentConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use visitgate_intake::{parse_envelope, parse_payload, IntakeOrchestrator};
use visitgate_observability::{init_tracing, AppMetrics, LogTarget};

#[derive(Debug, Parser)]
#[command(name = "visitgate")]
#[command(about = "Visitor intake decisions from the command line")]
struct Cli {
    #[arg(long, env = "VISITGATE_ENRICHMENT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "VISITGATE_ENRICHMENT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the rule table in evaluation order.
    Rules,
    /// Classify an envelope or bare payload without calling enrichment.
    Evaluate {
        /// JSON file, or `-` for stdin.
        input: PathBuf,
    },
    /// Run the full intake pipeline, enrichment included.
    Intake {
        /// JSON envelope file, or `-` for stdin.
        input: PathBuf,
    },
    /// Print the sample visits as intake envelopes.
    Samples,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the command result
    init_tracing("visitgate_cli", LogTarget::Stderr);
    let cli = Cli::parse();

    match cli.command {
        Command::Rules => {
            let table = RuleTable::standard();
            println!("{}", serde_json::to_string_pretty(&table.summaries())?);
        }
        Command::Evaluate { input } => {
            let raw = read_json(&input)?;
            let evaluation = evaluate_offline(&raw)?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }
        Command::Intake { input } => {
            let raw = read_json(&input)?;
            let timeouts = EnrichmentConfig::from_env();
            let config = EnrichmentConfig::new(cli.base_url, cli.model)
                .with_timeouts(timeouts.connect_timeout, timeouts.request_timeout);
            let intake = IntakeOrchestrator::new(
                DecisionEngine::default(),
                EnrichmentClient::new(config).context("failed to build enrichment client")?,
                AppMetrics::shared(),
            );

            let response = intake.handle(raw).await.context("intake failed")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Samples => {
            let envelopes = sample_visits()
                .iter()
                .map(|sample| {
                    serde_json::json!({
                        "name": sample.name,
                        "expected_policy_id": sample.expected_policy_id,
                        "envelope": sample.envelope(IntakeSource::QrScan),
                    })
                })
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&envelopes)?);
        }
    }

    Ok(())
}

fn evaluate_offline(raw: &Value) -> Result<Evaluation> {
    let request = if raw.get("payload").is_some() {
        parse_envelope(raw)?.payload
    } else {
        parse_payload(raw)?
    };
    Ok(DecisionEngine::default().evaluate(&request))
}

fn read_json(input: &Path) -> Result<Value> {
    let text = if input.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed reading stdin")?;
        buffer
    } else {
        fs::read_to_string(input)
            .with_context(|| format!("failed reading {}", input.display()))?
    };

    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", input.display()))
}
