use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use silicon_rca::config::PipelineConfig;
use silicon_rca::detect::Incident;
use silicon_rca::rca::RcaResult;

#[derive(Parser)]
#[command(
    name = "silicon-rca",
    about = "Fleet hardware incident detection and root-cause analysis",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Defaults to $SILICON_RCA_CONFIG, then ./silicon-rca.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: ingest, correlate, detect, diagnose, report
    Run {
        /// Input folder with counters.csv and logs.jsonl
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output folder for incidents, RCA results and report
        #[arg(long)]
        out: Option<PathBuf>,

        /// Time bucket (seconds) for log/counter correlation
        #[arg(long, allow_negative_numbers = true)]
        window_sec: Option<i64>,

        /// Minimum points in an incident window
        #[arg(long, allow_negative_numbers = true)]
        min_points: Option<i64>,

        /// Max allowed gap (seconds) inside an incident window
        #[arg(long, allow_negative_numbers = true)]
        max_gap_sec: Option<i64>,

        /// Also write results.json
        #[arg(long)]
        json: bool,

        /// Process hosts concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Re-run root-cause inference over an exported incidents.csv
    Rca {
        /// Path to incidents.csv
        #[arg(long)]
        incidents: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Generate a synthetic fleet (counters.csv + logs.jsonl)
    Simulate {
        /// Output folder
        #[arg(long, default_value = "data/demo_fleet")]
        out: PathBuf,

        /// Number of hosts
        #[arg(long, default_value = "12")]
        hosts: usize,

        /// Seconds of telemetry per host
        #[arg(long, default_value = "1800")]
        duration_sec: u32,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_top_incidents(incidents: &[Incident], n: usize) {
    if incidents.is_empty() {
        println!("No incidents detected.");
        return;
    }
    println!("\nTop {} Incidents", n.min(incidents.len()));
    println!(
        "{:<10} | {:<8} | {:<16} | {:<18} | {:>8} | Top signals",
        "Incident", "Host", "Workload", "Event hint", "Severity"
    );
    println!("{:-<10}-|-{:-<8}-|-{:-<16}-|-{:-<18}-|-{:-<8}-|-{:-<30}", "", "", "", "", "", "");
    for i in incidents.iter().take(n) {
        println!(
            "{:<10} | {:<8} | {:<16} | {:<18} | {:>8.2} | {}",
            i.incident_id.to_string(),
            i.host,
            i.workload,
            i.event_hint,
            i.severity_score,
            i.top_signals
        );
    }
}

fn print_results(results: &[RcaResult]) {
    for r in results {
        println!("\n{} -> {} (confidence {:.2})", r.incident_id, r.root_cause, r.confidence);
        println!("  Why:        {}", r.explanation);
        println!("  Evidence:   {}", r.evidence_top_signals);
        let hits: Vec<&str> = r.rule_hits.iter().map(String::as_str).collect();
        println!("  Rule hits:  {}", hits.join(";"));
        println!("  Validation: {}", r.recommended_validation);
        println!("  Mitigation: {}", r.recommended_mitigation);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::load_or_default(),
    };
    init_tracing(&config.logging.level, cli.log_json || config.logging.json);

    match cli.command {
        Commands::Run {
            data,
            out,
            window_sec,
            min_points,
            max_gap_sec,
            json,
            parallel,
        } => {
            let started = Instant::now();
            let detection = &mut config.detection;
            if let Some(v) = window_sec {
                detection.window_sec = v;
            }
            if let Some(v) = min_points {
                detection.min_points = v;
            }
            if let Some(v) = max_gap_sec {
                detection.max_gap_sec = v;
            }
            let data = data.unwrap_or(config.paths.data_dir);
            let out = out.unwrap_or(config.paths.out_dir);

            // Reject bad knobs before touching any input.
            config.detection.bucket()?;
            config.detection.validate()?;

            tracing::info!(
                data = %data.display(),
                out = %out.display(),
                detection = ?config.detection,
                parallel,
                "Starting pipeline"
            );
            let (counters, logs) = silicon_rca::ingest::load_fleet_data(&data)
                .with_context(|| format!("failed to load fleet data from {}", data.display()))?;

            let output = if parallel {
                silicon_rca::run_pipeline_parallel(counters, &logs, &config.detection).await?
            } else {
                silicon_rca::run_pipeline(counters, &logs, &config.detection)?
            };

            let written =
                silicon_rca::report::write_all(&out, &output.incidents, &output.results, json)?;
            println!("Artifacts written:");
            for path in &written {
                println!(" - {}", path.display());
            }
            print_top_incidents(&output.incidents, 8);
            println!("\nDone in {:.2}s", started.elapsed().as_secs_f64());
        }
        Commands::Rca { incidents, json } => {
            let loaded = silicon_rca::report::read_incidents_csv(&incidents)?;
            tracing::info!(path = %incidents.display(), incidents = loaded.len(), "Re-running RCA");
            let results = silicon_rca::rca::run_rca(&loaded);
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No incidents to diagnose.");
            } else {
                print_results(&results);
            }
        }
        Commands::Simulate {
            out,
            hosts,
            duration_sec,
            seed,
        } => {
            let sim = silicon_rca::simulate::SimulationConfig {
                hosts,
                duration_sec,
                seed,
                ..Default::default()
            };
            let fleet = silicon_rca::simulate::simulate_fleet(&sim)?;
            silicon_rca::simulate::write_fleet(&out, &fleet)?;
            println!("Fleet telemetry generated in {}", out.display());
        }
    }

    Ok(())
}
