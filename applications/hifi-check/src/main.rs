/// HiFi Check - frequency-response verification from loopback recordings
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hifi_analysis::render_stimulus;
use hifi_check::{read_recording, write_stimulus, CheckConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hifi-check")]
#[command(about = "Verify an audio path's frequency response from a loopback recording", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a recording of the test stimulus
    Analyze {
        /// WAV file to analyze
        recording: PathBuf,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the test stimulus for the configured plan
    Render {
        /// Output WAV file
        output: PathBuf,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Peak amplitude of the preamble and pips
        #[arg(short, long, default_value_t = 0.5)]
        amplitude: f64,
    },
    /// Print the effective configuration
    Plan {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    // Reports go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hifi_check=info,hifi_analysis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            recording,
            config,
            json,
        } => analyze(&recording, config.as_deref(), json),
        Commands::Render {
            output,
            config,
            amplitude,
        } => {
            render(&output, config.as_deref(), amplitude)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CheckConfig> {
    CheckConfig::load(path).context("Failed to load configuration")
}

fn analyze(path: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<ExitCode> {
    let config = load_config(config)?;
    let analyzer = config
        .analyzer()?
        .with_progress(|message: &str| tracing::info!("{}", message));

    let recording = read_recording(path)
        .with_context(|| format!("Failed to read recording {}", path.display()))?;
    recording.require_sample_rate(analyzer.plan().sample_rate())?;

    tracing::info!(
        "Analyzing {} ({} samples at {} Hz)",
        path.display(),
        recording.samples.len(),
        recording.sample_rate
    );

    let report = analyzer.analyze(&recording.samples);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn render(output: &Path, config: Option<&Path>, amplitude: f64) -> anyhow::Result<()> {
    if amplitude.is_nan() || amplitude <= 0.0 || amplitude > 1.0 {
        bail!("Amplitude must be in (0, 1], got {amplitude}");
    }

    let config = load_config(config)?;
    let analyzer = config.analyzer()?;
    let plan = analyzer.plan();
    let samples = render_stimulus(plan, amplitude);

    write_stimulus(output, &samples, plan.sample_rate())
        .with_context(|| format!("Failed to write stimulus {}", output.display()))?;

    tracing::info!(
        "Wrote {} ({} pips, {:.1} s)",
        output.display(),
        plan.pip_count(),
        samples.len() as f64 / f64::from(plan.sample_rate())
    );
    Ok(())
}
