use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use reelsmith_core::{
    Pipeline, Provider, Scenario, Settings, Target, TrendingQuery, catalog_from_settings,
    format_candidates_readable, format_scenario_readable, format_storyboard_readable,
    format_transcript_with_timestamps, generation::StoryboardPlanner, generator_from_settings,
    search_trending, snapshot, types::is_valid_video_id,
};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliTarget {
    Shorts,
    Youtube,
}

impl From<CliTarget> for Target {
    fn from(cli: CliTarget) -> Self {
        match cli {
            CliTarget::Shorts => Target::Shorts,
            CliTarget::Youtube => Target::Youtube,
        }
    }
}

#[derive(Parser)]
#[command(name = "reelsmith")]
#[command(about = "Turn trending videos into localized short-form scenarios and storyboards")]
struct Cli {
    /// AI provider for scenario and storyboard generation (overrides LLM_PROVIDER)
    #[arg(short, long, global = true)]
    provider: Option<CliProvider>,

    /// Chat model name (overrides the provider default and LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Print a human-readable rendering instead of JSON
    #[arg(short, long, global = true)]
    readable: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find trending candidate videos for a topic
    Search(SearchArgs),
    /// Download a video and extract its transcript and visual structure
    Analyze {
        /// YouTube video id
        #[arg(long)]
        video_id: String,
    },
    /// Write a localized scenario based on a video
    Scenario {
        #[arg(long)]
        video_id: String,
        #[arg(long)]
        topic: String,
        /// Use the stored analysis snapshot when one exists
        #[arg(long)]
        reuse: bool,
    },
    /// Plan a timed storyboard from a scenario JSON file
    Storyboard {
        /// Path to a scenario JSON file
        #[arg(long)]
        scenario: PathBuf,
        #[arg(short, long, default_value = "shorts")]
        target: CliTarget,
    },
    /// Analyse a video, then write its scenario and storyboard
    Run {
        #[arg(long)]
        video_id: String,
        #[arg(long)]
        topic: String,
        #[arg(short, long, default_value = "shorts")]
        target: CliTarget,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    #[arg(long)]
    topic: String,

    /// Number of candidates to return
    #[arg(short, long, default_value_t = 5)]
    n: usize,

    /// ISO 3166-1 region code (defaults to REGION_CODE)
    #[arg(long)]
    region: Option<String>,

    /// Only videos published after this RFC3339 timestamp (defaults to
    /// DEFAULT_PUBLISHED_AFTER, then to seven days ago)
    #[arg(long)]
    after: Option<String>,

    /// Include videos of any length
    #[arg(long)]
    no_shorts: bool,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(spinner: ProgressBar, msg: &str, started: Instant) {
    spinner.finish_with_message(format!(
        "{} {} {}",
        style("✓").green().bold(),
        msg,
        style(format!("[{}]", format_duration(started.elapsed()))).dim()
    ));
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reelsmith=info,reelsmith_core=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(env_filter)
            .init();
    }
}

fn emit<T: Serialize>(value: &T, readable: impl FnOnce(&T) -> String, human: bool) -> Result<()> {
    if human {
        println!("{}", readable(value));
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn seven_days_ago() -> String {
    (Utc::now() - chrono::Duration::days(7)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Subject for storyboard-only runs: the scenario's source video when it is
/// usable as an identifier.
fn storyboard_subject(scenario: &Scenario, path: &Path) -> String {
    if is_valid_video_id(&scenario.meta.source) {
        return scenario.meta.source.clone();
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| is_valid_video_id(s))
        .unwrap_or("storyboard")
        .to_string()
}

async fn execute(cli: Cli, mut settings: Settings) -> Result<()> {
    if let Some(provider) = cli.provider {
        settings.provider = provider.into();
    }
    if let Some(model) = cli.model {
        settings.llm_model = Some(model);
    }
    let readable = cli.readable;
    tracing::debug!(
        provider = settings.provider.name(),
        data_dir = %settings.data_dir.display(),
        "settings loaded"
    );

    eprintln!(
        "\n{}  {}\n",
        style("reelsmith").cyan().bold(),
        style("Trending video → short-form scenario").dim()
    );
    let total_start = Instant::now();

    match cli.command {
        Command::Search(args) => {
            let api = catalog_from_settings(&settings)?;
            let query = TrendingQuery {
                topic: args.topic,
                limit: args.n,
                region: args.region.unwrap_or_else(|| settings.region_code.clone()),
                published_after: args
                    .after
                    .or_else(|| settings.default_published_after.clone())
                    .unwrap_or_else(seven_days_ago),
                shorts_only: !args.no_shorts,
            };

            let started = Instant::now();
            let spinner = create_spinner(&format!("Searching trending videos for {:?}...", query.topic));
            let candidates = search_trending(&api, &query).await?;
            finish(spinner, &format!("Found {} candidates", candidates.len()), started);

            emit(&candidates, |c| format_candidates_readable(c), readable)?;
        }
        Command::Analyze { video_id } => {
            let pipeline = Pipeline::from_settings(&settings)?;

            let started = Instant::now();
            let spinner = create_spinner("Downloading and analysing video...");
            let analysis = pipeline.analyze(&video_id).await?;
            finish(
                spinner,
                &format!(
                    "Analysed: {} segments, {} shots, {} objects",
                    analysis.transcript.segments.len(),
                    analysis.shots.len(),
                    analysis.key_objects.len()
                ),
                started,
            );

            emit(&analysis, |a| format_transcript_with_timestamps(&a.transcript), readable)?;
        }
        Command::Scenario {
            video_id,
            topic,
            reuse,
        } => {
            let pipeline = Pipeline::from_settings(&settings)?;

            let started = Instant::now();
            let spinner = create_spinner(&format!(
                "Writing scenario with {}...",
                settings.provider.name()
            ));
            let scenario = pipeline.scenario(&video_id, &topic, reuse).await?;
            finish(
                spinner,
                &format!("Scenario: {} scenes", scenario.scenes.len()),
                started,
            );

            emit(&scenario, format_scenario_readable, readable)?;
        }
        Command::Storyboard { scenario, target } => {
            let parsed: Scenario = snapshot::load_json(&scenario)
                .await
                .with_context(|| format!("reading scenario from {}", scenario.display()))?;
            let target: Target = target.into();
            let planner = StoryboardPlanner::new(generator_from_settings(&settings)?)
                .with_temperature(settings.storyboard_temperature);
            let subject = storyboard_subject(&parsed, &scenario);

            let started = Instant::now();
            let spinner = create_spinner(&format!(
                "Planning {} storyboard with {}...",
                target,
                settings.provider.name()
            ));
            let board = planner.plan(&subject, &parsed, target).await?;
            finish(
                spinner,
                &format!("Storyboard: {}s total", board.total_duration_sec),
                started,
            );

            emit(&board, format_storyboard_readable, readable)?;
        }
        Command::Run {
            video_id,
            topic,
            target,
        } => {
            let pipeline = Pipeline::from_settings(&settings)?;

            let started = Instant::now();
            let spinner = create_spinner("Running analysis, scenario and storyboard...");
            let output = pipeline.run(&video_id, &topic, target.into()).await?;
            finish(
                spinner,
                &format!(
                    "Storyboard: {} scenes, {}s",
                    output.storyboard.scenes.len(),
                    output.storyboard.total_duration_sec
                ),
                started,
            );

            emit(
                &output,
                |o| {
                    format!(
                        "{}\n{}",
                        format_scenario_readable(&o.scenario),
                        format_storyboard_readable(&o.storyboard)
                    )
                },
                readable,
            )?;
        }
    }

    eprintln!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(2);
        }
    };

    // Dropping the in-flight future on Ctrl-C releases transient media.
    let outcome = tokio::select! {
        result = execute(cli, settings) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
        None => {
            eprintln!("{}", style("Interrupted").yellow().bold());
            std::process::exit(130);
        }
    }
}
