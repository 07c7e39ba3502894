use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use harpline_core::{
    EngineConfig, InputEvent, PerformanceScript, ReplayReport, Track,
    diagnostics::init_tracing,
    fixtures::{demo_raw_track, demo_track, performance_for},
    persistence::{load_script, save_report, save_script},
    replay_script,
};

#[derive(Debug, Parser)]
#[command(name = "harpline-cli")]
#[command(about = "Headless tools for replaying and scoring Harpline performances")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Engine config TOML; defaults to harpline.config.toml discovery.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replays synthetic performances of the built-in demo track.
    Demo {
        #[arg(long, default_value = "data/demo")]
        output_dir: PathBuf,

        #[arg(long, value_enum, default_value = "all")]
        style: DemoStyle,

        #[arg(long, default_value_t = 60.0)]
        frame_rate: f64,
    },
    /// Replays a recorded performance script.
    Replay {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DemoStyle {
    Perfect,
    Sloppy,
    Silent,
    All,
}

fn sloppy_offset(index: usize) -> f64 {
    match index % 4 {
        0 => 0.04,
        1 => -0.15,
        2 => 0.18,
        _ => 0.35,
    }
}

impl DemoStyle {
    fn inputs(self, track: &Track) -> Vec<InputEvent> {
        match self {
            Self::Perfect => performance_for(track, |_| 0.0),
            Self::Sloppy => performance_for(track, sloppy_offset),
            Self::Silent | Self::All => Vec::new(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Perfect => "perfect",
            Self::Sloppy => "sloppy",
            Self::Silent => "silent",
            Self::All => "all",
        }
    }
}

fn print_report(label: &str, report: &ReplayReport) {
    let accuracy = report
        .score
        .final_accuracy
        .map_or_else(|| "n/a".to_string(), |value| format!("{:.0}%", value * 100.0));
    println!(
        "{label}: {accuracy} accuracy ({} hit, {} early, {} late, {} missed, {} stray) state={:?}",
        report.score.tally.hit,
        report.score.tally.early,
        report.score.tally.late,
        report.score.tally.missed,
        report.stats.stray_inputs,
        report.final_state,
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = init_tracing(&cli.log_dir)?;

    let (config, config_path) = match &cli.config {
        Some(path) => (EngineConfig::load_from(path)?, Some(path.clone())),
        None => EngineConfig::discover()?,
    };
    telemetry.record_config(config_path.as_deref(), &config);

    match cli.command {
        Commands::Demo {
            output_dir,
            style,
            frame_rate,
        } => {
            std::fs::create_dir_all(&output_dir)?;
            let styles = match style {
                DemoStyle::All => vec![DemoStyle::Perfect, DemoStyle::Sloppy, DemoStyle::Silent],
                single => vec![single],
            };
            let track = demo_track();

            for style in styles {
                let inputs = style.inputs(&track);
                let script =
                    PerformanceScript::synthesize(demo_raw_track(), &inputs, 1.0 / frame_rate, 1.0);
                save_script(
                    &output_dir.join(format!("{}.script.json", style.label())),
                    &script,
                )?;

                let report = replay_script(&script, &config)?;
                save_report(
                    &output_dir.join(format!("{}.report.json", style.label())),
                    &report,
                )?;
                print_report(style.label(), &report);
            }
        }
        Commands::Replay { script, report } => {
            let loaded = load_script(&script)?;
            let result = replay_script(&loaded, &config)?;
            if let Some(path) = report {
                save_report(&path, &result)?;
                tracing::info!(path = %path.display(), "replay report written");
            }
            print_report(&script.display().to_string(), &result);
        }
    }

    Ok(())
}
