use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use gridlens::config::{load_config, save_config, AppConfig};
use gridlens::grid::GridRange;
use gridlens::llm::DetailLevel;
use gridlens::scan::CoordinateSpace;
use gridlens::worker::{handler, WorkerTask};
use gridlens::{GridLens, GridLensError, GridLensResult, ScreenshotOutput, ScreenshotPayload};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "gridlens", version, about = "Grid-addressed browser control over the DevTools protocol")]
struct Cli {
    /// DevTools HTTP endpoint; overrides config and GRIDLENS_CDP_ENDPOINT.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Tab id from `gridlens tabs`; the first tab when omitted.
    #[arg(long, short = 't', global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Space {
    Viewport,
    Page,
}

impl From<Space> for CoordinateSpace {
    fn from(s: Space) -> Self {
        match s {
            Space::Viewport => CoordinateSpace::Viewport,
            Space::Page => CoordinateSpace::Page,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Detail {
    High,
    Extreme,
}

impl From<Detail> for DetailLevel {
    fn from(d: Detail) -> Self {
        match d {
            Detail::High => DetailLevel::High,
            Detail::Extreme => DetailLevel::Extreme,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LabelKind {
    Full,
    Overview,
    Zone,
}

#[derive(Subcommand)]
enum Commands {
    /// List open tabs.
    Tabs,
    /// Open a URL in a new tab.
    Open { url: String },
    /// Capture a grid-labeled screenshot.
    Grid {
        /// Crop to a range such as "B2:D4".
        #[arg(long)]
        range: Option<String>,
        #[arg(long)]
        full_page: bool,
        /// Save to this path instead of the screenshot directory.
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Print the PNG as base64 instead of saving it.
        #[arg(long, conflicts_with = "out")]
        base64: bool,
    },
    /// List interactive elements inside one or more zones.
    Scan {
        /// Ranges such as "B2:D4" or single cells such as "C3".
        #[arg(required = true)]
        zones: Vec<String>,
        #[arg(long, value_enum, default_value = "viewport")]
        space: Space,
    },
    /// Execute one action given as JSON, e.g. '{"type":"click","selector":"#buy"}'.
    Act { action: String },
    /// Ask the vision model to label the page.
    Label {
        #[arg(long, value_enum, default_value = "full")]
        kind: LabelKind,
        /// Required for `--kind zone`.
        #[arg(long)]
        range: Option<String>,
        #[arg(long, value_enum, default_value = "high")]
        detail: Detail,
        #[arg(long, value_enum, default_value = "viewport")]
        space: Space,
    },
    /// Resolve a natural-language query to one labeled element.
    Find {
        query: String,
        #[arg(long, value_enum, default_value = "high")]
        detail: Detail,
        #[arg(long, value_enum, default_value = "viewport")]
        space: Space,
    },
    /// Write the effective configuration to a TOML file.
    InitConfig {
        #[arg(default_value = "gridlens.toml")]
        path: PathBuf,
    },
    /// Run one serialized task (used by the parent process).
    #[command(hide = true)]
    Worker { task: String },
}

fn print_json<T: Serialize>(value: &T) -> GridLensResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Exactly one JSON line on stdout, or a message on stderr with a non-zero exit.
async fn run_worker(raw: &str) -> ExitCode {
    let result = async {
        let task: WorkerTask = serde_json::from_str(raw)?;
        let value = handler::handle(&task).await?;
        Ok::<_, GridLensError>(serde_json::to_string(&value)?)
    }
    .await;

    match result {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut config: AppConfig) -> GridLensResult<()> {
    if let Some(endpoint) = cli.endpoint {
        config.browser.endpoint = endpoint;
    }
    let target = cli.target.as_deref();
    let lens = GridLens::new(config)?;

    match cli.command {
        Commands::Tabs => print_json(&lens.list_tabs().await?),
        Commands::Open { url } => print_json(&lens.open_url(&url).await?),
        Commands::Grid { range, full_page, out, base64 } => {
            let range = range.as_deref().map(GridRange::parse).transpose()?;
            let output = if base64 {
                ScreenshotOutput::Base64
            } else {
                ScreenshotOutput::File(out)
            };
            let shot = lens.grid_screenshot(target, full_page, range.as_ref(), output).await?;
            let mut summary = serde_json::to_value(&shot)?;
            match &shot.payload {
                ScreenshotPayload::Path(path) => summary["path"] = serde_json::json!(path),
                ScreenshotPayload::Base64(b64) => summary["pngBase64"] = serde_json::json!(b64),
                ScreenshotPayload::Bytes(_) => {}
            }
            print_json(&summary)
        }
        Commands::Scan { zones, space } => {
            let zones = zones
                .iter()
                .map(|z| GridRange::parse(z))
                .collect::<GridLensResult<Vec<_>>>()?;
            print_json(&lens.scan_zones(target, &zones, space.into()).await?)
        }
        Commands::Act { action } => {
            let action: serde_json::Value = serde_json::from_str(&action)?;
            print_json(&lens.execute(target, action).await?)
        }
        Commands::Label { kind, range, detail, space } => match kind {
            LabelKind::Full => print_json(&lens.label_full(target, detail.into(), space.into()).await?),
            LabelKind::Overview => print_json(&lens.label_overview(target, space.into()).await?),
            LabelKind::Zone => {
                let range = range
                    .as_deref()
                    .map(GridRange::parse)
                    .transpose()?
                    .ok_or_else(|| GridLensError::InvalidArgument("--kind zone needs --range".into()))?;
                print_json(&lens.label_zone(target, &range, detail.into(), space.into()).await?)
            }
        },
        Commands::Find { query, detail, space } => {
            print_json(&lens.find_element(target, &query, detail.into(), space.into()).await?)
        }
        Commands::InitConfig { path } => {
            save_config(lens.config(), &path)?;
            println!("{}", path.display());
            Ok(())
        }
        // Dispatched before configuration is loaded.
        Commands::Worker { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    gridlens::init_tracing();
    let cli = Cli::parse();

    if let Commands::Worker { task } = &cli.command {
        return run_worker(task).await;
    }

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
