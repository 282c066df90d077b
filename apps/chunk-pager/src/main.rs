use chunk_pager::client::{
    ChunksMap, ClientError, Document, MapOptions, StatusBusy, TerminalClient, Viewport,
};
use chunk_pager::client::document::UNITS_PER_ROW;
use chunk_pager::config::{ConfigError, ConfigLayer, PagerConfig, RenderProfile, SourceConfig};
use chunk_pager::source::{
    ChunkSource, DirChunkSource, HttpChunkSource, MemoryChunkSource, SourceError,
};
use chunk_pager::telemetry::logging::{self as logctl, LogConfig, LogLevel};
use clap::{Args, Parser};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Terminal rows assumed when the size cannot be queried.
const FALLBACK_ROWS: u16 = 24;
/// Log file name under the temp dir when the TUI runs without `--log-file`.
const DEFAULT_TUI_LOG: &str = "chunk-pager.log";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let render = !cli.no_render && io::stdout().is_terminal();
    let log_config = cli.logging.to_config(render);
    logctl::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    debug!(log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ConfigLayer::default_path()?,
    };
    let file_layer = ConfigLayer::load(&config_path)?;
    let config = PagerConfig::resolve(file_layer.merge(cli.layer()))?;
    info!(
        segments = config.segment_count,
        placeholder = config.placeholder_extent,
        profile = ?config.profile,
        "pager configured"
    );

    let source = build_source(&config)?;
    let rows = crossterm::terminal::size()
        .map(|(_, rows)| rows)
        .unwrap_or(FALLBACK_ROWS);
    let body_rows = rows.saturating_sub(2).max(1) as u64;
    let viewport = Arc::new(Viewport::new(body_rows * UNITS_PER_ROW));
    let busy = Arc::new(StatusBusy::new());
    let map = ChunksMap::new(
        source,
        Box::new(Document::new()),
        viewport,
        busy.clone(),
        MapOptions {
            segment_count: config.segment_count,
            placeholder_extent: config.placeholder_extent,
        },
    );

    TerminalClient::new(map, busy)
        .with_render(render)
        .with_settle_quiet(config.settle_quiet)
        .run()
        .await?;
    Ok(())
}

fn build_source(config: &PagerConfig) -> Result<Arc<dyn ChunkSource>, CliError> {
    let source: Arc<dyn ChunkSource> = match &config.source {
        SourceConfig::Http { template } => Arc::new(HttpChunkSource::new(template.clone())?),
        SourceConfig::Dir { root, template } => {
            Arc::new(DirChunkSource::new(root.clone(), template.clone())?)
        }
        SourceConfig::Demo {
            records_per_segment,
        } => Arc::new(MemoryChunkSource::synthetic(
            config.segment_count,
            *records_per_segment,
        )),
    };
    Ok(source)
}

#[derive(Parser, Debug)]
#[command(
    name = "chunk-pager",
    about = "Page through very large record lists, one segment at a time",
    author,
    version
)]
struct Cli {
    #[arg(
        long,
        env = "CHUNK_PAGER_URL",
        value_name = "URL",
        help = "Base URL or URL template ({index} is replaced by the segment index)"
    )]
    url: Option<String>,

    #[arg(
        long,
        env = "CHUNK_PAGER_DIR",
        value_name = "DIR",
        help = "Read segments from files in this directory"
    )]
    dir: Option<PathBuf>,

    #[arg(
        long,
        env = "CHUNK_PAGER_TEMPLATE",
        value_name = "NAME",
        help = "Segment file name template (default doc_list_chunk_{index}.pdx)"
    )]
    template: Option<String>,

    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        help = "Use generated in-memory segments instead of a real source"
    )]
    demo: bool,

    #[arg(long, value_name = "N", help = "Records per generated segment in demo mode")]
    demo_records: Option<usize>,

    #[arg(
        long,
        env = "CHUNK_PAGER_SEGMENTS",
        value_name = "N",
        help = "Total number of segments (default 999)"
    )]
    segments: Option<usize>,

    #[arg(
        long,
        value_enum,
        env = "CHUNK_PAGER_PROFILE",
        help = "Placeholder sizing profile (default wide)"
    )]
    profile: Option<RenderProfile>,

    #[arg(
        long,
        env = "CHUNK_PAGER_PLACEHOLDER_EXTENT",
        value_name = "UNITS",
        help = "Extent reserved for each unloaded segment; overrides the profile"
    )]
    placeholder_extent: Option<u64>,

    #[arg(
        long,
        env = "CHUNK_PAGER_SETTLE_MS",
        value_name = "MS",
        help = "Quiet period before a scroll counts as settled (default 20)"
    )]
    settle_ms: Option<u64>,

    #[arg(
        long,
        value_name = "PATH",
        env = "CHUNK_PAGER_CONFIG",
        help = "Config file (default ~/.chunk-pager/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long = "no-render",
        action = clap::ArgAction::SetTrue,
        help = "Print the first window to stdout instead of starting the TUI"
    )]
    no_render: bool,

    #[command(flatten)]
    logging: LoggingArgs,
}

impl Cli {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            url: self.url.clone(),
            dir: self.dir.clone(),
            template: self.template.clone(),
            demo: self.demo.then_some(true),
            demo_records: self.demo_records,
            segments: self.segments,
            profile: self.profile,
            placeholder_extent: self.placeholder_extent,
            settle_ms: self.settle_ms,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "CHUNK_PAGER_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "CHUNK_PAGER_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    file: Option<PathBuf>,
}

impl LoggingArgs {
    /// Logs written to stderr would tear the TUI, so they go to a file there.
    fn to_config(&self, render: bool) -> LogConfig {
        let file = match &self.file {
            Some(path) => Some(path.clone()),
            None if render => Some(std::env::temp_dir().join(DEFAULT_TUI_LOG)),
            None => None,
        };
        LogConfig {
            level: self.level,
            file,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("logging initialization failed: {0}")]
    Logging(String),
}
