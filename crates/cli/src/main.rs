use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use genq_history::card::CardContent;
use genq_history::config::{load_config, ClientConfig};
use genq_history::pagination::{PageLoad, RefreshOutcome};
use genq_history::record::{AspectRatio, JobRequest, Record, RecordId, RecordStatus, Resolution};
use genq_history::sink::RenderSink;
use genq_history::source::{RecordDetails, SnapshotFetcher};
use genq_history::{History, RecordStore};
use humansize::{format_size, DECIMAL};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "genq")]
#[command(about = "Submit video generation jobs and follow their history", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the record store directory
    #[arg(long, value_name = "DIR", global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a new generation job
    Submit {
        /// Text prompt describing the video
        prompt: String,

        /// Source image to animate
        #[arg(short, long, value_name = "FILE")]
        image: Option<PathBuf>,

        /// Video length in seconds (1-15)
        #[arg(short, long, default_value_t = genq_history::record::MAX_DURATION_SECS)]
        duration: u32,

        /// Aspect ratio: auto, 1:1, 16:9, 9:16, 4:3, 3:4, 3:2, 2:3
        #[arg(short, long, default_value = "auto")]
        aspect_ratio: AspectRatio,

        /// Output resolution: 480p or 720p
        #[arg(short, long, default_value = "720p")]
        resolution: Resolution,
    },

    /// Print one page of history, newest first
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Page size (defaults to the configured page size)
        #[arg(long)]
        limit: Option<usize>,

        /// Print the raw page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a single record
    Show { id: RecordId },

    /// Record the outcome of a pending job
    Resolve {
        id: RecordId,

        /// done, rejected, failed or expired
        status: RecordStatus,

        /// Video reference for finished jobs
        #[arg(long)]
        video: Option<String>,

        /// Error message for failed or expired jobs
        #[arg(long)]
        error: Option<String>,
    },

    /// Follow the history, logging every change until interrupted. Polling
    /// pauses while nothing is pending and resumes when new jobs appear.
    Watch {
        /// Additional pages to load after the first one
        #[arg(long, default_value_t = 0)]
        pages: usize,

        /// Exit once no pending jobs remain visible
        #[arg(long)]
        until_idle: bool,
    },
}

/// Render sink that writes every change to the log instead of a screen.
struct TracingSink;

impl RenderSink for TracingSink {
    fn create(&mut self, id: &RecordId, record: &Record, position: usize) {
        let content = CardContent::from_record(record);
        info!(
            "[{}] #{} {} | {} | {}",
            position,
            id,
            record.status,
            content.meta,
            content.headline()
        );
    }

    fn update_content(&mut self, id: &RecordId, record: &Record) {
        let content = CardContent::from_record(record);
        info!("#{} is now {}: {}", id, record.status, content.headline());
    }

    fn move_to(&mut self, id: &RecordId, position: usize) {
        info!("#{} moved to position {}", id, position);
    }

    fn remove(&mut self, id: &RecordId) {
        info!("#{} left the window", id);
    }

    fn set_placeholder(&mut self, visible: bool) {
        if visible {
            info!("No history yet");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .init();

    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    if let Some(dir) = args.store_dir {
        config.store_dir = dir;
    }

    let store = Arc::new(
        RecordStore::open(&config.store_dir)
            .with_context(|| format!("Failed to open record store {:?}", config.store_dir))?,
    );

    match args.command {
        Command::Submit {
            prompt,
            image,
            duration,
            aspect_ratio,
            resolution,
        } => {
            let mut request = JobRequest::new(prompt);
            request.duration = duration;
            request.aspect_ratio = aspect_ratio;
            request.resolution = resolution;
            if let Some(path) = image {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Failed to read image {:?}", path))?;
                info!("Attaching {:?} ({})", path, format_size(bytes.len(), DECIMAL));
                request.image = Some(bytes);
            }

            let history = History::new(Arc::clone(&store), TracingSink, &config);
            let id = history.submit(request).await?;
            history.shutdown();
            println!("{}", id);
        }

        Command::List {
            offset,
            limit,
            json,
        } => {
            let limit = limit.unwrap_or(config.page_size).max(1);
            let snapshot = store.fetch_page(offset, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                for record in &snapshot.items {
                    let content = CardContent::from_record(record);
                    println!(
                        "{:>6}  {:<8}  {:<20}  {}",
                        record.id,
                        record.status,
                        content.meta,
                        content.headline()
                    );
                }
                println!(
                    "{} of {} records ({} pending on this page)",
                    snapshot.items.len(),
                    snapshot.total,
                    snapshot.pending_count()
                );
            }
        }

        Command::Show { id } => {
            let record = store.fetch_record(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.has_source_image {
                match store.fetch_source_image(&id).await {
                    Ok(bytes) => println!("source image: {}", format_size(bytes.len(), DECIMAL)),
                    Err(e) => warn!("Source image for #{} is unavailable: {}", id, e),
                }
            }
        }

        Command::Resolve {
            id,
            status,
            video,
            error,
        } => {
            let record = store.resolve(&id, status, video, error)?;
            println!("#{} {}", record.id, CardContent::from_record(&record).headline());
        }

        Command::Watch { pages, until_idle } => {
            watch(store, &config, pages, until_idle).await?;
        }
    }

    Ok(())
}

async fn watch(
    store: Arc<RecordStore>,
    config: &ClientConfig,
    pages: usize,
    until_idle: bool,
) -> Result<()> {
    info!(
        "Watching {:?} (page size {}, polling every {:?})",
        config.store_dir,
        config.page_size,
        config.poll_interval()
    );
    let history = History::new(store, TracingSink, config);

    if let RefreshOutcome::Failed(e) = history.initial_load().await {
        warn!("Initial load failed, waiting for the next poll: {}", e);
        history.start_polling();
    }

    for _ in 0..pages {
        match history.controller().load_next_page().await {
            PageLoad::Loaded { .. } => {}
            PageLoad::Skipped(reason) => {
                info!("No further pages ({:?})", reason);
                break;
            }
            PageLoad::Failed(e) if e.is_transient() => {
                warn!("Page load failed, continuing with what is loaded: {}", e);
                break;
            }
            PageLoad::Failed(e) => return Err(e.into()),
        }
    }

    let mut idle_check = tokio::time::interval(Duration::from_millis(250));
    let mut resume_check = tokio::time::interval(config.poll_interval());
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for interrupt")?;
                info!("Interrupted");
                break;
            }
            _ = idle_check.tick() => {
                if until_idle && !history.scheduler().is_running() {
                    info!("No pending jobs remain");
                    break;
                }
            }
            _ = resume_check.tick(), if !until_idle => {
                history.resume_if_pending().await;
            }
        }
    }

    info!(
        "{} of {} records loaded",
        history.controller().loaded_count(),
        history.controller().total_count()
    );
    history.shutdown();
    Ok(())
}
