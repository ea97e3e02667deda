use anyhow::{Context, Result};
use clap::Parser;

mod app;
mod view;

use app::{Action, App, Overlay};
use genq_history::config::load_config;
use genq_history::pagination::{PageLoad, RefreshOutcome};
use genq_history::sink::CardList;
use genq_history::viewport::ScrollSource;
use genq_history::{History, RecordStore};
use humansize::{format_size, DECIMAL};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::OpenOptions;
use std::io::{stdout, Stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use view::{list_rows, ui, visible_cards, ViewState};

type StoreHistory = History<RecordStore, CardList>;

/// Terminal view of the generation history
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the record store directory
    #[arg(long, value_name = "DIR")]
    store_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_config_path = PathBuf::from("/etc/genq/config.toml");
    let config_path = if let Some(ref path) = args.config {
        Some(path.as_path())
    } else if default_config_path.exists() {
        Some(default_config_path.as_path())
    } else {
        None
    };

    let mut cfg = load_config(config_path).context("Failed to load configuration")?;
    if let Some(dir) = args.store_dir {
        cfg.store_dir = dir;
    }

    let store = RecordStore::open(&cfg.store_dir)
        .with_context(|| format!("Failed to open record store {:?}", cfg.store_dir))?;
    init_logging(&cfg.store_dir)?;
    info!("genqtop v{} on {:?}", env!("CARGO_PKG_VERSION"), cfg.store_dir);

    let rt = Runtime::new().context("Failed to start async runtime")?;
    let _runtime = rt.enter();
    let history = History::new(Arc::new(store), CardList::new(), &cfg);

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&rt, &mut terminal, &history, &cfg.store_dir);

    // Restore terminal
    history.shutdown();
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    result
}

/// The screen belongs to the UI, so logs go to a file next to the records.
fn init_logging(store_dir: &Path) -> Result<()> {
    let log_path = store_dir.join("genqtop.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run(
    rt: &Runtime,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    history: &StoreHistory,
    store_dir: &Path,
) -> Result<()> {
    let mut app = App::new();

    if let RefreshOutcome::Failed(e) = rt.block_on(history.initial_load()) {
        app.set_message(format!("Failed to load history: {}", e));
    }

    // A first page shorter than the screen leaves nothing to scroll.
    let height = terminal.size()?.height;
    let count = rt.block_on(history.reconciler().lock()).len();
    let metrics = app.scroll_metrics(count, list_rows(height));
    report_page_load(&mut app, rt.block_on(history.on_scroll(ScrollSource::Panel, metrics)));

    loop {
        let state = rt.block_on(view_state(history, store_dir));
        let height = terminal.size()?.height;
        let visible = visible_cards(height);
        app.clamp(state.cards.len(), visible);
        app.expire_message();

        terminal.draw(|f| ui(f, &app, &state))?;

        if !crossterm::event::poll(Duration::from_millis(250))? {
            continue;
        }
        let crossterm::event::Event::Key(key) = crossterm::event::read()? else {
            continue;
        };

        let count = state.cards.len();
        let selected = state.cards.get(app.selected).map(|card| card.id.clone());
        match app.handle_key(key.code, count, visible) {
            Action::None => {}
            Action::Quit => break,
            Action::Refresh => match rt.block_on(history.controller().refresh_first_page()) {
                RefreshOutcome::Refreshed { pending, .. } => {
                    if pending > 0 {
                        history.start_polling();
                    }
                    app.set_message(format!("Refreshed ({} pending)", pending));
                }
                RefreshOutcome::Failed(e) => app.set_message(format!("Refresh failed: {}", e)),
            },
            Action::Scrolled(source) => {
                let metrics = app.scroll_metrics(count, list_rows(height));
                report_page_load(&mut app, rt.block_on(history.on_scroll(source, metrics)));
            }
            Action::ShowPrompt => {
                let Some(id) = selected else { continue };
                match rt.block_on(history.prompt_of(&id)) {
                    Some(prompt) => {
                        app.overlay = Some(Overlay {
                            title: format!("Prompt #{}", id),
                            body: prompt,
                        });
                    }
                    None => app.set_message(format!("#{} is no longer shown", id)),
                }
            }
            Action::ShowImage => {
                let Some(id) = selected else { continue };
                match rt.block_on(history.source_image_of(&id)) {
                    Ok(Some(bytes)) => {
                        app.overlay = Some(Overlay {
                            title: format!("Source image #{}", id),
                            body: format!(
                                "{} ({} bytes)\n\n{}",
                                format_size(bytes.len(), DECIMAL),
                                bytes.len(),
                                store_dir.join(format!("{}.image", id)).display()
                            ),
                        });
                    }
                    Ok(None) => app.set_message(format!("#{} was submitted without an image", id)),
                    Err(e) => {
                        warn!("Failed to fetch source image for #{}: {}", id, e);
                        app.set_message(format!("Image unavailable: {}", e));
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

async fn view_state(history: &StoreHistory, store_dir: &Path) -> ViewState {
    let reconciler = history.reconciler().lock().await;
    ViewState {
        cards: reconciler.sink().cards().to_vec(),
        placeholder: reconciler.placeholder_visible(),
        loaded: history.controller().loaded_count(),
        total: history.controller().total_count(),
        polling: history.scheduler().is_running(),
        loading: history.controller().is_loading(),
        store_dir: store_dir.to_path_buf(),
    }
}

fn report_page_load(app: &mut App, load: Option<PageLoad>) {
    match load {
        Some(PageLoad::Loaded { returned, appended }) => {
            debug!("Page load returned {} records, {} new", returned, appended);
        }
        Some(PageLoad::Failed(e)) => app.set_message(format!("Failed to load more: {}", e)),
        Some(PageLoad::Skipped(_)) | None => {}
    }
}
