use anyhow::{Context, Result};
use clap::Parser;
use core_events::{EventSourceRegistry, ScriptEventSource, TickEventSource};
use core_sync::{SharedPreviewStore, StaticRecommendSource, SyncOptions};
use landing_sync::document_io::{load_catalog, load_document, render_document, write_document};
use landing_sync::{StoreEventSource, SyncRuntime};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "landing-sync", version, about = "Replay landing block edits against a preview document")]
struct Args {
    /// Preview document (JSON) to edit.
    pub document: PathBuf,
    /// Optional configuration file path (overrides discovery of `landing-sync.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Edit script (JSON lines). Read from stdin when omitted.
    #[arg(long = "script")]
    pub script: Option<PathBuf>,
    /// Write the final document here instead of stdout.
    #[arg(long = "output")]
    pub output: Option<PathBuf>,
    /// Recommended-content catalog (JSON array of nodes).
    #[arg(long = "catalog")]
    pub catalog: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("landing-sync.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "landing-sync.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        // Global subscriber already installed; dropping the guard stops the writer.
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let config = core_config::load_from(args.config.clone())?;
    let options = SyncOptions::from_config(&config);
    info!(
        target: "runtime.startup",
        config_override = args.config.is_some(),
        debounce_ms = config.effective_debounce_ms,
        append_on_missing = options.append_on_missing,
        reject_stale = options.reject_stale,
        "config_loaded"
    );

    let document = load_document(&args.document).await?;
    let catalog = match &args.catalog {
        Some(path) => StaticRecommendSource::new(load_catalog(path).await?),
        None => StaticRecommendSource::default(),
    };
    let store = Arc::new(SharedPreviewStore::new(document));

    let mut registry = EventSourceRegistry::new();
    registry.register(TickEventSource::new(config.tick_interval()));
    registry.register(StoreEventSource::new(store.subscribe()));
    match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening script {}", path.display()))?;
            registry.register(ScriptEventSource::new(BufReader::new(file)));
        }
        None => registry.register(ScriptEventSource::new(BufReader::new(tokio::io::stdin()))),
    }

    let mut runtime = SyncRuntime::new(Arc::clone(&store), options, catalog);
    runtime.spawn_sources(&mut registry);
    let reason = runtime.run().await;

    let final_document = runtime.document();
    match &args.output {
        Some(path) => write_document(&final_document, path).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(render_document(&final_document)?.as_bytes())
                .await
                .context("writing document to stdout")?;
            stdout.flush().await.context("flushing stdout")?;
        }
    }
    info!(target: "runtime", reason = reason.as_str(), "exit");
    Ok(())
}
