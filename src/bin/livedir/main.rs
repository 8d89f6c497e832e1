//! livedir CLI tool
//!
//! Serves a directory over HTTP and reloads connected browsers when HTML, CSS or JS files in it
//! change.
//!
//! ## Usage
//!
//! ```bash
//! livedir --dir ./site --port 8080
//! livedir --config livedir.toml --no-open
//! ```
//!
//! Command line flags override values from `--config`, which override the built-in defaults
//! (port 8080, current directory, file granularity, open a browser).

use clap::Parser;
use livedir::{
    config::{Config, WatchGranularity},
    port::find_available_port,
    registry::ConnectionRegistry,
    server::DevServer,
    watch::FileWatcher,
    LivedirError,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "livedir")]
#[command(author, version, about = "Serve a directory with automatic browser reload", long_about = None)]
struct Cli {
    /// Starting port for the HTTP server (default: 8080, must be >= 1024)
    #[arg(long)]
    port: Option<u16>,

    /// Directory to serve (default: current directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What to watch: `files` (.html/.css/.js) or `directories`
    #[arg(long)]
    watch: Option<WatchGranularity>,

    /// Don't open a browser window
    #[arg(long)]
    no_open: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config, LivedirError> {
        let mut cfg = match self.config {
            Some(ref path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };
        if let Some(port) = self.port {
            cfg.starting_port = port;
        }
        if let Some(dir) = self.dir {
            cfg.dir = dir;
        }
        if let Some(granularity) = self.watch {
            cfg.granularity = granularity;
        }
        if self.no_open {
            cfg.open_browser = false;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), LivedirError> {
    let cfg = cli.into_config()?;
    cfg.validate()?;

    let port = find_available_port(cfg.starting_port)?;

    let mut watcher = FileWatcher::new(cfg.granularity)?;
    watcher.watch_tree(&cfg.dir)?;

    let registry = ConnectionRegistry::new();
    let cancel = CancellationToken::new();

    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Received exit signal, shutting down server...");
        handler_cancel.cancel();
    })
    .map_err(|e| LivedirError::Server(format!("could not install signal handler: {e}")))?;

    let server = DevServer::new(cfg.dir.clone(), port, registry.clone());
    let mut server_handle = tokio::spawn(server.serve(cancel.clone()));
    let watcher_handle = tokio::spawn(watcher.run(registry, cancel.clone()));

    if cfg.open_browser {
        let url = format!("http://localhost:{port}");
        if let Err(e) = open::that_detached(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let served = tokio::select! {
        result = &mut server_handle => {
            // The server only returns early when it failed to start or crashed.
            cancel.cancel();
            result
        }
        _ = cancel.cancelled() => server_handle.await,
    };
    let _ = watcher_handle.await;

    match served {
        Ok(result) => result,
        Err(e) => Err(LivedirError::Server(format!("server task failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_defaults() {
        let cli = Cli::try_parse_from(["livedir"]).unwrap();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.starting_port, 8080);
        assert_eq!(cfg.dir, PathBuf::from("./"));
        assert_eq!(cfg.granularity, WatchGranularity::Files);
        assert!(cfg.open_browser);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("livedir.toml");
        std::fs::write(&path, "starting_port = 9000\ndir = \"public\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "livedir",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9100",
            "--watch",
            "directories",
            "--no-open",
        ])
        .unwrap();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.starting_port, 9100);
        assert_eq!(cfg.dir, PathBuf::from("public"));
        assert_eq!(cfg.granularity, WatchGranularity::Directories);
        assert!(!cfg.open_browser);
    }
}
