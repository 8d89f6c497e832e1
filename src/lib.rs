//! # livedir
//!
//! A local development file server that reloads connected browsers whenever served files change.
//!
//! ## Overview
//!
//! livedir serves one directory over HTTP. Every HTML document it serves gets a small script
//! injected before `</body>` that opens a websocket to `/ws`. A background watcher observes the
//! served tree and, on each write to a watched file, pushes the text frame `reload` to every
//! open websocket so the browser refreshes the page.
//!
//! ## Architecture
//!
//! - **[`port`]**: finds the first free TCP port at or above a starting port
//! - **[`inject`]**: inserts the reload listener into HTML bytes
//! - **[`serve`]**: the static file responder behind every route except `/ws`
//! - **[`registry`]**: the set of open browser channels, with broadcast and pruning
//! - **[`ws`]**: the `/ws` upgrade handler
//! - **[`watch`]**: the filesystem watcher and its reload loop
//! - **[`server`]**: router assembly and the server lifecycle with graceful shutdown
//! - **[`config`]**: startup configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use livedir::{
//!     config::WatchGranularity, port::find_available_port, registry::ConnectionRegistry,
//!     server::DevServer, watch::FileWatcher,
//! };
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), livedir::LivedirError> {
//!     let root = PathBuf::from("./site");
//!     let port = find_available_port(8080)?;
//!     let registry = ConnectionRegistry::new();
//!     let cancel = CancellationToken::new();
//!
//!     let mut watcher = FileWatcher::new(WatchGranularity::Files)?;
//!     watcher.watch_tree(&root)?;
//!     let watch_handle = tokio::spawn(watcher.run(registry.clone(), cancel.clone()));
//!
//!     let server = DevServer::new(root, port, registry);
//!     server.serve(cancel).await?;
//!     let _ = watch_handle.await;
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! - The watch set is built once at startup; new files and directories are not watched.
//! - Rapid successive writes each produce a separate `reload`.

pub mod config;
pub mod error;
pub mod inject;
pub mod port;
pub mod registry;
pub mod serve;
pub mod server;
pub mod watch;
pub mod ws;

pub use error::LivedirError;
