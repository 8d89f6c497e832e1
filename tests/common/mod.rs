//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use livedir::{registry::ConnectionRegistry, server::DevServer, LivedirError};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tempfile::TempDir;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
	<meta charset="UTF-8">
	<title>Test HTML</title>
</head>
<body>
	<h1>Hello, World!</h1>
</body>
</html>"#;

pub const STYLE_CSS: &str = "body { color: rebeccapurple; }\n";

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create a served root at `<temp_dir>/site` containing:
/// - `index.html` with a `Hello, World!` body
/// - `style.css`, `app.js`, `logo.png`
/// - `docs/index.html`
///
/// A `secret.txt` is written next to (not inside) the root for traversal tests.
#[allow(dead_code)]
pub fn create_test_site(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("site");
    std::fs::create_dir_all(root.join("docs")).unwrap();
    std::fs::write(root.join("index.html"), INDEX_HTML).unwrap();
    std::fs::write(root.join("style.css"), STYLE_CSS).unwrap();
    std::fs::write(root.join("app.js"), "console.log('hi');\n").unwrap();
    std::fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
    std::fs::write(
        root.join("docs/index.html"),
        "<html><body><p>Docs</p></body></html>",
    )
    .unwrap();
    std::fs::write(temp_dir.path().join("secret.txt"), "do not serve").unwrap();
    root
}

#[allow(dead_code)]
pub struct RunningServer {
    pub addr: SocketAddr,
    pub registry: ConnectionRegistry,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<(), LivedirError>>,
}

/// Start a [`DevServer`] for `root` on an ephemeral loopback port.
#[allow(dead_code)]
pub async fn start_server(root: PathBuf) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = ConnectionRegistry::new();
    let cancel = CancellationToken::new();

    let server = DevServer::new(root, addr.port(), registry.clone());
    let handle = tokio::spawn(server.serve_with_listener(listener, cancel.clone()));

    RunningServer {
        addr,
        registry,
        cancel,
        handle,
    }
}

/// Poll `registry` until it holds `expected` connections, panicking after five seconds.
#[allow(dead_code)]
pub async fn wait_for_connections(registry: &ConnectionRegistry, expected: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while registry.len().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        waited.is_ok(),
        "registry never reached {expected} connection(s), has {}",
        registry.len().await
    );
}
