//! Registry of live browser channels.
//!
//! Every open duplex channel is held by its write half, keyed by a [`ConnectionId`]. The
//! registry is the only state shared between the upgrade handlers and the filesystem watcher,
//! so all access goes through one async mutex.

use axum::extract::ws::{Message, WebSocket};
use futures::{future::join_all, stream::SplitSink, Sink, SinkExt};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::timeout};

/// Upper bound on a single broadcast write; a client that cannot take a frame in this window is
/// treated as failed.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Payload telling a browser to reload its current page.
pub const RELOAD_MESSAGE: &str = "reload";

/// Write half of an upgraded axum websocket.
pub type WebSocketSink = SplitSink<WebSocket, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connections<S> {
    next_id: u64,
    members: HashMap<ConnectionId, S>,
}

pub struct ConnectionRegistry<S = WebSocketSink> {
    inner: Arc<Mutex<Connections<S>>>,
}

impl<S> Clone for ConnectionRegistry<S> {
    fn clone(&self) -> Self {
        ConnectionRegistry {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        ConnectionRegistry {
            inner: Arc::new(Mutex::new(Connections {
                next_id: 0,
                members: HashMap::new(),
            })),
        }
    }
}

impl<S> ConnectionRegistry<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, sink: S) -> ConnectionId {
        let mut connections = self.inner.lock().await;
        let id = ConnectionId(connections.next_id);
        connections.next_id += 1;
        connections.members.insert(id, sink);
        tracing::debug!(
            "[ConnectionRegistry] {} registered ({} open)",
            id,
            connections.members.len()
        );
        id
    }

    /// Deregister `id`, handing its sink back to the caller. Removing an absent id is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> Option<S> {
        let mut connections = self.inner.lock().await;
        let removed = connections.members.remove(&id);
        if removed.is_some() {
            tracing::debug!(
                "[ConnectionRegistry] {} deregistered ({} open)",
                id,
                connections.members.len()
            );
        }
        removed
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().await.members.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.members.is_empty()
    }

    /// Send `message` as a text frame to every registered connection.
    ///
    /// Writes run concurrently while the registry lock is held. Any connection whose write
    /// fails or times out is dropped from the registry before the lock is released and is
    /// closed afterwards, each close bounded by [`WRITE_TIMEOUT`]. Frames already delivered to
    /// the others stay delivered.
    pub async fn broadcast(&self, message: &str) {
        let mut connections = self.inner.lock().await;
        let writes = connections.members.iter_mut().map(|(id, sink)| {
            let frame = Message::Text(message.to_string());
            async move {
                let result = match timeout(WRITE_TIMEOUT, sink.send(frame)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("write timed out after {WRITE_TIMEOUT:?}")),
                };
                (*id, result)
            }
        });
        let failed: Vec<(ConnectionId, String)> = join_all(writes)
            .await
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| (id, e)))
            .collect();

        let mut pruned = Vec::with_capacity(failed.len());
        for (id, reason) in failed {
            tracing::warn!("[ConnectionRegistry] WebSocket error on {}: {}", id, reason);
            if let Some(sink) = connections.members.remove(&id) {
                pruned.push((id, sink));
            }
        }
        tracing::debug!(
            "[ConnectionRegistry] broadcast {:?} to {} connection(s)",
            message,
            connections.members.len()
        );
        drop(connections);

        // A peer that stopped reading may never finish its close handshake.
        join_all(pruned.into_iter().map(|(id, mut sink)| async move {
            match timeout(WRITE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("[ConnectionRegistry] closing {} failed: {}", id, e),
                Err(_) => tracing::debug!(
                    "[ConnectionRegistry] closing {} timed out, dropping it",
                    id
                ),
            }
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{
        channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
        StreamExt,
    };
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };

    type TestRegistry = ConnectionRegistry<UnboundedSender<Message>>;

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = rx.try_next() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection_once() {
        let registry = TestRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = unbounded();
            registry.add(tx).await;
            receivers.push(rx);
        }

        registry.broadcast(RELOAD_MESSAGE).await;

        for rx in receivers.iter_mut() {
            assert_eq!(drain(rx), vec![Message::Text("reload".to_string())]);
        }
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_failed_write_prunes_only_that_connection() {
        let registry = TestRegistry::new();
        let (tx_a, mut rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        let (tx_c, mut rx_c) = unbounded();
        let a = registry.add(tx_a).await;
        let b = registry.add(tx_b).await;
        let c = registry.add(tx_c).await;

        // Peer went away: writes to b now fail.
        drop(rx_b);

        registry.broadcast(RELOAD_MESSAGE).await;

        assert!(registry.contains(a).await);
        assert!(!registry.contains(b).await);
        assert!(registry.contains(c).await);
        assert_eq!(registry.len().await, 2);
        assert_eq!(drain(&mut rx_a), vec![Message::Text("reload".to_string())]);
        assert_eq!(drain(&mut rx_c), vec![Message::Text("reload".to_string())]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = TestRegistry::new();
        let (tx, mut rx) = unbounded();
        let id = registry.add(tx).await;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
        assert!(registry.is_empty().await);

        registry.broadcast(RELOAD_MESSAGE).await;
        // The sink was dropped with the removal, so the stream has ended.
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = TestRegistry::new();
        let (tx1, _rx1) = unbounded();
        let (tx2, _rx2) = unbounded();
        let first = registry.add(tx1).await;
        registry.remove(first).await;
        let second = registry.add(tx2).await;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_and_broadcast() {
        let registry = TestRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, rx) = unbounded();
                let id = registry.add(tx).await;
                registry.broadcast(RELOAD_MESSAGE).await;
                registry.remove(id).await;
                rx
            }));
        }
        for handle in handles {
            let mut rx = handle.await.unwrap();
            assert!(!drain(&mut rx).is_empty());
        }
        assert!(registry.is_empty().await);
    }

    /// A peer that never drains its socket: neither writes nor closes ever complete.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = String;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), String> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Pending
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_peer_is_pruned_without_holding_the_lock() {
        let registry = ConnectionRegistry::<StalledSink>::new();
        let stalled = registry.add(StalledSink).await;

        let broadcaster = registry.clone();
        let handle = tokio::spawn(async move { broadcaster.broadcast(RELOAD_MESSAGE).await });

        // Past the write timeout the stalled peer is gone, even while its close is pending.
        tokio::time::sleep(WRITE_TIMEOUT + Duration::from_secs(1)).await;
        let len = timeout(Duration::from_secs(1), registry.len())
            .await
            .expect("registry lock still held after the write timed out");
        assert_eq!(len, 0);
        assert!(!registry.contains(stalled).await);

        timeout(WRITE_TIMEOUT * 2, handle)
            .await
            .expect("broadcast never returned")
            .unwrap();

        let late = registry.add(StalledSink).await;
        assert!(registry.contains(late).await);
    }
}
