//! Typed publish/subscribe channels
//!
//! Every event kind has its own broadcast channel. Events carry the full
//! authoritative value, so a subscriber that falls behind skips straight to
//! the newest events instead of failing.

use crate::operation::{OperationKind, OperationResult};
use cfgsnap_scanner::{ApplicationDescriptor, BackupSnapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

/// Buffered events per channel before slow subscribers start skipping
pub const CHANNEL_CAPACITY: usize = 64;

/// A change to the user-defined application store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreChange {
    Added(Uuid),
    Updated(Uuid),
    Removed(Vec<Uuid>),
    BatchUpdated,
}

/// A backup or restore finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCompleted {
    pub kind: OperationKind,
    pub result: OperationResult,
    /// User-facing status line
    pub summary: String,
}

/// One event kind
#[derive(Debug)]
pub struct EventChannel<T> {
    tx: broadcast::Sender<T>,
    name: &'static str,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<T: Clone + Send + 'static> EventChannel<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, name }
    }

    /// Deliver `event` to every current subscriber. Never blocks; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: T) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    /// Receive events published from now on
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
            name: self.name,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A subscriber's cursor into one channel
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    name: &'static str,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Next event, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = self.name, skipped, "subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        let name = self.name;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(channel = name, skipped, "subscriber lagged, skipping ahead");
                None
            }
        })
    }
}

/// All event channels of the engine
#[derive(Debug, Clone)]
pub struct EventBus {
    pub apps_updated: EventChannel<Vec<ApplicationDescriptor>>,
    pub snapshots_updated: EventChannel<Vec<BackupSnapshot>>,
    pub selected_snapshot_updated: EventChannel<Option<BackupSnapshot>>,
    pub operation_started: EventChannel<OperationKind>,
    pub operation_completed: EventChannel<OperationCompleted>,
    pub user_apps_changed: EventChannel<StoreChange>,
    pub settings_window_closed: EventChannel<()>,
    pub preferences_directory_changed: EventChannel<PathBuf>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            apps_updated: EventChannel::new("apps_updated"),
            snapshots_updated: EventChannel::new("snapshots_updated"),
            selected_snapshot_updated: EventChannel::new("selected_snapshot_updated"),
            operation_started: EventChannel::new("operation_started"),
            operation_completed: EventChannel::new("operation_completed"),
            user_apps_changed: EventChannel::new("user_apps_changed"),
            settings_window_closed: EventChannel::new("settings_window_closed"),
            preferences_directory_changed: EventChannel::new("preferences_directory_changed"),
        }
    }
}
