//! Progress event distribution
//!
//! The [`ProgressBus`] fans every [`ProgressEvent`] out to the observers registered at
//! the time the event is published.
//!
//! # Threading
//!
//! Observers run **synchronously on the worker that is performing the transfer**. A
//! slow observer slows that transfer down. Observers that need to touch a UI or any
//! other single-threaded context should hand events off instead of doing the work
//! inline; [`ProgressBus::channel`] does exactly that.
//!
//! Errors returned by an observer, and panics raised inside one, are logged and
//! discarded. They never reach the transfer or the other observers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::ProgressEvent;

/// Error returned by an observer
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ObserverError(String);

impl ObserverError {
    /// Create an observer error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receiver of progress events
///
/// Any `Fn(&ProgressEvent) -> Result<(), ObserverError>` closure is an observer; register
/// closures with [`ProgressBus::subscribe_fn`].
pub trait ProgressObserver: Send + Sync {
    /// Handle one event. Runs on the transfer's worker.
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError>;
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Handle identifying a registered observer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ObserverList = Vec<(ObserverId, Arc<dyn ProgressObserver>)>;

/// Fan-out of progress events (cloneable - all clones share observers)
#[derive(Clone, Default)]
pub struct ProgressBus {
    observers: Arc<RwLock<ObserverList>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for ProgressBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl ProgressBus {
    /// Create a bus with no observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn subscribe<O>(&self, observer: O) -> ObserverId
    where
        O: ProgressObserver + 'static,
    {
        self.subscribe_arc(Arc::new(observer))
    }

    /// Register a closure as an observer
    pub fn subscribe_fn<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ProgressEvent) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(observer))
    }

    /// Register a shared observer
    pub fn subscribe_arc(&self, observer: Arc<dyn ProgressObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, observer));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    ///
    /// An event already being delivered may still reach the observer.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Register an observer that forwards events into an unbounded channel
    ///
    /// The receiver can be drained from any task. Once it is dropped the forwarding
    /// observer reports an error on each event; unsubscribe it with the returned id.
    pub fn channel(&self) -> (ObserverId, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(ChannelObserver { tx });
        (id, rx)
    }

    /// Deliver `event` to every observer registered right now
    pub fn publish(&self, event: &ProgressEvent) {
        // Snapshot so observers may (un)subscribe while being called
        let snapshot: Vec<(ObserverId, Arc<dyn ProgressObserver>)> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (id, observer) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| observer.on_progress(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(
                        task_id = %event.task_id,
                        observer = id.0,
                        error = %e,
                        "Progress observer returned an error"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        task_id = %event.task_id,
                        observer = id.0,
                        "Progress observer panicked"
                    );
                }
            }
        }
    }
}

/// Observer forwarding events into a tokio channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError> {
        self.tx
            .send(event.clone())
            .map_err(|_| ObserverError::new("progress receiver dropped"))
    }
}
