// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher and event handling
//!
//! [`FileWatcher`] turns notify events into [`FileEvent`]s. [`WatchPool`]
//! queues them for a fixed set of workers, each of which runs the settle
//! delay and hands the file to a [`WatchHandler`]. Events for a path that
//! is already being handled wait for that job and then run in order.

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::processor::{FileProcessor, ProcessOutcome};
use crate::{NewfilesError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Renamed,
}

/// A create or rename notification for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub is_directory: bool,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), kind: FileEventKind::Created, is_directory: false }
    }

    pub fn renamed(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), kind: FileEventKind::Renamed, is_directory: false }
    }
}

/// File system watcher
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_path: Option<PathBuf>,
    event_rx: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(tx, config)?;

        Ok(Self {
            watcher,
            watched_path: None,
            event_rx: rx,
        })
    }

    /// Start watching a directory
    pub fn watch(&mut self, path: &Path, recursive: bool) -> Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        self.watcher.watch(path, mode)?;
        self.watched_path = Some(path.to_path_buf());
        info!("Watching: {:?} (recursive: {})", path, recursive);

        Ok(())
    }

    /// Stop watching
    pub fn unwatch(&mut self) -> Result<()> {
        if let Some(path) = self.watched_path.take() {
            self.watcher.unwatch(&path)?;
            info!("Stopped watching: {:?}", path);
        }
        Ok(())
    }

    /// Get the next relevant event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<Result<FileEvent>> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => convert_event(event).map(Ok),
            Ok(Err(e)) => Some(Err(e.into())),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(NewfilesError::Watch(notify::Error::generic("Watcher disconnected"))))
            }
        }
    }
}

/// Convert a notify event into a create or rename event
pub fn convert_event(event: Event) -> Option<FileEvent> {
    match event.kind {
        EventKind::Create(kind) => event.paths.into_iter().next().map(|path| FileEvent {
            is_directory: kind == CreateKind::Folder || path.is_dir(),
            path,
            kind: FileEventKind::Created,
        }),
        EventKind::Modify(ModifyKind::Name(mode)) => {
            let path = match mode {
                RenameMode::To | RenameMode::Any | RenameMode::Other => event.paths.into_iter().next(),
                // inotify and Windows report the destination as a separate `To` event as well
                RenameMode::Both | RenameMode::From => None,
            }?;
            Some(FileEvent {
                is_directory: path.is_dir(),
                path,
                kind: FileEventKind::Renamed,
            })
        }
        _ => None,
    }
}

/// A renamed file counts as new only when it exists, is empty and has a mapped extension
pub fn is_eligible_rename(path: &Path, settings: &Settings) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    if !metadata.is_file() || metadata.len() > 0 {
        return false;
    }

    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| settings.is_supported_extension(ext))
        .unwrap_or(false)
}

/// Applies the settle delay and eligibility rules, then dispatches
#[derive(Clone)]
pub struct WatchHandler {
    processor: FileProcessor,
    settle_delay: Duration,
}

impl WatchHandler {
    pub fn new(processor: FileProcessor) -> Self {
        let settle_delay = processor.settings().settle_delay();
        Self { processor, settle_delay }
    }

    /// Handle one event. Returns `None` when the event was not dispatched.
    pub async fn handle(&self, event: &FileEvent) -> Option<ProcessOutcome> {
        if event.is_directory {
            return None;
        }

        tokio::time::sleep(self.settle_delay).await;

        if event.kind == FileEventKind::Renamed
            && !is_eligible_rename(&event.path, self.processor.settings())
        {
            debug!("Ignoring rename of {:?}: not an empty file with a mapped extension", event.path);
            return None;
        }

        Some(self.processor.process(&event.path).await)
    }
}

/// Paths owned by a worker, with the events that arrived for them meanwhile
type InFlight = Arc<Mutex<HashMap<PathBuf, VecDeque<FileEvent>>>>;

/// Bounded event queue served by a fixed number of workers.
///
/// At most one worker handles a given path at a time. Later events for
/// that path are held back and handled by the same worker afterwards.
pub struct WatchPool {
    tx: mpsc::Sender<FileEvent>,
    in_flight: InFlight,
    workers: Vec<JoinHandle<()>>,
}

impl WatchPool {
    pub fn spawn(handler: WatchHandler, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    handler.clone(),
                    Arc::clone(&rx),
                    Arc::clone(&in_flight),
                ))
            })
            .collect();

        Self { tx, in_flight, workers }
    }

    /// Queue an event, waiting for room. Returns false if it was dropped.
    pub async fn submit(&self, event: FileEvent) -> bool {
        if event.is_directory {
            return false;
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(pending) = in_flight.get_mut(&event.path) {
                debug!("Already handling {:?}, running this event after it", event.path);
                pending.push_back(event);
                return true;
            }
            in_flight.insert(event.path.clone(), VecDeque::new());
        }

        let path = event.path.clone();
        if self.tx.send(event).await.is_err() {
            warn!("Worker queue closed, dropping event for {:?}", path);
            self.in_flight.lock().await.remove(&path);
            return false;
        }
        true
    }

    /// Close the queue and wait for queued events to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Worker ended abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    handler: WatchHandler,
    rx: Arc<Mutex<mpsc::Receiver<FileEvent>>>,
    in_flight: InFlight,
) {
    loop {
        let event = rx.lock().await.recv().await;
        let mut event = match event {
            Some(event) => event,
            None => break,
        };

        loop {
            match handler.handle(&event).await {
                Some(ProcessOutcome::Written { kind, bytes }) => {
                    debug!("Worker {} wrote {} bytes of {:?} to {:?}", id, bytes, kind, event.path);
                }
                Some(ProcessOutcome::Failed { reason }) => {
                    debug!("Worker {} failed {:?}: {}", id, event.path, reason);
                }
                None => {}
            }

            let mut owned = in_flight.lock().await;
            let next = owned.get_mut(&event.path).and_then(|pending| pending.pop_front());
            match next {
                Some(next) => event = next,
                None => {
                    owned.remove(&event.path);
                    break;
                }
            }
        }
    }

    debug!("Worker {} stopped", id);
}
