//! Background worker
//!
//! One thread fed by a crossbeam channel runs every flush and compaction.
//! A failed job is retried with exponential backoff; the manifest is only
//! touched by jobs that succeed.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{Result, StrataError};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Work the background thread performs on behalf of the engine
pub(crate) trait BackgroundWork: Send + Sync + 'static {
    /// Flush the oldest immutable memtable; `false` when none is pending
    fn flush_one(&self) -> Result<bool>;

    /// Run one scheduled compaction; `false` when no level is due
    fn compact_one(&self) -> Result<bool>;

    /// Flush everything pending, then compact `[begin, end]` down the tree
    fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()>;

    /// Delete files nothing references any more
    fn collect_garbage(&self);

    /// Called whenever a job fails, before the retry delay
    fn background_failed(&self, error: &StrataError);
}

pub(crate) enum Task {
    /// An immutable memtable is waiting
    Flush,
    /// A version was installed that may need compaction
    Compact,
    ManualCompact {
        begin: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        reply: Sender<Result<()>>,
    },
    /// A reader released the last handle on a replaced version
    CollectGarbage,
    Shutdown,
}

pub(crate) struct Worker {
    sender: Sender<Task>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Start the worker thread
    ///
    /// The thread holds only a weak reference, so it never keeps the engine
    /// alive on its own.
    pub fn spawn<W: BackgroundWork>(work: Weak<W>) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("stratakv-bg".to_string())
            .spawn(move || run(work, receiver))?;

        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a task; ignored once the worker has stopped
    pub fn schedule(&self, task: Task) {
        let _ = self.sender.send(task);
    }

    /// Sender for tasks raised outside the engine, such as by iterators
    pub fn scheduler(&self) -> Sender<Task> {
        self.sender.clone()
    }

    /// Stop after the current job and wait for the thread to exit
    pub fn shutdown(&self) {
        let _ = self.sender.send(Task::Shutdown);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Background worker panicked");
            }
        }
    }
}

fn run<W: BackgroundWork>(work: Weak<W>, receiver: Receiver<Task>) {
    tracing::debug!("Background worker started");
    let mut backoff = INITIAL_BACKOFF;

    while let Ok(task) = receiver.recv() {
        let Some(engine) = work.upgrade() else {
            break;
        };

        match task {
            Task::Shutdown => break,
            Task::ManualCompact { begin, end, reply } => {
                let result = engine.compact_range(begin.as_deref(), end.as_deref());
                let _ = reply.send(result);
            }
            Task::CollectGarbage => engine.collect_garbage(),
            Task::Flush | Task::Compact => loop {
                match drain(&*engine) {
                    Ok(()) => {
                        backoff = INITIAL_BACKOFF;
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, retry_in = ?backoff, "Background job failed");
                        engine.background_failed(&e);

                        // Sleep on the channel so shutdown is not delayed
                        match receiver.recv_timeout(backoff) {
                            Ok(Task::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                                tracing::debug!("Background worker stopped");
                                return;
                            }
                            Ok(Task::ManualCompact { reply, .. }) => {
                                let _ = reply.send(Err(StrataError::Background(e.to_string())));
                            }
                            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            },
        }
    }

    tracing::debug!("Background worker stopped");
}

/// Flush every pending memtable, then compact until no level is due
fn drain<W: BackgroundWork>(work: &W) -> Result<()> {
    while work.flush_one()? {}
    while work.compact_one()? {
        // Writers may have frozen another memtable meanwhile
        while work.flush_one()? {}
    }
    Ok(())
}
