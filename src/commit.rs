//! Commit worker, per-path exclusivity gate, and completion handles.
//!
//! Every store handle owns at most one worker thread that drains a FIFO
//! channel of commit jobs. Before running a job the worker takes the gate for
//! the job's path, so two handles bound to the same file never have commits
//! in flight at once.

use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, OnceLock, Weak};
use std::thread;

/// A unit of work run on the worker with the path gate held.
pub(crate) type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct Request {
    job: Job,
    done: mpsc::SyncSender<Result<()>>,
}

type Gate = Arc<Mutex<()>>;

fn gates() -> &'static Mutex<HashMap<PathBuf, Weak<Mutex<()>>>> {
    static GATES: OnceLock<Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>> = OnceLock::new();
    GATES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The process-wide gate for `path`. A gate lives as long as some worker
/// holds it, so a fresh one is only minted when nobody can be writing.
fn gate_for(path: &Path) -> Gate {
    let mut gates = gates().lock();
    if let Some(gate) = gates.get(path).and_then(Weak::upgrade) {
        return gate;
    }
    gates.retain(|_, g| g.strong_count() > 0);
    let gate = Arc::new(Mutex::new(()));
    gates.insert(path.to_path_buf(), Arc::downgrade(&gate));
    gate
}

/// Background thread that applies commit jobs one at a time, in the order
/// they were submitted. Joins the thread on drop once the queue is drained.
pub(crate) struct CommitWorker {
    path: PathBuf,
    tx: Option<mpsc::Sender<Request>>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl CommitWorker {
    pub(crate) fn start(path: &Path) -> Result<Self> {
        let gate = gate_for(path);
        let (tx, rx) = mpsc::channel::<Request>();
        let worker_path = path.to_path_buf();

        let join_handle = thread::Builder::new()
            .name("atomic-mapping-commit".into())
            .spawn(move || {
                for request in rx {
                    let guard = gate.lock();
                    let result = panic::catch_unwind(AssertUnwindSafe(request.job))
                        .unwrap_or_else(|_| {
                            Err(Error::Panicked {
                                path: worker_path.clone(),
                            })
                        });
                    MutexGuard::unlock_fair(guard);
                    // Caller may have dropped its Pending; the commit still happened.
                    let _ = request.done.send(result);
                }
                tracing::debug!(path = %worker_path.display(), "commit worker exiting");
            })
            .map_err(|e| Error::io(path, e))?;

        tracing::debug!(path = %path.display(), "commit worker started");
        Ok(Self {
            path: path.to_path_buf(),
            tx: Some(tx),
            join_handle: Some(join_handle),
        })
    }

    /// Queue `job` behind everything already submitted.
    pub(crate) fn submit(&self, job: Job) -> Pending {
        let (done, rx) = mpsc::sync_channel(1);
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(Request { job, done }).is_ok());
        if sent {
            Pending::waiting(self.path.clone(), rx)
        } else {
            Pending::ready(
                self.path.clone(),
                Err(Error::Disconnected {
                    path: self.path.clone(),
                }),
            )
        }
    }
}

impl Drop for CommitWorker {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(h) = self.join_handle.take() {
            // The last handle can be released by a job running on the worker
            // itself; that thread drains the queue and exits on its own.
            if h.thread().id() != thread::current().id() {
                let _ = h.join();
            }
        }
    }
}

impl std::fmt::Debug for CommitWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitWorker")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

enum State {
    Ready(Result<()>),
    Waiting(mpsc::Receiver<Result<()>>),
}

/// Completion handle for a submitted commit.
///
/// Dropping it does not cancel the commit; it only discards the outcome.
#[must_use = "a commit reports failure only through `wait`"]
pub struct Pending {
    path: PathBuf,
    state: State,
}

impl Pending {
    pub(crate) fn ready(path: PathBuf, result: Result<()>) -> Self {
        Self {
            path,
            state: State::Ready(result),
        }
    }

    fn waiting(path: PathBuf, rx: mpsc::Receiver<Result<()>>) -> Self {
        Self {
            path,
            state: State::Waiting(rx),
        }
    }

    /// Path of the backing file this commit targets.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the commit has been applied (or has failed).
    pub fn wait(self) -> Result<()> {
        match self.state {
            State::Ready(result) => result,
            State::Waiting(rx) => rx
                .recv()
                .unwrap_or(Err(Error::Disconnected { path: self.path })),
        }
    }

    /// Await the outcome without blocking the async runtime.
    #[cfg(feature = "tokio")]
    pub async fn wait_async(self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .unwrap_or(Err(Error::Disconnected { path }))
    }
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = matches!(self.state, State::Ready(_));
        f.debug_struct("Pending")
            .field("path", &self.path)
            .field("ready", &ready)
            .finish()
    }
}
