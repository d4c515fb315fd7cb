//! Core store type, staged update, and builder.

use crate::commit::{CommitWorker, Job, Pending};
use crate::error::{Error, Result};
use crate::persist::{atomic_write, load, load_or_default, WriteOptions};
use crate::serializer::{JsonSerializer, Serializer};
use crate::Mapping;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A JSON document on disk with atomic, serialized whole-document commits.
///
/// Generic over the document type `T`, which defaults to a JSON object
/// ([`Mapping`]). Use [`new`](Self::new) for the defaults or
/// [`builder`](Self::builder) to tweak formatting and fsync behavior.
///
/// Cloning is cheap; clones share one commit queue, so commits from any clone
/// are applied in submission order.
pub struct AtomicMapping<T = Mapping> {
    shared: Arc<Shared>,
    _marker: PhantomData<fn() -> T>,
}

struct Shared {
    path: PathBuf,
    serializer: JsonSerializer,
    options: WriteOptions,
    worker: Mutex<Option<CommitWorker>>,
}

impl<T> AtomicMapping<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Bind a store to `path` with pretty JSON and directory fsync. Nothing
    /// on disk is touched until the first read or commit.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder(path).build()
    }

    /// Start configuring a new store. Call [`.build()`](AtomicMappingBuilder::build)
    /// when ready.
    pub fn builder(path: impl AsRef<Path>) -> AtomicMappingBuilder<T> {
        AtomicMappingBuilder::new(path)
    }

    // ---- reads ----

    /// Load the current document. A missing, empty, unreadable or corrupt
    /// file yields `T::default()`.
    #[must_use]
    pub fn read(&self) -> T {
        load_or_default(&self.shared.path, &self.shared.serializer)
    }

    /// Like [`read`](Self::read) but surfaces read and parse errors. A
    /// missing or empty file is still `Ok(T::default())`.
    pub fn try_read(&self) -> Result<T> {
        load(&self.shared.path, &self.shared.serializer).map(Option::unwrap_or_default)
    }

    /// Path to the backing JSON file (always absolute).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    // ---- writes ----

    /// Stage `value` as the full replacement document. The value is
    /// serialized now; nothing is written until [`Update::commit`].
    pub fn update(&self, value: &T) -> Update<T> {
        let staged = self
            .shared
            .serializer
            .serialize(value)
            .map(|bytes| replace_job(self.shared.path.clone(), bytes, self.shared.options));
        Update {
            store: self.clone(),
            staged,
        }
    }

    /// Stage a read-modify-write. `f` runs on the commit worker once this
    /// update reaches the head of the queue; it gets the document currently
    /// on disk and returns the replacement.
    ///
    /// A missing or empty file hands `f` the default document. A file that
    /// exists but cannot be read or parsed fails the commit with
    /// [`Error::Io`] or [`Error::Deserialize`] and is left as it is.
    pub fn update_with<F>(&self, f: F) -> Update<T>
    where
        T: 'static,
        F: FnOnce(T) -> T + Send + 'static,
    {
        let path = self.shared.path.clone();
        let serializer = self.shared.serializer;
        let options = self.shared.options;
        let job: Job = Box::new(move || {
            let current: T = load(&path, &serializer)?.unwrap_or_default();
            let bytes = serializer.serialize(&f(current))?;
            atomic_write(&path, &bytes, options)?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "mapping rewritten");
            Ok(())
        });
        Update {
            store: self.clone(),
            staged: Ok(job),
        }
    }

    /// Commit `value` and wait for it to land. Shorthand for
    /// `update(value).commit().wait()`.
    pub fn write(&self, value: &T) -> Result<()> {
        self.update(value).commit().wait()
    }

    // ---- async ----

    /// [`read`](Self::read) on tokio's blocking pool.
    #[cfg(feature = "tokio")]
    pub async fn read_async(&self) -> T
    where
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read())
            .await
            .unwrap_or_default()
    }

    // ---- internal ----

    fn submit(&self, job: Job) -> Pending {
        let mut worker = self.shared.worker.lock();
        if worker.is_none() {
            match CommitWorker::start(&self.shared.path) {
                Ok(w) => *worker = Some(w),
                Err(err) => return Pending::ready(self.shared.path.clone(), Err(err)),
            }
        }
        match worker.as_ref() {
            Some(w) => w.submit(job),
            None => Pending::ready(
                self.shared.path.clone(),
                Err(Error::Disconnected {
                    path: self.shared.path.clone(),
                }),
            ),
        }
    }
}

fn replace_job(path: PathBuf, bytes: Vec<u8>, options: WriteOptions) -> Job {
    Box::new(move || {
        atomic_write(&path, &bytes, options)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "mapping committed");
        Ok(())
    })
}

impl<T> Clone for AtomicMapping<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for AtomicMapping<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicMapping")
            .field("path", &self.shared.path)
            .field("pretty", &self.shared.serializer.is_pretty())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// A staged replacement document. Nothing reaches disk until
/// [`commit`](Self::commit) is called.
#[must_use = "an update does nothing until committed"]
pub struct Update<T> {
    store: AtomicMapping<T>,
    staged: Result<Job>,
}

impl<T> Update<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Queue the durable write and return a handle for its outcome.
    pub fn commit(self) -> Pending {
        match self.staged {
            Ok(job) => self.store.submit(job),
            Err(err) => Pending::ready(self.store.shared.path.clone(), Err(err)),
        }
    }
}

impl<T> std::fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Update")
            .field("path", &self.store.shared.path)
            .field("staged", &self.staged.is_ok())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures an [`AtomicMapping`].
///
/// ```rust,no_run
/// use atomic_mapping::AtomicMapping;
///
/// let store = AtomicMapping::<serde_json::Value>::builder("meta/cache.json")
///     .pretty(false)
///     .create_parent(true)
///     .build()
///     .unwrap();
/// ```
pub struct AtomicMappingBuilder<T> {
    path: PathBuf,
    pretty: bool,
    options: WriteOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AtomicMappingBuilder<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pretty: true,
            options: WriteOptions::default(),
            _marker: PhantomData,
        }
    }

    /// Write indented JSON (default) or compact single-line JSON.
    pub fn pretty(mut self, yes: bool) -> Self {
        self.pretty = yes;
        self
    }

    /// fsync the parent directory after each rename (default: on).
    pub fn sync_dir(mut self, yes: bool) -> Self {
        self.options.sync_dir = yes;
        self
    }

    /// Create missing parent directories on commit (default: off).
    pub fn create_parent(mut self, yes: bool) -> Self {
        self.options.create_parent = yes;
        self
    }

    /// Validate the path and bind the store. Does not touch the file.
    pub fn build(self) -> Result<AtomicMapping<T>> {
        if self.path.file_name().is_none() {
            return Err(Error::Config(format!(
                "{} does not name a file",
                self.path.display()
            )));
        }
        let path = std::path::absolute(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let serializer = if self.pretty {
            JsonSerializer::pretty()
        } else {
            JsonSerializer::new()
        };

        Ok(AtomicMapping {
            shared: Arc::new(Shared {
                path,
                serializer,
                options: self.options,
                worker: Mutex::new(None),
            }),
            _marker: PhantomData,
        })
    }
}

impl<T> std::fmt::Debug for AtomicMappingBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicMappingBuilder")
            .field("path", &self.path)
            .field("pretty", &self.pretty)
            .field("options", &self.options)
            .finish()
    }
}
