//! Ephemeral per-job workspaces
//!
//! Each job works inside its own directory under a configured root. Removal
//! is deferred by a release delay so that an in-flight stream can finish, and
//! is performed at most once per workspace no matter how many parties
//! (scoped guards, stream completion, the sweeper) ask for it.
//!
//! Guarded workspaces count as live until the guard is dropped or kept, and
//! the sweeper never touches a live workspace however old its directory is.
//! Released ids are remembered until the directory is gone and a further
//! `release_delay + unclaimed_ttl` has passed, after which the sweeper
//! forgets them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::env_or;

/// Default delay between release and directory removal.
pub const DEFAULT_RELEASE_DELAY_SECS: u64 = 60;

/// Default age after which an unreleased workspace is reclaimed.
pub const DEFAULT_UNCLAIMED_TTL_SECS: u64 = 600;

/// Default interval of the unclaimed-workspace sweeper.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

const ID_PREFIX: &str = "ws-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub release_delay_secs: u64,
    pub unclaimed_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl WorkspaceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            release_delay_secs: env_or("WORKSPACE_RELEASE_DELAY_SECS", defaults.release_delay_secs),
            unclaimed_ttl_secs: env_or("WORKSPACE_UNCLAIMED_TTL_SECS", defaults.unclaimed_ttl_secs),
            sweep_interval_secs: env_or(
                "WORKSPACE_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root.as_os_str().is_empty() {
            anyhow::bail!("WORKSPACE_ROOT must not be empty");
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("WORKSPACE_SWEEP_INTERVAL_SECS must be greater than 0");
        }
        Ok(())
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("yass-workspaces"),
            release_delay_secs: DEFAULT_RELEASE_DELAY_SECS,
            unclaimed_ttl_secs: DEFAULT_UNCLAIMED_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid workspace id: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scratch directory owned by one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    id: String,
    path: PathBuf,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A workspace id is a single path component made of `[A-Za-z0-9_-]`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Default)]
struct Registry {
    /// Held by a guard of a job that is still running
    live: HashSet<String>,
    /// `None` while the deletion is pending, then the time it ran
    released: HashMap<String, Option<Instant>>,
}

struct Inner {
    root: PathBuf,
    release_delay: Duration,
    unclaimed_ttl: Duration,
    registry: Mutex<Registry>,
    deletions: AtomicUsize,
}

#[derive(Clone)]
pub struct WorkspaceManager {
    inner: Arc<Inner>,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.root)?;
        Ok(Self {
            inner: Arc::new(Inner {
                root: config.root.clone(),
                release_delay: Duration::from_secs(config.release_delay_secs),
                unclaimed_ttl: Duration::from_secs(config.unclaimed_ttl_secs),
                registry: Mutex::new(Registry::default()),
                deletions: AtomicUsize::new(0),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Create a fresh, empty workspace directory
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let id = format!("{}{}", ID_PREFIX, Uuid::new_v4().simple());
        let path = self.inner.root.join(&id);
        tokio::fs::create_dir_all(&path).await?;
        debug!(workspace = %id, "Workspace acquired");
        Ok(Workspace { id, path })
    }

    /// Acquire a workspace wrapped in a guard that releases it on drop
    pub async fn acquire_guarded(&self) -> Result<WorkspaceGuard, WorkspaceError> {
        let workspace = self.acquire().await?;
        Ok(self.guard(workspace))
    }

    /// Wrap `workspace` in a guard; it stays live until the guard goes away
    pub fn guard(&self, workspace: Workspace) -> WorkspaceGuard {
        self.inner
            .registry
            .lock()
            .live
            .insert(workspace.id().to_string());
        WorkspaceGuard {
            manager: self.clone(),
            workspace,
            armed: true,
        }
    }

    /// Map an id to its directory
    pub fn resolve(&self, id: &str) -> Result<PathBuf, WorkspaceError> {
        if !is_valid_id(id) {
            return Err(WorkspaceError::InvalidId(id.to_string()));
        }
        Ok(self.inner.root.join(id))
    }

    /// Schedule deletion after the release delay.
    ///
    /// Returns `false` when the workspace was already released.
    pub fn release(&self, id: &str) -> bool {
        self.release_tracked(id).is_some()
    }

    /// Same as [`release`](Self::release), handing back the pending deletion.
    pub fn release_tracked(&self, id: &str) -> Option<JoinHandle<()>> {
        let path = match self.resolve(id) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Refusing to release workspace");
                return None;
            }
        };

        if !self.mark_released(id) {
            debug!(workspace = %id, "Workspace already released");
            return None;
        }

        let inner = self.inner.clone();
        let id = id.to_string();
        Some(tokio::spawn(async move {
            tokio::time::sleep(inner.release_delay).await;
            remove_workspace_dir(&inner, &id, &path).await;
        }))
    }

    /// Number of deletions carried out so far
    pub fn deletions(&self) -> usize {
        self.inner.deletions.load(Ordering::SeqCst)
    }

    pub fn is_released(&self, id: &str) -> bool {
        self.inner.registry.lock().released.contains_key(id)
    }

    /// Whether a guard still holds the workspace
    pub fn is_live(&self, id: &str) -> bool {
        self.inner.registry.lock().live.contains(id)
    }

    /// Number of released ids still remembered
    pub fn tracked_releases(&self) -> usize {
        self.inner.registry.lock().released.len()
    }

    fn mark_released(&self, id: &str) -> bool {
        let mut registry = self.inner.registry.lock();
        if registry.released.contains_key(id) {
            return false;
        }
        registry.live.remove(id);
        registry.released.insert(id.to_string(), None);
        true
    }

    fn unmark_live(&self, id: &str) {
        self.inner.registry.lock().live.remove(id);
    }

    /// Forget releases whose directory has been gone long enough
    fn prune_released(&self) -> usize {
        let horizon = self.inner.release_delay + self.inner.unclaimed_ttl;
        let mut registry = self.inner.registry.lock();
        let before = registry.released.len();
        registry
            .released
            .retain(|_, removed_at| removed_at.map_or(true, |at| at.elapsed() < horizon));
        before - registry.released.len()
    }

    /// Release leftovers from a previous run
    pub async fn recover(&self) -> Result<usize, WorkspaceError> {
        let released = self.sweep().await?;
        if released > 0 {
            info!(released, "Recovered workspaces left by a previous run");
        }
        Ok(released)
    }

    /// Release every workspace directory older than the unclaimed TTL
    /// that no guard holds
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<usize, WorkspaceError> {
        let pruned = self.prune_released();
        if pruned > 0 {
            debug!(pruned, "Forgot released workspaces");
        }

        let mut entries = tokio::fs::read_dir(&self.inner.root).await?;
        let now = SystemTime::now();
        let mut released = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str() else { continue };
            if !id.starts_with(ID_PREFIX)
                || !is_valid_id(id)
                || self.is_released(id)
                || self.is_live(id)
            {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age >= self.inner.unclaimed_ttl && self.release(id) {
                debug!(workspace = %id, age_secs = age.as_secs(), "Reclaiming unclaimed workspace");
                released += 1;
            }
        }

        Ok(released)
    }

    /// Run [`sweep`](Self::sweep) every `interval` until cancelled
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Workspace sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = manager.sweep().await {
                            warn!(error = %e, "Workspace sweep failed");
                        }
                    }
                }
            }
        })
    }
}

async fn remove_workspace_dir(inner: &Inner, id: &str, path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => info!(workspace = %id, "Workspace deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(workspace = %id, "Workspace directory already gone")
        }
        Err(e) => warn!(workspace = %id, error = %e, "Failed to delete workspace"),
    }
    mark_removed(inner, id);
}

fn mark_removed(inner: &Inner, id: &str) {
    inner
        .registry
        .lock()
        .released
        .insert(id.to_string(), Some(Instant::now()));
    inner.deletions.fetch_add(1, Ordering::SeqCst);
}

/// Releases its workspace on drop unless [`keep`](Self::keep) was called
pub struct WorkspaceGuard {
    manager: WorkspaceManager,
    workspace: Workspace,
    armed: bool,
}

impl WorkspaceGuard {
    pub fn id(&self) -> &str {
        self.workspace.id()
    }

    pub fn path(&self) -> &Path {
        self.workspace.path()
    }

    /// Disarm the guard; someone else now owns the release and the
    /// sweeper may reclaim the workspace once it is old enough
    pub fn keep(mut self) -> Workspace {
        self.armed = false;
        self.manager.unmark_live(self.workspace.id());
        self.workspace.clone()
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            self.manager.release(self.workspace.id());
        } else if self.manager.mark_released(self.workspace.id()) {
            // No runtime to defer on: remove right away.
            if let Err(e) = std::fs::remove_dir_all(self.workspace.path()) {
                warn!(workspace = %self.workspace.id(), error = %e, "Failed to delete workspace");
            }
            mark_removed(&self.manager.inner, self.workspace.id());
        }
    }
}
