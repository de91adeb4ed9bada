//! Intake directory scanning, file stability tracking, and change watching.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::processor::DocumentKind;

/// Enumerates candidate documents in the intake directory.
pub struct DirectoryScanner {
    scan_dir: PathBuf,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(scan_dir: P) -> Self {
        Self {
            scan_dir: scan_dir.as_ref().to_path_buf(),
        }
    }

    pub fn scan_dir(&self) -> &Path {
        &self.scan_dir
    }

    /// Returns supported files at the top level of the intake directory,
    /// sorted by path for deterministic emission order.
    pub fn scan(&self) -> Result<Vec<PathBuf>, WorkerError> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(&self.scan_dir)
            .min_depth(1)
            .max_depth(1) // Only scan top level, not subdirectories
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if path.is_dir() {
                continue;
            }

            if DocumentKind::from_path(path).is_some() {
                debug!("Found document: {}", path.display());
                candidates.push(path.to_path_buf());
            }
        }

        candidates.sort();
        Ok(candidates)
    }

    /// Watches the intake directory and invokes `callback` for each change
    /// event on a supported file, until the shutdown flag flips.
    ///
    /// Uses a `PollWatcher` for Docker/NFS compatibility. Callers still run
    /// emitted paths through the stability gate — an event only wakes the
    /// scan loop early.
    pub fn watch<F>(&self, callback: F, shutdown: Arc<AtomicBool>) -> Result<(), WorkerError>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let scan_dir = self.scan_dir.clone();

        let poll_config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));

        let debouncer_config = DebouncerConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&scan_dir, RecursiveMode::NonRecursive)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        info!("Watching directory: {}", scan_dir.display());

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Watch mode shutting down...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    for event in events {
                        if matches!(event.kind, DebouncedEventKind::Any) {
                            let path = &event.path;

                            if path.is_dir() {
                                continue;
                            }

                            if path.exists() && DocumentKind::from_path(path).is_some() {
                                debug!("Change detected: {}", path.display());
                                callback(path.to_path_buf());
                            }
                        }
                    }
                }
                Ok(Err(errors)) => {
                    warn!("Watch error: {:?}", errors);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    size: u64,
    mtime: Option<SystemTime>,
}

#[derive(Debug)]
struct TrackedFile {
    observation: Observation,
    seen_at: Instant,
    emitted: bool,
}

/// The settle gate: a candidate path is emitted only once its size and
/// mtime are unchanged across two observations at least the settle
/// interval apart.
///
/// Each stable path is emitted once. A path that leaves the intake
/// directory is forgotten, so a new file under the same name later becomes
/// eligible again. Changed files restart their settle window.
pub struct StabilityTracker {
    settle: Duration,
    tracked: HashMap<PathBuf, TrackedFile>,
}

impl StabilityTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            tracked: HashMap::new(),
        }
    }

    /// Feeds one scan's candidates through the gate and returns the paths
    /// that just became stable.
    pub fn observe(&mut self, candidates: &[PathBuf]) -> Vec<PathBuf> {
        // Forget paths no longer present so reappearing names re-qualify.
        self.tracked
            .retain(|path, _| candidates.iter().any(|c| c == path));

        let mut stable = Vec::new();
        let now = Instant::now();

        for path in candidates {
            let Some(observation) = observe_file(path) else {
                // Vanished between enumeration and stat.
                self.tracked.remove(path);
                continue;
            };

            match self.tracked.get_mut(path) {
                Some(tracked) if tracked.observation == observation => {
                    if !tracked.emitted && now.duration_since(tracked.seen_at) >= self.settle {
                        tracked.emitted = true;
                        stable.push(path.clone());
                    }
                }
                Some(tracked) => {
                    // Still being written; restart the settle window.
                    tracked.observation = observation;
                    tracked.seen_at = now;
                    tracked.emitted = false;
                }
                None => {
                    self.tracked.insert(
                        path.clone(),
                        TrackedFile {
                            observation,
                            seen_at: now,
                            emitted: false,
                        },
                    );
                }
            }
        }

        stable
    }
}

fn observe_file(path: &Path) -> Option<Observation> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(Observation {
        size: metadata.len(),
        mtime: metadata.modified().ok(),
    })
}
