use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// How long the watcher waits for the filesystem to settle before flushing.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// A directory whose contents changed, ready to hand to `invalidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationEvent {
    /// Directory containing the change.
    pub directory: PathBuf,
    /// The last changed path seen in that directory.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Watches collection base directories and reports debounced invalidations.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
    pub event_rx: mpsc::Receiver<InvalidationEvent>,
}

impl FileWatcher {
    /// Start watching `dirs` recursively. Directories that do not exist yet
    /// are skipped.
    pub fn start(dirs: &[PathBuf]) -> Result<Self, notify::Error> {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = mpsc::channel::<InvalidationEvent>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;

        for dir in dirs {
            if dir.is_dir() {
                watcher.watch(dir, RecursiveMode::Recursive)?;
                log::debug!("Watching {}", dir.display());
            } else {
                log::warn!("Not watching {}: directory does not exist", dir.display());
            }
        }

        let roots = dirs.to_vec();
        let thread = std::thread::spawn(move || {
            let mut pending = PendingChanges::default();
            let mut last_event = Instant::now();

            loop {
                match notify_rx.recv_timeout(DEBOUNCE) {
                    Ok(Ok(event)) => {
                        if let Some(kind) = change_kind(&event.kind) {
                            for path in event.paths {
                                if !is_hidden(&path, &roots) {
                                    pending.push(path, kind);
                                }
                            }
                        }
                        last_event = Instant::now();
                    }
                    Ok(Err(e)) => {
                        log::warn!("File watcher error: {e}");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if !pending.is_empty() && last_event.elapsed() >= DEBOUNCE {
                            for event in pending.drain() {
                                if event_tx.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(FileWatcher {
            _watcher: watcher,
            _thread: thread,
            event_rx,
        })
    }
}

/// The kind of file change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Changes collected during one debounce window, one per directory.
#[derive(Default)]
struct PendingChanges {
    by_directory: HashMap<PathBuf, (PathBuf, ChangeKind)>,
}

impl PendingChanges {
    fn push(&mut self, path: PathBuf, kind: ChangeKind) {
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
        self.by_directory.insert(directory, (path, kind));
    }

    fn is_empty(&self) -> bool {
        self.by_directory.is_empty()
    }

    /// Flush in directory order.
    fn drain(&mut self) -> Vec<InvalidationEvent> {
        let mut events: Vec<InvalidationEvent> = self
            .by_directory
            .drain()
            .map(|(directory, (path, kind))| InvalidationEvent {
                directory,
                path,
                kind,
            })
            .collect();
        events.sort_by(|a, b| a.directory.cmp(&b.directory));
        events
    }
}

/// Whether any component below the watched root starts with a dot.
fn is_hidden(path: &Path, roots: &[PathBuf]) -> bool {
    let relative = roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_str().map_or(false, |n| n.starts_with('.')),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pending_changes_dedupe_by_directory() {
        let mut pending = PendingChanges::default();
        pending.push(PathBuf::from("/site/docs/a.md"), ChangeKind::Created);
        pending.push(PathBuf::from("/site/docs/b.md"), ChangeKind::Modified);
        pending.push(PathBuf::from("/site/blog/c.md"), ChangeKind::Deleted);

        let events = pending.drain();
        assert!(pending.is_empty());
        assert_eq!(
            events,
            vec![
                InvalidationEvent {
                    directory: PathBuf::from("/site/blog"),
                    path: PathBuf::from("/site/blog/c.md"),
                    kind: ChangeKind::Deleted,
                },
                InvalidationEvent {
                    directory: PathBuf::from("/site/docs"),
                    path: PathBuf::from("/site/docs/b.md"),
                    kind: ChangeKind::Modified,
                },
            ]
        );
    }

    #[test]
    fn test_hidden_paths() {
        let roots = vec![PathBuf::from("/home/.cache/site")];
        assert!(is_hidden(Path::new("/home/.cache/site/.git/index"), &roots));
        assert!(is_hidden(Path::new("/home/.cache/site/docs/.draft.md"), &roots));
        assert!(!is_hidden(Path::new("/home/.cache/site/docs/01.intro.md"), &roots));
    }

    #[test]
    fn test_reports_changes_in_watched_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        std::fs::create_dir_all(&dir).unwrap();

        let watcher = FileWatcher::start(&[dir.clone()]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(dir.join("new.md"), "# New\n").unwrap();

        let event = watcher
            .event_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("watcher should report the write");
        assert_eq!(event.path.file_name().unwrap(), "new.md");
    }
}
