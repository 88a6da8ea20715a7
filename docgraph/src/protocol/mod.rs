//! Messages exchanged on a live-reload channel.
//!
//! Clients send `watch`/`unwatch` to manage the set of directories they care
//! about and `refresh` when something under one of them changed. The
//! transport is up to the embedding server; this module only parses and
//! serializes messages and keeps per-connection state.

use crate::collection::Collection;
use crate::error::Result;
use crate::project::Project;
use crate::watcher::InvalidationEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A live-reload notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Message {
    Watch { directory: PathBuf },
    Unwatch { directory: PathBuf },
    Refresh { directory: PathBuf },
}

impl Message {
    pub fn directory(&self) -> &Path {
        match self {
            Message::Watch { directory }
            | Message::Unwatch { directory }
            | Message::Refresh { directory } => directory,
        }
    }
}

impl From<InvalidationEvent> for Message {
    fn from(event: InvalidationEvent) -> Self {
        Message::Refresh {
            directory: event.directory,
        }
    }
}

pub fn parse_message(text: &str) -> Result<Message> {
    Ok(serde_json::from_str(text)?)
}

pub fn to_json(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Something that can drop cached state for a directory.
pub trait InvalidationTarget {
    /// Returns whether anything was affected.
    fn invalidate_path(&self, path: &Path) -> bool;
}

impl InvalidationTarget for Collection {
    fn invalidate_path(&self, path: &Path) -> bool {
        self.invalidate(path)
    }
}

impl InvalidationTarget for Project {
    fn invalidate_path(&self, path: &Path) -> bool {
        self.invalidate(path) > 0
    }
}

/// State of one live-reload connection.
#[derive(Debug, Default)]
pub struct WatchSession {
    watched: BTreeSet<PathBuf>,
}

impl WatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.iter().any(|dir| path.starts_with(dir))
    }

    /// Apply a message. Returns the directory that was invalidated, if any.
    ///
    /// Refreshes outside every watched directory are ignored.
    pub fn handle(&mut self, message: Message, target: &dyn InvalidationTarget) -> Option<PathBuf> {
        match message {
            Message::Watch { directory } => {
                log::debug!("Session watching {}", directory.display());
                self.watched.insert(directory);
                None
            }
            Message::Unwatch { directory } => {
                log::debug!("Session stopped watching {}", directory.display());
                self.watched.remove(&directory);
                None
            }
            Message::Refresh { directory } => {
                if !self.is_watching(&directory) {
                    log::debug!("Ignoring refresh of unwatched {}", directory.display());
                    return None;
                }
                target.invalidate_path(&directory).then_some(directory)
            }
        }
    }

    /// Forget every watched directory, as when the connection closes.
    pub fn close(&mut self) {
        self.watched.clear();
    }
}
