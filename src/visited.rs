use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use log::warn;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Topic;

const VISITED_FILE: &str = "visited-topics.json";

/// Topics a reader has opened from a shared view. Persisted as a JSON array
/// of ids when backed by a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitedTopics {
    path: Option<PathBuf>,
    ids: BTreeSet<String>,
}

impl VisitedTopics {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "roadmap-editor")
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(project_dirs.data_dir().join(VISITED_FILE))
    }

    /// Loads the set stored at `path`. A missing file is an empty set; an
    /// unreadable one is reported and replaced on the next write.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let ids = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!("discarding unreadable visit history {}: {err}", path.display());
                BTreeSet::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Self { path: Some(path), ids })
    }

    pub fn is_visited(&self, topic_id: &str) -> bool {
        self.ids.contains(topic_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Records a visit. Topics without a link cannot be opened and are
    /// ignored. Returns whether the set changed.
    pub fn mark(&mut self, topic: &Topic) -> Result<bool> {
        if !topic.has_link() || !self.ids.insert(topic.id.clone()) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ids.clear();
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to remove {}", path.display()));
                }
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let json = serde_json::to_string(&self.ids)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn linked(id: &str) -> Topic {
        let mut topic = Topic::new(id, id);
        topic.link = format!("https://example.com/{id}");
        topic
    }

    #[test]
    fn visits_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(VISITED_FILE);

        let mut visited = VisitedTopics::load(&path).unwrap();
        assert!(visited.is_empty());
        assert!(visited.mark(&linked("a")).unwrap());
        assert!(!visited.mark(&linked("a")).unwrap());
        assert!(!visited.mark(&Topic::new("b", "no link")).unwrap());

        let reloaded = VisitedTopics::load(&path).unwrap();
        assert!(reloaded.is_visited("a"));
        assert!(!reloaded.is_visited("b"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn clearing_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(VISITED_FILE);
        let mut visited = VisitedTopics::load(&path).unwrap();
        visited.mark(&linked("a")).unwrap();
        visited.clear().unwrap();
        assert!(!path.exists());
        assert!(VisitedTopics::load(&path).unwrap().is_empty());
    }

    #[test]
    fn corrupt_history_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(VISITED_FILE);
        fs::write(&path, "{oops").unwrap();
        assert!(VisitedTopics::load(&path).unwrap().is_empty());
    }
}
