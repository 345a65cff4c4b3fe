use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    Media,
    Podcast,
}

impl Default for FolderType {
    fn default() -> FolderType {
        FolderType::Media
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicFolder {
    pub id: i64,
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub folder_type: FolderType,
}

impl MusicFolder {
    pub fn new(id: i64, name: &str, path: &Path, folder_type: FolderType) -> MusicFolder {
        MusicFolder {
            id,
            name: name.to_string(),
            path: path.to_path_buf(),
            folder_type,
        }
    }

    /// `full` relative to this folder's root, or `None` when it lies outside it.
    pub fn relativize(&self, full: &Path) -> Option<String> {
        full.strip_prefix(&self.path)
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

/// Resolves paths to the configured folder roots that own them.
pub trait FolderCatalog: Send + Sync {
    fn folder_for_path(&self, path: &Path) -> Option<MusicFolder>;
    fn folder_by_id(&self, id: i64) -> Option<MusicFolder>;
    fn folders(&self) -> Vec<MusicFolder>;
}

/// Fixed set of roots given on the command line or in the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    roots: Vec<MusicFolder>,
}

impl StaticCatalog {
    pub fn new(roots: Vec<MusicFolder>) -> StaticCatalog {
        StaticCatalog { roots }
    }
}

impl FolderCatalog for StaticCatalog {
    fn folder_for_path(&self, path: &Path) -> Option<MusicFolder> {
        // Roots may nest; the deepest one containing the path owns it.
        self.roots
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
            .cloned()
    }

    fn folder_by_id(&self, id: i64) -> Option<MusicFolder> {
        self.roots.iter().find(|r| r.id == id).cloned()
    }

    fn folders(&self) -> Vec<MusicFolder> {
        self.roots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_roots_resolve_to_deepest() {
        let catalog = StaticCatalog::new(vec![
            MusicFolder::new(1, "music", Path::new("/srv/music"), FolderType::Media),
            MusicFolder::new(2, "pods", Path::new("/srv/music/pods"), FolderType::Podcast),
        ]);

        let owner = catalog.folder_for_path(Path::new("/srv/music/pods/show/ep1.mp3"));
        assert_eq!(owner.map(|f| f.id), Some(2));

        let owner = catalog.folder_for_path(Path::new("/srv/music/album/01.flac"));
        assert_eq!(owner.map(|f| f.id), Some(1));

        assert!(catalog.folder_for_path(Path::new("/srv/other")).is_none());
    }

    #[test]
    fn relativize_strips_root() {
        let folder = MusicFolder::new(1, "music", Path::new("/srv/music"), FolderType::Media);
        assert_eq!(
            folder.relativize(Path::new("/srv/music/a/b.mp3")).as_deref(),
            Some("a/b.mp3")
        );
        assert_eq!(folder.relativize(Path::new("/srv/music")).as_deref(), Some(""));
        assert_eq!(folder.relativize(Path::new("/tmp/x")), None);
    }
}
