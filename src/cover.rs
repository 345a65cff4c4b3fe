use std::path::{Path, PathBuf};

use crate::settings::CoverArtSource;
use crate::tags::TagReader;

/// Picks the artwork for a directory from its entries.
pub struct CoverLocator<'a> {
    source: CoverArtSource,
    file_types: &'a [String],
    tags: &'a dyn TagReader,
}

impl<'a> CoverLocator<'a> {
    pub fn new(source: CoverArtSource, file_types: &'a [String], tags: &'a dyn TagReader) -> Self {
        CoverLocator {
            source,
            file_types,
            tags,
        }
    }

    pub fn locate(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        match self.source {
            CoverArtSource::File => self.file_cover(candidates),
            CoverArtSource::Tag => self.tag_cover(candidates),
            CoverArtSource::Filetag => self
                .file_cover(candidates)
                .or_else(|| self.tag_cover(candidates)),
            CoverArtSource::Tagfile => self
                .tag_cover(candidates)
                .or_else(|| self.file_cover(candidates)),
        }
    }

    fn file_cover(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        self.file_types.iter().find_map(|suffix| {
            candidates
                .iter()
                .find(|c| is_cover_file(c, suffix))
                .cloned()
        })
    }

    fn tag_cover(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates
            .iter()
            .find(|c| c.is_file() && self.tags.can_parse(c) && self.tags.has_embedded_image(c))
            .cloned()
    }
}

fn is_cover_file(path: &Path, suffix: &str) -> bool {
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy().to_lowercase(),
        None => return false,
    };

    name.ends_with(suffix) && !name.starts_with('.') && path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::MetaData;
    use std::fs;

    struct ImageTags;

    impl TagReader for ImageTags {
        fn can_parse(&self, path: &Path) -> bool {
            path.extension().map_or(false, |e| e == "mp3")
        }

        fn read(&self, _path: &Path) -> MetaData {
            MetaData::default()
        }

        fn has_embedded_image(&self, path: &Path) -> bool {
            path.file_name().map_or(false, |n| n == "b.mp3")
        }
    }

    fn setup() -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let mut candidates = Vec::new();
        for name in &["a.mp3", "b.mp3", "back.jpg", "Cover.JPG", ".cover.png"] {
            let p = dir.path().join(name);
            fs::write(&p, b"x").unwrap();
            candidates.push(p);
        }
        fs::create_dir(dir.path().join("dir.png")).unwrap();
        candidates.push(dir.path().join("dir.png"));
        (dir, candidates)
    }

    fn types() -> Vec<String> {
        vec!["cover.jpg".into(), "cover.png".into(), "jpg".into(), "png".into()]
    }

    #[test]
    fn file_policy_follows_suffix_priority() {
        let (_dir, candidates) = setup();
        let types = types();
        let locator = CoverLocator::new(CoverArtSource::File, &types, &ImageTags);

        let found = locator.locate(&candidates).unwrap();
        assert_eq!(found.file_name().unwrap(), "Cover.JPG");
    }

    #[test]
    fn file_policy_skips_dotfiles_and_directories() {
        let (_dir, candidates) = setup();
        let types = vec!["png".to_string()];
        let locator = CoverLocator::new(CoverArtSource::File, &types, &ImageTags);

        assert_eq!(locator.locate(&candidates), None);
    }

    #[test]
    fn tag_policies() {
        let (_dir, candidates) = setup();
        let types = types();

        let tag = CoverLocator::new(CoverArtSource::Tag, &types, &ImageTags);
        assert_eq!(tag.locate(&candidates).unwrap().file_name().unwrap(), "b.mp3");

        let tagfile = CoverLocator::new(CoverArtSource::Tagfile, &types, &ImageTags);
        assert_eq!(tagfile.locate(&candidates).unwrap().file_name().unwrap(), "b.mp3");

        let filetag = CoverLocator::new(CoverArtSource::Filetag, &types, &ImageTags);
        assert_eq!(filetag.locate(&candidates).unwrap().file_name().unwrap(), "Cover.JPG");

        let none: Vec<String> = Vec::new();
        let fallback = CoverLocator::new(CoverArtSource::Filetag, &none, &ImageTags);
        assert_eq!(fallback.locate(&candidates).unwrap().file_name().unwrap(), "b.mp3");
    }
}
