use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::region::OcrData;

/// Opaque per-page persistence.
pub trait PageStore: Send + Sync {
    fn save(&self, page_id: &str, data: &OcrData) -> Result<()>;
    /// `None` when nothing usable is stored for `page_id`.
    fn load(&self, page_id: &str) -> Result<Option<OcrData>>;
    fn delete(&self, page_id: &str) -> Result<bool>;
}

/// One JSON blob per page under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Readable prefix plus a digest of the full id, so distinct ids never
    /// share a file.
    fn page_path(&self, page_id: &str) -> PathBuf {
        let digest = format!("{:x}", md5::compute(page_id.as_bytes()));
        self.dir.join(format!(
            "{}-{}.json",
            sanitize_filename_component(page_id),
            digest
        ))
    }
}

impl PageStore for FileStore {
    fn save(&self, page_id: &str, data: &OcrData) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create page store: {}", self.dir.display()))?;
        let path = self.page_path(page_id);
        let blob = data.to_blob()?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| "failed to create temp file for page")?;
        tmp.write_all(&blob)
            .with_context(|| "failed to write page blob")?;
        tmp.persist(&path)
            .with_context(|| format!("failed to store page: {}", path.display()))?;
        debug!("stored page {} at {}", page_id, path.display());
        Ok(())
    }

    fn load(&self, page_id: &str) -> Result<Option<OcrData>> {
        let path = self.page_path(page_id);
        if !path.exists() {
            return Ok(None);
        }
        let blob =
            fs::read(&path).with_context(|| format!("failed to read page: {}", path.display()))?;
        Ok(OcrData::from_blob(&blob))
    }

    fn delete(&self, page_id: &str) -> Result<bool> {
        let path = self.page_path(page_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed to delete page: {}", path.display()))?;
        Ok(true)
    }
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.chars().all(|ch| ch == '.') {
        "page".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Bounds, Language, Region};
    use tempfile::tempdir;

    fn sample() -> OcrData {
        OcrData {
            regions: vec![Region {
                id: "r0".to_string(),
                bounds: Bounds::clamped(0.1, 0.1, 0.5, 0.2).expect("bounds"),
                original_text: "你好".to_string(),
                translated_text: "Hello".to_string(),
                language: Language::Zh,
                confidence: 0.8,
                is_manually_edited: true,
                custom_font_size: Some(18.0),
            }],
            source_image_width: 640,
            source_image_height: 480,
            processed_at: 1_700_000_000_000,
            dominant_language: Language::Zh,
        }
    }

    #[test]
    fn saved_pages_load_back() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("pages"));
        store.save("scan 1/a", &sample()).expect("save");
        assert!(store.page_path("scan 1/a").exists());
        assert!(
            store
                .page_path("scan 1/a")
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("scan_1_a-") && name.ends_with(".json"))
        );
        let loaded = store.load("scan 1/a").expect("load").expect("page");
        assert_eq!(loaded, sample());
    }

    #[test]
    fn missing_and_malformed_pages_load_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        assert!(store.load("absent").expect("load").is_none());
        fs::write(dir.path().join("broken.json"), b"{not json").expect("write");
        assert!(store.load("broken").expect("load").is_none());
    }

    #[test]
    fn delete_reports_whether_a_page_existed() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        store.save("p", &sample()).expect("save");
        assert!(store.delete("p").expect("delete"));
        assert!(!store.delete("p").expect("delete again"));
    }

    #[test]
    fn ids_with_the_same_readable_name_stay_separate() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let mut other = sample();
        other.regions[0].original_text = "再见".to_string();
        other.source_image_width = 320;

        for (a, b) in [("scan 1/a", "scan_1_a"), ("..", "...")] {
            store.save(a, &sample()).expect("save a");
            store.save(b, &other).expect("save b");
            assert_ne!(store.page_path(a), store.page_path(b));
            assert_eq!(store.load(a).expect("load a").expect("page a"), sample());
            assert_eq!(store.load(b).expect("load b").expect("page b"), other);
            assert!(store.delete(a).expect("delete a"));
            assert!(store.load(b).expect("load b").is_some());
        }
    }

    #[test]
    fn page_ids_cannot_escape_the_store() {
        assert_eq!(sanitize_filename_component(".."), "page");
        assert_eq!(sanitize_filename_component("../x"), ".._x");
    }
}
