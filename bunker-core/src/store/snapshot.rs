//! On-disk format of a file-backed store.
//!
//! One JSON document holding every table plus the id counters, written to a
//! temporary sibling and renamed over the target.

use crate::schema::{Chapter, Character, Scene, Setting};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::StoreError;

/// Current store file version.
pub const STORE_VERSION: u32 = 1;

/// Next id to hand out, per table. Starts at 1 and only grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NextIds {
    pub chapter: u64,
    pub scene: u64,
    pub character: u64,
}

impl Default for NextIds {
    fn default() -> Self {
        Self {
            chapter: 1,
            scene: 1,
            character: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreFile {
    pub version: u32,
    pub next_ids: NextIds,
    pub chapters: Vec<Chapter>,
    pub scenes: Vec<Scene>,
    pub characters: Vec<Character>,
    pub settings: Vec<Setting>,
}

impl StoreFile {
    /// Raise counters past any id present in the file.
    pub fn repair_counters(&mut self) {
        let max_chapter = self.chapters.iter().map(|c| c.id.get()).max().unwrap_or(0);
        let max_scene = self.scenes.iter().map(|s| s.id.get()).max().unwrap_or(0);
        let max_character = self.characters.iter().map(|c| c.id.get()).max().unwrap_or(0);

        self.next_ids.chapter = self.next_ids.chapter.max(max_chapter + 1);
        self.next_ids.scene = self.next_ids.scene.max(max_scene + 1);
        self.next_ids.character = self.next_ids.character.max(max_character + 1);
    }
}

/// Read a store file. A missing file yields `None`.
pub(crate) async fn read(path: &Path) -> Result<Option<StoreFile>, StoreError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut file: StoreFile = serde_json::from_str(&content)?;
    if file.version != STORE_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: STORE_VERSION,
            found: file.version,
        });
    }
    file.repair_counters();
    Ok(Some(file))
}

/// Replace the store file with `file`.
pub(crate) async fn write(path: &Path, file: &StoreFile) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(file)?;
    let tmp = temp_path(path);
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store.json".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
