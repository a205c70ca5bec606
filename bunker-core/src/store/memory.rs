//! In-memory tables, optionally written through to a JSON file.

use super::snapshot::{self, NextIds, StoreFile, STORE_VERSION};
use super::{Store, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::schema::{
    Chapter, ChapterId, ChapterPatch, Character, CharacterId, CharacterPatch, NewChapter,
    NewCharacter, NewScene, Scene, SceneId, ScenePatch, Setting, Table,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct Tables {
    next_ids: NextIds,
    chapters: BTreeMap<ChapterId, Chapter>,
    scenes: BTreeMap<SceneId, Scene>,
    /// Secondary index: chapter id to the ids of its scenes.
    scenes_by_chapter: HashMap<ChapterId, BTreeSet<SceneId>>,
    characters: BTreeMap<CharacterId, Character>,
    settings: BTreeMap<String, String>,
}

impl Tables {
    fn from_file(file: StoreFile) -> Self {
        let mut tables = Tables {
            next_ids: file.next_ids,
            ..Tables::default()
        };
        for chapter in file.chapters {
            tables.chapters.insert(chapter.id, chapter);
        }
        for scene in file.scenes {
            tables.index_scene(scene.chapter_id, scene.id);
            tables.scenes.insert(scene.id, scene);
        }
        for character in file.characters {
            tables.characters.insert(character.id, character);
        }
        for setting in file.settings {
            tables.settings.insert(setting.key, setting.value);
        }
        tables
    }

    fn to_file(&self) -> StoreFile {
        StoreFile {
            version: STORE_VERSION,
            next_ids: self.next_ids,
            chapters: self.chapters.values().cloned().collect(),
            scenes: self.scenes.values().cloned().collect(),
            characters: self.characters.values().cloned().collect(),
            settings: self
                .settings
                .iter()
                .map(|(key, value)| Setting {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    fn index_scene(&mut self, chapter_id: ChapterId, id: SceneId) {
        self.scenes_by_chapter.entry(chapter_id).or_default().insert(id);
    }

    fn unindex_scene(&mut self, chapter_id: ChapterId, id: SceneId) {
        if let Some(ids) = self.scenes_by_chapter.get_mut(&chapter_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.scenes_by_chapter.remove(&chapter_id);
            }
        }
    }

    fn remove_scene(&mut self, id: SceneId) {
        if let Some(scene) = self.scenes.remove(&id) {
            self.unindex_scene(scene.chapter_id, id);
        }
    }
}

/// The default store.
///
/// Tables live in memory behind an async mutex that is held for exactly one
/// call. When bound to a path, each mutation is applied to a copy, the copy
/// is written to disk, and only then swapped in; a failed write leaves both
/// memory and disk unchanged.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// An empty store that is never written to disk.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            path: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Open a file-backed store, loading the file if it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tables = match snapshot::read(&path).await? {
            Some(file) => Tables::from_file(file),
            None => Tables::default(),
        };

        tracing::debug!(
            path = %path.display(),
            chapters = tables.chapters.len(),
            scenes = tables.scenes.len(),
            "Opened manuscript store"
        );

        Ok(Self {
            tables: Mutex::new(tables),
            path: Some(path),
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different time source for timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Tables, DateTime<Utc>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = self.clock.now();

        let Some(path) = &self.path else {
            return f(&mut tables, now);
        };

        let mut next = tables.clone();
        let out = f(&mut next, now)?;
        if let Err(e) = snapshot::write(path, &next.to_file()).await {
            tracing::error!(path = %path.display(), error = %e, "Store write-through failed");
            return Err(e);
        }
        *tables = next;
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_chapters(&self) -> Result<Vec<Chapter>, StoreError> {
        Ok(self
            .read(|t| {
                let mut chapters: Vec<_> = t.chapters.values().cloned().collect();
                chapters.sort_by_key(|c| (c.order, c.id));
                chapters
            })
            .await)
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StoreError> {
        Ok(self.read(|t| t.chapters.get(&id).cloned()).await)
    }

    async fn create_chapter(&self, new: NewChapter) -> Result<ChapterId, StoreError> {
        self.mutate(|t, now| {
            let id = ChapterId(t.next_ids.chapter);
            t.next_ids.chapter += 1;
            t.chapters.insert(
                id,
                Chapter {
                    id,
                    title: new.title,
                    order: new.order,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(id)
        })
        .await
    }

    async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> Result<(), StoreError> {
        self.mutate(|t, now| {
            let row = t.chapters.get_mut(&id).ok_or(StoreError::NotFound {
                table: Table::Chapters,
                id: id.get(),
            })?;
            patch.apply(row);
            row.updated_at = now;
            Ok(())
        })
        .await
    }

    async fn delete_chapter(&self, id: ChapterId) -> Result<(), StoreError> {
        self.mutate(|t, _| {
            t.chapters.remove(&id);
            Ok(())
        })
        .await
    }

    async fn list_scenes(&self) -> Result<Vec<Scene>, StoreError> {
        Ok(self
            .read(|t| {
                let mut scenes: Vec<_> = t.scenes.values().cloned().collect();
                scenes.sort_by_key(Scene::sort_key);
                scenes
            })
            .await)
    }

    async fn list_scenes_by_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<Scene>, StoreError> {
        Ok(self
            .read(|t| {
                let mut scenes: Vec<_> = t
                    .scenes_by_chapter
                    .get(&chapter_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| t.scenes.get(id).cloned())
                    .collect();
                scenes.sort_by_key(|s| (s.order, s.id));
                scenes
            })
            .await)
    }

    async fn get_scene(&self, id: SceneId) -> Result<Option<Scene>, StoreError> {
        Ok(self.read(|t| t.scenes.get(&id).cloned()).await)
    }

    async fn create_scene(&self, new: NewScene) -> Result<SceneId, StoreError> {
        self.mutate(|t, now| {
            let id = SceneId(t.next_ids.scene);
            t.next_ids.scene += 1;
            t.index_scene(new.chapter_id, id);
            t.scenes.insert(
                id,
                Scene {
                    id,
                    chapter_id: new.chapter_id,
                    title: new.title,
                    content: new.content,
                    order: new.order,
                    characters: new.characters,
                    ai_feedback: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(id)
        })
        .await
    }

    async fn update_scene(&self, id: SceneId, patch: ScenePatch) -> Result<(), StoreError> {
        self.mutate(|t, now| {
            let row = t.scenes.get_mut(&id).ok_or(StoreError::NotFound {
                table: Table::Scenes,
                id: id.get(),
            })?;
            let old_chapter = row.chapter_id;
            patch.apply(row);
            row.updated_at = now;
            let new_chapter = row.chapter_id;
            if new_chapter != old_chapter {
                t.unindex_scene(old_chapter, id);
                t.index_scene(new_chapter, id);
            }
            Ok(())
        })
        .await
    }

    async fn delete_scene(&self, id: SceneId) -> Result<(), StoreError> {
        self.mutate(|t, _| {
            t.remove_scene(id);
            Ok(())
        })
        .await
    }

    async fn bulk_delete_scenes(&self, ids: &[SceneId]) -> Result<(), StoreError> {
        self.mutate(|t, _| {
            for &id in ids {
                t.remove_scene(id);
            }
            Ok(())
        })
        .await
    }

    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        Ok(self.read(|t| t.characters.values().cloned().collect()).await)
    }

    async fn get_character(&self, id: CharacterId) -> Result<Option<Character>, StoreError> {
        Ok(self.read(|t| t.characters.get(&id).cloned()).await)
    }

    async fn find_characters_by_name(&self, name: &str) -> Result<Vec<Character>, StoreError> {
        let needle = name.to_lowercase();
        Ok(self
            .read(|t| {
                t.characters
                    .values()
                    .filter(|c| c.name.to_lowercase() == needle)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn create_character(&self, new: NewCharacter) -> Result<CharacterId, StoreError> {
        self.mutate(|t, _| {
            let id = CharacterId(t.next_ids.character);
            t.next_ids.character += 1;
            t.characters.insert(
                id,
                Character {
                    id,
                    name: new.name,
                    description: new.description,
                    tags: new.tags,
                },
            );
            Ok(id)
        })
        .await
    }

    async fn update_character(
        &self,
        id: CharacterId,
        patch: CharacterPatch,
    ) -> Result<(), StoreError> {
        self.mutate(|t, _| {
            let row = t.characters.get_mut(&id).ok_or(StoreError::NotFound {
                table: Table::Characters,
                id: id.get(),
            })?;
            patch.apply(row);
            Ok(())
        })
        .await
    }

    async fn delete_character(&self, id: CharacterId) -> Result<(), StoreError> {
        self.mutate(|t, _| {
            t.characters.remove(&id);
            Ok(())
        })
        .await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(|t| t.settings.get(key).cloned()).await)
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(|t, _| {
            t.settings.insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn list_settings(&self) -> Result<Vec<Setting>, StoreError> {
        Ok(self
            .read(|t| {
                t.settings
                    .iter()
                    .map(|(key, value)| Setting {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn store_with_clock() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::default();
        let store = MemoryStore::new().with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let store = MemoryStore::new();
        assert!(store.list_chapters().await.unwrap().is_empty());
        assert!(store.list_scenes().await.unwrap().is_empty());
        assert!(store
            .list_scenes_by_chapter(ChapterId(1))
            .await
            .unwrap()
            .is_empty());
        assert!(store.list_characters().await.unwrap().is_empty());
        assert!(store.list_settings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_stamps_equal_timestamps() {
        let (store, _) = store_with_clock();
        let id = store
            .create_chapter(NewChapter {
                title: "프롤로그".to_string(),
                order: 0,
            })
            .await
            .unwrap();

        let chapter = store.get_chapter(id).await.unwrap().unwrap();
        assert_eq!(chapter.created_at, chapter.updated_at);
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at_only() {
        let (store, clock) = store_with_clock();
        let chapter = ChapterId(1);
        let id = store
            .create_scene(NewScene::new(chapter, "씬", 0))
            .await
            .unwrap();
        let before = store.get_scene(id).await.unwrap().unwrap();

        clock.advance(Duration::seconds(3));
        store
            .update_scene(id, ScenePatch::content("<p>본문</p>"))
            .await
            .unwrap();

        let after = store.get_scene(id).await.unwrap().unwrap();
        assert_eq!(after.content, "<p>본문</p>");
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.updated_at - before.updated_at, Duration::seconds(3));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_scene(SceneId(42), ScenePatch::title("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .update_chapter(ChapterId(42), ChapterPatch::title("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound {
                table: Table::Chapters,
                id: 42
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete_scene(SceneId(9)).await.unwrap();
        store.delete_chapter(ChapterId(9)).await.unwrap();
        store.delete_character(CharacterId(9)).await.unwrap();
        store.bulk_delete_scenes(&[SceneId(1), SceneId(2)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = MemoryStore::new();
        let first = store
            .create_scene(NewScene::new(ChapterId(1), "a", 0))
            .await
            .unwrap();
        store.delete_scene(first).await.unwrap();
        let second = store
            .create_scene(NewScene::new(ChapterId(1), "b", 0))
            .await
            .unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_scene_listing_sorts_by_chapter_order_then_id() {
        let store = MemoryStore::new();
        let c1 = ChapterId(1);
        let c2 = ChapterId(2);
        let late = store.create_scene(NewScene::new(c2, "c2-0", 0)).await.unwrap();
        let b = store.create_scene(NewScene::new(c1, "c1-1", 1)).await.unwrap();
        let a = store.create_scene(NewScene::new(c1, "c1-0", 0)).await.unwrap();
        let tie = store.create_scene(NewScene::new(c1, "c1-1b", 1)).await.unwrap();

        let ids: Vec<_> = store
            .list_scenes()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![a, b, tie, late]);

        let in_c1: Vec<_> = store
            .list_scenes_by_chapter(c1)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(in_c1, vec![a, b, tie]);
    }

    #[tokio::test]
    async fn test_moving_scene_updates_chapter_index() {
        let store = MemoryStore::new();
        let id = store
            .create_scene(NewScene::new(ChapterId(1), "떠돌이", 0))
            .await
            .unwrap();

        let patch = ScenePatch {
            chapter_id: Some(ChapterId(2)),
            ..ScenePatch::default()
        };
        store.update_scene(id, patch).await.unwrap();

        assert!(store
            .list_scenes_by_chapter(ChapterId(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.list_scenes_by_chapter(ChapterId(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_upsert() {
        let store = MemoryStore::new();
        assert_eq!(store.get_setting("synopsis").await.unwrap(), None);

        store.put_setting("synopsis", "first").await.unwrap();
        store.put_setting("synopsis", "second").await.unwrap();

        assert_eq!(
            store.get_setting("synopsis").await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(store.list_settings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_characters_by_name_ignores_case() {
        let store = MemoryStore::new();
        store
            .create_character(NewCharacter {
                name: "Minho".to_string(),
                description: String::new(),
                tags: vec![],
            })
            .await
            .unwrap();

        assert_eq!(store.find_characters_by_name("minho").await.unwrap().len(), 1);
        assert!(store.find_characters_by_name("min").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("novel.json");

        let deleted = {
            let store = MemoryStore::open(&path).await.unwrap();
            let chapter = store
                .create_chapter(NewChapter {
                    title: "프롤로그".to_string(),
                    order: 0,
                })
                .await
                .unwrap();
            store
                .create_scene(NewScene::new(chapter, "카페의 아침", 0))
                .await
                .unwrap();
            let doomed = store
                .create_scene(NewScene::new(chapter, "지울 씬", 1))
                .await
                .unwrap();
            store.delete_scene(doomed).await.unwrap();
            store.put_setting("novelTitle", "벙커").await.unwrap();
            doomed
        };

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_chapters().await.unwrap().len(), 1);
        let scenes = reopened.list_scenes().await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].title, "카페의 아침");
        assert_eq!(
            reopened.get_setting("novelTitle").await.unwrap().as_deref(),
            Some("벙커")
        );

        let fresh = reopened
            .create_scene(NewScene::new(ChapterId(1), "새 씬", 1))
            .await
            .unwrap();
        assert!(fresh > deleted);
    }
}
