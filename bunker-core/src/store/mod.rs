//! Durable CRUD primitives over the manuscript schema.
//!
//! Every method is async and is a suspension point: two calls issued without
//! an await between them may interleave with timers and other store calls.
//! Multi-row operations are not atomic from the caller's point of view.

mod memory;
mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::STORE_VERSION;

use crate::schema::{
    Chapter, ChapterId, ChapterPatch, Character, CharacterId, CharacterPatch, NewChapter,
    NewCharacter, NewScene, Scene, SceneId, ScenePatch, Setting, Table,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} row {id} not found")]
    NotFound { table: Table, id: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// The persistent store contract.
///
/// Listing order: chapters by `(order, id)`, scenes by
/// `(chapter_id, order, id)`, characters by id, settings by key. Deletes are
/// idempotent. Ids are never reused within a store's lifetime.
#[async_trait]
pub trait Store: Send + Sync {
    // Chapters

    async fn list_chapters(&self) -> Result<Vec<Chapter>, StoreError>;

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StoreError>;

    async fn create_chapter(&self, new: NewChapter) -> Result<ChapterId, StoreError>;

    /// Fails with `NotFound` when the chapter does not exist.
    async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> Result<(), StoreError>;

    async fn delete_chapter(&self, id: ChapterId) -> Result<(), StoreError>;

    // Scenes

    async fn list_scenes(&self) -> Result<Vec<Scene>, StoreError>;

    async fn list_scenes_by_chapter(&self, chapter_id: ChapterId)
        -> Result<Vec<Scene>, StoreError>;

    async fn get_scene(&self, id: SceneId) -> Result<Option<Scene>, StoreError>;

    async fn create_scene(&self, new: NewScene) -> Result<SceneId, StoreError>;

    /// Fails with `NotFound` when the scene does not exist.
    async fn update_scene(&self, id: SceneId, patch: ScenePatch) -> Result<(), StoreError>;

    async fn delete_scene(&self, id: SceneId) -> Result<(), StoreError>;

    async fn bulk_delete_scenes(&self, ids: &[SceneId]) -> Result<(), StoreError>;

    // Characters

    async fn list_characters(&self) -> Result<Vec<Character>, StoreError>;

    async fn get_character(&self, id: CharacterId) -> Result<Option<Character>, StoreError>;

    /// Case-insensitive exact match on `name`.
    async fn find_characters_by_name(&self, name: &str) -> Result<Vec<Character>, StoreError>;

    async fn create_character(&self, new: NewCharacter) -> Result<CharacterId, StoreError>;

    async fn update_character(
        &self,
        id: CharacterId,
        patch: CharacterPatch,
    ) -> Result<(), StoreError>;

    async fn delete_character(&self, id: CharacterId) -> Result<(), StoreError>;

    // Settings

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite.
    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn list_settings(&self) -> Result<Vec<Setting>, StoreError>;
}
