//! The editor context: an in-memory mirror of the store plus selection and
//! loading state.
//!
//! Every mutation goes through an action on [`EditorContext`]. An action
//! writes to the store first and then reconciles the mirror, either by a full
//! reload (structural changes) or by patching the touched rows in place.
//! Subscribers see each reconciled [`Snapshot`] through a `watch` channel.
//!
//! Contexts are cheap to clone; clones share the same store and snapshot.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::EditorError;
use crate::feedback::{FeedbackRequest, FeedbackService, GrammarRequest};
use crate::ordering;
use crate::schema::{
    Chapter, ChapterId, ChapterPatch, Character, CharacterId, CharacterPatch, NewCharacter, Scene,
    SceneId, ScenePatch, NOVEL_TITLE_KEY, SYNOPSIS_KEY,
};
use crate::store::{Store, StoreError};

/// Which text field of a scene an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneField {
    Title,
    Content,
}

/// Transient progress flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingFlags {
    /// At least one load has completed.
    pub initialized: bool,
    /// A full reload is in flight.
    pub reloading: bool,
    /// A feedback or grammar request is in flight.
    pub ai: bool,
}

/// The mirrored state.
///
/// `chapters` and `scenes` are kept in store listing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub chapters: Vec<Chapter>,
    pub scenes: Vec<Scene>,
    pub characters: Vec<Character>,
    pub settings: BTreeMap<String, String>,
    pub selected_scene_id: Option<SceneId>,
    pub loading: LoadingFlags,
    /// Scenes present in the store whose chapter no longer exists. They are
    /// left out of `scenes`.
    pub hidden_orphans: Vec<SceneId>,
}

impl Snapshot {
    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Scenes of one chapter, by order.
    pub fn scenes_for_chapter(&self, id: ChapterId) -> impl Iterator<Item = &Scene> {
        self.scenes.iter().filter(move |s| s.chapter_id == id)
    }

    pub fn selected_scene(&self) -> Option<&Scene> {
        self.selected_scene_id.and_then(|id| self.scene(id))
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn novel_title(&self) -> &str {
        self.setting(NOVEL_TITLE_KEY).unwrap_or_default()
    }

    pub fn synopsis(&self) -> &str {
        self.setting(SYNOPSIS_KEY).unwrap_or_default()
    }

    fn clear_stale_selection(&mut self) {
        if let Some(id) = self.selected_scene_id {
            if self.scene(id).is_none() {
                tracing::debug!(scene_id = %id, "Clearing selection of removed scene");
                self.selected_scene_id = None;
            }
        }
    }
}

/// Everything a full reload reads from the store.
struct Loaded {
    chapters: Vec<Chapter>,
    scenes: Vec<Scene>,
    characters: Vec<Character>,
    settings: BTreeMap<String, String>,
}

struct Inner {
    store: Arc<dyn Store>,
    feedback: Option<Arc<dyn FeedbackService>>,
    state: watch::Sender<Snapshot>,
}

/// Shared handle to the editor state and its actions.
#[derive(Clone)]
pub struct EditorContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EditorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("EditorContext")
            .field("chapters", &state.chapters.len())
            .field("scenes", &state.scenes.len())
            .field("selected_scene_id", &state.selected_scene_id)
            .field("feedback", &self.inner.feedback.is_some())
            .finish()
    }
}

impl EditorContext {
    /// A context over `store` with an empty, uninitialized snapshot.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::from_parts(store, None, Snapshot::default())
    }

    /// Attach a feedback service. Call before handing out clones or
    /// subscribing; the returned context has its own snapshot channel.
    pub fn with_feedback(self, service: Arc<dyn FeedbackService>) -> Self {
        let snapshot = self.inner.state.borrow().clone();
        Self::from_parts(self.inner.store.clone(), Some(service), snapshot)
    }

    fn from_parts(
        store: Arc<dyn Store>,
        feedback: Option<Arc<dyn FeedbackService>>,
        snapshot: Snapshot,
    ) -> Self {
        let (state, _) = watch::channel(snapshot);
        Self {
            inner: Arc::new(Inner {
                store,
                feedback,
                state,
            }),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    // =====================================================================
    // Reads (never touch the store)
    // =====================================================================

    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.borrow().clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.state.subscribe()
    }

    pub fn list_chapters(&self) -> Vec<Chapter> {
        self.read(|s| s.chapters.clone())
    }

    pub fn list_scenes(&self) -> Vec<Scene> {
        self.read(|s| s.scenes.clone())
    }

    pub fn list_characters(&self) -> Vec<Character> {
        self.read(|s| s.characters.clone())
    }

    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.read(|s| s.setting(key).map(str::to_string))
    }

    pub fn scenes_for_chapter(&self, id: ChapterId) -> Vec<Scene> {
        self.read(|s| s.scenes_for_chapter(id).cloned().collect())
    }

    pub fn selected_scene(&self) -> Option<Scene> {
        self.read(|s| s.selected_scene().cloned())
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    fn publish(&self, f: impl FnOnce(&mut Snapshot)) {
        self.inner.state.send_modify(f);
    }

    fn store_ref(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    // =====================================================================
    // Loading
    // =====================================================================

    /// Replace the snapshot with the full contents of the store.
    ///
    /// Scenes whose chapter is missing are hidden and recorded in
    /// `hidden_orphans`. A selection that no longer resolves is cleared.
    pub async fn load(&self) -> Result<(), EditorError> {
        self.publish(|s| s.loading.reloading = true);

        let loaded = match self.fetch_all().await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.publish(|s| s.loading.reloading = false);
                tracing::error!(error = %e, "Failed to load manuscript");
                return Err(e.into());
            }
        };

        let live: HashSet<ChapterId> = loaded.chapters.iter().map(|c| c.id).collect();
        let (scenes, orphans): (Vec<Scene>, Vec<Scene>) = loaded
            .scenes
            .into_iter()
            .partition(|s| live.contains(&s.chapter_id));
        let hidden_orphans: Vec<SceneId> = orphans.iter().map(|s| s.id).collect();

        if !hidden_orphans.is_empty() {
            tracing::warn!(
                count = hidden_orphans.len(),
                ids = ?hidden_orphans,
                "Hiding scenes whose chapter no longer exists"
            );
        }

        self.publish(move |s| {
            s.chapters = loaded.chapters;
            s.scenes = scenes;
            s.characters = loaded.characters;
            s.settings = loaded.settings;
            s.hidden_orphans = hidden_orphans;
            s.loading.initialized = true;
            s.loading.reloading = false;
            s.clear_stale_selection();
        });

        Ok(())
    }

    /// Same as [`load`](Self::load).
    pub async fn reload(&self) -> Result<(), EditorError> {
        self.load().await
    }

    async fn fetch_all(&self) -> Result<Loaded, StoreError> {
        let store = self.store_ref();
        let chapters = store.list_chapters().await?;
        let scenes = store.list_scenes().await?;
        let characters = store.list_characters().await?;
        let settings = store
            .list_settings()
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();

        Ok(Loaded {
            chapters,
            scenes,
            characters,
            settings,
        })
    }

    /// Best-effort reload after a structural action failed part way.
    async fn reconcile(&self) {
        if let Err(e) = self.load().await {
            tracing::warn!(error = %e, "Reconciliation reload failed");
        }
    }

    // =====================================================================
    // Chapters
    // =====================================================================

    /// Append a chapter after all existing chapters.
    pub async fn create_chapter(&self, title: &str) -> Result<ChapterId, EditorError> {
        let title = required("Chapter title", title)?;
        let id = ordering::append_chapter(self.store_ref(), title).await?;
        tracing::info!(chapter_id = %id, "Chapter created");
        self.load().await?;
        Ok(id)
    }

    pub async fn update_chapter_title(
        &self,
        id: ChapterId,
        title: &str,
    ) -> Result<(), EditorError> {
        let title = required("Chapter title", title)?;
        self.store_ref()
            .update_chapter(id, ChapterPatch::title(title))
            .await?;
        self.refresh_chapter(id).await
    }

    /// Delete a chapter and all of its scenes.
    ///
    /// Scenes are removed before the chapter. If any step fails the snapshot
    /// is reloaded to reflect what was actually removed.
    pub async fn delete_chapter(&self, id: ChapterId) -> Result<(), EditorError> {
        let store = self.store_ref();
        let scenes = store.list_scenes_by_chapter(id).await?;
        let plan = ordering::plan_cascade_delete(id, &scenes);

        if let Err(e) = plan.execute(store).await {
            tracing::error!(chapter_id = %id, error = %e, "Cascade delete failed");
            self.reconcile().await;
            return Err(e.into());
        }

        tracing::info!(chapter_id = %id, scenes = scenes.len(), "Chapter deleted");
        self.publish(|s| {
            s.chapters.retain(|c| c.id != id);
            s.scenes.retain(|scene| scene.chapter_id != id);
            s.clear_stale_selection();
        });
        Ok(())
    }

    /// Set a chapter's order directly. Other chapters keep theirs.
    pub async fn reorder_chapter(&self, id: ChapterId, order: i64) -> Result<(), EditorError> {
        ordering::reorder_chapter(self.store_ref(), id, order).await?;
        self.load().await
    }

    async fn refresh_chapter(&self, id: ChapterId) -> Result<(), EditorError> {
        let row = self.store_ref().get_chapter(id).await?;
        self.publish(|s| match row {
            Some(row) => {
                if let Some(slot) = s.chapters.iter_mut().find(|c| c.id == id) {
                    *slot = row;
                }
            }
            None => s.chapters.retain(|c| c.id != id),
        });
        Ok(())
    }

    // =====================================================================
    // Scenes
    // =====================================================================

    /// Create a scene, appended when `order` is `None`, otherwise inserted at
    /// `order` with later siblings shifted up.
    pub async fn create_scene(
        &self,
        chapter_id: ChapterId,
        title: &str,
        order: Option<i64>,
    ) -> Result<SceneId, EditorError> {
        let title = required("Scene title", title)?;
        let store = self.store_ref();

        if store.get_chapter(chapter_id).await?.is_none() {
            return Err(EditorError::not_found("Chapter", chapter_id.get()));
        }

        let id = match ordering::create_scene(store, chapter_id, title, order).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(chapter_id = %chapter_id, error = %e, "Scene creation failed");
                self.reconcile().await;
                return Err(e.into());
            }
        };

        tracing::info!(scene_id = %id, chapter_id = %chapter_id, ?order, "Scene created");
        self.load().await?;
        Ok(id)
    }

    /// Write one text field of a scene.
    pub async fn update_scene_field(
        &self,
        id: SceneId,
        field: SceneField,
        value: &str,
    ) -> Result<(), EditorError> {
        let patch = match field {
            SceneField::Title => ScenePatch::title(required("Scene title", value)?),
            SceneField::Content => ScenePatch::content(value),
        };
        self.store_ref().update_scene(id, patch).await?;
        self.refresh_scene(id).await
    }

    /// Replace a scene's free-text character list.
    pub async fn update_scene_characters(
        &self,
        id: SceneId,
        names: Vec<String>,
    ) -> Result<(), EditorError> {
        self.store_ref()
            .update_scene(id, ScenePatch::characters(names))
            .await?;
        self.refresh_scene(id).await
    }

    /// Delete one scene. Deleting an absent id succeeds.
    pub async fn delete_scene(&self, id: SceneId) -> Result<(), EditorError> {
        self.store_ref().delete_scene(id).await?;
        tracing::info!(scene_id = %id, "Scene deleted");
        self.publish(|s| {
            s.scenes.retain(|scene| scene.id != id);
            s.clear_stale_selection();
        });
        Ok(())
    }

    /// Set a scene's order directly. Siblings are not re-sequenced, so two
    /// scenes can end up sharing an order.
    pub async fn reorder_scene(&self, id: SceneId, order: i64) -> Result<(), EditorError> {
        ordering::reorder_scene(self.store_ref(), id, order).await?;
        self.load().await
    }

    /// Select a scene, or clear the selection with `None`.
    pub fn select(&self, id: Option<SceneId>) -> Result<(), EditorError> {
        if let Some(id) = id {
            if self.read(|s| s.scene(id).is_none()) {
                return Err(EditorError::not_found("Scene", id.get()));
            }
        }
        self.publish(|s| s.selected_scene_id = id);
        Ok(())
    }

    /// Delete scenes whose chapter is gone. Returns how many were removed.
    pub async fn purge_orphans(&self) -> Result<usize, EditorError> {
        let store = self.store_ref();
        let live: HashSet<ChapterId> = store
            .list_chapters()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let orphans: Vec<SceneId> = store
            .list_scenes()
            .await?
            .into_iter()
            .filter(|s| !live.contains(&s.chapter_id))
            .map(|s| s.id)
            .collect();

        if !orphans.is_empty() {
            store.bulk_delete_scenes(&orphans).await?;
            tracing::info!(count = orphans.len(), "Purged orphaned scenes");
        }
        self.load().await?;
        Ok(orphans.len())
    }

    async fn refresh_scene(&self, id: SceneId) -> Result<(), EditorError> {
        let row = self.store_ref().get_scene(id).await?;
        self.publish(|s| {
            match row {
                Some(row) => {
                    if let Some(slot) = s.scenes.iter_mut().find(|scene| scene.id == id) {
                        *slot = row;
                    }
                }
                None => s.scenes.retain(|scene| scene.id != id),
            }
            s.clear_stale_selection();
        });
        Ok(())
    }

    // =====================================================================
    // Settings and characters
    // =====================================================================

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), EditorError> {
        self.store_ref().put_setting(key, value).await?;
        let (key, value) = (key.to_string(), value.to_string());
        self.publish(|s| {
            s.settings.insert(key, value);
        });
        Ok(())
    }

    pub async fn update_novel_title(&self, title: &str) -> Result<(), EditorError> {
        self.put_setting(NOVEL_TITLE_KEY, title).await
    }

    pub async fn update_synopsis(&self, synopsis: &str) -> Result<(), EditorError> {
        self.put_setting(SYNOPSIS_KEY, synopsis).await
    }

    pub async fn create_character(
        &self,
        name: &str,
        description: &str,
        tags: Vec<String>,
    ) -> Result<CharacterId, EditorError> {
        let name = required("Character name", name)?;
        let id = self
            .store_ref()
            .create_character(NewCharacter {
                name,
                description: description.to_string(),
                tags,
            })
            .await?;
        self.load().await?;
        Ok(id)
    }

    pub async fn update_character(
        &self,
        id: CharacterId,
        patch: CharacterPatch,
    ) -> Result<(), EditorError> {
        if let Some(name) = &patch.name {
            required("Character name", name)?;
        }
        let store = self.store_ref();
        store.update_character(id, patch).await?;
        let row = store.get_character(id).await?;
        self.publish(|s| match row {
            Some(row) => {
                if let Some(slot) = s.characters.iter_mut().find(|c| c.id == id) {
                    *slot = row;
                }
            }
            None => s.characters.retain(|c| c.id != id),
        });
        Ok(())
    }

    pub async fn delete_character(&self, id: CharacterId) -> Result<(), EditorError> {
        self.store_ref().delete_character(id).await?;
        self.publish(|s| s.characters.retain(|c| c.id != id));
        Ok(())
    }

    // =====================================================================
    // AI collaborator
    // =====================================================================

    /// Ask for editorial feedback on a scene and store it on the scene.
    ///
    /// The request carries the scene content, the synopsis setting and the
    /// scene's character list. Service errors come back as
    /// [`EditorError::Upstream`] with the service's message unchanged.
    pub async fn request_feedback(&self, id: SceneId) -> Result<String, EditorError> {
        let service = self.feedback_service()?;
        let request = self
            .read(|s| {
                s.scene(id).map(|scene| FeedbackRequest {
                    scene_content: scene.content.clone(),
                    synopsis: s.synopsis().to_string(),
                    characters: scene.characters.clone(),
                })
            })
            .ok_or_else(|| EditorError::not_found("Scene", id.get()))?;

        self.publish(|s| s.loading.ai = true);
        let result = service.feedback(request).await;
        self.publish(|s| s.loading.ai = false);

        let feedback = result.map_err(|e| EditorError::Upstream(e.error))?.feedback;
        self.store_ref()
            .update_scene(id, ScenePatch::ai_feedback(Some(feedback.clone())))
            .await?;
        self.refresh_scene(id).await?;
        Ok(feedback)
    }

    /// Run a grammar pass over a scene's content.
    pub async fn check_grammar(&self, id: SceneId) -> Result<String, EditorError> {
        let service = self.feedback_service()?;
        let request = self
            .read(|s| {
                s.scene(id).map(|scene| GrammarRequest {
                    content: scene.content.clone(),
                })
            })
            .ok_or_else(|| EditorError::not_found("Scene", id.get()))?;

        self.publish(|s| s.loading.ai = true);
        let result = service.grammar(request).await;
        self.publish(|s| s.loading.ai = false);

        result
            .map(|r| r.suggestions)
            .map_err(|e| EditorError::Upstream(e.error))
    }

    fn feedback_service(&self) -> Result<Arc<dyn FeedbackService>, EditorError> {
        self.inner
            .feedback
            .clone()
            .ok_or_else(|| EditorError::Upstream("AI feedback is not configured".to_string()))
    }
}

/// Trim `value` and reject it if nothing is left.
fn required(what: &str, value: &str) -> Result<String, EditorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EditorError::Validation(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn editor() -> EditorContext {
        EditorContext::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_load_marks_initialized() {
        let ctx = editor();
        assert!(!ctx.snapshot().loading.initialized);

        ctx.load().await.unwrap();

        let snap = ctx.snapshot();
        assert!(snap.loading.initialized);
        assert!(!snap.loading.reloading);
        assert!(snap.chapters.is_empty());
    }

    #[tokio::test]
    async fn test_titles_are_trimmed_and_required() {
        let ctx = editor();
        let err = ctx.create_chapter("   ").await.unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));

        let id = ctx.create_chapter("  프롤로그 ").await.unwrap();
        assert_eq!(ctx.snapshot().chapter(id).unwrap().title, "프롤로그");

        let scene = ctx.create_scene(id, "씬", None).await.unwrap();
        let err = ctx
            .update_scene_field(scene, SceneField::Title, "")
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));

        ctx.update_scene_field(scene, SceneField::Content, "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_scene_in_missing_chapter() {
        let ctx = editor();
        let err = ctx.create_scene(ChapterId(7), "씬", None).await.unwrap_err();
        assert!(matches!(err, EditorError::NotFound { entity: "Chapter", id: 7 }));
        assert!(ctx.store().list_scenes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_unknown_scene_is_rejected() {
        let ctx = editor();
        let err = ctx.select(Some(SceneId(3))).unwrap_err();
        assert!(matches!(err, EditorError::NotFound { entity: "Scene", .. }));
        assert!(ctx.select(None).is_ok());
    }

    #[tokio::test]
    async fn test_delete_selected_scene_clears_selection() {
        let ctx = editor();
        let chapter = ctx.create_chapter("1장").await.unwrap();
        let keep = ctx.create_scene(chapter, "남길 씬", None).await.unwrap();
        let doomed = ctx.create_scene(chapter, "지울 씬", None).await.unwrap();

        ctx.select(Some(keep)).unwrap();
        ctx.delete_scene(doomed).await.unwrap();
        assert_eq!(ctx.snapshot().selected_scene_id, Some(keep));

        ctx.select(Some(doomed)).unwrap_err();
        ctx.delete_scene(keep).await.unwrap();
        assert_eq!(ctx.snapshot().selected_scene_id, None);
    }

    #[tokio::test]
    async fn test_settings_patch_snapshot() {
        let ctx = editor();
        ctx.update_novel_title("벙커").await.unwrap();
        ctx.update_synopsis("줄거리").await.unwrap();

        let snap = ctx.snapshot();
        assert_eq!(snap.novel_title(), "벙커");
        assert_eq!(snap.synopsis(), "줄거리");
        assert_eq!(ctx.get_setting(SYNOPSIS_KEY).as_deref(), Some("줄거리"));
    }

    #[tokio::test]
    async fn test_character_actions() {
        let ctx = editor();
        let id = ctx
            .create_character("이서윤", "카페 주인", vec!["주인공".to_string()])
            .await
            .unwrap();

        ctx.update_character(
            id,
            CharacterPatch {
                description: Some("바리스타".to_string()),
                ..CharacterPatch::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ctx.snapshot().character(id).unwrap().description, "바리스타");

        ctx.delete_character(id).await.unwrap();
        assert!(ctx.list_characters().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_reconciled_snapshot() {
        let ctx = editor();
        let mut rx = ctx.subscribe();

        let chapter = ctx.create_chapter("1장").await.unwrap();

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.chapters.len(), 1);
        assert_eq!(seen.chapters[0].id, chapter);
    }

    #[tokio::test]
    async fn test_feedback_without_service() {
        let ctx = editor();
        let err = ctx.request_feedback(SceneId(1)).await.unwrap_err();
        assert!(matches!(err, EditorError::Upstream(_)));
    }
}
