//! Testing utilities.
//!
//! - `FaultyStore` wraps any store, counts calls, records update patches and
//!   fails chosen operations on demand
//! - `MockFeedback` returns scripted feedback and grammar responses

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::feedback::{
    FeedbackError, FeedbackRequest, FeedbackResponse, FeedbackService, GrammarRequest,
    GrammarResponse,
};
use crate::schema::{
    Chapter, ChapterId, ChapterPatch, Character, CharacterId, CharacterPatch, NewChapter,
    NewCharacter, NewScene, Scene, SceneId, ScenePatch, Setting,
};
use crate::store::{Store, StoreError};

/// A store operation, for counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListChapters,
    GetChapter,
    CreateChapter,
    UpdateChapter,
    DeleteChapter,
    ListScenes,
    ListScenesByChapter,
    GetScene,
    CreateScene,
    UpdateScene,
    DeleteScene,
    BulkDeleteScenes,
    ListCharacters,
    GetCharacter,
    FindCharacters,
    CreateCharacter,
    UpdateCharacter,
    DeleteCharacter,
    GetSetting,
    PutSetting,
    ListSettings,
}

#[derive(Default)]
struct Recorder {
    calls: HashMap<Op, usize>,
    /// Op to the number of calls allowed to succeed before failures start.
    faults: HashMap<Op, usize>,
    scene_updates: Vec<(SceneId, ScenePatch)>,
    chapter_updates: Vec<(ChapterId, ChapterPatch)>,
}

/// Store wrapper that can be told to fail.
pub struct FaultyStore {
    inner: Arc<dyn Store>,
    recorder: Mutex<Recorder>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            recorder: Mutex::new(Recorder::default()),
        }
    }

    /// The wrapped store, for writes that bypass counting and faults.
    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    /// Fail every call to `op` from now on.
    pub fn fail(&self, op: Op) {
        let mut rec = self.lock();
        let made = rec.calls.get(&op).copied().unwrap_or(0);
        rec.faults.insert(op, made);
    }

    /// Let `n` more calls to `op` succeed, then fail the rest.
    pub fn fail_after(&self, op: Op, n: usize) {
        let mut rec = self.lock();
        let made = rec.calls.get(&op).copied().unwrap_or(0);
        rec.faults.insert(op, made + n);
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: Op) {
        self.lock().faults.remove(&op);
    }

    /// Calls made to `op`, including failed ones.
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every scene patch passed to `update_scene`, in call order.
    pub fn scene_updates(&self) -> Vec<(SceneId, ScenePatch)> {
        self.lock().scene_updates.clone()
    }

    /// Every chapter patch passed to `update_chapter`, in call order.
    pub fn chapter_updates(&self) -> Vec<(ChapterId, ChapterPatch)> {
        self.lock().chapter_updates.clone()
    }

    /// Forget counts and recorded patches. Faults stay armed.
    pub fn reset_counts(&self) {
        let mut rec = self.lock();
        rec.calls.clear();
        rec.scene_updates.clear();
        rec.chapter_updates.clear();
        rec.faults.values_mut().for_each(|allowed| *allowed = 0);
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, op: Op) -> Result<(), StoreError> {
        let mut rec = self.lock();
        let count = rec.calls.entry(op).or_insert(0);
        *count += 1;
        let made = *count;

        match rec.faults.get(&op) {
            Some(&allowed) if made > allowed => {
                tracing::debug!(?op, call = made, "Injected store failure");
                Err(StoreError::Unavailable(format!("injected failure in {op:?}")))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for FaultyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rec = self.lock();
        f.debug_struct("FaultyStore")
            .field("calls", &rec.calls)
            .field("faults", &rec.faults)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn list_chapters(&self) -> Result<Vec<Chapter>, StoreError> {
        self.enter(Op::ListChapters)?;
        self.inner.list_chapters().await
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StoreError> {
        self.enter(Op::GetChapter)?;
        self.inner.get_chapter(id).await
    }

    async fn create_chapter(&self, new: NewChapter) -> Result<ChapterId, StoreError> {
        self.enter(Op::CreateChapter)?;
        self.inner.create_chapter(new).await
    }

    async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> Result<(), StoreError> {
        self.enter(Op::UpdateChapter)?;
        self.lock().chapter_updates.push((id, patch.clone()));
        self.inner.update_chapter(id, patch).await
    }

    async fn delete_chapter(&self, id: ChapterId) -> Result<(), StoreError> {
        self.enter(Op::DeleteChapter)?;
        self.inner.delete_chapter(id).await
    }

    async fn list_scenes(&self) -> Result<Vec<Scene>, StoreError> {
        self.enter(Op::ListScenes)?;
        self.inner.list_scenes().await
    }

    async fn list_scenes_by_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<Scene>, StoreError> {
        self.enter(Op::ListScenesByChapter)?;
        self.inner.list_scenes_by_chapter(chapter_id).await
    }

    async fn get_scene(&self, id: SceneId) -> Result<Option<Scene>, StoreError> {
        self.enter(Op::GetScene)?;
        self.inner.get_scene(id).await
    }

    async fn create_scene(&self, new: NewScene) -> Result<SceneId, StoreError> {
        self.enter(Op::CreateScene)?;
        self.inner.create_scene(new).await
    }

    async fn update_scene(&self, id: SceneId, patch: ScenePatch) -> Result<(), StoreError> {
        self.enter(Op::UpdateScene)?;
        self.lock().scene_updates.push((id, patch.clone()));
        self.inner.update_scene(id, patch).await
    }

    async fn delete_scene(&self, id: SceneId) -> Result<(), StoreError> {
        self.enter(Op::DeleteScene)?;
        self.inner.delete_scene(id).await
    }

    async fn bulk_delete_scenes(&self, ids: &[SceneId]) -> Result<(), StoreError> {
        self.enter(Op::BulkDeleteScenes)?;
        self.inner.bulk_delete_scenes(ids).await
    }

    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        self.enter(Op::ListCharacters)?;
        self.inner.list_characters().await
    }

    async fn get_character(&self, id: CharacterId) -> Result<Option<Character>, StoreError> {
        self.enter(Op::GetCharacter)?;
        self.inner.get_character(id).await
    }

    async fn find_characters_by_name(&self, name: &str) -> Result<Vec<Character>, StoreError> {
        self.enter(Op::FindCharacters)?;
        self.inner.find_characters_by_name(name).await
    }

    async fn create_character(&self, new: NewCharacter) -> Result<CharacterId, StoreError> {
        self.enter(Op::CreateCharacter)?;
        self.inner.create_character(new).await
    }

    async fn update_character(
        &self,
        id: CharacterId,
        patch: CharacterPatch,
    ) -> Result<(), StoreError> {
        self.enter(Op::UpdateCharacter)?;
        self.inner.update_character(id, patch).await
    }

    async fn delete_character(&self, id: CharacterId) -> Result<(), StoreError> {
        self.enter(Op::DeleteCharacter)?;
        self.inner.delete_character(id).await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.enter(Op::GetSetting)?;
        self.inner.get_setting(key).await
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.enter(Op::PutSetting)?;
        self.inner.put_setting(key, value).await
    }

    async fn list_settings(&self) -> Result<Vec<Setting>, StoreError> {
        self.enter(Op::ListSettings)?;
        self.inner.list_settings().await
    }
}

// =========================================================================
// Mock feedback
// =========================================================================

#[derive(Default)]
struct Script {
    feedback: VecDeque<Result<String, FeedbackError>>,
    grammar: VecDeque<Result<String, FeedbackError>>,
    feedback_requests: Vec<FeedbackRequest>,
    grammar_requests: Vec<GrammarRequest>,
}

/// A feedback service that returns scripted responses.
///
/// Empty content is rejected with a client error before the script is
/// consulted. When a script runs dry a placeholder text is returned.
#[derive(Default)]
pub struct MockFeedback {
    script: Mutex<Script>,
}

impl MockFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next feedback result.
    pub fn push_feedback(&self, result: Result<String, FeedbackError>) -> &Self {
        self.lock().feedback.push_back(result);
        self
    }

    /// Queue the next grammar result.
    pub fn push_grammar(&self, result: Result<String, FeedbackError>) -> &Self {
        self.lock().grammar.push_back(result);
        self
    }

    /// Feedback requests received so far.
    pub fn feedback_requests(&self) -> Vec<FeedbackRequest> {
        self.lock().feedback_requests.clone()
    }

    /// Grammar requests received so far.
    pub fn grammar_requests(&self) -> Vec<GrammarRequest> {
        self.lock().grammar_requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FeedbackService for MockFeedback {
    async fn feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse, FeedbackError> {
        let mut script = self.lock();
        script.feedback_requests.push(request.clone());
        request.validate()?;
        let feedback = script
            .feedback
            .pop_front()
            .unwrap_or_else(|| Ok("No scripted feedback.".to_string()))?;
        Ok(FeedbackResponse { feedback })
    }

    async fn grammar(&self, request: GrammarRequest) -> Result<GrammarResponse, FeedbackError> {
        let mut script = self.lock();
        script.grammar_requests.push(request.clone());
        request.validate()?;
        let suggestions = script
            .grammar
            .pop_front()
            .unwrap_or_else(|| Ok("No scripted suggestions.".to_string()))?;
        Ok(GrammarResponse { suggestions })
    }
}
