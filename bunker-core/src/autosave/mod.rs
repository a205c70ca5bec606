//! Debounced write-back of interactive edits.
//!
//! Each editable field has at most one pending task. A new edit to the same
//! field cancels the pending task and schedules a fresh one after that
//! field's quiet period, so a burst of edits results in a single write of the
//! last value. When a task fires it compares its value with the editor's
//! mirror and skips the write if nothing changed.
//!
//! Tearing down a scene or chapter cancels its pending tasks without writing
//! them; an edit made inside the quiet period before teardown is lost.

mod scheduler;

pub use scheduler::{Scheduler, Task, TaskHandle, TokioScheduler, VirtualScheduler};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::config::EditorConfig;
use crate::editor::{EditorContext, SceneField};
use crate::schema::{ChapterId, SceneId};

/// The field an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditTarget {
    SceneTitle(SceneId),
    SceneContent(SceneId),
    ChapterTitle(ChapterId),
}

impl EditTarget {
    fn scene_id(&self) -> Option<SceneId> {
        match self {
            EditTarget::SceneTitle(id) | EditTarget::SceneContent(id) => Some(*id),
            EditTarget::ChapterTitle(_) => None,
        }
    }
}

struct PendingEdit {
    generation: u64,
    value: String,
    handle: TaskHandle,
}

struct Inner {
    editor: EditorContext,
    scheduler: Arc<dyn Scheduler>,
    title_delay: Duration,
    content_delay: Duration,
    pending: Mutex<HashMap<EditTarget, PendingEdit>>,
    generation: AtomicU64,
}

impl Inner {
    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<EditTarget, PendingEdit>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist `value` unless the mirror already holds it. Titles are
    /// compared trimmed, the way they are stored.
    async fn write(&self, target: EditTarget, value: String) {
        let value = match target {
            EditTarget::SceneTitle(_) | EditTarget::ChapterTitle(_) => value.trim().to_string(),
            EditTarget::SceneContent(_) => value,
        };
        let persisted = self.editor.snapshot();
        let current = match target {
            EditTarget::SceneTitle(id) => persisted.scene(id).map(|s| s.title.as_str()),
            EditTarget::SceneContent(id) => persisted.scene(id).map(|s| s.content.as_str()),
            EditTarget::ChapterTitle(id) => persisted.chapter(id).map(|c| c.title.as_str()),
        };

        match current {
            None => {
                tracing::debug!(?target, "Dropping edit for removed entity");
                return;
            }
            Some(current) if current == value => {
                tracing::trace!(?target, "Edit matches persisted value");
                return;
            }
            Some(_) => {}
        }

        let result = match target {
            EditTarget::SceneTitle(id) => {
                self.editor
                    .update_scene_field(id, SceneField::Title, &value)
                    .await
            }
            EditTarget::SceneContent(id) => {
                self.editor
                    .update_scene_field(id, SceneField::Content, &value)
                    .await
            }
            EditTarget::ChapterTitle(id) => self.editor.update_chapter_title(id, &value).await,
        };

        match result {
            Ok(()) => tracing::debug!(?target, "Autosaved"),
            Err(e) => tracing::warn!(?target, error = %e, "Autosave failed"),
        }
    }
}

/// Coalesces edits into debounced editor updates.
///
/// Clones share pending state.
#[derive(Clone)]
pub struct Autosave {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Autosave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autosave")
            .field("title_delay", &self.inner.title_delay)
            .field("content_delay", &self.inner.content_delay)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Autosave {
    /// Coordinator with the quiet periods from `config`.
    pub fn new(
        editor: EditorContext,
        scheduler: Arc<dyn Scheduler>,
        config: &EditorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                editor,
                scheduler,
                title_delay: config.title_debounce,
                content_delay: config.content_debounce,
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// The quiet period for a target.
    pub fn delay_for(&self, target: EditTarget) -> Duration {
        match target {
            EditTarget::SceneTitle(_) | EditTarget::ChapterTitle(_) => self.inner.title_delay,
            EditTarget::SceneContent(_) => self.inner.content_delay,
        }
    }

    /// Record an edit, replacing any pending edit for the same field.
    pub fn edit(&self, target: EditTarget, value: impl Into<String>) {
        let value = value.into();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task_value = value.clone();

        let task: Task = Box::pin(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut pending = inner.pending();
                match pending.get(&target) {
                    Some(p) if p.generation == generation => {
                        pending.remove(&target);
                    }
                    _ => return,
                }
            }
            inner.write(target, task_value).await;
        });

        let mut pending = self.inner.pending();
        let handle = self.inner.scheduler.schedule(self.delay_for(target), task);
        if let Some(previous) = pending.insert(
            target,
            PendingEdit {
                generation,
                value,
                handle,
            },
        ) {
            previous.handle.cancel();
        }
    }

    /// Number of edits waiting for their quiet period to end.
    pub fn pending(&self) -> usize {
        self.inner.pending().len()
    }

    /// The value waiting to be written for `target`, if any.
    pub fn pending_value(&self, target: EditTarget) -> Option<String> {
        self.inner.pending().get(&target).map(|p| p.value.clone())
    }

    /// Cancel pending edits to a scene without writing them.
    pub fn teardown_scene(&self, id: SceneId) {
        self.cancel_where(|target| target.scene_id() == Some(id));
    }

    /// Cancel pending edits to a chapter and to its scenes without writing
    /// them.
    pub fn teardown_chapter(&self, id: ChapterId) {
        let scenes: Vec<SceneId> = self
            .inner
            .editor
            .snapshot()
            .scenes_for_chapter(id)
            .map(|s| s.id)
            .collect();
        self.cancel_where(|target| match target {
            EditTarget::ChapterTitle(chapter) => *chapter == id,
            other => other.scene_id().is_some_and(|s| scenes.contains(&s)),
        });
    }

    /// Cancel every pending edit without writing.
    pub fn teardown_all(&self) {
        self.cancel_where(|_| true);
    }

    /// Write every pending edit now instead of waiting.
    pub async fn flush(&self) {
        let drained: Vec<(EditTarget, String)> = {
            let mut pending = self.inner.pending();
            pending
                .drain()
                .map(|(target, edit)| {
                    edit.handle.cancel();
                    (target, edit.value)
                })
                .collect()
        };

        for (target, value) in drained {
            self.inner.write(target, value).await;
        }
    }

    fn cancel_where(&self, matches: impl Fn(&EditTarget) -> bool) {
        let mut pending = self.inner.pending();
        let before = pending.len();
        pending.retain(|target, edit| {
            if matches(target) {
                edit.handle.cancel();
                false
            } else {
                true
            }
        });
        let dropped = before - pending.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded pending edits on teardown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn setup() -> (EditorContext, Autosave, VirtualScheduler, SceneId) {
        let editor = EditorContext::new(Arc::new(MemoryStore::new()));
        let chapter = editor.create_chapter("1장").await.unwrap();
        let scene = editor.create_scene(chapter, "초안", None).await.unwrap();
        let scheduler = VirtualScheduler::new();
        let autosave = Autosave::new(
            editor.clone(),
            Arc::new(scheduler.clone()),
            &EditorConfig::default(),
        );
        (editor, autosave, scheduler, scene)
    }

    #[tokio::test]
    async fn test_edit_waits_for_quiet_period() {
        let (editor, autosave, clock, scene) = setup().await;

        autosave.edit(EditTarget::SceneContent(scene), "<p>첫 문장</p>");
        clock.advance(Duration::from_millis(999)).await;
        assert_eq!(editor.snapshot().scene(scene).unwrap().content, "");
        assert_eq!(autosave.pending(), 1);

        clock.advance(Duration::from_millis(1)).await;
        assert_eq!(editor.snapshot().scene(scene).unwrap().content, "<p>첫 문장</p>");
        assert_eq!(autosave.pending(), 0);
    }

    #[tokio::test]
    async fn test_fields_are_independent() {
        let (editor, autosave, clock, scene) = setup().await;

        autosave.edit(EditTarget::SceneContent(scene), "본문");
        autosave.edit(EditTarget::SceneTitle(scene), "제목");
        assert_eq!(autosave.pending(), 2);

        clock.advance(Duration::from_millis(500)).await;
        let snap = editor.snapshot();
        assert_eq!(snap.scene(scene).unwrap().title, "제목");
        assert_eq!(snap.scene(scene).unwrap().content, "");
        assert_eq!(
            autosave.pending_value(EditTarget::SceneContent(scene)).as_deref(),
            Some("본문")
        );
    }

    #[tokio::test]
    async fn test_teardown_drops_edit() {
        let (editor, autosave, clock, scene) = setup().await;

        autosave.edit(EditTarget::SceneTitle(scene), "잃어버린 제목");
        autosave.teardown_scene(scene);
        clock.advance(Duration::from_secs(5)).await;

        assert_eq!(editor.snapshot().scene(scene).unwrap().title, "초안");
        assert_eq!(autosave.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_writes_immediately() {
        let (editor, autosave, _clock, scene) = setup().await;

        autosave.edit(EditTarget::SceneTitle(scene), "바로 저장");
        autosave.flush().await;

        assert_eq!(editor.snapshot().scene(scene).unwrap().title, "바로 저장");
        assert_eq!(autosave.pending(), 0);
    }
}
