//! Sibling ordering: append, insert with shift, and direct reorder.
//!
//! Scene `order` values are scoped to a chapter; chapter `order` values are
//! global. Values are dense but need not be contiguous.
//!
//! Insert shifts each sibling through its own store call, so the shift is not
//! atomic. A second writer appending or inserting into the same chapter while
//! a shift is in flight can observe or create a duplicate order. Callers are
//! expected to be the store's only writer; the window is not locked.

use crate::schema::{
    Chapter, ChapterId, ChapterPatch, NewChapter, NewScene, Scene, SceneId, ScenePatch,
};
use crate::store::{Store, StoreError};
use crate::work::{Step, WorkError, WorkPlan};
use thiserror::Error;

/// Errors from ordering operations.
#[derive(Debug, Error)]
pub enum OrderingError {
    /// A sibling already sits at `i64::MAX`, so nothing can follow it.
    #[error("no order follows {0}")]
    Overflow(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Work(#[from] WorkError),
}

/// The order a newly appended sibling receives: one past the maximum, or 0.
pub fn next_order(orders: impl IntoIterator<Item = i64>) -> Result<i64, OrderingError> {
    match orders.into_iter().max() {
        None => Ok(0),
        Some(max) => successor(max),
    }
}

fn successor(order: i64) -> Result<i64, OrderingError> {
    order.checked_add(1).ok_or(OrderingError::Overflow(order))
}

/// Plan the creation of `new` among `siblings`.
///
/// With `at == None` the scene is appended and `new.order` is overwritten.
/// With `at == Some(k)` every sibling at or after `k` is shifted up by one,
/// highest first, before the scene is created at `k`.
///
/// Fails without planning anything when a required order would pass
/// `i64::MAX`.
pub fn plan_scene_insert(
    mut new: NewScene,
    siblings: &[Scene],
    at: Option<i64>,
) -> Result<WorkPlan, OrderingError> {
    let mut plan = WorkPlan::new();

    match at {
        None => {
            new.order = next_order(siblings.iter().map(|s| s.order))?;
        }
        Some(k) => {
            let mut to_shift: Vec<&Scene> = siblings.iter().filter(|s| s.order >= k).collect();
            to_shift.sort_by(|a, b| b.order.cmp(&a.order).then(b.id.cmp(&a.id)));
            for scene in to_shift {
                plan.push(Step::ShiftScene {
                    id: scene.id,
                    from: scene.order,
                    to: successor(scene.order)?,
                });
            }
            new.order = k;
        }
    }

    plan.push(Step::CreateScene(new));
    Ok(plan)
}

/// Plan the removal of a chapter and every scene that references it.
///
/// Scenes go first so a failure never leaves scenes without their chapter.
pub fn plan_cascade_delete(chapter_id: ChapterId, scenes: &[Scene]) -> WorkPlan {
    let ids: Vec<SceneId> = scenes
        .iter()
        .filter(|s| s.chapter_id == chapter_id)
        .map(|s| s.id)
        .collect();

    let mut plan = WorkPlan::new();
    if !ids.is_empty() {
        plan.push(Step::DeleteScenes(ids));
    }
    plan.push(Step::DeleteChapter(chapter_id));
    plan
}

/// True when the scenes' orders, in the given sequence, strictly increase.
pub fn is_strictly_increasing(scenes: &[Scene]) -> bool {
    scenes.windows(2).all(|pair| pair[0].order < pair[1].order)
}

// =========================================================================
// Store-backed operations
// =========================================================================

/// Create a scene in `chapter_id`, appending or inserting at `at`.
///
/// Siblings are fetched fresh from the store.
pub async fn create_scene(
    store: &dyn Store,
    chapter_id: ChapterId,
    title: impl Into<String>,
    at: Option<i64>,
) -> Result<SceneId, OrderingError> {
    let siblings = store.list_scenes_by_chapter(chapter_id).await?;

    let plan = plan_scene_insert(NewScene::new(chapter_id, title, 0), &siblings, at)?;
    let outcome = plan.execute(store).await?;

    outcome
        .created
        .ok_or_else(|| StoreError::Unavailable("create returned no id".to_string()).into())
}

/// Append a chapter after every existing chapter.
pub async fn append_chapter(
    store: &dyn Store,
    title: impl Into<String>,
) -> Result<ChapterId, OrderingError> {
    let chapters: Vec<Chapter> = store.list_chapters().await?;
    let order = next_order(chapters.iter().map(|c| c.order))?;
    let id = store
        .create_chapter(NewChapter {
            title: title.into(),
            order,
        })
        .await?;
    Ok(id)
}

/// Set a scene's order. Siblings are not adjusted, so duplicates are possible.
pub async fn reorder_scene(store: &dyn Store, id: SceneId, order: i64) -> Result<(), StoreError> {
    store.update_scene(id, ScenePatch::order(order)).await
}

/// Set a chapter's order. Other chapters are not adjusted.
pub async fn reorder_chapter(
    store: &dyn Store,
    id: ChapterId,
    order: i64,
) -> Result<(), StoreError> {
    store.update_chapter(id, ChapterPatch::order(order)).await
}
