//! Chapter deletion, selection clearing, and orphan handling.

use bunker_core::testing::{FaultyStore, Op};
use bunker_core::{ChapterId, EditorContext, EditorError, MemoryStore, NewScene, Store};
use std::sync::Arc;

async fn faulty_editor() -> (EditorContext, Arc<FaultyStore>) {
    let store = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new())));
    let editor = EditorContext::new(store.clone());
    editor.load().await.unwrap();
    (editor, store)
}

// =============================================================================
// TEST 1: Cascade removes every scene of the chapter
// =============================================================================

#[tokio::test]
async fn test_delete_chapter_removes_its_scenes_and_selection() {
    let (editor, store) = faulty_editor().await;
    let doomed = editor.create_chapter("프롤로그").await.unwrap();
    let kept = editor.create_chapter("첫 번째 만남").await.unwrap();
    let a = editor.create_scene(doomed, "카페의 아침", None).await.unwrap();
    editor.create_scene(doomed, "우연한 발견", None).await.unwrap();
    let survivor = editor.create_scene(kept, "출판사에서", None).await.unwrap();

    editor.select(Some(a)).unwrap();
    editor.delete_chapter(doomed).await.unwrap();

    let snap = editor.snapshot();
    assert!(snap.chapter(doomed).is_none());
    assert_eq!(snap.selected_scene_id, None);
    assert_eq!(snap.scenes.len(), 1);
    assert_eq!(snap.scenes[0].id, survivor);

    let stored = store.inner().list_scenes().await.unwrap();
    assert!(stored.iter().all(|s| s.chapter_id != doomed));
    assert_eq!(store.calls(Op::BulkDeleteScenes), 1);
}

#[tokio::test]
async fn test_selection_survives_unrelated_delete() {
    let (editor, _) = faulty_editor().await;
    let one = editor.create_chapter("1장").await.unwrap();
    let two = editor.create_chapter("2장").await.unwrap();
    let selected = editor.create_scene(two, "남는 씬", None).await.unwrap();
    editor.create_scene(one, "지워질 씬", None).await.unwrap();

    editor.select(Some(selected)).unwrap();
    editor.delete_chapter(one).await.unwrap();

    assert_eq!(editor.snapshot().selected_scene_id, Some(selected));
}

#[tokio::test]
async fn test_delete_missing_chapter_and_scene_succeed() {
    let (editor, _) = faulty_editor().await;
    editor.delete_chapter(ChapterId(40)).await.unwrap();
    editor.delete_scene(bunker_core::SceneId(41)).await.unwrap();
}

// =============================================================================
// TEST 2: Partial failure is reconciled by reload
// =============================================================================

#[tokio::test]
async fn test_chapter_delete_failure_after_scenes_removed() {
    let (editor, store) = faulty_editor().await;
    let chapter = editor.create_chapter("1장").await.unwrap();
    let scene = editor.create_scene(chapter, "씬", None).await.unwrap();
    editor.select(Some(scene)).unwrap();

    store.fail(Op::DeleteChapter);
    let err = editor.delete_chapter(chapter).await.unwrap_err();
    assert!(matches!(err, EditorError::StorageUnavailable(_)));

    let snap = editor.snapshot();
    assert!(snap.chapter(chapter).is_some());
    assert!(snap.scenes.is_empty());
    assert_eq!(snap.selected_scene_id, None);

    // Retrying once storage recovers finishes the job.
    store.heal(Op::DeleteChapter);
    editor.delete_chapter(chapter).await.unwrap();
    assert!(editor.list_chapters().is_empty());
}

#[tokio::test]
async fn test_scene_removal_failure_leaves_everything() {
    let (editor, store) = faulty_editor().await;
    let chapter = editor.create_chapter("1장").await.unwrap();
    editor.create_scene(chapter, "씬", None).await.unwrap();

    store.fail(Op::BulkDeleteScenes);
    editor.delete_chapter(chapter).await.unwrap_err();

    assert_eq!(store.calls(Op::DeleteChapter), 0);
    let snap = editor.snapshot();
    assert!(snap.chapter(chapter).is_some());
    assert_eq!(snap.scenes.len(), 1);
}

// =============================================================================
// TEST 3: Orphans are hidden and purgeable
// =============================================================================

#[tokio::test]
async fn test_orphan_scene_is_hidden_then_purged() {
    let (editor, store) = faulty_editor().await;
    let chapter = editor.create_chapter("1장").await.unwrap();
    let visible = editor.create_scene(chapter, "보이는 씬", None).await.unwrap();
    let orphan = store
        .inner()
        .create_scene(NewScene::new(ChapterId(999), "떠돌이", 0))
        .await
        .unwrap();

    editor.reload().await.unwrap();

    let snap = editor.snapshot();
    assert_eq!(snap.hidden_orphans, vec![orphan]);
    assert!(snap.scene(orphan).is_none());
    assert!(snap.scene(visible).is_some());
    assert!(editor.select(Some(orphan)).is_err());

    assert_eq!(editor.purge_orphans().await.unwrap(), 1);
    assert!(store.inner().get_scene(orphan).await.unwrap().is_none());
    assert!(editor.snapshot().hidden_orphans.is_empty());
}

#[tokio::test]
async fn test_load_failure_keeps_previous_snapshot() {
    let (editor, store) = faulty_editor().await;
    editor.create_chapter("1장").await.unwrap();

    store.fail(Op::ListScenes);
    let err = editor.reload().await.unwrap_err();

    assert!(matches!(err, EditorError::StorageUnavailable(_)));
    let snap = editor.snapshot();
    assert_eq!(snap.chapters.len(), 1);
    assert!(!snap.loading.reloading);
}
