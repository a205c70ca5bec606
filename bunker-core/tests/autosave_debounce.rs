//! Debounced autosave driven by a virtual clock.

use bunker_core::testing::{FaultyStore, Op};
use bunker_core::{
    Autosave, ChapterId, ChapterPatch, EditTarget, EditorConfig, EditorContext, MemoryStore,
    SceneId, ScenePatch, TokioScheduler, VirtualScheduler,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    editor: EditorContext,
    store: Arc<FaultyStore>,
    autosave: Autosave,
    clock: VirtualScheduler,
    chapter: ChapterId,
    scene: SceneId,
}

async fn fixture(config: EditorConfig) -> Fixture {
    let store = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new())));
    let editor = EditorContext::new(store.clone());
    editor.load().await.unwrap();
    let chapter = editor.create_chapter("1장").await.unwrap();
    let scene = editor.create_scene(chapter, "초안", None).await.unwrap();

    let clock = VirtualScheduler::new();
    let autosave = Autosave::new(editor.clone(), Arc::new(clock.clone()), &config);
    store.reset_counts();

    Fixture {
        editor,
        store,
        autosave,
        clock,
        chapter,
        scene,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// =============================================================================
// TEST 1: Coalescing
// =============================================================================

#[tokio::test]
async fn test_three_title_edits_write_once_with_last_value() {
    let f = fixture(EditorConfig::default()).await;
    let target = EditTarget::SceneTitle(f.scene);

    f.autosave.edit(target, "카");
    f.clock.advance(ms(200)).await;
    f.autosave.edit(target, "카페");
    f.clock.advance(ms(200)).await;
    f.autosave.edit(target, "카페의 아침");
    f.clock.advance(ms(499)).await;
    assert_eq!(f.store.calls(Op::UpdateScene), 0);

    f.clock.advance(ms(1)).await;

    assert_eq!(
        f.store.scene_updates(),
        vec![(f.scene, ScenePatch::title("카페의 아침"))]
    );
    assert_eq!(f.editor.snapshot().scene(f.scene).unwrap().title, "카페의 아침");
}

#[tokio::test]
async fn test_content_edits_coalesce_independently_of_titles() {
    let f = fixture(EditorConfig::default()).await;

    f.autosave.edit(EditTarget::SceneContent(f.scene), "<p>하나</p>");
    f.autosave.edit(EditTarget::SceneTitle(f.scene), "제목");
    f.clock.advance(ms(600)).await;
    f.autosave.edit(EditTarget::SceneContent(f.scene), "<p>하나 둘</p>");
    f.clock.advance(ms(1000)).await;

    assert_eq!(
        f.store.scene_updates(),
        vec![
            (f.scene, ScenePatch::title("제목")),
            (f.scene, ScenePatch::content("<p>하나 둘</p>")),
        ]
    );
}

#[tokio::test]
async fn test_chapter_title_autosave() {
    let f = fixture(EditorConfig::default()).await;

    f.autosave.edit(EditTarget::ChapterTitle(f.chapter), "프롤로그");
    f.clock.advance(ms(500)).await;

    assert_eq!(
        f.store.chapter_updates(),
        vec![(f.chapter, ChapterPatch::title("프롤로그"))]
    );
    assert_eq!(f.editor.list_chapters()[0].title, "프롤로그");
}

#[tokio::test]
async fn test_quiet_periods_are_configurable() {
    let config = EditorConfig::default()
        .with_title_debounce(ms(100))
        .with_content_debounce(ms(2000));
    let f = fixture(config).await;

    f.autosave.edit(EditTarget::SceneTitle(f.scene), "빠른 제목");
    f.autosave.edit(EditTarget::SceneContent(f.scene), "느린 본문");
    f.clock.advance(ms(100)).await;
    assert_eq!(f.store.calls(Op::UpdateScene), 1);

    f.clock.advance(ms(1899)).await;
    assert_eq!(f.store.calls(Op::UpdateScene), 1);
    f.clock.advance(ms(1)).await;
    assert_eq!(f.store.calls(Op::UpdateScene), 2);
}

// =============================================================================
// TEST 2: Unchanged values are not written
// =============================================================================

#[tokio::test]
async fn test_reverted_edit_writes_nothing() {
    let f = fixture(EditorConfig::default()).await;
    let target = EditTarget::SceneTitle(f.scene);

    f.autosave.edit(target, "바뀐 제목");
    f.clock.advance(ms(100)).await;
    f.autosave.edit(target, "초안");
    f.clock.advance(ms(1000)).await;

    assert_eq!(f.store.calls(Op::UpdateScene), 0);
    assert_eq!(f.autosave.pending(), 0);
}

#[tokio::test]
async fn test_title_differing_only_in_whitespace_writes_nothing() {
    let f = fixture(EditorConfig::default()).await;
    let before = f.editor.snapshot().scene(f.scene).unwrap().updated_at;

    f.autosave.edit(EditTarget::SceneTitle(f.scene), "  초안 ");
    f.autosave.edit(EditTarget::ChapterTitle(f.chapter), "1장  ");
    f.clock.advance(ms(500)).await;

    assert_eq!(f.store.calls(Op::UpdateScene), 0);
    assert_eq!(f.store.calls(Op::UpdateChapter), 0);
    assert_eq!(f.editor.snapshot().scene(f.scene).unwrap().updated_at, before);
}

#[tokio::test]
async fn test_content_whitespace_is_significant() {
    let f = fixture(EditorConfig::default()).await;

    f.autosave.edit(EditTarget::SceneContent(f.scene), " ");
    f.clock.advance(ms(1000)).await;

    assert_eq!(
        f.store.scene_updates(),
        vec![(f.scene, ScenePatch::content(" "))]
    );
}

// =============================================================================
// TEST 3: Teardown drops pending edits
// =============================================================================

#[tokio::test]
async fn test_teardown_within_quiet_period_loses_edit() {
    let f = fixture(EditorConfig::default()).await;

    f.autosave.edit(EditTarget::SceneContent(f.scene), "<p>저장 안 됨</p>");
    f.clock.advance(ms(900)).await;
    f.autosave.teardown_scene(f.scene);
    f.clock.advance(ms(5000)).await;

    assert_eq!(f.store.calls(Op::UpdateScene), 0);
    assert_eq!(f.editor.snapshot().scene(f.scene).unwrap().content, "");
}

#[tokio::test]
async fn test_chapter_teardown_covers_its_scenes() {
    let f = fixture(EditorConfig::default()).await;
    let other = f.editor.create_chapter("2장").await.unwrap();
    let elsewhere = f.editor.create_scene(other, "남는 씬", None).await.unwrap();

    f.autosave.edit(EditTarget::ChapterTitle(f.chapter), "새 이름");
    f.autosave.edit(EditTarget::SceneTitle(f.scene), "버려질 제목");
    f.autosave.edit(EditTarget::SceneTitle(elsewhere), "살아남는 제목");
    f.autosave.teardown_chapter(f.chapter);
    assert_eq!(f.autosave.pending(), 1);

    f.clock.advance(ms(500)).await;
    assert_eq!(
        f.store.scene_updates(),
        vec![(elsewhere, ScenePatch::title("살아남는 제목"))]
    );
}

// =============================================================================
// TEST 4: Failures are swallowed and later edits retry
// =============================================================================

#[tokio::test]
async fn test_failed_write_is_swallowed_and_next_edit_retries() {
    let f = fixture(EditorConfig::default()).await;
    let target = EditTarget::SceneTitle(f.scene);

    f.store.fail(Op::UpdateScene);
    f.autosave.edit(target, "실패할 제목");
    f.clock.advance(ms(500)).await;
    assert_eq!(f.editor.snapshot().scene(f.scene).unwrap().title, "초안");

    f.store.heal(Op::UpdateScene);
    f.autosave.edit(target, "실패할 제목");
    f.clock.advance(ms(500)).await;
    assert_eq!(f.editor.snapshot().scene(f.scene).unwrap().title, "실패할 제목");
}

#[tokio::test]
async fn test_edit_to_deleted_scene_is_dropped() {
    let f = fixture(EditorConfig::default()).await;

    f.autosave.edit(EditTarget::SceneContent(f.scene), "<p>늦은 편집</p>");
    f.editor.delete_scene(f.scene).await.unwrap();
    f.clock.advance(ms(1000)).await;

    assert_eq!(f.store.calls(Op::UpdateScene), 0);
}

// =============================================================================
// TEST 5: Real-time scheduler
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_tokio_scheduler_coalesces() {
    let store = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new())));
    let editor = EditorContext::new(store.clone());
    let chapter = editor.create_chapter("1장").await.unwrap();
    let scene = editor.create_scene(chapter, "초안", None).await.unwrap();
    let autosave = Autosave::new(
        editor.clone(),
        Arc::new(TokioScheduler),
        &EditorConfig::default(),
    );

    for text in ["a", "ab", "abc"] {
        autosave.edit(EditTarget::SceneContent(scene), text);
        tokio::time::sleep(ms(300)).await;
    }
    tokio::time::sleep(ms(1500)).await;

    assert_eq!(store.scene_updates(), vec![(scene, ScenePatch::content("abc"))]);
}
