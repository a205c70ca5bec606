//! Ordered chapter/scene document store for long-form writing.
//!
//! This crate provides:
//! - A manuscript schema of chapters, ordered scenes, characters and settings
//! - A persistent store with an in-memory default that can write through to JSON
//! - Append, insert-with-shift and reorder over sibling `order` keys
//! - An editor context that mirrors the store and publishes snapshots
//! - Debounced autosave with a pluggable scheduler
//! - AI scene feedback and grammar checks through Claude
//!
//! # Quick Start
//!
//! ```ignore
//! use bunker_core::{EditorContext, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::open("novel.json").await?);
//!     let editor = EditorContext::new(store);
//!     editor.load().await?;
//!
//!     let prologue = editor.create_chapter("프롤로그").await?;
//!     editor.create_scene(prologue, "카페의 아침", None).await?;
//!     editor.create_scene(prologue, "새벽", Some(0)).await?;
//!
//!     for scene in editor.scenes_for_chapter(prologue) {
//!         println!("{} {}", scene.order, scene.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod autosave;
pub mod clock;
pub mod config;
pub mod demo;
pub mod editor;
pub mod error;
pub mod feedback;
pub mod headless;
pub mod ordering;
pub mod schema;
pub mod store;
pub mod testing;
pub mod work;

// Primary public API
pub use autosave::{Autosave, EditTarget, Scheduler, TaskHandle, TokioScheduler, VirtualScheduler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EditorConfig};
pub use editor::{EditorContext, LoadingFlags, SceneField, Snapshot};
pub use error::EditorError;
pub use feedback::{
    ClaudeFeedback, FeedbackError, FeedbackRequest, FeedbackResponse, FeedbackService,
    FeedbackStatus, GrammarRequest, GrammarResponse,
};
pub use headless::{Command, HeadlessConfig, HeadlessError, HeadlessSession, Reply};
pub use ordering::OrderingError;
pub use schema::{
    Chapter, ChapterId, ChapterPatch, Character, CharacterId, CharacterPatch, NewChapter,
    NewCharacter, NewScene, Scene, SceneId, ScenePatch, Setting,
};
pub use store::{MemoryStore, Store, StoreError};
pub use testing::{FaultyStore, MockFeedback, Op};
pub use work::{Step, WorkError, WorkOutcome, WorkPlan};
