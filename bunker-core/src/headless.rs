//! Line-oriented command interface over an editing session.
//!
//! Used by the `bunker` binary and by tests that drive a manuscript through
//! text commands instead of calling actions directly.
//!
//! ```ignore
//! use bunker_core::headless::{Command, HeadlessConfig, HeadlessSession};
//!
//! let session = HeadlessSession::open(HeadlessConfig::default().with_demo()).await?;
//! let reply = session.execute(Command::parse("ls")?).await?;
//! println!("{}", reply.text);
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use crate::autosave::{Autosave, EditTarget, Scheduler, TokioScheduler};
use crate::config::EditorConfig;
use crate::demo;
use crate::editor::EditorContext;
use crate::error::EditorError;
use crate::feedback::{ClaudeFeedback, FeedbackService};
use crate::ordering::OrderingError;
use crate::schema::{ChapterId, SceneId};
use crate::store::{MemoryStore, Store, StoreError};

/// Errors opening a headless session.
#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),

    #[error("Seeding failed: {0}")]
    Seed(#[from] OrderingError),
}

/// Configuration for a headless session.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    pub editor: EditorConfig,
    /// Seed the sample manuscript into an empty store.
    pub seed_demo: bool,
}

impl HeadlessConfig {
    pub fn new(editor: EditorConfig) -> Self {
        Self {
            editor,
            seed_demo: false,
        }
    }

    pub fn with_demo(mut self) -> Self {
        self.seed_demo = true;
        self
    }
}

// =========================================================================
// Commands
// =========================================================================

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    List,
    ChapterAdd(String),
    ChapterRename(ChapterId, String),
    ChapterRemove(ChapterId),
    ChapterMove(ChapterId, i64),
    SceneAdd {
        chapter: ChapterId,
        title: String,
        at: Option<i64>,
    },
    SceneTitle(SceneId, String),
    SceneWrite(SceneId, String),
    SceneCast(SceneId, Vec<String>),
    SceneRemove(SceneId),
    SceneMove(SceneId, i64),
    Select(Option<SceneId>),
    Feedback(SceneId),
    Grammar(SceneId),
    Title(String),
    Synopsis(String),
    Purge,
    Flush,
    Quit,
}

pub const HELP: &str = "\
Commands:
  ls                                  - Show chapters and scenes
  chapter add <title>                 - Append a chapter
  chapter rename <id> <title>         - Rename a chapter
  chapter rm <id>                     - Delete a chapter and its scenes
  chapter move <id> <order>           - Set a chapter's order
  scene add <chapter> <title> [@pos]  - Append a scene, or insert at pos
  scene title <id> <text>             - Edit a scene title (autosaved)
  scene write <id> <text>             - Edit scene content (autosaved)
  scene cast <id> <name, ...>         - Set the scene's characters
  scene rm <id>                       - Delete a scene
  scene move <id> <order>             - Set a scene's order
  select <id|none>                    - Select a scene
  feedback <id>                       - AI feedback on a scene
  grammar <id>                        - AI grammar check on a scene
  title <text>                        - Set the manuscript title
  synopsis <text>                     - Set the synopsis
  purge                               - Delete scenes without a chapter
  flush                               - Write pending edits now
  help                                - Show this help
  quit                                - Exit (pending edits are dropped)";

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (head, rest) = split_word(line);

        match head {
            "help" | "?" => Ok(Command::Help),
            "ls" | "list" => Ok(Command::List),
            "chapter" => Self::parse_chapter(rest),
            "scene" => Self::parse_scene(rest),
            "select" => match rest.trim() {
                "none" | "" => Ok(Command::Select(None)),
                id => Ok(Command::Select(Some(SceneId(parse_id(id)?)))),
            },
            "feedback" => Ok(Command::Feedback(SceneId(parse_id(rest)?))),
            "grammar" => Ok(Command::Grammar(SceneId(parse_id(rest)?))),
            "title" => Ok(Command::Title(rest.trim().to_string())),
            "synopsis" => Ok(Command::Synopsis(rest.trim().to_string())),
            "purge" => Ok(Command::Purge),
            "flush" => Ok(Command::Flush),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err("Empty command".to_string()),
            other => Err(format!("Unknown command '{other}'. Type help for help.")),
        }
    }

    fn parse_chapter(args: &str) -> Result<Command, String> {
        let (sub, rest) = split_word(args);
        match sub {
            "add" => Ok(Command::ChapterAdd(rest.trim().to_string())),
            "rename" => {
                let (id, title) = split_word(rest);
                Ok(Command::ChapterRename(
                    ChapterId(parse_id(id)?),
                    title.trim().to_string(),
                ))
            }
            "rm" => Ok(Command::ChapterRemove(ChapterId(parse_id(rest)?))),
            "move" => {
                let (id, order) = split_word(rest);
                Ok(Command::ChapterMove(ChapterId(parse_id(id)?), parse_order(order)?))
            }
            _ => Err("Usage: chapter add|rename|rm|move ...".to_string()),
        }
    }

    fn parse_scene(args: &str) -> Result<Command, String> {
        let (sub, rest) = split_word(args);
        match sub {
            "add" => {
                let (chapter, rest) = split_word(rest);
                let chapter = ChapterId(parse_id(chapter)?);
                let rest = rest.trim();
                let (title, at) = match rest.rsplit_once(' ') {
                    Some((title, pos)) if pos.starts_with('@') => {
                        (title.trim(), Some(parse_order(&pos[1..])?))
                    }
                    _ => (rest, None),
                };
                Ok(Command::SceneAdd {
                    chapter,
                    title: title.to_string(),
                    at,
                })
            }
            "title" | "write" | "cast" => {
                let (id, text) = split_word(rest);
                let id = SceneId(parse_id(id)?);
                let text = text.trim();
                Ok(match sub {
                    "title" => Command::SceneTitle(id, text.to_string()),
                    "write" => Command::SceneWrite(id, text.to_string()),
                    _ => Command::SceneCast(
                        id,
                        text.split(',')
                            .map(str::trim)
                            .filter(|n| !n.is_empty())
                            .map(str::to_string)
                            .collect(),
                    ),
                })
            }
            "rm" => Ok(Command::SceneRemove(SceneId(parse_id(rest)?))),
            "move" => {
                let (id, order) = split_word(rest);
                Ok(Command::SceneMove(SceneId(parse_id(id)?), parse_order(order)?))
            }
            _ => Err("Usage: scene add|title|write|cast|rm|move ...".to_string()),
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn parse_id(raw: &str) -> Result<u64, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("Expected a numeric id, got '{}'", raw.trim()))
}

fn parse_order(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("Expected an integer order, got '{}'", raw.trim()))
}

// =========================================================================
// Session
// =========================================================================

/// Result of executing a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    /// The session should end.
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

/// An editor context and its autosave coordinator.
#[derive(Debug, Clone)]
pub struct HeadlessSession {
    editor: EditorContext,
    autosave: Autosave,
}

impl HeadlessSession {
    /// Open the configured store, seed it if asked, and load it.
    ///
    /// AI feedback is enabled when `ANTHROPIC_API_KEY` is set.
    pub async fn open(config: HeadlessConfig) -> Result<Self, HeadlessError> {
        let store: Arc<dyn Store> = match &config.editor.store_path {
            Some(path) => Arc::new(MemoryStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };

        if config.seed_demo && demo::seed_if_empty(store.as_ref()).await? {
            tracing::info!("Demo manuscript created");
        }

        let mut editor = EditorContext::new(store);
        match ClaudeFeedback::from_env() {
            Ok(service) => {
                let mut service = service.with_max_tokens(config.editor.max_tokens);
                if let Some(model) = &config.editor.model {
                    service = service.with_model(model);
                }
                tracing::info!(model = service.model(), "AI feedback enabled");
                let service: Arc<dyn FeedbackService> = Arc::new(service);
                editor = editor.with_feedback(service);
            }
            Err(e) => tracing::info!(reason = %e, "AI feedback disabled"),
        }

        Self::with_parts(editor, Arc::new(TokioScheduler), &config.editor).await
    }

    /// Assemble a session from an editor and a scheduler, and load it.
    pub async fn with_parts(
        editor: EditorContext,
        scheduler: Arc<dyn Scheduler>,
        config: &EditorConfig,
    ) -> Result<Self, HeadlessError> {
        editor.load().await?;
        let autosave = Autosave::new(editor.clone(), scheduler, config);
        Ok(Self { editor, autosave })
    }

    pub fn editor(&self) -> &EditorContext {
        &self.editor
    }

    pub fn autosave(&self) -> &Autosave {
        &self.autosave
    }

    /// Run one command.
    pub async fn execute(&self, command: Command) -> Result<Reply, EditorError> {
        let editor = &self.editor;

        let reply = match command {
            Command::Help => Reply::text(HELP),
            Command::List => Reply::text(self.render_outline()),
            Command::ChapterAdd(title) => {
                let id = editor.create_chapter(&title).await?;
                Reply::text(format!("Chapter {id} created"))
            }
            Command::ChapterRename(id, title) => {
                editor.update_chapter_title(id, &title).await?;
                Reply::text(format!("Chapter {id} renamed"))
            }
            Command::ChapterRemove(id) => {
                self.autosave.teardown_chapter(id);
                editor.delete_chapter(id).await?;
                Reply::text(format!("Chapter {id} deleted"))
            }
            Command::ChapterMove(id, order) => {
                editor.reorder_chapter(id, order).await?;
                Reply::text(format!("Chapter {id} moved to {order}"))
            }
            Command::SceneAdd { chapter, title, at } => {
                let id = editor.create_scene(chapter, &title, at).await?;
                Reply::text(format!("Scene {id} created"))
            }
            Command::SceneTitle(id, text) => {
                self.require_scene(id)?;
                self.autosave.edit(EditTarget::SceneTitle(id), text);
                Reply::text(format!("Scene {id} title edited"))
            }
            Command::SceneWrite(id, text) => {
                self.require_scene(id)?;
                self.autosave.edit(EditTarget::SceneContent(id), text);
                Reply::text(format!("Scene {id} content edited"))
            }
            Command::SceneCast(id, names) => {
                editor.update_scene_characters(id, names).await?;
                Reply::text(format!("Scene {id} characters updated"))
            }
            Command::SceneRemove(id) => {
                self.autosave.teardown_scene(id);
                editor.delete_scene(id).await?;
                Reply::text(format!("Scene {id} deleted"))
            }
            Command::SceneMove(id, order) => {
                editor.reorder_scene(id, order).await?;
                Reply::text(format!("Scene {id} moved to {order}"))
            }
            Command::Select(id) => {
                editor.select(id)?;
                Reply::text(match id {
                    Some(id) => format!("Scene {id} selected"),
                    None => "Selection cleared".to_string(),
                })
            }
            Command::Feedback(id) => Reply::text(editor.request_feedback(id).await?),
            Command::Grammar(id) => Reply::text(editor.check_grammar(id).await?),
            Command::Title(text) => {
                editor.update_novel_title(&text).await?;
                Reply::text("Title updated")
            }
            Command::Synopsis(text) => {
                editor.update_synopsis(&text).await?;
                Reply::text("Synopsis updated")
            }
            Command::Purge => {
                let removed = editor.purge_orphans().await?;
                Reply::text(format!("Removed {removed} orphaned scenes"))
            }
            Command::Flush => {
                let pending = self.autosave.pending();
                self.autosave.flush().await;
                Reply::text(format!("Flushed {pending} pending edits"))
            }
            Command::Quit => {
                let dropped = self.autosave.pending();
                self.autosave.teardown_all();
                Reply {
                    text: if dropped > 0 {
                        format!("Goodbye! ({dropped} unsaved edits dropped)")
                    } else {
                        "Goodbye!".to_string()
                    },
                    quit: true,
                }
            }
        };

        Ok(reply)
    }

    fn require_scene(&self, id: SceneId) -> Result<(), EditorError> {
        if self.editor.snapshot().scene(id).is_none() {
            return Err(EditorError::not_found("Scene", id.get()));
        }
        Ok(())
    }

    /// Chapters and scenes as an indented outline.
    pub fn render_outline(&self) -> String {
        let snap = self.editor.snapshot();
        let mut out = String::new();

        let title = match snap.novel_title() {
            "" => "(untitled)",
            t => t,
        };
        let _ = writeln!(out, "# {title}");

        if snap.chapters.is_empty() {
            let _ = writeln!(out, "(no chapters)");
        }
        for chapter in &snap.chapters {
            let _ = writeln!(
                out,
                "[{}] {} (order {})",
                chapter.id, chapter.title, chapter.order
            );
            for scene in snap.scenes_for_chapter(chapter.id) {
                let marker = if snap.selected_scene_id == Some(scene.id) {
                    " *"
                } else {
                    ""
                };
                let _ = writeln!(
                    out,
                    "    [{}] {} (order {}, {} chars){marker}",
                    scene.id,
                    scene.title,
                    scene.order,
                    scene.char_count()
                );
            }
        }

        if !snap.hidden_orphans.is_empty() {
            let _ = writeln!(
                out,
                "({} orphaned scenes hidden; run purge to delete them)",
                snap.hidden_orphans.len()
            );
        }

        out.trim_end().to_string()
    }
}
