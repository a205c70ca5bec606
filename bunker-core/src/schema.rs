//! Entity schema for the manuscript store.
//!
//! Four tables: chapters, scenes, characters and settings. Rows carry
//! store-assigned integer ids (settings are keyed by text). Scenes point at
//! their chapter through `chapter_id`, a soft reference the store does not
//! enforce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Setting key holding the manuscript title.
pub const NOVEL_TITLE_KEY: &str = "novelTitle";

/// Setting key holding the manuscript synopsis.
pub const SYNOPSIS_KEY: &str = "synopsis";

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The raw integer id.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(
    /// Identifier of a chapter row.
    ChapterId
);
row_id!(
    /// Identifier of a scene row.
    SceneId
);
row_id!(
    /// Identifier of a character row.
    CharacterId
);

// =========================================================================
// Rows
// =========================================================================

/// Top-level ordered narrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub title: String,
    /// Global position among chapters.
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered unit of content within a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    pub chapter_id: ChapterId,
    pub title: String,
    /// Serialized rich text produced by the editing surface.
    pub content: String,
    /// Position among scenes sharing `chapter_id`.
    pub order: i64,
    /// Free-text character names, not ids.
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// Sort key for scene listings: chapter, then order, then insertion id.
    pub fn sort_key(&self) -> (ChapterId, i64, SceneId) {
        (self.chapter_id, self.order, self.id)
    }

    /// The content with markup tags removed.
    pub fn plain_text(&self) -> String {
        strip_tags(&self.content)
    }

    /// Number of characters in the tag-stripped content.
    pub fn char_count(&self) -> usize {
        self.plain_text().chars().count()
    }
}

/// A character sheet. Not linked to `Scene::characters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A singleton key/value row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Remove `<...>` markup from a serialized rich-text string.
///
/// Matches the editor's HTML output closely enough for counting and prompts;
/// entities are left as-is.
pub fn strip_tags(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

// =========================================================================
// Inserts and partial updates
// =========================================================================

/// Fields for a new chapter. The store stamps id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChapter {
    pub title: String,
    pub order: i64,
}

/// Fields for a new scene.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScene {
    pub chapter_id: ChapterId,
    pub title: String,
    pub content: String,
    pub order: i64,
    pub characters: Vec<String>,
}

impl NewScene {
    /// An empty scene at the given position.
    pub fn new(chapter_id: ChapterId, title: impl Into<String>, order: i64) -> Self {
        Self {
            chapter_id,
            title: title.into(),
            content: String::new(),
            order,
            characters: Vec::new(),
        }
    }
}

/// Fields for a new character.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCharacter {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Partial update of a chapter. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterPatch {
    pub title: Option<String>,
    pub order: Option<i64>,
}

impl ChapterPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn order(order: i64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, row: &mut Chapter) {
        if let Some(title) = self.title {
            row.title = title;
        }
        if let Some(order) = self.order {
            row.order = order;
        }
    }
}

/// Partial update of a scene.
///
/// `ai_feedback` is doubly optional: `Some(None)` clears stored feedback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenePatch {
    pub chapter_id: Option<ChapterId>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: Option<i64>,
    pub characters: Option<Vec<String>>,
    pub ai_feedback: Option<Option<String>>,
}

impl ScenePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn order(order: i64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn characters(names: Vec<String>) -> Self {
        Self {
            characters: Some(names),
            ..Self::default()
        }
    }

    pub fn ai_feedback(feedback: Option<String>) -> Self {
        Self {
            ai_feedback: Some(feedback),
            ..Self::default()
        }
    }

    pub fn with_characters(mut self, names: Vec<String>) -> Self {
        self.characters = Some(names);
        self
    }

    pub(crate) fn apply(self, row: &mut Scene) {
        if let Some(chapter_id) = self.chapter_id {
            row.chapter_id = chapter_id;
        }
        if let Some(title) = self.title {
            row.title = title;
        }
        if let Some(content) = self.content {
            row.content = content;
        }
        if let Some(order) = self.order {
            row.order = order;
        }
        if let Some(characters) = self.characters {
            row.characters = characters;
        }
        if let Some(feedback) = self.ai_feedback {
            row.ai_feedback = feedback;
        }
    }
}

/// Partial update of a character.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl CharacterPatch {
    pub(crate) fn apply(self, row: &mut Character) {
        if let Some(name) = self.name {
            row.name = name;
        }
        if let Some(description) = self.description {
            row.description = description;
        }
        if let Some(tags) = self.tags {
            row.tags = tags;
        }
    }
}

// =========================================================================
// Declared layout
// =========================================================================

/// The four tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Chapters,
    Scenes,
    Characters,
    Settings,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Chapters => "chapters",
            Table::Scenes => "scenes",
            Table::Characters => "characters",
            Table::Settings => "settings",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a table's rows are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKey {
    /// Store-assigned, monotonically increasing integer `id`.
    AutoIncrement,
    /// Caller-supplied text field.
    Field(&'static str),
}

/// Logical layout of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub table: Table,
    pub primary_key: PrimaryKey,
    /// Secondary indexes; multi-field entries are composite.
    pub indexes: &'static [&'static [&'static str]],
}

/// The persisted layout.
pub const TABLES: [TableSpec; 4] = [
    TableSpec {
        table: Table::Chapters,
        primary_key: PrimaryKey::AutoIncrement,
        indexes: &[&["order"], &["createdAt"]],
    },
    TableSpec {
        table: Table::Scenes,
        primary_key: PrimaryKey::AutoIncrement,
        indexes: &[&["chapterId"], &["order"], &["chapterId", "order"], &["createdAt"]],
    },
    TableSpec {
        table: Table::Characters,
        primary_key: PrimaryKey::AutoIncrement,
        indexes: &[&["name"]],
    },
    TableSpec {
        table: Table::Settings,
        primary_key: PrimaryKey::Field("key"),
        indexes: &[],
    },
];

/// Look up the declared layout of a table.
pub fn table_spec(table: Table) -> &'static TableSpec {
    TABLES
        .iter()
        .find(|spec| spec.table == table)
        .unwrap_or(&TABLES[0])
}
