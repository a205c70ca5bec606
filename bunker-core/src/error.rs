//! Errors surfaced by editor actions.

use crate::ordering::OrderingError;
use crate::schema::Table;
use crate::store::StoreError;
use crate::work::WorkError;
use thiserror::Error;

/// Errors from `EditorContext` actions.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    /// Text of the collaborator's error response, unchanged.
    #[error("{0}")]
    Upstream(String),
}

impl EditorError {
    pub(crate) fn not_found(entity: &'static str, id: u64) -> Self {
        EditorError::NotFound { entity, id }
    }
}

impl From<StoreError> for EditorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { table, id } => EditorError::NotFound {
                entity: entity_name(table),
                id,
            },
            other => EditorError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<WorkError> for EditorError {
    fn from(err: WorkError) -> Self {
        match err.source {
            StoreError::NotFound { .. } => err.source.into(),
            _ => EditorError::StorageUnavailable(err.to_string()),
        }
    }
}

impl From<OrderingError> for EditorError {
    fn from(err: OrderingError) -> Self {
        match err {
            OrderingError::Overflow(_) => EditorError::Validation(err.to_string()),
            OrderingError::Store(e) => e.into(),
            OrderingError::Work(e) => e.into(),
        }
    }
}

fn entity_name(table: Table) -> &'static str {
    match table {
        Table::Chapters => "Chapter",
        Table::Scenes => "Scene",
        Table::Characters => "Character",
        Table::Settings => "Setting",
    }
}
