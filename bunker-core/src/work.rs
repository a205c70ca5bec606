//! Planned multi-step writes.
//!
//! Structural operations (insert with shift, cascade delete) touch several
//! rows through separate store calls. They are built up front as a
//! [`WorkPlan`] and executed in order. Execution stops at the first failed
//! step; earlier steps stay applied. Callers reconcile by reloading.

use crate::schema::{ChapterId, NewScene, SceneId, ScenePatch};
use crate::store::{Store, StoreError};
use std::fmt;
use thiserror::Error;

/// One store call in a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Move a sibling from `from` to `to` to open a slot.
    ShiftScene { id: SceneId, from: i64, to: i64 },
    CreateScene(NewScene),
    DeleteScenes(Vec<SceneId>),
    DeleteChapter(ChapterId),
}

impl Step {
    /// Issue this step's store call.
    pub async fn run(&self, store: &dyn Store) -> Result<Option<SceneId>, StoreError> {
        match self {
            Step::ShiftScene { id, to, .. } => {
                store.update_scene(*id, ScenePatch::order(*to)).await?;
                Ok(None)
            }
            Step::CreateScene(new) => store.create_scene(new.clone()).await.map(Some),
            Step::DeleteScenes(ids) => {
                store.bulk_delete_scenes(ids).await?;
                Ok(None)
            }
            Step::DeleteChapter(id) => {
                store.delete_chapter(*id).await?;
                Ok(None)
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::ShiftScene { id, from, to } => write!(f, "shift scene {id} {from}->{to}"),
            Step::CreateScene(new) => {
                write!(f, "create scene in chapter {} at {}", new.chapter_id, new.order)
            }
            Step::DeleteScenes(ids) => write!(f, "delete {} scenes", ids.len()),
            Step::DeleteChapter(id) => write!(f, "delete chapter {id}"),
        }
    }
}

/// A failed plan execution.
#[derive(Debug, Error)]
#[error("step {} of {total} ({step}) failed: {source}", .completed + 1)]
pub struct WorkError {
    /// Steps that completed before the failure.
    pub completed: usize,
    pub total: usize,
    pub step: String,
    #[source]
    pub source: StoreError,
}

/// Result of a fully executed plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkOutcome {
    /// Id of the scene created by the plan, if it created one.
    pub created: Option<SceneId>,
    pub completed: usize,
}

/// An ordered list of store calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkPlan {
    steps: Vec<Step>,
}

impl WorkPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn execute(&self, store: &dyn Store) -> Result<WorkOutcome, WorkError> {
        let total = self.steps.len();
        let mut outcome = WorkOutcome::default();

        for (index, step) in self.steps.iter().enumerate() {
            match step.run(store).await {
                Ok(created) => {
                    if created.is_some() {
                        outcome.created = created;
                    }
                    outcome.completed = index + 1;
                }
                Err(source) => {
                    tracing::warn!(
                        step = %step,
                        completed = index,
                        total,
                        error = %source,
                        "Work plan aborted"
                    );
                    return Err(WorkError {
                        completed: index,
                        total,
                        step: step.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(outcome)
    }
}
