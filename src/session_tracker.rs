//! Per-user cooking-session state machine.
//!
//! The cursor counts completed/acknowledged steps: 0 right after
//! assignment, N once the whole recipe is done. Advancement is linearized
//! through the store's conditional write, so two concurrent advances can
//! never both apply against the same base.

use std::sync::Arc;

use tracing::debug;

use crate::error::CoreError;
use crate::schemas::RecipeDocument;
use crate::store::UserStore;

/// Retries for a lost conditional-write race before giving up.
const ADVANCE_RETRIES: u32 = 3;

/// Result of an advance: the next step to perform, or completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Step { step_no: u32, instruction: String },
    Complete,
}

/// Observable session state, derived from the stored document.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    NoSession,
    Assigned,
    InProgress { step: u32 },
    Complete,
}

#[derive(Clone)]
pub struct SessionTracker {
    users: Arc<dyn UserStore>,
}

impl SessionTracker {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Assign a recipe snapshot, replacing any prior session entirely.
    pub async fn assign(&self, user_id: &str, recipe: &RecipeDocument) -> Result<(), CoreError> {
        self.users.assign_recipe(user_id, recipe).await
    }

    /// Acknowledge the next step and return its instruction, or the
    /// completion signal once every step is done. Idempotent at completion.
    pub async fn advance(&self, user_id: &str) -> Result<Advance, CoreError> {
        for attempt in 0..=ADVANCE_RETRIES {
            let session = self
                .users
                .find_session(user_id)
                .await?
                .ok_or_else(|| CoreError::NoActiveSession(user_id.to_string()))?;
            let recipe = session
                .current_recipe
                .ok_or_else(|| CoreError::NoActiveSession(user_id.to_string()))?;

            let total = recipe.steps.len() as u32;
            let completed = session.current_step;
            if completed >= total {
                return Ok(Advance::Complete);
            }

            if self.users.advance_step(user_id, completed).await? {
                let step = &recipe.steps[completed as usize];
                return Ok(Advance::Step {
                    step_no: step.step_no,
                    instruction: step.instruction.clone(),
                });
            }
            // Lost the conditional write to a concurrent advance; re-read
            // and try again from the new base.
            debug!(
                "advance race for user {} (attempt {}), re-reading",
                user_id, attempt
            );
        }
        Err(CoreError::Store(format!(
            "session advance contention for user {}",
            user_id
        )))
    }

    /// Instructions for steps 1..=upto, clamped to the recipe length.
    /// Read-only; used to give the step verifier its context.
    pub async fn current_step_instructions(
        &self,
        user_id: &str,
        upto: u32,
    ) -> Result<Vec<String>, CoreError> {
        let session = self
            .users
            .find_session(user_id)
            .await?
            .ok_or_else(|| CoreError::NoActiveSession(user_id.to_string()))?;
        let recipe = session
            .current_recipe
            .ok_or_else(|| CoreError::NoActiveSession(user_id.to_string()))?;
        let end = (upto as usize).min(recipe.steps.len());
        Ok(recipe.steps[..end]
            .iter()
            .map(|step| step.instruction.clone())
            .collect())
    }

    pub async fn state(&self, user_id: &str) -> Result<SessionState, CoreError> {
        let session = match self.users.find_session(user_id).await? {
            Some(session) => session,
            None => return Ok(SessionState::NoSession),
        };
        let recipe = match session.current_recipe {
            Some(recipe) => recipe,
            None => return Ok(SessionState::NoSession),
        };
        let total = recipe.steps.len() as u32;
        Ok(match session.current_step {
            step if step >= total => SessionState::Complete,
            0 => SessionState::Assigned,
            step => SessionState::InProgress { step },
        })
    }

    pub async fn reset(&self, user_id: &str) -> Result<(), CoreError> {
        self.users.reset_session(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe_matcher::tests_support::recipe;
    use crate::store::memory::MemoryStore;

    fn tracker_with_store() -> (SessionTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SessionTracker::new(store.clone()), store)
    }

    #[tokio::test]
    async fn advance_without_session_fails() {
        let (tracker, _store) = tracker_with_store();
        match tracker.advance("U1").await {
            Err(CoreError::NoActiveSession(_)) => {}
            other => panic!("expected no-active-session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn assign_resets_to_step_zero() {
        let (tracker, _store) = tracker_with_store();
        let three_steps = recipe("味噌汁", &[("tofu", 1.0)], 3, 15);
        tracker.assign("U1", &three_steps).await.unwrap();
        assert_eq!(tracker.state("U1").await.unwrap(), SessionState::Assigned);

        tracker.advance("U1").await.unwrap();
        // Re-assignment replaces the session wholesale.
        tracker.assign("U1", &three_steps).await.unwrap();
        assert_eq!(tracker.state("U1").await.unwrap(), SessionState::Assigned);
    }

    #[tokio::test]
    async fn advance_walks_steps_then_completes_idempotently() {
        let (tracker, _store) = tracker_with_store();
        tracker
            .assign("U1", &recipe("味噌汁", &[("tofu", 1.0)], 3, 15))
            .await
            .unwrap();

        assert_eq!(
            tracker.advance("U1").await.unwrap(),
            Advance::Step {
                step_no: 1,
                instruction: "手順 1".to_string()
            }
        );
        assert_eq!(
            tracker.advance("U1").await.unwrap(),
            Advance::Step {
                step_no: 2,
                instruction: "手順 2".to_string()
            }
        );
        assert_eq!(
            tracker.state("U1").await.unwrap(),
            SessionState::InProgress { step: 2 }
        );
        assert_eq!(
            tracker.advance("U1").await.unwrap(),
            Advance::Step {
                step_no: 3,
                instruction: "手順 3".to_string()
            }
        );
        assert_eq!(tracker.state("U1").await.unwrap(), SessionState::Complete);
        // Further advances are no-ops returning the completion signal.
        assert_eq!(tracker.advance("U1").await.unwrap(), Advance::Complete);
        assert_eq!(tracker.advance("U1").await.unwrap(), Advance::Complete);
        assert_eq!(tracker.state("U1").await.unwrap(), SessionState::Complete);
    }

    #[tokio::test]
    async fn concurrent_advances_never_skip_or_duplicate() {
        let (tracker, store) = tracker_with_store();
        tracker
            .assign("U1", &recipe("味噌汁", &[("tofu", 1.0)], 3, 15))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move { tracker.advance("U1").await }));
        }
        let mut steps_seen = Vec::new();
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Advance::Step { step_no, .. } => steps_seen.push(step_no),
                Advance::Complete => {}
            }
        }
        steps_seen.sort_unstable();
        // Each step was handed out exactly once.
        assert_eq!(steps_seen, vec![1, 2, 3]);
        let session = crate::store::UserStore::find_session(store.as_ref(), "U1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.current_step, 3);
    }

    #[tokio::test]
    async fn instruction_context_is_clamped_and_readonly() {
        let (tracker, _store) = tracker_with_store();
        tracker
            .assign("U1", &recipe("味噌汁", &[("tofu", 1.0)], 3, 15))
            .await
            .unwrap();

        let context = tracker.current_step_instructions("U1", 2).await.unwrap();
        assert_eq!(context, vec!["手順 1", "手順 2"]);
        let clamped = tracker.current_step_instructions("U1", 10).await.unwrap();
        assert_eq!(clamped.len(), 3);
        assert_eq!(tracker.state("U1").await.unwrap(), SessionState::Assigned);
    }

    #[tokio::test]
    async fn reset_returns_to_no_session() {
        let (tracker, _store) = tracker_with_store();
        tracker
            .assign("U1", &recipe("味噌汁", &[("tofu", 1.0)], 3, 15))
            .await
            .unwrap();
        tracker.advance("U1").await.unwrap();
        tracker.reset("U1").await.unwrap();
        assert_eq!(tracker.state("U1").await.unwrap(), SessionState::NoSession);
        assert!(tracker.advance("U1").await.is_err());
    }
}
