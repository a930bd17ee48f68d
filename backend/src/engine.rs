use std::sync::Arc;

use chrono::Utc;
use draw_core::{DrawError, DrawResult, DrawState, Participant};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{DrawStore, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    InvalidRegistration(String),
    #[error("registration is closed, the draw has already been performed")]
    RegistrationClosed,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Runs the draw against a [`DrawStore`] and answers assignment lookups.
pub struct DrawEngine {
    store: Arc<dyn DrawStore>,
    // Serialises every write that depends on the draw state.
    write_lock: Mutex<()>,
}

impl DrawEngine {
    pub fn new(store: Arc<dyn DrawStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Draws once per cycle. `seed` makes the pairing reproducible; without it
    /// the generator is seeded from OS entropy.
    pub async fn run_draw(&self, seed: Option<u64>) -> Result<Vec<DrawResult>, EngineError> {
        let _guard = self.write_lock.lock().await;

        let state = self.store.draw_state().await;
        let participants = self.store.list_participants().await;

        let mut rng = seed
            .map(ChaCha8Rng::seed_from_u64)
            .unwrap_or_else(ChaCha8Rng::from_entropy);

        let results = match draw_core::draw(&participants, &state, &mut rng) {
            Ok(results) => results,
            Err(err) => {
                warn!(participants = participants.len(), "draw rejected: {err}");
                return Err(err.into());
            }
        };

        self.store.commit_draw(results.clone(), Utc::now()).await?;
        info!(participants = results.len(), seeded = seed.is_some(), "draw committed");

        Ok(results)
    }

    /// Name of the recipient assigned to `user_id`, if the draw has run and
    /// the user took part in it.
    pub async fn assignment_for(&self, user_id: &str) -> Option<String> {
        self.store
            .draw_result_for(user_id)
            .await
            .map(|r| r.assigned_to_name)
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.store.list_participants().await
    }

    pub async fn state(&self) -> DrawState {
        self.store.draw_state().await
    }

    pub async fn results(&self) -> Vec<DrawResult> {
        self.store.draw_results().await
    }

    pub async fn register(&self, registration: Registration) -> Result<Participant, EngineError> {
        let name = registration.name.trim();
        let email = registration.email.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidRegistration("name required".into()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::InvalidRegistration("valid email required".into()));
        }

        let _guard = self.write_lock.lock().await;
        if self.store.draw_state().await.has_run {
            return Err(EngineError::RegistrationClosed);
        }

        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            phone: registration.phone.trim().to_string(),
            created_at: Utc::now(),
        };
        self.store.add_participant(participant.clone()).await?;
        info!(participant_id = %participant.id, "participant registered");

        Ok(participant)
    }
}
