use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use draw_core::{DrawResult, DrawState, Participant};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("a participant with email {0} is already registered")]
    DuplicateEmail(String),
}

/// Persistence used by the draw engine. Writes are all-or-nothing: a failed
/// write leaves previously visible data untouched.
#[async_trait]
pub trait DrawStore: Send + Sync {
    /// Participants in registration order.
    async fn list_participants(&self) -> Vec<Participant>;

    async fn add_participant(&self, participant: Participant) -> Result<(), StoreError>;

    async fn draw_state(&self) -> DrawState;

    async fn set_draw_state(&self, state: DrawState) -> Result<(), StoreError>;

    /// Replaces the stored result set in one write.
    async fn save_draw_results(&self, results: Vec<DrawResult>) -> Result<(), StoreError>;

    async fn draw_result_for(&self, participant_id: &str) -> Option<DrawResult>;

    async fn draw_results(&self) -> Vec<DrawResult>;

    /// Stores `results` and marks the draw as run in a single write.
    async fn commit_draw(
        &self,
        results: Vec<DrawResult>,
        drawn_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub participants: Vec<Participant>,
    pub results: Vec<DrawResult>,
    pub state: DrawState,
}

/// In-memory store, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct JsonStore {
    snapshot: RwLock<Snapshot>,
    persist_path: Option<PathBuf>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path`, starting empty when the file does not
    /// exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Snapshot::default(),
            Err(err) => return Err(err.into()),
        };
        debug!(
            path = %path.display(),
            participants = snapshot.participants.len(),
            has_run = snapshot.state.has_run,
            "store loaded"
        );

        Ok(Self {
            snapshot: RwLock::new(snapshot),
            persist_path: Some(path),
        })
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Applies `change` to a copy of the snapshot, persists the copy, and only
    /// then publishes it. Readers see either the old or the new snapshot.
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot) -> Result<(), StoreError> + Send,
    {
        let mut current = self.snapshot.write().await;
        let mut next = current.clone();
        change(&mut next)?;

        if let Some(path) = &self.persist_path {
            if let Err(err) = persist(path, &next).await {
                error!(path = %path.display(), "persist error: {err}");
                return Err(err);
            }
        }

        *current = next;
        Ok(())
    }
}

async fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[async_trait]
impl DrawStore for JsonStore {
    async fn list_participants(&self) -> Vec<Participant> {
        self.snapshot.read().await.participants.clone()
    }

    async fn add_participant(&self, participant: Participant) -> Result<(), StoreError> {
        self.update(move |snapshot| {
            let taken = snapshot
                .participants
                .iter()
                .any(|p| p.email.eq_ignore_ascii_case(&participant.email));
            if taken {
                return Err(StoreError::DuplicateEmail(participant.email));
            }
            snapshot.participants.push(participant);
            Ok(())
        })
        .await
    }

    async fn draw_state(&self) -> DrawState {
        self.snapshot.read().await.state.clone()
    }

    async fn set_draw_state(&self, state: DrawState) -> Result<(), StoreError> {
        self.update(move |snapshot| {
            snapshot.state = state;
            Ok(())
        })
        .await
    }

    async fn save_draw_results(&self, results: Vec<DrawResult>) -> Result<(), StoreError> {
        self.update(move |snapshot| {
            snapshot.results = results;
            Ok(())
        })
        .await
    }

    async fn draw_result_for(&self, participant_id: &str) -> Option<DrawResult> {
        self.snapshot
            .read()
            .await
            .results
            .iter()
            .find(|r| r.participant_id == participant_id)
            .cloned()
    }

    async fn draw_results(&self) -> Vec<DrawResult> {
        self.snapshot.read().await.results.clone()
    }

    async fn commit_draw(
        &self,
        results: Vec<DrawResult>,
        drawn_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(move |snapshot| {
            snapshot.results = results;
            snapshot.state = DrawState::drawn(drawn_at);
            Ok(())
        })
        .await
    }
}


#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A [`JsonStore`] whose commits can be switched to fail with an I/O error.
    #[derive(Debug, Default)]
    pub(crate) struct FlakyStore {
        pub(crate) inner: JsonStore,
        fail_commits: AtomicBool,
    }

    impl FlakyStore {
        pub(crate) fn failing() -> Self {
            let store = Self::default();
            store.set_failing(true);
            store
        }

        pub(crate) fn set_failing(&self, failing: bool) {
            self.fail_commits.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(ErrorKind::Other, "disk full").into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DrawStore for FlakyStore {
        async fn list_participants(&self) -> Vec<Participant> {
            self.inner.list_participants().await
        }

        async fn add_participant(&self, participant: Participant) -> Result<(), StoreError> {
            self.inner.add_participant(participant).await
        }

        async fn draw_state(&self) -> DrawState {
            self.inner.draw_state().await
        }

        async fn set_draw_state(&self, state: DrawState) -> Result<(), StoreError> {
            self.check()?;
            self.inner.set_draw_state(state).await
        }

        async fn save_draw_results(&self, results: Vec<DrawResult>) -> Result<(), StoreError> {
            self.check()?;
            self.inner.save_draw_results(results).await
        }

        async fn draw_result_for(&self, participant_id: &str) -> Option<DrawResult> {
            self.inner.draw_result_for(participant_id).await
        }

        async fn draw_results(&self) -> Vec<DrawResult> {
            self.inner.draw_results().await
        }

        async fn commit_draw(
            &self,
            results: Vec<DrawResult>,
            drawn_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.check()?;
            self.inner.commit_draw(results, drawn_at).await
        }
    }
}
