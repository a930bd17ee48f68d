use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

mod countdown;

pub use countdown::Countdown;

pub type ParticipantId = String;

/// Reshuffles allowed before a draw gives up. A uniform shuffle is a
/// derangement with probability close to 1/e, so this is never reached for
/// well-formed input.
pub const MAX_SHUFFLE_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrawResult {
    pub participant_id: ParticipantId,
    pub assigned_to_id: ParticipantId,
    pub assigned_to_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrawState {
    pub has_run: bool,
    #[serde(default)]
    pub drawn_at: Option<DateTime<Utc>>,
}

impl DrawState {
    pub fn drawn(at: DateTime<Utc>) -> Self {
        Self {
            has_run: true,
            drawn_at: Some(at),
        }
    }

    pub fn phase(&self) -> DrawPhase {
        if self.has_run {
            DrawPhase::Drawn
        } else {
            DrawPhase::NotDrawn
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawPhase {
    NotDrawn,
    Drawn,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("at least 2 participants are required for the draw, found {count}")]
    InsufficientParticipants { count: usize },
    #[error("the draw has already been performed")]
    AlreadyDrawn,
    #[error("participant {id} appears more than once")]
    DuplicateParticipant { id: ParticipantId },
    #[error("no valid assignment found after {attempts} shuffles")]
    RetryLimitExceeded { attempts: usize },
}

/// Returns a random permutation of `items` in which no element stays at its
/// original position.
pub fn derange<T, R>(items: &[T], rng: &mut R) -> Result<Vec<T>, DrawError>
where
    T: Clone + PartialEq,
    R: Rng + ?Sized,
{
    derange_with_limit(items, rng, MAX_SHUFFLE_ATTEMPTS)
}

/// Same as [`derange`] with an explicit cap on the number of full reshuffles.
pub fn derange_with_limit<T, R>(
    items: &[T],
    rng: &mut R,
    max_attempts: usize,
) -> Result<Vec<T>, DrawError>
where
    T: Clone + PartialEq,
    R: Rng + ?Sized,
{
    if items.len() < 2 {
        return Err(DrawError::InsufficientParticipants { count: items.len() });
    }

    let mut perm = items.to_vec();
    for _ in 0..max_attempts {
        perm.shuffle(rng);
        if !has_fixed_point(items, &perm) {
            return Ok(perm);
        }
    }

    Err(DrawError::RetryLimitExceeded {
        attempts: max_attempts,
    })
}

fn has_fixed_point<T: PartialEq>(original: &[T], perm: &[T]) -> bool {
    original.iter().zip(perm).any(|(a, b)| a == b)
}

/// Pairs every participant with a recipient. Results come back in the same
/// order as `participants`.
pub fn draw<R>(
    participants: &[Participant],
    state: &DrawState,
    rng: &mut R,
) -> Result<Vec<DrawResult>, DrawError>
where
    R: Rng + ?Sized,
{
    if state.has_run {
        return Err(DrawError::AlreadyDrawn);
    }

    if participants.len() < 2 {
        return Err(DrawError::InsufficientParticipants {
            count: participants.len(),
        });
    }

    let mut seen = HashSet::with_capacity(participants.len());
    for p in participants {
        if !seen.insert(p.id.as_str()) {
            return Err(DrawError::DuplicateParticipant { id: p.id.clone() });
        }
    }

    let ids = participants.iter().map(|p| p.id.clone()).collect::<Vec<_>>();
    let perm = derange(&ids, rng)?;

    let names: HashMap<&str, &str> = participants
        .iter()
        .map(|p| (p.id.as_str(), p.name.as_str()))
        .collect();

    let results = participants
        .iter()
        .zip(perm)
        .map(|(giver, receiver_id)| DrawResult {
            participant_id: giver.id.clone(),
            assigned_to_name: names
                .get(receiver_id.as_str())
                .map(|n| n.to_string())
                .unwrap_or_default(),
            assigned_to_id: receiver_id,
        })
        .collect();

    Ok(results)
}
