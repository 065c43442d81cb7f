//! Interactive conflict resolution
//!
//! When a pull comparison ends in `CONFLICT`, the session presents both
//! sides to a [`ConflictResolver`] and waits for one of three answers: use
//! the local copy, keep the vault copy, or cancel this title. The resolver
//! is a trait so the same session logic runs against a terminal prompt in
//! the binary and a scripted queue of answers in tests.

use crate::error::{Result, SyncError};
use crate::types::{ComparisonResult, Direction};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// Answer to a conflict prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    /// Use the local copy
    Local,
    /// Use the vault copy
    Remote,
    /// Leave both sides as they are
    Cancel,
}

impl ConflictChoice {
    /// Parse a typed answer
    ///
    /// Accepts `l`/`local`, `r`/`remote` and `c`/`cancel` in any case.
    /// Anything else cancels.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "l" | "local" => ConflictChoice::Local,
            "r" | "remote" => ConflictChoice::Remote,
            _ => ConflictChoice::Cancel,
        }
    }
}

impl fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictChoice::Local => f.write_str("local"),
            ConflictChoice::Remote => f.write_str("remote"),
            ConflictChoice::Cancel => f.write_str("cancel"),
        }
    }
}

/// Progress of one conflict prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictState {
    /// Both sides shown, waiting for an answer
    Presented,
    /// Answer received
    Resolved(ConflictChoice),
}

impl ConflictState {
    /// Record the answer
    ///
    /// A prompt can only be answered once.
    pub fn resolve(self, choice: ConflictChoice) -> Result<ConflictState> {
        match self {
            ConflictState::Presented => Ok(ConflictState::Resolved(choice)),
            ConflictState::Resolved(previous) => Err(SyncError::internal(format!(
                "conflict already resolved as {}",
                previous
            ))),
        }
    }

    /// The answer, once resolved
    pub fn choice(&self) -> Option<ConflictChoice> {
        match self {
            ConflictState::Presented => None,
            ConflictState::Resolved(choice) => Some(*choice),
        }
    }
}

/// Obtains a decision for a conflicting comparison
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, comparison: &ComparisonResult, title: &str, direction: Direction) -> Result<ConflictChoice>;
}

/// Answers prompts from a fixed queue, then cancels
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    choices: Mutex<VecDeque<ConflictChoice>>,
    presented: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new(choices: impl IntoIterator<Item = ConflictChoice>) -> Self {
        Self {
            choices: Mutex::new(choices.into_iter().collect()),
            presented: Mutex::new(Vec::new()),
        }
    }

    /// Titles that were presented, in order
    pub fn presented(&self) -> Vec<String> {
        self.presented
            .lock()
            .map(|titles| titles.clone())
            .unwrap_or_default()
    }
}

impl ConflictResolver for ScriptedResolver {
    fn resolve(&self, _comparison: &ComparisonResult, title: &str, _direction: Direction) -> Result<ConflictChoice> {
        let state = ConflictState::Presented;
        if let Ok(mut presented) = self.presented.lock() {
            presented.push(title.to_string());
        }

        let choice = self
            .choices
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(ConflictChoice::Cancel);

        state
            .resolve(choice)?
            .choice()
            .ok_or_else(|| SyncError::internal("conflict left unresolved"))
    }
}
