use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use vj_domain::{FailureKind, StoreError};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    Editing,
    Saving,
    Saved,
    Error { kind: FailureKind, message: String },
}

impl From<StoreError> for SaveStatus {
    fn from(err: StoreError) -> Self {
        let kind = err.failure_kind();
        let message = match err {
            StoreError::Request { message, .. } => message,
            other => other.to_string(),
        };
        SaveStatus::Error { kind, message }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveTicket<T> {
    pub field: String,
    pub target: String,
    pub sequence: u64,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Applied,
    Discarded,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error("no autosave field named `{0}`")]
    UnknownField(String),
}

#[derive(Debug)]
struct PendingEdit<T> {
    value: T,
    deadline: Instant,
    token: CancellationToken,
}

/// Autosave state for one field (`idle -> editing -> saving -> saved | error`).
///
/// Every issued write carries a sequence number; only the latest one for the
/// current target may change the status.
#[derive(Debug)]
pub struct FieldSaver<T> {
    field: String,
    target: String,
    delay: Duration,
    status: SaveStatus,
    sequence: u64,
    pending: Option<PendingEdit<T>>,
}

impl<T: Clone> FieldSaver<T> {
    pub fn new(field: impl Into<String>, target: impl Into<String>, delay: Duration) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            delay,
            status: SaveStatus::Idle,
            sequence: 0,
            pending: None,
        }
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn latest_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn edit(&mut self, value: T, now: Instant) -> CancellationToken {
        if let Some(previous) = self.pending.take() {
            previous.token.cancel();
        }
        let token = CancellationToken::new();
        self.pending = Some(PendingEdit {
            value,
            deadline: now + self.delay,
            token: token.clone(),
        });
        self.status = SaveStatus::Editing;
        token
    }

    pub fn poll(&mut self, now: Instant) -> Option<SaveTicket<T>> {
        let (cancelled, due) = match &self.pending {
            Some(pending) => (pending.token.is_cancelled(), now >= pending.deadline),
            None => return None,
        };
        if cancelled {
            self.pending = None;
            return None;
        }
        if due {
            self.flush()
        } else {
            None
        }
    }

    pub fn flush(&mut self) -> Option<SaveTicket<T>> {
        let pending = self.pending.take()?;
        if pending.token.is_cancelled() {
            return None;
        }
        pending.token.cancel();
        self.sequence += 1;
        self.status = SaveStatus::Saving;
        Some(SaveTicket {
            field: self.field.clone(),
            target: self.target.clone(),
            sequence: self.sequence,
            value: pending.value,
        })
    }

    /// Points the field at a different date or month. A pending edit is
    /// issued for the old target before switching; its result, like that of
    /// any write already in flight, no longer changes the status.
    pub fn retarget(&mut self, target: impl Into<String>) -> Option<SaveTicket<T>> {
        let target = target.into();
        if target == self.target {
            return None;
        }
        let carried = self.flush();
        self.sequence += 1;
        self.target = target;
        self.status = SaveStatus::Idle;
        carried
    }

    pub fn complete(
        &mut self,
        ticket: &SaveTicket<T>,
        outcome: Result<(), StoreError>,
    ) -> Completion {
        if ticket.sequence != self.sequence || ticket.target != self.target {
            debug!(
                field = %self.field,
                ticket = ticket.sequence,
                latest = self.sequence,
                "discarding stale save result"
            );
            return Completion::Discarded;
        }
        self.status = match outcome {
            Ok(()) if self.pending.is_some() => SaveStatus::Editing,
            Ok(()) => SaveStatus::Saved,
            Err(err) => err.into(),
        };
        Completion::Applied
    }
}

#[derive(Debug)]
pub struct AutosaveRegistry<T> {
    delay: Duration,
    fields: BTreeMap<String, FieldSaver<T>>,
    ready: VecDeque<SaveTicket<T>>,
}

impl<T: Clone> Default for AutosaveRegistry<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl<T: Clone> AutosaveRegistry<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fields: BTreeMap::new(),
            ready: VecDeque::new(),
        }
    }

    pub fn status(&self, field: &str) -> Option<&SaveStatus> {
        self.fields.get(field).map(FieldSaver::status)
    }

    #[instrument(skip(self, value, now))]
    pub fn edit(&mut self, field: &str, target: &str, value: T, now: Instant) -> CancellationToken {
        let delay = self.delay;
        let saver = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| FieldSaver::new(field, target, delay));
        if let Some(ticket) = saver.retarget(target) {
            self.ready.push_back(ticket);
        }
        saver.edit(value, now)
    }

    pub fn retarget(&mut self, field: &str, target: &str) -> Result<(), SaveError> {
        let saver = self
            .fields
            .get_mut(field)
            .ok_or_else(|| SaveError::UnknownField(field.to_string()))?;
        if let Some(ticket) = saver.retarget(target) {
            self.ready.push_back(ticket);
        }
        Ok(())
    }

    pub fn poll(&mut self, now: Instant) -> usize {
        let before = self.ready.len();
        for saver in self.fields.values_mut() {
            if let Some(ticket) = saver.poll(now) {
                self.ready.push_back(ticket);
            }
        }
        self.ready.len() - before
    }

    pub fn flush(&mut self, field: &str) -> Result<bool, SaveError> {
        let saver = self
            .fields
            .get_mut(field)
            .ok_or_else(|| SaveError::UnknownField(field.to_string()))?;
        match saver.flush() {
            Some(ticket) => {
                self.ready.push_back(ticket);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn flush_all(&mut self) -> usize {
        let before = self.ready.len();
        for saver in self.fields.values_mut() {
            if let Some(ticket) = saver.flush() {
                self.ready.push_back(ticket);
            }
        }
        self.ready.len() - before
    }

    pub fn dequeue(&mut self) -> Option<SaveTicket<T>> {
        self.ready.pop_front()
    }

    pub fn complete(
        &mut self,
        ticket: &SaveTicket<T>,
        outcome: Result<(), StoreError>,
    ) -> Result<Completion, SaveError> {
        let saver = self
            .fields
            .get_mut(&ticket.field)
            .ok_or_else(|| SaveError::UnknownField(ticket.field.clone()))?;
        Ok(saver.complete(ticket, outcome))
    }

    /// Runs `write` for the ticket. A [`StoreError`] from the write is kept
    /// as is; any other error is treated as a failed request.
    pub fn perform(
        &mut self,
        ticket: SaveTicket<T>,
        write: impl FnOnce(&SaveTicket<T>) -> anyhow::Result<()>,
    ) -> Result<Completion, SaveError> {
        let outcome = write(&ticket).map_err(|err| match err.downcast::<StoreError>() {
            Ok(store) => store,
            Err(other) => StoreError::request(format!("{other:#}")),
        });
        self.complete(&ticket, outcome)
    }
}
