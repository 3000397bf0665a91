//! Client-side write coordination: debounced autosave per field and guards
//! that drop responses which arrive after the user moved on.

pub mod autosave;
pub mod guard;

pub use crate::autosave::{
    AutosaveRegistry, CancellationToken, Completion, FieldSaver, SaveError, SaveStatus,
    SaveTicket, DEFAULT_DEBOUNCE,
};
pub use crate::guard::{FetchTicket, StaleGuard};
