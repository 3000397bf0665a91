use serde::{Deserialize, Serialize};

/// Identifies one fetch issued for a selected date or month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTicket {
    pub target: String,
    pub sequence: u64,
}

/// Accepts a completed fetch only if it is the newest request and its target
/// is still the selected one.
#[derive(Debug, Default)]
pub struct StaleGuard {
    selected: Option<String>,
    latest: u64,
}

impl StaleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Selects `target` and starts a request for it.
    pub fn begin(&mut self, target: impl Into<String>) -> FetchTicket {
        let target = target.into();
        self.latest += 1;
        self.selected = Some(target.clone());
        FetchTicket {
            target,
            sequence: self.latest,
        }
    }

    pub fn accept(&self, ticket: &FetchTicket) -> bool {
        ticket.sequence == self.latest && self.selected.as_deref() == Some(ticket.target.as_str())
    }
}
