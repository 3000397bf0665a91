pub mod dates;
pub mod error;
pub mod forms;
pub mod insights;
pub mod model;
pub mod monthly;
pub mod service;

pub use crate::dates::{DateKey, DateRange, MonthKey};
pub use crate::error::{DateError, FailureKind, StoreError, ValidationError};
pub use crate::service::{JournalService, JournalServiceBuilder, StoreSnapshot};
