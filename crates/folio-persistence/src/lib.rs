//! Outcome journal for the folio manager.
//!
//! Every `OrderOutcome` produced by a decision or risk cycle is appended to a
//! daily JSON Lines file, so no order ever goes unrecorded.

pub mod error;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::{OrderOrigin, OutcomeJournal, OutcomeRecord, PersistenceConfig};
