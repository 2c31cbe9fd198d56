//! Job status tracking.
//!
//! The [`StatusStore`] holds one [`StatusRecord`] per job. Only the task
//! processing a job writes its record; any task may read or subscribe.

mod record;
mod store;

pub use record::StatusRecord;
pub use store::StatusStore;
