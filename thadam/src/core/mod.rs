//! Core domain model types for thadam.
//!
//! This module contains the fundamental types shared by every component:
//! - Job identity and submission payloads
//! - Job lifecycle states and policy outcomes
//! - Stage results and the final pipeline output

mod job;
mod output;
mod result;
mod state;

pub use job::{Job, JobId, Submission, SubmissionMetadata};
pub use output::{FinalOutput, StoredId};
pub use result::{Confidence, StageResult};
pub use state::{JobState, RejectionKind, RejectionReason, Verdict};
