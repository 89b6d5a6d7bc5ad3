//! Job tracking: the durable ledger that gives clients forward-progress
//! visibility into the asynchronous pipeline.

pub mod job;
pub mod ledger;

pub use job::{IngestionJob, JobStatus, JobType};
pub use ledger::{JobFilter, JobLedger, JobSort, LedgerError, StatusUpdate};
