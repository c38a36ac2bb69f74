//! Batch pipeline: validate, plan, build, submit, record

pub mod aggregation;
pub mod builder;
pub mod planner;
pub mod submitter;
pub mod validation;

pub use aggregation::{AggregationError, Outcome, ResultAggregator, ResultSummary, TransferResult};
pub use builder::{RecipientError, TransferBuilder};
pub use planner::{BatchPlanner, PlanError, TransferBatch, DEFAULT_BATCH_SIZE};
pub use submitter::{SubmissionError, Submitter};
pub use validation::{BalanceValidator, ValidationError};
