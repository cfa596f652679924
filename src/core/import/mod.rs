//! Batch import pipeline
//!
//! A job's rows are split into fixed-size batches. Each batch runs on the work
//! queue in its own record transaction, reports to a cache-backed aggregator,
//! and the aggregator finalizes the job once every batch has reported.
//! Cancellation is a cooperative flag; rollback replays recorded deltas.

pub mod cancellation;
pub mod capabilities;
pub mod job;
pub mod keys;
pub mod mapping;
pub mod parser;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod rollback;
pub mod sanitize;
pub mod scheduler;
pub mod types;
pub mod validation;
pub mod worker;

#[cfg(test)]
mod tests;

pub use cancellation::CancellationController;
pub use capabilities::{FieldMapper, FileParser, ParseOptions, RowValidation, ValidationEngine};
pub use job::{ImportJob, ImportStatus, JobStatusView, progress_percentage};
pub use mapping::ColumnFieldMapper;
pub use parser::PreparsedRows;
pub use pipeline::ImportPipeline;
pub use processor::{
    CategoryProcessor, MenuItemProcessor, ProcessorRegistry, ProjectedRow, RowProcessor,
};
pub use progress::ProgressAggregator;
pub use queue::{BatchUnit, DeadLetter, LocalWorkQueue, RetryPolicy, WorkQueue};
pub use rollback::{RollbackEngine, RollbackReport};
pub use scheduler::{BatchPlan, BatchScheduler, plan_batches};
pub use types::*;
pub use validation::RuleValidationEngine;
pub use worker::{BatchOutcome, BatchWorker, SkipReason};
