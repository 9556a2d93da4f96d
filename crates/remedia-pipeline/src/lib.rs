//! Record remediation pipeline: validator/flagger, remediator, contract check.

mod columns;
mod error;

pub mod anomaly_log;
pub mod contract;
pub mod flagger;
pub mod pipeline;
pub mod remediator;

pub use anomaly_log::AnomalyLog;
pub use contract::Contract;
pub use error::PipelineError;
pub use flagger::Flagger;
pub use pipeline::{BatchSummary, Pipeline, PipelineOutput};
pub use remediator::{RejectedRecord, Remediation, Remediator};
