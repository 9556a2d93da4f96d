pub mod config;
pub mod error;
pub mod field;
pub mod normalize;
pub mod record;
pub mod schema;

pub use config::{EnrollmentConfig, FieldPolicy, Imputation, PipelineConfig, RejectionMode};
pub use error::{ConfigError, RecordError};
pub use field::{FieldKind, FieldRule, USER_FIELDS};
pub use record::{ContractedRecord, FlaggedRecord, RawRecord};
pub use schema::users;
