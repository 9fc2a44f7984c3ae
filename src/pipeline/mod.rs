//! Pipeline orchestration: validation, backend dispatch, and result envelopes.

mod service;
pub mod types;

pub use service::{PipelineApi, PipelineService};
pub use types::{
    ErrorKind, GenerateInput, HealthSnapshot, PipelineError, ResultEnvelope, SummarizeInput,
    Upload,
};
