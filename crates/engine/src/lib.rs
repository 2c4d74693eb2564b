pub mod service;

pub use service::{ClaimService, Identity, SubmitClaimRequest, TracingAuditSink};
