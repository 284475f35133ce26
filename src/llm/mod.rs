//! LLM access layer: the provider-agnostic router seam and the HTTP client
//! adapters build on.

pub mod http;
pub mod router;

pub use http::{HttpClient, HttpError, HttpErrorKind, RequestOptions, scrub_url};
pub use router::{HealthCheckConfig, HealthError, HealthStatus, LlmRequest, LlmResponse, LlmRouter};
