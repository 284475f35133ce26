//! IPC surface: the message envelope, payload validation, and routing of
//! inbound messages into the core.

pub mod dispatcher;
pub mod envelope;
pub mod validator;

pub use dispatcher::{Dispatcher, Routed};
pub use envelope::{ActaMessage, MessageSource, MessageType};
pub use validator::{
    MAX_CONTEXT_FILE_LEN, MAX_CONTEXT_FILES, MAX_TASK_INPUT, ValidationError, validate_envelope,
    validate_payload,
};
