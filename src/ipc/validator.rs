//! Envelope and per-payload validation for inbound IPC messages.
//!
//! The envelope check is uniform; payload rules are enforced per message
//! type with the wire's failure codes. Types the core does not consume get
//! permissive payload validation.

use serde_json::Value;

use super::envelope::{ActaMessage, MessageType};

/// Maximum accepted `task.request` input length, in characters.
pub const MAX_TASK_INPUT: usize = 20_000;

/// Maximum number of `context.files` entries.
pub const MAX_CONTEXT_FILES: usize = 50;

/// Maximum length of one `context.files` entry.
pub const MAX_CONTEXT_FILE_LEN: usize = 500;

/// A rejected message, with the stable code clients switch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new("ipc.invalid_payload", message)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Validate the envelope shape and decode it.
///
/// Valid iff: object with string `id`, recognised `type`, recognised
/// `source`, numeric `timestamp`, and a present `payload` property.
pub fn validate_envelope(raw: &Value) -> Result<ActaMessage, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::invalid_payload("message is not an object"))?;

    if !object.get("id").is_some_and(Value::is_string) {
        return Err(ValidationError::invalid_payload("missing string id"));
    }
    let type_str = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::invalid_payload("missing type"))?;
    if MessageType::parse(type_str).is_none() {
        return Err(ValidationError::invalid_payload(format!(
            "unrecognised type '{type_str}'"
        )));
    }
    let source_ok = object
        .get("source")
        .and_then(Value::as_str)
        .is_some_and(|s| matches!(s, "ui" | "agent" | "tool" | "system"));
    if !source_ok {
        return Err(ValidationError::invalid_payload("invalid source"));
    }
    if !object.get("timestamp").is_some_and(Value::is_number) {
        return Err(ValidationError::invalid_payload("missing numeric timestamp"));
    }
    if !object.contains_key("payload") {
        return Err(ValidationError::invalid_payload("missing payload"));
    }

    serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::invalid_payload(format!("malformed envelope: {e}")))
}

/// Validate `payload` for `message_type`. Unknown-to-the-core types pass.
pub fn validate_payload(
    message_type: MessageType,
    payload: &Value,
) -> Result<(), ValidationError> {
    match message_type {
        MessageType::TaskRequest => validate_task_request(payload),
        MessageType::TaskStop => validate_task_stop(payload),
        MessageType::TaskError => validate_task_error(payload),
        MessageType::PermissionRequest => validate_permission_request(payload),
        MessageType::PermissionResponse => validate_permission_response(payload),
        MessageType::ChatRequest => validate_chat_request(payload),
        MessageType::ChatResponse => validate_chat_response(payload),
        MessageType::ChatError => validate_chat_error(payload),
        MessageType::LlmHealthCheck => validate_health_check(payload),
        _ => Ok(()),
    }
}

// ─── Per-type rules ─────────────────────────────────────────────────────────

fn validate_task_request(payload: &Value) -> Result<(), ValidationError> {
    let object = payload.as_object().ok_or_else(|| {
        ValidationError::new("task.invalid_input", "payload must be an object")
    })?;

    let input = object
        .get("input")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ValidationError::new("task.invalid_input", "input must be a non-empty string")
        })?;
    if input.chars().count() > MAX_TASK_INPUT {
        return Err(ValidationError::new(
            "task.input_too_long",
            format!("input exceeds {MAX_TASK_INPUT} characters"),
        ));
    }

    if let Some(context) = object.get("context") {
        let context = context.as_object().ok_or_else(|| {
            ValidationError::new("task.invalid_input", "context must be an object")
        })?;
        if let Some(files) = context.get("files") {
            let files = files.as_array().ok_or_else(|| {
                ValidationError::new("task.invalid_input", "context.files must be an array")
            })?;
            if files.len() > MAX_CONTEXT_FILES {
                return Err(ValidationError::new(
                    "task.invalid_input",
                    format!("context.files exceeds {MAX_CONTEXT_FILES} entries"),
                ));
            }
            for file in files {
                let ok = file
                    .as_str()
                    .is_some_and(|s| !s.is_empty() && s.chars().count() <= MAX_CONTEXT_FILE_LEN);
                if !ok {
                    return Err(ValidationError::new(
                        "task.invalid_input",
                        "context.files entries must be non-empty strings of at most 500 characters",
                    ));
                }
            }
        }
        for key in ["screen", "clipboard"] {
            if let Some(flag) = context.get(key)
                && !flag.is_boolean()
            {
                return Err(ValidationError::new(
                    "task.invalid_input",
                    format!("context.{key} must be a boolean"),
                ));
            }
        }
    }

    if let Some(level) = object.get("trustLevel") {
        let ok = level
            .as_str()
            .is_some_and(|s| matches!(s, "low" | "medium" | "high"));
        if !ok {
            return Err(ValidationError::new(
                "task.invalid_input",
                "trustLevel must be one of low, medium, high",
            ));
        }
    }
    Ok(())
}

fn validate_task_stop(payload: &Value) -> Result<(), ValidationError> {
    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::invalid_payload("payload must be an object"))?;
    if let Some(correlation) = object.get("correlationId") {
        let ok = correlation.as_str().is_some_and(|s| !s.is_empty());
        if !ok {
            return Err(ValidationError::invalid_payload(
                "correlationId must be a non-empty string",
            ));
        }
    }
    Ok(())
}

fn validate_task_error(payload: &Value) -> Result<(), ValidationError> {
    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::invalid_payload("payload must be an object"))?;
    for key in ["taskId", "code", "message"] {
        if !object.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return Err(ValidationError::invalid_payload(format!(
                "{key} must be a non-empty string"
            )));
        }
    }
    if let Some(step_id) = object.get("stepId")
        && !step_id.as_str().is_some_and(|s| !s.is_empty())
    {
        return Err(ValidationError::invalid_payload(
            "stepId must be a non-empty string",
        ));
    }
    if let Some(details) = object.get("details")
        && !details.is_string()
    {
        return Err(ValidationError::invalid_payload("details must be a string"));
    }
    Ok(())
}

fn validate_permission_request(payload: &Value) -> Result<(), ValidationError> {
    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::invalid_payload("payload must be an object"))?;
    for key in ["id", "tool", "action", "reason", "profileId"] {
        if !object.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return Err(ValidationError::invalid_payload(format!(
                "{key} must be a non-empty string"
            )));
        }
    }
    let risk_ok = object
        .get("risk")
        .and_then(Value::as_str)
        .is_some_and(|s| matches!(s, "low" | "medium" | "high" | "critical"));
    if !risk_ok {
        return Err(ValidationError::invalid_payload("invalid risk level"));
    }
    if !object.get("reversible").is_some_and(Value::is_boolean) {
        return Err(ValidationError::invalid_payload(
            "reversible must be a boolean",
        ));
    }
    if !object.get("timestamp").is_some_and(Value::is_number) {
        return Err(ValidationError::invalid_payload(
            "timestamp must be a number",
        ));
    }
    if let Some(cloud) = object.get("cloud") {
        let provider_ok = cloud
            .get("provider")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !provider_ok {
            return Err(ValidationError::invalid_payload(
                "cloud.provider is required",
            ));
        }
    }
    Ok(())
}

fn validate_permission_response(payload: &Value) -> Result<(), ValidationError> {
    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::invalid_payload("payload must be an object"))?;
    if !object
        .get("requestId")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
    {
        return Err(ValidationError::invalid_payload(
            "requestId must be a non-empty string",
        ));
    }
    let decision_ok = object
        .get("decision")
        .and_then(Value::as_str)
        .is_some_and(|s| matches!(s, "allow" | "deny"));
    if !decision_ok {
        return Err(ValidationError::invalid_payload(
            "decision must be allow or deny",
        ));
    }
    if let Some(remember) = object.get("remember")
        && !remember.is_boolean()
    {
        return Err(ValidationError::invalid_payload(
            "remember must be a boolean",
        ));
    }
    Ok(())
}

fn validate_chat_request(payload: &Value) -> Result<(), ValidationError> {
    let ok = payload
        .as_object()
        .and_then(|o| o.get("input"))
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if !ok {
        return Err(ValidationError::new(
            "chat.invalid_input",
            "input must be a non-empty string",
        ));
    }
    Ok(())
}

fn validate_chat_response(payload: &Value) -> Result<(), ValidationError> {
    let ok = payload
        .as_object()
        .and_then(|o| o.get("text"))
        .is_some_and(Value::is_string);
    if !ok {
        return Err(ValidationError::new(
            "chat.invalid_payload",
            "text must be a string",
        ));
    }
    Ok(())
}

fn validate_chat_error(payload: &Value) -> Result<(), ValidationError> {
    let object = payload.as_object().ok_or_else(|| {
        ValidationError::new("chat.invalid_payload", "payload must be an object")
    })?;
    for key in ["code", "message"] {
        if !object.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return Err(ValidationError::new(
                "chat.invalid_payload",
                format!("{key} must be a non-empty string"),
            ));
        }
    }
    Ok(())
}

/// `llm.healthCheck` is dual-use: requests carry optional `profileId` and
/// `config`; responses carry `ok` plus optional `models` / `error`.
fn validate_health_check(payload: &Value) -> Result<(), ValidationError> {
    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::invalid_payload("payload must be an object"))?;
    if let Some(ok) = object.get("ok")
        && !ok.is_boolean()
    {
        return Err(ValidationError::invalid_payload("ok must be a boolean"));
    }
    if let Some(models) = object.get("models") {
        let all_strings = models
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !all_strings {
            return Err(ValidationError::invalid_payload(
                "models must be an array of strings",
            ));
        }
    }
    if let Some(error) = object.get("error")
        && !error.get("message").is_some_and(Value::is_string)
    {
        return Err(ValidationError::invalid_payload(
            "error.message must be a string",
        ));
    }
    Ok(())
}
