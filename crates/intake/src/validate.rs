use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use visitgate_core::{IntakeEnvelope, IntakeSource, VisitRequest};

const PAYLOAD_FIELDS: [&str; 6] = [
    "visitor_id",
    "purpose",
    "time",
    "host",
    "badge_required",
    "pre_registered",
];

/// Structural or type failure in an inbound intake. The message is safe to
/// return to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MalformedRequest {
    message: String,
}

impl MalformedRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn payload(detail: impl std::fmt::Display) -> Self {
        Self::new(format!("invalid payload structure: {}", detail))
    }
}

pub fn parse_body(body: &[u8]) -> Result<Value, MalformedRequest> {
    serde_json::from_slice(body)
        .map_err(|error| MalformedRequest::new(format!("request body is not valid JSON: {}", error)))
}

pub fn parse_envelope(raw: &Value) -> Result<IntakeEnvelope, MalformedRequest> {
    let object = raw
        .as_object()
        .ok_or_else(|| MalformedRequest::new("request body must be a JSON object"))?;

    let (Some(source), Some(payload)) = (present(object, "source"), present(object, "payload"))
    else {
        return Err(MalformedRequest::new(
            "missing required fields: source, payload",
        ));
    };

    let source = parse_source(source)?;
    let payload = parse_payload(payload)?;
    Ok(IntakeEnvelope { source, payload })
}

/// Validates a bare visit payload. Booleans must be JSON booleans and
/// strings must be non-empty; unknown extra fields are ignored.
pub fn parse_payload(raw: &Value) -> Result<VisitRequest, MalformedRequest> {
    let object = raw
        .as_object()
        .ok_or_else(|| MalformedRequest::payload("payload must be a JSON object"))?;

    let missing = PAYLOAD_FIELDS
        .iter()
        .copied()
        .filter(|field| present(object, field).is_none())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(MalformedRequest::payload(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }

    let request: VisitRequest = decode(raw).map_err(MalformedRequest::payload)?;
    if request.visitor_id.trim().is_empty() {
        return Err(MalformedRequest::payload("visitor_id must not be empty"));
    }
    if request.host.trim().is_empty() {
        return Err(MalformedRequest::payload("host must not be empty"));
    }

    Ok(request)
}

fn parse_source(raw: &Value) -> Result<IntakeSource, MalformedRequest> {
    decode(raw).map_err(|_| {
        MalformedRequest::new(format!(
            "unknown source {}; expected one of qr_scan, import, gallery",
            raw
        ))
    })
}

fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|value| !value.is_null())
}

fn decode<T: DeserializeOwned>(raw: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(raw)
}
