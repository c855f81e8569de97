//! Risk API response parsing.
//!
//! Each expected field is read and validated explicitly. `status` is checked
//! before anything else; unrecognized fields are ignored so the API can grow
//! without breaking deployed agents.

use crate::action::MitigationAction;
use crate::error::{ApiError, FieldError};
use serde_json::{Map, Value};
use tracing::debug;

/// A parsed, validated risk API reply.
pub trait RiskReply: Sized {
    fn from_json(body: Value) -> Result<Self, ApiError>;
}

struct Fields<'a> {
    body: &'a Value,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    /// Check the body shape and `status`, then log fields outside `known`.
    fn open(body: &'a Value, known: &[&str], require_status: bool) -> Result<Self, ApiError> {
        let map = body
            .as_object()
            .ok_or_else(|| invalid(body, "body", FieldError::WrongType("a JSON object")))?;

        match map.get("status") {
            Some(status) => match status.as_i64() {
                Some(0) => {}
                Some(code) => {
                    return Err(ApiError::Status {
                        code,
                        body: body.clone(),
                    })
                }
                None => return Err(invalid(body, "status", FieldError::WrongType("an integer"))),
            },
            None if require_status => return Err(invalid(body, "status", FieldError::Missing)),
            None => {}
        }

        for key in map.keys() {
            if key != "status" && !known.contains(&key.as_str()) {
                debug!(field = %key, "Ignoring unrecognized risk API response field");
            }
        }

        Ok(Self { body, map })
    }

    fn string(&self, field: &'static str) -> Result<String, ApiError> {
        self.optional_string(field)?
            .ok_or_else(|| invalid(self.body, field, FieldError::Missing))
    }

    fn optional_string(&self, field: &'static str) -> Result<Option<String>, ApiError> {
        match self.map.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(invalid(self.body, field, FieldError::WrongType("a string"))),
        }
    }

    fn score(&self, field: &'static str) -> Result<u8, ApiError> {
        let value = self
            .map
            .get(field)
            .ok_or_else(|| invalid(self.body, field, FieldError::Missing))?;
        let score = value
            .as_i64()
            .ok_or_else(|| invalid(self.body, field, FieldError::WrongType("an integer")))?;

        match u8::try_from(score) {
            Ok(score) if score <= 100 => Ok(score),
            _ => Err(invalid(self.body, field, FieldError::OutOfRange(score))),
        }
    }

    fn optional_action(&self, field: &'static str) -> Result<Option<MitigationAction>, ApiError> {
        let Some(code) = self.optional_string(field)? else {
            return Ok(None);
        };
        match code.as_str() {
            "b" => Ok(Some(MitigationAction::Block)),
            "c" => Ok(Some(MitigationAction::Challenge)),
            other => Err(invalid(
                self.body,
                field,
                FieldError::UnknownAction(other.to_string()),
            )),
        }
    }
}

fn invalid(body: &Value, field: &'static str, source: FieldError) -> ApiError {
    ApiError::Validation {
        field,
        body: body.clone(),
        source,
    }
}

/// Reply to a `risk` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskResponse {
    /// Request id assigned by the API
    pub uuid: String,
    /// Bot score (0-100)
    pub score: u8,
    /// Recommended action, `Block` or `Challenge`. The API may leave it out
    /// for low scores.
    pub action: Option<MitigationAction>,
}

impl RiskReply for RiskResponse {
    fn from_json(body: Value) -> Result<Self, ApiError> {
        let fields = Fields::open(&body, &["uuid", "score", "action"], true)?;

        Ok(Self {
            uuid: fields.string("uuid")?,
            score: fields.score("score")?,
            action: fields.optional_action("action")?,
        })
    }
}

/// Reply to a `risk/reset` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskResetResponse {
    /// Request id of the reset
    pub uuid: String,
    pub vid: Option<String>,
    /// Opaque id, passed through untouched
    pub cid: Option<String>,
}

impl RiskReply for RiskResetResponse {
    fn from_json(body: Value) -> Result<Self, ApiError> {
        let fields = Fields::open(&body, &["uuid", "vid", "cid"], true)?;

        Ok(Self {
            uuid: fields.string("uuid")?,
            vid: fields.optional_string("vid")?,
            cid: fields.optional_string("cid")?,
        })
    }
}

/// Acknowledgement of a `risk/reset/req_id` call. An empty body is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskResetByRequestIdResponse;

impl RiskReply for RiskResetByRequestIdResponse {
    fn from_json(body: Value) -> Result<Self, ApiError> {
        if !body.is_null() {
            Fields::open(&body, &[], false)?;
        }
        Ok(Self)
    }
}

/// Acknowledgement of a `risk/reset/visitor_id` call. An empty body is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskResetByVisitorIdResponse;

impl RiskReply for RiskResetByVisitorIdResponse {
    fn from_json(body: Value) -> Result<Self, ApiError> {
        if !body.is_null() {
            Fields::open(&body, &[], false)?;
        }
        Ok(Self)
    }
}
