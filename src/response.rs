//! `{code, msg, data}` response envelope.

use serde::Serialize;

use crate::error::{ErrorKind, ResolveError, Stage};

pub const CODE_OK: u16 = 200;
pub const CODE_FAILED: u16 = 201;
pub const MSG_RESOLVED: &str = "解析成功";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    #[must_use]
    pub fn success(msg: impl Into<String>, data: T) -> Self {
        Self {
            code: CODE_OK,
            msg: msg.into(),
            kind: None,
            stage: None,
            data: Some(data),
        }
    }

    /// Failed resolution; keeps the kind and stage for the caller's retry policy.
    #[must_use]
    pub fn failure(error: &ResolveError) -> Self {
        Self {
            code: CODE_FAILED,
            msg: error.to_string(),
            kind: Some(error.kind()),
            stage: Some(error.stage),
            data: None,
        }
    }

    /// Failure outside the resolution pipeline (audit queries).
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_FAILED,
            msg: msg.into(),
            kind: None,
            stage: None,
            data: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}
