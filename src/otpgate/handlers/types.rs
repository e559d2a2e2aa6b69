//! Request/response types for signup endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::users::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupStartRequest {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Client-side digest of the password, 64 hex characters.
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupStartResponse {
    pub email: String,
    /// Seconds until the code stops being accepted.
    pub expires_in: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

impl SignupError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            remaining_attempts: None,
        }
    }
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StatusResponse {
    pub email: String,
    pub verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn signup_start_request_parses_role() -> Result<()> {
        let request: SignupStartRequest = serde_json::from_value(serde_json::json!({
            "id": "emp7",
            "email": "pat@example.com",
            "name": "Pat",
            "role": "hr",
            "password": "c".repeat(64),
        }))?;
        assert_eq!(request.role, Role::Hr);
        Ok(())
    }

    #[test]
    fn signup_error_omits_missing_attempts() -> Result<()> {
        let value = serde_json::to_value(SignupError::new("Code expired"))?;
        assert!(value.get("remaining_attempts").is_none());

        let value = serde_json::to_value(SignupError {
            error: "Invalid code".to_string(),
            remaining_attempts: Some(2),
        })?;
        let remaining = value
            .get("remaining_attempts")
            .and_then(serde_json::Value::as_u64)
            .context("missing remaining_attempts")?;
        assert_eq!(remaining, 2);
        Ok(())
    }
}
