//! Signup endpoints.
//!
//! `start` stores the registration, issues a code and delivers it. `verify`
//! checks the code and, on success, commits whichever registration is pending
//! at that moment before dropping both the code and the registration. Verified
//! codes stay consumed until that commit succeeds, so a failed insert can be
//! retried with the same code.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::types::{
    EmailRequest, SignupError, SignupStartRequest, SignupStartResponse, StatusQuery,
    StatusResponse, UserResponse, VerifyCodeRequest,
};
use super::{valid_email, valid_password};
use crate::otp::{Rejection, Verification};
use crate::otpgate::state::{Registration, SignupState};
use crate::users::{NewUser, UserStoreError};

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(SignupError::new(message))).into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Signup failed")
}

/// Issue a code for `email` and hand it to the notifier.
///
/// On delivery failure the fresh code is discarded and `Err` carries the
/// response to return.
async fn issue_and_deliver(state: &SignupState, email: &str) -> Result<(), Response> {
    let code = state.otp().issue(email).await.map_err(|err| {
        error!("Failed to issue code: {err}");
        internal_error()
    })?;

    if let Err(err) = state.notifier().deliver(email, &code).await {
        error!("Failed to send code: {err}");
        if let Err(err) = state.otp().discard(email).await {
            error!("Failed to discard undelivered code: {err}");
        }
        return Err(error_response(
            StatusCode::BAD_GATEWAY,
            "Failed to send code. Please try again.",
        ));
    }

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/signup/start",
    request_body = SignupStartRequest,
    responses(
        (status = 202, description = "Code sent", body = SignupStartResponse),
        (status = 400, description = "Validation error", body = SignupError),
        (status = 409, description = "User with this id or email already exists", body = SignupError),
        (status = 502, description = "Code could not be delivered", body = SignupError)
    ),
    tag = "signup"
)]
pub async fn signup_start(
    state: Extension<Arc<SignupState>>,
    payload: Option<Json<SignupStartRequest>>,
) -> impl IntoResponse {
    let request: SignupStartRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let id = request.id.trim();
    let name = request.name.trim();
    let email = request.email.trim();

    if id.is_empty() || name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Please fill all details");
    }
    if !valid_email(email) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if !valid_password(&request.password) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid password");
    }

    match state.users().exists(id, email).await {
        Ok(false) => {}
        Ok(true) => {
            return error_response(
                StatusCode::CONFLICT,
                "User with this ID or email already exists",
            )
        }
        Err(err) => {
            error!("Failed to look up user: {err}");
            return internal_error();
        }
    }

    state
        .registrations()
        .insert(Registration {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            role: request.role,
            credential: SecretString::from(request.password),
            touched_at: state.otp().now(),
        })
        .await;

    if let Err(response) = issue_and_deliver(&state, email).await {
        state.registrations().remove(email).await;
        return response;
    }

    info!(user_id = %id, "signup code sent");
    (
        StatusCode::ACCEPTED,
        Json(SignupStartResponse {
            email: email.to_string(),
            expires_in: state.otp().policy().validity_seconds(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/signup/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid code", body = SignupError),
        (status = 404, description = "No pending signup or active code", body = SignupError),
        (status = 409, description = "User with this id or email already exists", body = SignupError),
        (status = 410, description = "Code expired", body = SignupError),
        (status = 429, description = "Too many failed attempts", body = SignupError)
    ),
    tag = "signup"
)]
pub async fn signup_verify(
    state: Extension<Arc<SignupState>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let request: VerifyCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = request.email.trim();
    if request.code.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing code");
    }

    if state.registrations().get(email).await.is_none() {
        return error_response(StatusCode::NOT_FOUND, "No pending signup for this email");
    }

    let outcome = match state.otp().verify(email, &request.code).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to verify code: {err}");
            return internal_error();
        }
    };

    match outcome {
        Verification::Verified => {
            // A restart can replace the registration while the code is checked.
            let Some(registration) = state.registrations().get(email).await else {
                return error_response(StatusCode::NOT_FOUND, "No pending signup for this email");
            };
            commit(&state, registration).await
        }
        Verification::Rejected(Rejection::NotFound) => error_response(
            StatusCode::NOT_FOUND,
            "No active code. Please request a new one.",
        ),
        Verification::Rejected(Rejection::Expired) => error_response(
            StatusCode::GONE,
            "Code expired. Please request a new one.",
        ),
        Verification::Rejected(Rejection::Mismatch { remaining }) => (
            StatusCode::BAD_REQUEST,
            Json(SignupError {
                error: "Invalid code. Please try again.".to_string(),
                remaining_attempts: Some(remaining),
            }),
        )
            .into_response(),
        Verification::Rejected(Rejection::TooManyAttempts) => {
            warn!("signup abandoned after too many failed attempts");
            state.registrations().remove(email).await;
            error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many failed attempts. Please sign up again.",
            )
        }
    }
}

async fn commit(state: &SignupState, registration: Registration) -> Response {
    let email = registration.email.clone();
    let user = NewUser::from(registration);

    match state.users().insert(&user).await {
        Ok(()) => {}
        Err(UserStoreError::Conflict) => {
            cleanup(state, &email).await;
            return error_response(
                StatusCode::CONFLICT,
                "User with this ID or email already exists",
            );
        }
        Err(err) => {
            // Keep the consumed code so the client can retry the commit.
            error!("Failed to create user: {err}");
            return internal_error();
        }
    }

    cleanup(state, &email).await;
    info!(user_id = %user.id, role = %user.role, "account created");

    (
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }),
    )
        .into_response()
}

async fn cleanup(state: &SignupState, email: &str) {
    if let Err(err) = state.otp().discard(email).await {
        error!("Failed to discard code: {err}");
    }
    state.registrations().remove(email).await;
}

#[utoipa::path(
    post,
    path = "/v1/signup/resend",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "New code sent", body = SignupStartResponse),
        (status = 404, description = "No pending signup", body = SignupError),
        (status = 502, description = "Code could not be delivered", body = SignupError)
    ),
    tag = "signup"
)]
pub async fn signup_resend(
    state: Extension<Arc<SignupState>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let request: EmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = request.email.trim();
    if state.registrations().get(email).await.is_none() {
        return error_response(StatusCode::NOT_FOUND, "No pending signup for this email");
    }

    if let Err(response) = issue_and_deliver(&state, email).await {
        return response;
    }
    state.registrations().touch(email, state.otp().now()).await;

    (
        StatusCode::ACCEPTED,
        Json(SignupStartResponse {
            email: email.to_string(),
            expires_in: state.otp().policy().validity_seconds(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/signup/cancel",
    request_body = EmailRequest,
    responses(
        (status = 204, description = "Pending signup dropped")
    ),
    tag = "signup"
)]
pub async fn signup_cancel(
    state: Extension<Arc<SignupState>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let request: EmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = request.email.trim();
    if let Err(err) = state.otp().discard(email).await {
        error!("Failed to discard code: {err}");
        return internal_error();
    }
    state.registrations().remove(email).await;

    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    get,
    path = "/v1/signup/status",
    params(StatusQuery),
    responses(
        (status = 200, description = "Verification state of the pending code", body = StatusResponse)
    ),
    tag = "signup"
)]
pub async fn signup_status(
    state: Extension<Arc<SignupState>>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let email = query.email.trim();
    match state.otp().is_verified(email).await {
        Ok(verified) => (
            StatusCode::OK,
            Json(StatusResponse {
                email: email.to_string(),
                verified,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to read code state: {err}");
            internal_error()
        }
    }
}
