//! Login endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Form;
use axum::Json;
use serde::{Deserialize, Serialize};

use indexswap_auth::TokenValidator;
use indexswap_engine::SessionManager;

use crate::error::ApiError;
use crate::state::AppState;

/// Login form fields.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// Portal username.
    #[serde(default)]
    pub username: String,
    /// Portal password. Only checked for presence.
    #[serde(default)]
    pub password: String,
    /// Number of modules the owner intends to swap.
    #[serde(default)]
    pub num_modules: u32,
}

/// Response for a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable result.
    pub message: String,
    /// Bearer token for later requests.
    pub token: String,
    /// Echo of the declared module count.
    pub num_modules: u32,
}

/// Accept credentials and issue an owner token.
///
/// # Example
///
/// ```text
/// POST /api/login
/// Content-Type: application/x-www-form-urlencoded
///
/// username=alice&password=hunter2&num_modules=2
///
/// Response: 200 OK
/// {
///   "success": true,
///   "message": "Login successful",
///   "token": "eyJ...",
///   "num_modules": 2
/// }
/// ```
pub async fn login<M, V>(
    State(state): State<Arc<AppState<M, V>>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<LoginResponse>, ApiError>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let issued = state
        .tokens
        .login(&form.username, &form.password, form.num_modules)?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token: issued.token,
        num_modules: form.num_modules,
    }))
}
