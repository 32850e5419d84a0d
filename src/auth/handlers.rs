use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::MaybeUser;
use crate::db::PublicUser;
use crate::error::AppError;
use crate::AppState;

// Fields are optional so a missing one surfaces as a validation error
// rather than a body deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub ok: bool,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub token: String,
    pub user: PublicUser,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let username = req.username.unwrap_or_default();
    info!("Received registration request for username: {}", username);

    match state
        .auth_service
        .register(
            &username,
            req.password.as_deref().unwrap_or_default(),
            req.first_name.as_deref().unwrap_or_default(),
        )
        .await
    {
        Ok(user) => Ok(HttpResponse::Ok().json(UserResponse { ok: true, user })),
        Err(e) => {
            warn!("Registration failed for username {}: {}", username, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let username = req.username.unwrap_or_default();

    match state
        .auth_service
        .login(&username, req.password.as_deref().unwrap_or_default())
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(LoginResponse {
            ok: true,
            token: outcome.token,
            user: outcome.user,
        })),
        Err(e) => {
            warn!("Login failed for username {}: {}", username, e);
            Err(e)
        }
    }
}

/// Reports the identity attached to the request, or `null` for anonymous callers.
pub async fn me(user: MaybeUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "ok": true, "user": user.0 }))
}
