use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use tracing::{debug, warn};

use crate::db::PublicUser;
use crate::error::AppError;
use crate::AppState;

/// Pulls `<token>` out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Identity attached to a request by its bearer token, if the token is valid.
///
/// Extraction never rejects: a missing, unknown or expired token simply
/// yields `MaybeUser(None)`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<PublicUser>);

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let (token, state) = match (token, state) {
                (Some(token), Some(state)) => (token, state),
                _ => return Ok(MaybeUser(None)),
            };

            match state.auth_service.validate_token(&token).await {
                Ok(user) => {
                    debug!("Bearer token resolved: {}", user.is_some());
                    Ok(MaybeUser(user))
                }
                Err(e) => {
                    warn!("Could not resolve bearer token: {}", e);
                    Err(e.into())
                }
            }
        })
    }
}
