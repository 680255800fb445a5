use axum::{body::Body, http::Request, middleware::Next, response::Response};
use uuid::Uuid;

use shared_models::auth::{AuthUser, Role};
use shared_models::error::AppError;

/// Middleware installing the authenticated caller into request extensions.
///
/// The identity/auth provider in front of this service authenticates every
/// request and forwards the result in `x-user-id` / `x-user-role`; the core
/// trusts these headers and never re-validates credentials itself.
pub async fn auth_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = header_value(&request, "x-user-id")?;
    let role = header_value(&request, "x-user-role")?;

    let user = AuthUser {
        id: Uuid::parse_str(&user_id)
            .map_err(|_| AppError::Auth("Invalid user id header".to_string()))?,
        role: Role::parse(&role)
            .ok_or_else(|| AppError::Auth(format!("Unknown role: {}", role)))?,
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn header_value(request: &Request<Body>, name: &str) -> Result<String, AppError> {
    request
        .headers()
        .get(name)
        .ok_or_else(|| AppError::Auth(format!("Missing {} header", name)))?
        .to_str()
        .map(|v| v.to_string())
        .map_err(|_| AppError::Auth(format!("Invalid {} header", name)))
}
