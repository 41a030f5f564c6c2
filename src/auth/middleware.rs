//! Session authentication for protected routes.

use crate::auth::{jwt::JwtHandler, models::Claims};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

/// Accepts `?token=` (WebSocket clients cannot set headers) or `Authorization: Bearer`,
/// and stores the validated [`Claims`] in request extensions.
pub async fn auth_middleware(
    State(jwt_handler): State<Arc<JwtHandler>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token_from_query = req.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
    });

    let token_from_header = match req.headers().get("Authorization") {
        Some(value) => {
            let value = value.to_str().map_err(|_| AuthError::InvalidFormat)?;
            Some(
                value
                    .strip_prefix("Bearer ")
                    .ok_or(AuthError::InvalidFormat)?
                    .to_string(),
            )
        }
        None => None,
    };

    let token = token_from_query
        .or(token_from_header)
        .ok_or(AuthError::MissingToken)?;

    let claims = jwt_handler.validate_token(&token).map_err(|e| {
        debug!(error = %e, "rejected session token");
        AuthError::InvalidToken
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn extract_claims(req: &Request) -> Option<&Claims> {
    req.extensions().get::<Claims>()
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid authorization format. Use: Bearer {token}",
            ),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(handler: Arc<JwtHandler>) -> Router {
        Router::new()
            .route(
                "/me",
                get(|req: Request| async move {
                    extract_claims(&req)
                        .map(|c| c.sub.clone())
                        .unwrap_or_default()
                }),
            )
            .route_layer(middleware::from_fn_with_state(handler, auth_middleware))
    }

    #[test]
    fn test_auth_error_responses() {
        for err in [
            AuthError::MissingToken,
            AuthError::InvalidFormat,
            AuthError::InvalidToken,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_bearer_and_query_tokens_accepted() {
        let handler = Arc::new(JwtHandler::new("secret".to_string(), 1));
        let token = handler.issue_session("user-7").unwrap();

        let res = app(handler.clone())
            .oneshot(
                HttpRequest::get("/me")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app(handler)
            .oneshot(
                HttpRequest::get(format!("/me?ticker=AAPL&token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"user-7");
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_rejected() {
        let handler = Arc::new(JwtHandler::new("secret".to_string(), 1));
        for req in [
            HttpRequest::get("/me").body(Body::empty()).unwrap(),
            HttpRequest::get("/me")
                .header("Authorization", "Token abc")
                .body(Body::empty())
                .unwrap(),
            HttpRequest::get("/me?token=garbage")
                .body(Body::empty())
                .unwrap(),
        ] {
            let res = app(handler.clone()).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
