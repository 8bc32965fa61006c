//! Per-operation authorization.
//!
//! An [`AuthorizationGuard`] is attached to each protected operation with one
//! static required role. For axum routes use [`require_role`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{Extension, Router, middleware, routing::{get, post}};
//! use tollgate_authn::{AuthorizationGuard, TokenVerifier, require_role};
//! use tollgate_keys::{Claims, Role};
//!
//! async fn read_profile(Extension(claims): Extension<Claims>) -> String {
//!     format!("profile of {}", claims.sub)
//! }
//!
//! async fn create_profile() -> &'static str {
//!     "created"
//! }
//!
//! fn routes(verifier: Arc<TokenVerifier>) -> Router {
//!     let guard = AuthorizationGuard::new(verifier);
//!     Router::new()
//!         .route(
//!             "/profile/{user_id}",
//!             get(read_profile).route_layer(middleware::from_fn(require_role(guard.clone(), Role::User))),
//!         )
//!         .route(
//!             "/profile",
//!             post(create_profile).route_layer(middleware::from_fn(require_role(guard, Role::Privileged))),
//!         )
//! }
//! ```
//!
//! For `USER` operations the addressed subject is the last path segment of a
//! GET request; other methods carry no subject and are denied for `USER`.

use std::{future::Future, pin::Pin, sync::Arc};

use axum::{
    Json,
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tollgate_keys::{Claims, Role};

use crate::verifier::{TokenVerifier, Verdict};

/// Why the guard refused to run an operation.
///
/// The response never says which verification step failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardRejection {
    /// The token was refused. Maps to `401 Unauthorized`.
    Unauthorized,
    /// The decision could not be made (key set unavailable). Maps to `500`.
    Unavailable,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                let body = ErrorBody { error: "unauthorized", message: "Unauthorized access" };
                let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            },
            Self::Unavailable => {
                let body = ErrorBody { error: "internal_error", message: "An error occurred" };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            },
        }
    }
}

/// The subject a `USER` operation addresses: the final path segment of a GET.
///
/// Trailing slashes are ignored, so `/profile/42/` addresses `42`. Returns
/// `None` for every other method.
#[must_use]
pub fn subject_from_path<'a>(method: &Method, path: &'a str) -> Option<&'a str> {
    if *method != Method::GET {
        return None;
    }
    path.trim_end_matches('/').rsplit('/').next()
}

/// Checks each call against a required role before letting it through.
#[derive(Clone, Debug)]
pub struct AuthorizationGuard {
    verifier: Arc<TokenVerifier>,
}

impl AuthorizationGuard {
    /// Creates a guard backed by `verifier`.
    #[must_use]
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Authorizes a request described by its parts.
    ///
    /// # Errors
    ///
    /// Returns [`GuardRejection::Unauthorized`] on any deny and
    /// [`GuardRejection::Unavailable`] if no verdict could be reached.
    pub async fn authorize(
        &self,
        parts: &Parts,
        required_role: Role,
    ) -> Result<Claims, GuardRejection> {
        self.authorize_call(&parts.headers, &parts.method, parts.uri.path(), required_role).await
    }

    /// Authorizes a call given its headers, method, and path.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationGuard::authorize`].
    #[tracing::instrument(skip_all, fields(%method, path, %required_role))]
    pub async fn authorize_call(
        &self,
        headers: &HeaderMap,
        method: &Method,
        path: &str,
        required_role: Role,
    ) -> Result<Claims, GuardRejection> {
        let authorization =
            headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or_default();
        let subject = match required_role {
            Role::User => subject_from_path(method, path),
            Role::Privileged => None,
        };

        match self.verifier.verify(authorization, required_role, subject).await {
            Ok(Verdict::Allow(claims)) => Ok(claims),
            Ok(Verdict::Deny(_)) => Err(GuardRejection::Unauthorized),
            Err(err) => {
                tracing::error!(error = %err, "authorization could not be evaluated");
                Err(GuardRejection::Unavailable)
            },
        }
    }

    /// Runs `operation` only if the request is authorized.
    ///
    /// The operation receives the verified claims and its output is returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationGuard::authorize`]. The operation is not invoked
    /// when an error is returned.
    pub async fn invoke<F, Fut, T>(
        &self,
        parts: &Parts,
        required_role: Role,
        operation: F,
    ) -> Result<T, GuardRejection>
    where
        F: FnOnce(Claims) -> Fut,
        Fut: Future<Output = T>,
    {
        let claims = self.authorize(parts, required_role).await?;
        Ok(operation(claims).await)
    }
}

/// Future returned by the [`require_role`] middleware.
pub type GuardFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// axum middleware enforcing `role` on every request it wraps.
///
/// On success the verified [`Claims`] are inserted into the request
/// extensions for the handler.
pub fn require_role(
    guard: AuthorizationGuard,
    role: Role,
) -> impl Fn(Request, Next) -> GuardFuture + Clone + Send + Sync + 'static {
    move |request: Request, next: Next| -> GuardFuture {
        let guard = guard.clone();
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            match guard.authorize(&parts, role).await {
                Ok(claims) => {
                    parts.extensions.insert(claims);
                    next.run(Request::from_parts(parts, body)).await
                },
                Err(rejection) => rejection.into_response(),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::user_path(Method::GET, "/profile/42", Some("42"))]
    #[case::nested(Method::GET, "/api/v1/users/7", Some("7"))]
    #[case::trailing_slash(Method::GET, "/profile/42/", Some("42"))]
    #[case::repeated_trailing_slash(Method::GET, "/profile/42//", Some("42"))]
    #[case::collection(Method::GET, "/profile/", Some("profile"))]
    #[case::root(Method::GET, "/", Some(""))]
    #[case::post(Method::POST, "/profile/42", None)]
    #[case::delete(Method::DELETE, "/profile/42", None)]
    fn test_subject_from_path(
        #[case] method: Method,
        #[case] path: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(subject_from_path(&method, path), expected);
    }

    #[tokio::test]
    async fn test_rejection_bodies_are_opaque() {
        let response = GuardRejection::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "unauthorized", "message": "Unauthorized access"}));

        let response = GuardRejection::Unavailable.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
