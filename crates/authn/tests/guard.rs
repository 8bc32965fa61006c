//! Route-level authorization through the axum middleware and
//! [`AuthorizationGuard::invoke`].
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    middleware,
    routing::{get, post},
};
use tollgate_authn::{
    AuthorizationGuard, GuardRejection, KeySetCache, TokenVerifier, require_role,
    testutil::{
        ScriptedFetcher, bearer, expired_token, foreign_key_material, privileged_token,
        test_key_material, user_token, verifier_for,
    },
};
use tollgate_keys::{Claims, Grant, PublicKeySet, Role};
use tower::ServiceExt;

fn guard() -> AuthorizationGuard {
    AuthorizationGuard::new(Arc::new(verifier_for(test_key_material())))
}

fn unavailable_guard() -> AuthorizationGuard {
    let fetcher = Arc::new(ScriptedFetcher::serving(PublicKeySet::default()));
    fetcher.fail();
    let cache = Arc::new(KeySetCache::builder().fetcher(fetcher).build());
    AuthorizationGuard::new(Arc::new(TokenVerifier::new(cache)))
}

/// A router with one USER route and one PRIVILEGED route, plus a counter of
/// handler invocations.
fn app(guard: AuthorizationGuard) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));

    let read_calls = Arc::clone(&calls);
    let read_profile = move |Extension(claims): Extension<Claims>| {
        let calls = Arc::clone(&read_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            format!("profile of {}", claims.sub)
        }
    };

    let create_calls = Arc::clone(&calls);
    let create_profile = move || {
        let calls = Arc::clone(&create_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            StatusCode::CREATED
        }
    };

    let router = Router::new()
        .route(
            "/profile/{user_id}",
            get(read_profile)
                .route_layer(middleware::from_fn(require_role(guard.clone(), Role::User))),
        )
        .route(
            "/profile",
            post(create_profile)
                .route_layer(middleware::from_fn(require_role(guard, Role::Privileged))),
        );

    (router, calls)
}

fn request(method: Method, uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_user_route_allows_owner() {
    let (router, calls) = app(guard());
    let header = bearer(&user_token(test_key_material(), 42));

    let response = router.oneshot(request(Method::GET, "/profile/42", Some(&header))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"profile of 42");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_privileged_route_allows_privileged_token() {
    let (router, calls) = app(guard());
    let header = bearer(&privileged_token(test_key_material()));

    let response = router.oneshot(request(Method::POST, "/profile", Some(&header))).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_every_deny_looks_the_same() {
    let material = test_key_material();
    let cases = [
        (Method::GET, "/profile/42", None),
        (Method::GET, "/profile/42", Some("Basic dXNlcjpwYXNz".to_owned())),
        (Method::GET, "/profile/42", Some("Bearer not-a-token".to_owned())),
        (Method::GET, "/profile/42", Some(bearer(&user_token(foreign_key_material(), 42)))),
        (Method::GET, "/profile/42", Some(bearer(&expired_token(material, Grant::User(42), 5)))),
        (Method::GET, "/profile/99", Some(bearer(&user_token(material, 42)))),
        (Method::GET, "/profile/42", Some(bearer(&privileged_token(material)))),
        (Method::POST, "/profile", Some(bearer(&user_token(material, 42)))),
    ];

    let mut expected_body = None;
    for (method, uri, authorization) in cases {
        let (router, calls) = app(guard());
        let response = router
            .oneshot(request(method.clone(), uri, authorization.as_deref()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        let body = body_json(response).await;
        if let Some(expected) = &expected_body {
            assert_eq!(&body, expected, "deny bodies must not differ ({method} {uri})");
        }
        expected_body = Some(body);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run on deny");
    }
}

#[tokio::test]
async fn test_trailing_slash_still_addresses_owner() {
    let router = Router::new().route(
        "/profile/{user_id}/",
        get(|Extension(claims): Extension<Claims>| async move { claims.sub })
            .route_layer(middleware::from_fn(require_role(guard(), Role::User))),
    );
    let header = bearer(&user_token(test_key_material(), 42));

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/profile/42/", Some(&header)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"42");

    let response =
        router.oneshot(request(Method::GET, "/profile/43/", Some(&header))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_collection_path_is_not_a_subject() {
    let (router, calls) = app(guard());
    let router = router.route(
        "/profile/",
        get(|| async { "listing" })
            .route_layer(middleware::from_fn(require_role(guard(), Role::User))),
    );
    let header = bearer(&user_token(test_key_material(), 42));

    let response = router.oneshot(request(Method::GET, "/profile/", Some(&header))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_key_set_outage_is_server_error() {
    let (router, calls) = app(unavailable_guard());
    let header = bearer(&user_token(test_key_material(), 42));

    let response = router.oneshot(request(Method::GET, "/profile/42", Some(&header))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "internal_error", "message": "An error occurred"})
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invoke_runs_operation_only_when_authorized() {
    let guard = guard();
    let header = bearer(&user_token(test_key_material(), 42));
    let (allowed, _) = request(Method::GET, "/profile/42", Some(&header)).into_parts();
    let (denied, _) = request(Method::GET, "/profile/43", Some(&header)).into_parts();

    let result = guard.invoke(&allowed, Role::User, |claims| async move { claims.sub }).await;
    assert_eq!(result, Ok("42".to_owned()));

    let ran = AtomicUsize::new(0);
    let result = guard
        .invoke(&denied, Role::User, |_| async {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    assert_eq!(result, Err(GuardRejection::Unauthorized));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invoke_reports_unavailable() {
    let header = bearer(&privileged_token(test_key_material()));
    let (parts, _) = request(Method::POST, "/profile", Some(&header)).into_parts();

    let result = unavailable_guard().invoke(&parts, Role::Privileged, |_| async {}).await;
    assert_eq!(result, Err(GuardRejection::Unavailable));
}
