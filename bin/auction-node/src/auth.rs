use auction_core::UserId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};

/// The resolved bidder identity an upstream middleware places in the
/// request context. An upstream middleware resolves the user id and
/// places it in the request context; the core reads, but does not
/// validate, that identity — this extractor only reads; it never
/// authenticates anyone.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or((StatusCode::UNAUTHORIZED, "missing resolved user identity"))
    }
}

const USER_ID_HEADER: &str = "x-user-id";

/// Stand-in for the real authentication middleware this workspace does
/// not implement (out of scope). Reads an already-trusted
/// `X-User-Id` header and inserts a `CurrentUser` extension exactly the
/// way a real auth layer would, for local running and integration
/// tests only.
pub async fn resolve_user_id<B>(
    mut request: axum::http::Request<B>,
    next: axum::middleware::Next<B>,
) -> axum::response::Response {
    if let Some(user_id) = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(HeaderValue::to_str)
        .ok()
        .and_then(|value| value.parse::<UserId>().ok())
    {
        request.extensions_mut().insert(CurrentUser(user_id));
    }
    next.run(request).await
}
