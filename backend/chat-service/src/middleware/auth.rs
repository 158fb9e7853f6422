use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
///
/// Validation checks both the session signature in the cache and that the
/// account still exists and is not blocked.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal)?;
            let token = token.ok_or(AppError::Unauthorized)?;
            let session = state
                .auth
                .validate(&token)
                .await?
                .ok_or(AppError::Unauthorized)?;
            Ok(AuthUser {
                id: session.identifier,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_token_strips_scheme() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer 7:abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("7:abc"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcg=="))
            .to_http_request();
        assert!(bearer_token(&req).is_none());

        let bare = TestRequest::default().to_http_request();
        assert!(bearer_token(&bare).is_none());
    }
}
