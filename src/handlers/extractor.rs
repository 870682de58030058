//! Request extractors with `{detail}` error bodies
//!
//! Rejections use the same `{"detail": ...}` shape as validation errors so
//! clients handle every request-shape problem alike.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;

/// JSON extraction error
///
/// Status codes by rejection type:
/// - JSON syntax errors → 400 Bad Request
/// - Data validation errors → 422 Unprocessable Entity
/// - Missing content type → 415 Unsupported Media Type
/// - Anything else keeps axum's status (413 for an over-limit body)
pub struct ProxyJsonRejection(JsonRejection);

impl IntoResponse for ProxyJsonRejection {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            JsonRejection::JsonSyntaxError(_) => (StatusCode::BAD_REQUEST, self.0.body_text()),
            JsonRejection::JsonDataError(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.body_text())
            }
            JsonRejection::MissingJsonContentType(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Content-Type must be application/json".to_string(),
            ),
            other => (other.status(), other.body_text()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// JSON body extractor producing `{detail}` rejections
pub struct ProxyJson<T>(pub T);

impl<S, T> FromRequest<S> for ProxyJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ProxyJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ProxyJson(value)),
            Err(rejection) => Err(ProxyJsonRejection(rejection)),
        }
    }
}

/// The caller's `Authorization` header, forwarded to the backend verbatim
///
/// A missing or non-UTF-8 header is a request-shape error (422).
#[derive(Debug, Clone)]
pub struct Credential(pub String);

impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| Credential(value.to_string()))
            .ok_or_else(|| {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "detail": "Missing Authorization header" })),
                )
                    .into_response()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        model: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_syntax_error_is_400_with_detail() {
        let rejection = ProxyJson::<Payload>::from_request(json_request("{not json"), &())
            .await
            .err()
            .unwrap();
        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn test_missing_field_is_422() {
        let rejection = ProxyJson::<Payload>::from_request(json_request("{}"), &())
            .await
            .err()
            .unwrap();
        assert_eq!(
            rejection.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_missing_content_type_is_415() {
        let request = Request::builder()
            .method("POST")
            .body(Body::from(r#"{"model":"m"}"#))
            .unwrap();
        let rejection = ProxyJson::<Payload>::from_request(request, &())
            .await
            .err()
            .unwrap();
        assert_eq!(
            rejection.into_response().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[tokio::test]
    async fn test_credential_requires_authorization_header() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let response = Credential::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["detail"],
            "Missing Authorization header"
        );
    }

    #[tokio::test]
    async fn test_credential_is_taken_verbatim() {
        let (mut parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Bearer sk-123")
            .body(())
            .unwrap()
            .into_parts();
        let Credential(value) = Credential::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(value, "Bearer sk-123");
    }
}
