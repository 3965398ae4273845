//! Fixed-shape JSON responses.
//!
//! Every built-in error answer has the same body:
//!
//! ```json
//! {"message": "not found", "code": 404, "details": {}}
//! ```
//!
//! `code` is a number or a symbolic string; `details` is always an object.
//! The `*_service` functions wrap the constructors as terminal services so
//! they can be used as layer branches.

use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Code;
use crate::response::Response;
use crate::service::{BoxedService, sync_service};

pub const NOT_FOUND_MESSAGE: &str = "not found";
pub const FORBIDDEN_MESSAGE: &str = "you do not have permission to perform this action";
pub const BAD_REQUEST_MESSAGE: &str = "failed to validate your requests";
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// The body of every error envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub message: &'a str,
    pub code: &'a Code,
    pub details: &'a Map<String, Value>,
}

/// Renders an error envelope with the given status.
pub fn error(status: StatusCode, message: &str, code: &Code, details: &Map<String, Value>) -> Response {
    let envelope = Envelope { message, code, details };
    match serde_json::to_vec(&envelope) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(_) => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// `404`: `{"message":"not found","code":404,"details":{}}`.
pub fn not_found() -> Response {
    bare(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

/// `403`: permission denied.
pub fn forbidden() -> Response {
    bare(StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE)
}

/// `400`: validation failed; `details` carries the field errors.
pub fn bad_request(details: &Map<String, Value>) -> Response {
    error(StatusCode::BAD_REQUEST, BAD_REQUEST_MESSAGE, &StatusCode::BAD_REQUEST.into(), details)
}

/// `500`: message always generic.
pub fn internal_error() -> Response {
    bare(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
}

/// `204`: no body.
pub fn no_content() -> Response {
    Response::status(StatusCode::NO_CONTENT)
}

/// `200` with a serializer's content type and body.
pub fn ok(content_type: &str, body: Vec<u8>) -> Response {
    Response::builder().content(content_type, body)
}

/// `201` with a serializer's content type and body.
pub fn created(content_type: &str, body: Vec<u8>) -> Response {
    Response::builder().status(StatusCode::CREATED).content(content_type, body)
}

fn bare(status: StatusCode, message: &str) -> Response {
    error(status, message, &status.into(), &Map::new())
}

// ── As services ───────────────────────────────────────────────────────────────

pub fn not_found_service() -> BoxedService {
    sync_service(|_ctx| Ok(not_found()))
}

pub fn forbidden_service() -> BoxedService {
    sync_service(|_ctx| Ok(forbidden()))
}

pub fn no_content_service() -> BoxedService {
    sync_service(|_ctx| Ok(no_content()))
}

pub fn bad_request_service(details: Map<String, Value>) -> BoxedService {
    sync_service(move |_ctx| Ok(bad_request(&details)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::{Data, enter_context};
    use crate::service::Service;

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn not_found_has_the_fixed_shape() {
        let res = not_found();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(body(&res), json!({"message": "not found", "code": 404, "details": {}}));
    }

    #[test]
    fn forbidden_has_the_fixed_shape() {
        assert_eq!(
            body(&forbidden()),
            json!({"message": "you do not have permission to perform this action", "code": 403, "details": {}}),
        );
    }

    #[test]
    fn bad_request_carries_details() {
        let mut details = Map::new();
        details.insert("title".into(), json!([{"message": "required", "code": "required"}]));
        let res = bad_request(&details);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["details"]["title"][0]["code"], "required");
        assert_eq!(body(&res)["message"], BAD_REQUEST_MESSAGE);
    }

    #[test]
    fn textual_codes_render_as_strings() {
        let res = error(StatusCode::CONFLICT, "taken", &Code::from("duplicate"), &Map::new());
        assert_eq!(body(&res), json!({"message": "taken", "code": "duplicate", "details": {}}));
    }

    #[test]
    fn internal_error_is_generic() {
        let res = internal_error();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res), json!({"message": "internal server error", "code": 500, "details": {}}));
    }

    #[tokio::test]
    async fn services_answer_with_their_envelope() {
        let mut details = Map::new();
        details.insert("__all__".into(), json!([{"message": "bad", "code": "invalid"}]));
        let mut ctx = enter_context(&Data::new());

        let res = bad_request_service(details).call(&mut ctx).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["details"]["__all__"][0]["code"], "invalid");

        let res = no_content_service().call(&mut ctx).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());

        let res = not_found_service().call(&mut ctx).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn no_content_is_empty() {
        let res = no_content();
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
        assert!(res.content_type().is_none());
    }
}
