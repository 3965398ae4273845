//! Mutators: form binding and deletion.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::Context;
use crate::envelope;
use crate::error::Error;
use crate::request::Request;
use crate::response::ContentType;

use super::{Mutated, Mutator};

/// Field name for errors that are not tied to one field.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// One validation error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub message: String,
    pub code: String,
}

/// Validation errors by field, rendered as the `details` of a 400 envelope:
///
/// ```json
/// {"title": [{"message": "This field is required.", "code": "required"}]}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<FieldError>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>, code: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(FieldError { message: message.into(), code: code.into() });
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, field: &str, message: impl Into<String>, code: impl Into<String>) -> Self {
        self.add(field, message, code);
        self
    }

    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<FieldErrors> for Map<String, Value> {
    fn from(errors: FieldErrors) -> Self {
        match serde_json::to_value(errors) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A file part of a multipart body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Uploaded files by field name. A repeated field keeps its last file.
pub type Files = BTreeMap<String, UploadedFile>;

/// Binds request data to an instance.
///
/// `validate` sees the parsed body fields, the uploaded files and, on
/// update, the located instance; `save` persists the validated form and
/// returns the stored instance.
pub trait Form: Sized + Send + 'static {
    type Instance: Send + 'static;

    fn validate(data: Map<String, Value>, files: Files, instance: Option<Self::Instance>) -> Result<Self, FieldErrors>;

    fn save(self, ctx: &mut Context) -> Result<Self::Instance, Error>;
}

/// Parses the request body, validates it with `F` and saves it.
///
/// JSON objects, urlencoded bodies and multipart bodies are bound; for a
/// repeated urlencoded or multipart key the last value wins. Multipart file
/// parts go to `files`. Any other content type binds empty data. Invalid
/// input is rejected with a 400 envelope carrying the field errors.
pub fn form_mutator<F: Form>() -> Mutator<F::Instance> {
    Arc::new(|ctx: &mut Context, instance: Option<F::Instance>| {
        let (data, files) = match parse_body(ctx.require_request()?) {
            Ok(parsed) => parsed,
            Err(errors) => return Ok(Mutated::Rejected(envelope::bad_request(&errors.into()))),
        };
        match F::validate(data, files, instance) {
            Ok(form) => Ok(Mutated::Saved(form.save(ctx)?)),
            Err(errors) => {
                debug!(fields = ?errors.0.keys().collect::<Vec<_>>(), "form rejected");
                Ok(Mutated::Rejected(envelope::bad_request(&errors.into())))
            }
        }
    })
}

fn parse_body(req: &Request) -> Result<(Map<String, Value>, Files), FieldErrors> {
    match req.content_type().and_then(ContentType::classify) {
        Some(ContentType::Json) => match serde_json::from_slice::<Value>(req.body()) {
            Ok(Value::Object(data)) => Ok((data, Files::new())),
            Ok(_) => Err(FieldErrors::new().with(NON_FIELD_ERRORS, "expected a JSON object", "invalid")),
            Err(e) => Err(FieldErrors::new().with(NON_FIELD_ERRORS, format!("malformed JSON: {e}"), "parse_error")),
        },
        Some(ContentType::FormData) => {
            let data = form_urlencoded::parse(req.body())
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            Ok((data, Files::new()))
        }
        Some(ContentType::Multipart) => parse_multipart(req).map_err(|e| {
            FieldErrors::new().with(NON_FIELD_ERRORS, format!("malformed multipart body: {e}"), "parse_error")
        }),
        _ => Ok((Map::new(), Files::new())),
    }
}

fn parse_multipart(req: &Request) -> Result<(Map<String, Value>, Files), multer::Error> {
    let boundary = multer::parse_boundary(req.header("content-type").unwrap_or_default())?;
    let body = req.body.clone();
    let mut multipart = multer::Multipart::new(
        futures::stream::once(async move { Ok::<_, Infallible>(body) }),
        boundary,
    );

    // The body is already in memory, so nothing here ever waits.
    futures::executor::block_on(async move {
        let mut data = Map::new();
        let mut files = Files::new();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            if field.file_name().is_some() {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(ToString::to_string);
                let bytes = field.bytes().await?;
                files.insert(name, UploadedFile { file_name, content_type, bytes });
            } else {
                data.insert(name, Value::String(field.text().await?));
            }
        }
        Ok((data, files))
    })
}

/// Runs `delete` on the located instance. Without one there is nothing to
/// delete and the request is answered with 404.
pub fn delete_mutator<T, F>(delete: F) -> Mutator<T>
where
    T: Send + 'static,
    F: Fn(&mut Context, &T) -> Result<(), Error> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &mut Context, instance: Option<T>| match instance {
        Some(instance) => {
            delete(ctx, &instance)?;
            Ok(Mutated::Saved(instance))
        }
        None => Ok(Mutated::Rejected(envelope::not_found())),
    })
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::context::{Data, enter_context};
    use crate::method::Method;
    use crate::response::Response;

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        id: u32,
        title: String,
    }

    struct NoteForm {
        id: u32,
        title: String,
    }

    impl Form for NoteForm {
        type Instance = Note;

        fn validate(data: Map<String, Value>, _files: Files, instance: Option<Note>) -> Result<Self, FieldErrors> {
            match data.get("title").and_then(Value::as_str) {
                Some(title) if !title.is_empty() => Ok(Self {
                    id: instance.map_or(1, |n| n.id),
                    title: title.to_owned(),
                }),
                _ => Err(FieldErrors::new().with("title", "This field is required.", "required")),
            }
        }

        fn save(self, _ctx: &mut Context) -> Result<Note, Error> {
            Ok(Note { id: self.id, title: self.title })
        }
    }

    fn post(content_type: &str, body: &'static str) -> Context {
        let req = Request::new(Method::Post, "/notes")
            .with_header("content-type", content_type)
            .with_body(body);
        enter_context(&Data::new()).set_request(req)
    }

    fn saved(outcome: Mutated<Note>) -> Note {
        match outcome {
            Mutated::Saved(note) => note,
            Mutated::Rejected(res) => panic!("rejected with {}", res.status_code()),
        }
    }

    fn rejected(outcome: Mutated<Note>) -> Response {
        match outcome {
            Mutated::Rejected(res) => res,
            Mutated::Saved(note) => panic!("saved {note:?}"),
        }
    }

    fn details(res: &Response) -> Value {
        serde_json::from_slice::<Value>(res.body()).unwrap()["details"].clone()
    }

    #[test]
    fn json_object_is_bound() {
        let mut ctx = post("application/json; charset=utf-8", r#"{"title":"hello"}"#);
        let note = saved(form_mutator::<NoteForm>()(&mut ctx, None).unwrap());
        assert_eq!(note, Note { id: 1, title: "hello".into() });
    }

    #[test]
    fn urlencoded_last_value_wins_and_instance_is_passed() {
        let mut ctx = post("application/x-www-form-urlencoded", "title=a&title=b+c");
        let prior = Note { id: 7, title: "old".into() };
        let note = saved(form_mutator::<NoteForm>()(&mut ctx, Some(prior)).unwrap());
        assert_eq!(note, Note { id: 7, title: "b c".into() });
    }

    #[test]
    fn validation_errors_become_400_details() {
        let mut ctx = post("application/json", r#"{"title":""}"#);
        let res = rejected(form_mutator::<NoteForm>()(&mut ctx, None).unwrap());
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::from_slice::<Value>(res.body()).unwrap(),
            json!({
                "message": "failed to validate your requests",
                "code": 400,
                "details": {"title": [{"message": "This field is required.", "code": "required"}]},
            }),
        );
    }

    #[test]
    fn malformed_or_non_object_json_is_rejected_under_all() {
        for body in ["{not json", "[1, 2]"] {
            let mut ctx = post("application/json", body);
            let res = rejected(form_mutator::<NoteForm>()(&mut ctx, None).unwrap());
            assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
            assert!(details(&res).get(NON_FIELD_ERRORS).is_some(), "{body}");
        }
    }

    #[test]
    fn other_content_types_bind_empty_data() {
        let mut ctx = post("text/plain", "title=hello");
        let res = rejected(form_mutator::<NoteForm>()(&mut ctx, None).unwrap());
        assert_eq!(details(&res)["title"][0]["code"], "required");
    }

    /// Keeps the title and the cover upload it was given.
    #[derive(Debug)]
    struct Upload {
        title: String,
        cover: Option<UploadedFile>,
    }

    impl Form for Upload {
        type Instance = Upload;

        fn validate(data: Map<String, Value>, mut files: Files, _instance: Option<Upload>) -> Result<Self, FieldErrors> {
            match data.get("title").and_then(Value::as_str) {
                Some(title) => Ok(Self { title: title.to_owned(), cover: files.remove("cover") }),
                None => Err(FieldErrors::new().with("title", "This field is required.", "required")),
            }
        }

        fn save(self, _ctx: &mut Context) -> Result<Upload, Error> {
            Ok(self)
        }
    }

    const MULTIPART: &str = "--XyZ\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\r\n\
        Dune\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"cover\"; filename=\"dune.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        spice\r\n\
        --XyZ--\r\n";

    #[test]
    fn multipart_binds_fields_and_files() {
        let mut ctx = post("multipart/form-data; boundary=XyZ", MULTIPART);
        let upload = match form_mutator::<Upload>()(&mut ctx, None).unwrap() {
            Mutated::Saved(upload) => upload,
            Mutated::Rejected(res) => panic!("rejected with {}", res.status_code()),
        };
        assert_eq!(upload.title, "Dune");
        let cover = upload.cover.unwrap();
        assert_eq!(cover.file_name.as_deref(), Some("dune.txt"));
        assert_eq!(cover.content_type.as_deref(), Some("text/plain"));
        assert_eq!(&cover.bytes[..], b"spice");
    }

    #[test]
    fn multipart_without_a_boundary_is_rejected_under_all() {
        let mut ctx = post("multipart/form-data", MULTIPART);
        let res = rejected(form_mutator::<NoteForm>()(&mut ctx, None).unwrap());
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(details(&res)[NON_FIELD_ERRORS][0]["code"], "parse_error");
    }

    #[test]
    fn binding_needs_a_request() {
        let mut ctx = enter_context(&Data::new());
        assert!(matches!(form_mutator::<NoteForm>()(&mut ctx, None), Err(Error::MissingRequest)));
    }

    #[test]
    fn delete_runs_the_callback_on_the_instance() {
        let mut ctx = enter_context(&Data::new());
        let delete = delete_mutator(|ctx: &mut Context, note: &Note| {
            ctx.insert("deleted", note.id)?;
            Ok(())
        });
        let note = saved(delete(&mut ctx, Some(Note { id: 3, title: "x".into() })).unwrap());
        assert_eq!(note.id, 3);
        assert_eq!(ctx.get::<u32>("deleted").unwrap(), &3);

        let res = rejected(delete(&mut ctx, None).unwrap());
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn field_errors_convert_to_a_details_map() {
        let errors = FieldErrors::new()
            .with("title", "This field is required.", "required")
            .with(NON_FIELD_ERRORS, "bad", "invalid");
        let map: Map<String, Value> = errors.into();
        assert_eq!(
            Value::Object(map),
            json!({
                "__all__": [{"message": "bad", "code": "invalid"}],
                "title": [{"message": "This field is required.", "code": "required"}],
            }),
        );
    }

    #[test]
    fn field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("a", "one", "x");
        errors.add("a", "two", "y");
        assert_eq!(errors.get("a").map(<[FieldError]>::len), Some(2));
        assert!(errors.get("b").is_none());
    }
}
