//! An in-memory book API.
//!
//! ```sh
//! cargo run --example books
//! curl localhost:3000/books?limit=1
//! curl -XPOST -H 'authorization: editor' -H 'content-type: application/json' \
//!      -d '{"title":"Middlemarch"}' localhost:3000/books
//! ```

use std::sync::{Arc, RwLock};

use plait::crud::{
    FieldErrors, Files, Filterer, Form, Keyed, Records, all_filterer, count_meta_filterer, create_service,
    detail_service, form_mutator, json_list_serializer, json_serializer, limit_offset_filterer, list_service,
    pk_filterer,
};
use plait::envelope::not_found_service;
use plait::middleware::{
    AuthenticationLayer, Authenticator, Credentials, ExceptionLayer, Principal, TraceLayer, User,
    has_permissions_layer, method_layer,
};
use plait::{
    BoxFuture, Context, Data, Error, Failure, META_KEY, Method, Request, Router, Server, View, into_service,
    layers,
};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Serialize)]
struct Book {
    id: u32,
    title: String,
}

impl Keyed for Book {
    fn pk(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Clone, Default)]
struct Store(Arc<RwLock<Vec<Book>>>);

impl Store {
    fn all(&self) -> Records<Book> {
        let books = self.0.read().map(|books| books.to_vec()).unwrap_or_default();
        Records::new(books)
    }
}

struct NewBook(String);

impl Form for NewBook {
    type Instance = Book;

    fn validate(data: Map<String, Value>, _files: Files, _instance: Option<Book>) -> Result<Self, FieldErrors> {
        match data.get("title").and_then(Value::as_str) {
            Some(title) if !title.trim().is_empty() => Ok(Self(title.trim().to_owned())),
            _ => Err(FieldErrors::new().with("title", "This field is required.", "required")),
        }
    }

    fn save(self, ctx: &mut Context) -> Result<Book, Error> {
        let store = ctx.get::<Store>("store")?;
        let mut books = store.0.write().map_err(|_| Failure::new("store poisoned"))?;
        let book = Book { id: books.len() as u32 + 1, title: self.0 };
        books.push(book.clone());
        Ok(book)
    }
}

struct Editor;

impl Principal for Editor {
    fn has_perm(&self, perm: &str) -> bool {
        perm == "books.add_book"
    }

    fn name(&self) -> &str {
        "editor"
    }
}

/// Anyone presenting the `editor` token.
struct Tokens;

impl Authenticator for Tokens {
    fn authenticate<'a>(
        &'a self,
        _request: Option<&'a Request>,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<Option<User>, Error>> {
        let user = (credentials.get("token").map(String::as_str) == Some("editor")).then(|| User::new(Editor));
        Box::pin(async move { Ok(user) })
    }
}

fn mount(store: &Store, service: plait::BoxedService) -> View {
    let store = store.clone();
    View::new(service).with_initial_data(move |req: &Request| {
        req.params()
            .iter()
            .fold(Data::new(), |data, (k, v)| data.with(k.as_str(), v.clone()))
            .with("store", store.clone())
            .with("token", req.header("authorization").unwrap_or_default().to_owned())
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let store = Store::default();
    let source = |store: &Store| -> Filterer<Records<Book>> {
        let store = store.clone();
        all_filterer(move || store.all())
    };

    let list = list_service(
        json_list_serializer::<Records<Book>>(META_KEY),
        vec![source(&store), count_meta_filterer(META_KEY), limit_offset_filterer()],
    );
    let create = into_service(
        has_permissions_layer(["books.add_book"]),
        create_service(form_mutator::<NewBook>(), json_serializer::<Book>()),
    );
    let detail = detail_service(json_serializer::<Book>(), vec![source(&store), pk_filterer("pk")]);

    let books = into_service(
        layers![
            TraceLayer,
            ExceptionLayer::new(),
            AuthenticationLayer::new(Tokens, ["token"]),
            method_layer(Method::Get, list),
            method_layer(Method::Post, create),
        ],
        not_found_service(),
    );
    let book = into_service(
        layers![TraceLayer, ExceptionLayer::new(), method_layer(Method::Get, detail)],
        not_found_service(),
    );

    let app = Router::new()
        .route_view("/books", mount(&store, books))
        .route_view("/books/{pk}", mount(&store, book));

    Server::bind("0.0.0.0:3000")?.serve(app).await
}
