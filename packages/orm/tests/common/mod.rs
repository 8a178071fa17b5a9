//! A small blog API served from memory: a `profile` singleton, `authors`,
//! `posts`, and post `history` records. Posts are returned with their
//! author nested in place of `author_id`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use reflect_http::mock::{MockTransport, RouteRequest};
use reflect_http::{Error as HttpError, Method};
use reflect_orm::contract::Cast;
use reflect_orm::{
    ActionDef, Api, FieldSpec, ModelDefinition, Options, Record, Reflect, RelationDef, Registry,
    Store, Validation,
};
use serde_json::{json, Value};

pub type Rows = BTreeMap<i64, Record>;

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

fn rows(items: Vec<Value>) -> Rows {
    items
        .into_iter()
        .zip(1..)
        .map(|(item, id)| {
            let mut row = record(item);
            row.insert("id".to_string(), json!(id));
            (id, row)
        })
        .collect()
}

pub struct Db {
    pub profile: Record,
    pub posts: Rows,
    pub records: Rows,
    pub authors: Rows,
}

impl Db {
    pub fn seed() -> Self {
        Self {
            profile: record(json!({"username": "admin"})),
            posts: rows(vec![
                json!({"title": "Foo", "body": "foo bar baz", "hits": 100, "author_id": 1, "archived": false}),
                json!({"title": "Bar", "body": "bar baz", "hits": 200, "author_id": 1, "archived": true}),
            ]),
            records: rows(vec![
                json!({"delta": "foo", "post_id": 1}),
                json!({"delta": "bar", "post_id": 1}),
            ]),
            authors: rows(vec![
                json!({"name": "Jane Doe", "email": "jane@doe.com"}),
                json!({"name": "John Doe", "email": "john@doe.com"}),
            ]),
        }
    }

    fn rows(&mut self, table: &str) -> &mut Rows {
        match table {
            "posts" => &mut self.posts,
            "authors" => &mut self.authors,
            "records" => &mut self.records,
            other => panic!("no table {}", other),
        }
    }

    /// A row as the API returns it.
    fn row(&self, table: &str, id: i64) -> Option<Value> {
        let source = match table {
            "posts" => &self.posts,
            "authors" => &self.authors,
            _ => &self.records,
        };
        let mut row = source.get(&id)?.clone();
        if table == "posts" {
            if let Some(author_id) = row.remove("author_id") {
                let author = author_id
                    .as_i64()
                    .and_then(|id| self.authors.get(&id))
                    .map(|a| Value::Object(a.clone()))
                    .unwrap_or(Value::Null);
                row.insert("author".to_string(), author);
            }
        }
        Some(Value::Object(row))
    }

    fn list(&self, table: &str) -> Value {
        let ids: Vec<i64> = match table {
            "posts" => self.posts.keys().copied().collect(),
            "authors" => self.authors.keys().copied().collect(),
            _ => self.records.keys().copied().collect(),
        };
        Value::Array(ids.into_iter().filter_map(|id| self.row(table, id)).collect())
    }

    fn history(&self, post_id: i64) -> Value {
        Value::Array(
            self.records
                .values()
                .filter(|r| r.get("post_id") == Some(&json!(post_id)))
                .map(|r| Value::Object(r.clone()))
                .collect(),
        )
    }
}

fn missing(id: i64) -> HttpError {
    HttpError::Status {
        status: 404,
        message: format!("Record `{}` not in API Database", id),
    }
}

fn body(req: &RouteRequest) -> Record {
    match &req.body {
        Some(Value::Object(map)) => map.clone(),
        _ => Record::new(),
    }
}

#[derive(Clone)]
pub struct Server {
    pub transport: MockTransport,
    db: Arc<Mutex<Db>>,
}

impl Server {
    pub fn db(&self) -> MutexGuard<'_, Db> {
        self.db.lock().unwrap()
    }

    /// Requests seen so far, as `(method, url)`.
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.transport
            .recorded_requests()
            .into_iter()
            .map(|r| (r.method, r.url))
            .collect()
    }

    fn route<F>(&self, method: Method, pattern: &str, handler: F)
    where
        F: Fn(&mut Db, RouteRequest) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        let db = Arc::clone(&self.db);
        self.transport.add_route(method, pattern, move |req| {
            let mut db = db.lock().unwrap();
            handler(&mut db, req)
        });
    }

    fn collection(&self, table: &'static str) {
        let path = format!("/{}", table);
        self.route(Method::GET, &path, move |db, _| Ok(db.list(table)));
        self.route(Method::POST, &path, move |db, req| {
            let rows = db.rows(table);
            let id = rows.keys().max().copied().unwrap_or(0) + 1;
            let mut row = body(&req);
            row.insert("id".to_string(), json!(id));
            rows.insert(id, row);
            db.row(table, id).ok_or_else(|| missing(id))
        });
    }

    fn model(&self, table: &'static str) {
        let path = format!("/{}/:id", table);
        self.route(Method::GET, &path, move |db, req| {
            let id = req.id.unwrap_or_default();
            db.row(table, id).ok_or_else(|| missing(id))
        });
        self.route(Method::PUT, &path, move |db, req| {
            let id = req.id.unwrap_or_default();
            let payload = body(&req);
            let row = db.rows(table).get_mut(&id).ok_or_else(|| missing(id))?;
            for (key, value) in payload {
                if row.contains_key(&key) {
                    row.insert(key, value);
                }
            }
            db.row(table, id).ok_or_else(|| missing(id))
        });
        self.route(Method::DELETE, &path, move |db, req| {
            let id = req.id.unwrap_or_default();
            db.rows(table).remove(&id);
            Ok(Value::Null)
        });
    }
}

pub fn server() -> Server {
    let server = Server {
        transport: MockTransport::new(),
        db: Arc::new(Mutex::new(Db::seed())),
    };

    server.route(Method::GET, "/profile", |db, _| Ok(Value::Object(db.profile.clone())));
    server.route(Method::PUT, "/profile", |db, req| {
        db.profile.extend(body(&req));
        Ok(Value::Object(db.profile.clone()))
    });
    server.route(Method::DELETE, "/profile", |db, _| {
        db.profile = record(json!({"username": "admin"}));
        Ok(Value::Null)
    });

    server.collection("posts");
    server.model("posts");
    server.collection("authors");
    server.model("authors");

    server.route(Method::GET, "/posts/:id/history", |db, req| {
        Ok(db.history(req.id.unwrap_or_default()))
    });
    server.route(Method::POST, "/posts/:id/history", |db, req| {
        let post_id = req.id.unwrap_or_default();
        let id = db.records.keys().max().copied().unwrap_or(0) + 1;
        let mut row = body(&req);
        row.insert("id".to_string(), json!(id));
        row.insert("post_id".to_string(), json!(post_id));
        db.records.insert(id, row);
        Ok(db.history(post_id))
    });
    server.route(Method::POST, "/posts/:id/archive", |db, req| {
        let id = req.id.unwrap_or_default();
        let post = db.posts.get_mut(&id).ok_or_else(|| missing(id))?;
        post.insert("archived".to_string(), json!(true));
        db.row("posts", id).ok_or_else(|| missing(id))
    });
    server.route(Method::GET, "/posts/:id/author", |db, req| {
        let id = req.id.unwrap_or_default();
        let author_id = db
            .posts
            .get(&id)
            .and_then(|p| p.get("author_id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| missing(id))?;
        db.row("authors", author_id).ok_or_else(|| missing(author_id))
    });
    server.route(Method::GET, "/authors/:id/posts", |db, req| {
        let id = req.id.unwrap_or_default();
        let ids: Vec<i64> = db
            .posts
            .iter()
            .filter(|(_, p)| p.get("author_id") == Some(&json!(id)))
            .map(|(id, _)| *id)
            .collect();
        Ok(Value::Array(ids.into_iter().filter_map(|id| db.row("posts", id)).collect()))
    });

    server
}

pub fn is_email(value: &Value) -> bool {
    let Some(s) = value.as_str() else {
        return false;
    };
    match s.split_once('@') {
        Some((user, domain)) => !user.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

fn text(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

pub fn profile() -> ModelDefinition {
    ModelDefinition::new()
        .singleton()
        .initial(Record::new())
        .api(Api::new().fetch("/profile").update("/profile").delete("/profile"))
        .field(
            "username",
            FieldSpec::new()
                .required()
                .with_default(json!("<anonymous>"))
                .cast(Cast::String)
                .validate(Validation::predicate(|v| !text(v).contains(char::is_whitespace)))
                .mutate(|v| json!(text(&v).to_lowercase())),
        )
}

pub fn authors() -> ModelDefinition {
    ModelDefinition::new()
        .api(
            Api::new()
                .fetch("/authors")
                .create("/authors")
                .get("/authors/:id")
                .update("/authors/:id"),
        )
        .field(
            "name",
            FieldSpec::new()
                .with_default(Value::Null)
                .required()
                .cast(Cast::String),
        )
        .field(
            "email",
            FieldSpec::new()
                .cast(Cast::String)
                .validate(Validation::predicate(is_email).with_message("`${value}` is not a valid email.")),
        )
        .relation("posts", RelationDef::to("posts", "/authors/:id/posts"))
}

pub fn posts() -> ModelDefinition {
    ModelDefinition::new()
        .api(Api::new().collection("/posts").model("/posts/:id"))
        .field(
            "slug",
            FieldSpec::new()
                .from_key("title")
                .local_only()
                .parse(|v| json!(text(&v).to_lowercase().replace(' ', "-"))),
        )
        .field(
            "title",
            FieldSpec::new()
                .with_default(json!("My Post Title"))
                .required()
                .cast(Cast::String),
        )
        .field(
            "body",
            FieldSpec::new()
                .cast(Cast::String)
                .mutate(|v| json!(format!("<div>{}</div>", text(&v)))),
        )
        .field("footer", FieldSpec::new().with_default(json!("footer")).local_only())
        .field(
            "author",
            FieldSpec::new()
                .required()
                .model("authors")
                .to_key("author_id")
                .collapse("id"),
        )
        .relation("author", RelationDef::to("authors", "/posts/:id/author"))
        .action(
            "archive",
            ActionDef::new().method("post", "/posts/:id/archive").refresh(),
        )
        .action("history", "/posts/:id/history")
        .query("history", "/posts/:id/history")
}

/// The blog models registered at the root of a fresh store.
pub fn setup() -> (Registry, Server) {
    let server = server();
    let store = Store::new();
    let registry = Reflect::new(Options::new().with_transport(server.transport.clone()))
        .model("profile", profile())
        .model("authors", authors())
        .model("posts", posts())
        .install(&store)
        .expect("blog models register");
    (registry, server)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
