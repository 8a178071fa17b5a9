//! Model handles and instances against the blog API.

mod common;

use common::{record, setup};
use pretty_assertions::assert_eq;
use reflect_http::Method;
use reflect_orm::{Error, ErrorKind, FieldSpec, FieldValue, Member, Options, RecordId, Reflect, Store};
use serde_json::{json, Value};

#[tokio::test]
async fn fetch_builds_instances() {
    common::init_tracing();
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();

    let fetched = posts.fetch().await.unwrap();
    assert_eq!(fetched.len(), 2);

    let foo = &fetched[0];
    assert_eq!(foo.id(), Some(&RecordId::Int(1)));
    assert_eq!(foo.value("title"), Some(json!("Foo")));
    assert_eq!(foo.value("slug"), Some(json!("foo")));
    assert_eq!(foo.value("footer"), Some(json!("footer")));

    let author = foo.get("author").and_then(FieldValue::as_entity).unwrap();
    assert_eq!(author.model().name(), "authors");
    assert_eq!(author.id(), Some(&RecordId::Int(1)));
    assert_eq!(author.value("name"), Some(json!("Jane Doe")));
}

#[tokio::test]
async fn get_and_find() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();

    assert!(posts.find(2i64).unwrap().is_none());

    let bar = posts.get(2i64).await.unwrap().unwrap();
    assert_eq!(bar.value("title"), Some(json!("Bar")));

    let found = posts.find_many([2i64, 7]).unwrap();
    assert!(found[0].is_some());
    assert!(found[1].is_none());
}

#[tokio::test]
async fn commit_creates_then_updates() {
    let (registry, server) = setup();
    let posts = registry.model("posts").unwrap();

    let mut post = posts
        .build(record(json!({"title": "Baz", "body": "baz", "author": {"id": 2}})))
        .unwrap();
    assert_eq!(post.id(), None);
    assert_eq!(post.value("author"), Some(json!({"id": 2})));

    post.commit().await.unwrap();
    assert_eq!(post.id(), Some(&RecordId::Int(3)));
    assert_eq!(post.value("body"), Some(json!("<div>baz</div>")));
    let author = post.get("author").and_then(FieldValue::as_entity).unwrap();
    assert_eq!(author.value("name"), Some(json!("John Doe")));

    post.set("title", "Baz Two").unwrap();
    post.commit().await.unwrap();
    assert_eq!(post.value("slug"), Some(json!("baz-two")));
    assert_eq!(server.db().posts[&3]["title"], json!("Baz Two"));

    assert_eq!(
        server.calls(),
        vec![
            (Method::POST, "/posts".to_string()),
            (Method::PUT, "/posts/3".to_string()),
        ]
    );
}

#[tokio::test]
async fn successive_creates_get_new_ids() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();

    let mut ids = Vec::new();
    for title in ["One", "Two", "Three"] {
        let mut post = posts
            .build(record(json!({"title": title, "author": 1})))
            .unwrap();
        post.commit().await.unwrap();
        ids.push(post.id().cloned());
    }
    assert_eq!(
        ids,
        vec![
            Some(RecordId::Int(3)),
            Some(RecordId::Int(4)),
            Some(RecordId::Int(5)),
        ]
    );
    assert_eq!(posts.query().unwrap().count(), 3);
}

#[tokio::test]
async fn nested_values_resolve_from_the_cache() {
    let (registry, _server) = setup();
    let authors = registry.model("authors").unwrap();
    let posts = registry.model("posts").unwrap();
    authors.fetch().await.unwrap();

    let post = posts.build(record(json!({"author": 2}))).unwrap();
    let author = post.get("author").and_then(FieldValue::as_entity).unwrap();
    assert_eq!(author.value("email"), Some(json!("john@doe.com")));

    let err = posts
        .build(record(json!({"author": {"name": "No Id"}})))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Contract);
    assert_eq!(
        err.to_string(),
        "Nested inputs for property `author` must have `id` property."
    );
}

#[tokio::test]
async fn cyclic_references_resolve_one_level() {
    let server = common::server();
    let store = Store::new();
    let registry = Reflect::new(Options::new().with_transport(server.transport.clone()))
        .model(
            "authors",
            common::authors().field("latest_post", FieldSpec::new().model("posts")),
        )
        .model("posts", common::posts())
        .install(&store)
        .unwrap();
    store
        .commit("authors.sync", json!({"id": 1, "name": "Jane Doe", "latest_post": 1}))
        .unwrap();
    store
        .commit("posts.sync", json!({"id": 1, "title": "Foo", "author": 1}))
        .unwrap();

    let posts = registry.model("posts").unwrap();
    let post = posts.find(1i64).unwrap().unwrap();
    let author = post.get("author").and_then(FieldValue::as_entity).unwrap();
    assert_eq!(author.value("name"), Some(json!("Jane Doe")));
    assert_eq!(
        author.get("latest_post").and_then(FieldValue::as_value),
        Some(&json!(1))
    );

    let authors = registry.model("authors").unwrap();
    let jane = authors.find(1i64).unwrap().unwrap();
    let latest = jane.get("latest_post").and_then(FieldValue::as_entity).unwrap();
    assert_eq!(latest.value("title"), Some(json!("Foo")));
    assert_eq!(latest.value("author"), Some(json!(1)));
}

#[tokio::test]
async fn invalid_commit_leaves_the_instance_unsaved() {
    let (registry, server) = setup();
    let posts = registry.model("posts").unwrap();

    let mut post = posts.build(record(json!({"title": "Orphan"}))).unwrap();
    let err = post.commit().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Contract);
    assert_eq!(post.id(), None);
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn local_changes_stay_local_until_commit() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();
    posts.fetch().await.unwrap();

    let mut post = posts.find(1i64).unwrap().unwrap();
    post.set("title", "Changed").unwrap();
    assert_eq!(post.value("title"), Some(json!("Changed")));
    assert_eq!(post.mirror().get("title").unwrap(), Some(json!("Foo")));

    post.sync().unwrap();
    assert_eq!(post.value("title"), Some(json!("Foo")));
}

#[tokio::test]
async fn unset_only_touches_the_local_copy() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();
    posts.fetch().await.unwrap();

    let mut post = posts.find(1i64).unwrap().unwrap();
    assert!(post.unset("title").is_some());
    assert_eq!(post.value("title"), None);
    assert!(post.unset("title").is_none());
    assert_eq!(post.mirror().get("title").unwrap(), Some(json!("Foo")));
    assert_eq!(registry.store().get("posts", json!(1)).unwrap()["title"], json!("Foo"));
}

#[tokio::test]
async fn mirror_is_read_only() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();
    posts.fetch().await.unwrap();

    let post = posts.find(1i64).unwrap().unwrap();
    let err = post.mirror().set("title", json!("Nope")).unwrap_err();
    assert!(matches!(err, Error::ReadOnlyMirror { .. }));
    assert_eq!(posts.find(1i64).unwrap().unwrap().value("title"), Some(json!("Foo")));
}

#[tokio::test]
async fn ids_cannot_change() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();
    posts.fetch().await.unwrap();

    let mut post = posts.find(1i64).unwrap().unwrap();
    post.set("id", 1i64).unwrap();
    let err = post.set("id", 5i64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);
    assert_eq!(post.id(), Some(&RecordId::Int(1)));
}

#[tokio::test]
async fn delete_and_remove() {
    let (registry, server) = setup();
    let posts = registry.model("posts").unwrap();
    posts.fetch().await.unwrap();

    let mut foo = posts.find(1i64).unwrap().unwrap();
    foo.delete().await.unwrap();
    assert_eq!(foo.id(), None);
    assert!(posts.find(1i64).unwrap().is_none());
    assert!(!server.db().posts.contains_key(&1));

    let mut bar = posts.find(2i64).unwrap().unwrap();
    bar.remove().unwrap();
    assert!(posts.find(2i64).unwrap().is_none());
    assert!(server.db().posts.contains_key(&2));

    let mut unsaved = posts.build(record(json!({"title": "Draft"}))).unwrap();
    let err = unsaved.delete().await.unwrap_err();
    assert!(matches!(err, Error::MissingId { .. }));
}

#[tokio::test]
async fn relations_fetch_target_instances() {
    let (registry, server) = setup();
    let authors = registry.model("authors").unwrap();

    let jane = authors.get(1i64).await.unwrap().unwrap();
    let posts = jane.relation("posts").unwrap().fetch().await.unwrap();
    let titles: Vec<Value> = posts.iter().filter_map(|p| p.value("title")).collect();
    assert_eq!(titles, vec![json!("Foo"), json!("Bar")]);
    assert_eq!(posts[0].model().name(), "posts");

    assert_eq!(
        server.calls().last(),
        Some(&(Method::GET, "/authors/1/posts".to_string()))
    );
    assert_eq!(registry.model("posts").unwrap().query().unwrap().count(), 2);
}

#[tokio::test]
async fn relation_on_a_renamed_field() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();

    let post = posts.get(2i64).await.unwrap().unwrap();
    let authors = post.relation("author").unwrap().fetch().await.unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].value("name"), Some(json!("Jane Doe")));

    let unsaved = posts.build(record(json!({}))).unwrap();
    let err = unsaved.relation("author").unwrap().fetch().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identity);

    assert!(matches!(
        post.relation("comments"),
        Err(Error::UnknownRelation { .. })
    ));
}

#[tokio::test]
async fn member_lookup_order() {
    let (registry, _server) = setup();
    let authors = registry.model("authors").unwrap();
    let posts = registry.model("posts").unwrap();

    let mut post = posts.get(1i64).await.unwrap().unwrap();
    assert!(matches!(post.member("title"), Member::Field(_)));
    assert!(matches!(post.member("history"), Member::Action(_)));
    assert!(matches!(post.member("publish"), Member::Unknown));

    let mut jane = authors.get(1i64).await.unwrap().unwrap();
    assert!(matches!(jane.member("posts"), Member::Relation(_)));
}

#[tokio::test]
async fn actions_with_many_methods() {
    let (registry, server) = setup();
    let posts = registry.model("posts").unwrap();
    let mut post = posts.get(1i64).await.unwrap().unwrap();

    let mut history = post.action("history").unwrap().methods();
    history.sort();
    assert_eq!(history, vec!["create", "delete", "fetch", "get", "update"]);

    let records = post.action("history").unwrap().invoke("fetch", None).await.unwrap();
    assert_eq!(records.as_array().map(Vec::len), Some(2));

    let records = post
        .action("history")
        .unwrap()
        .invoke("create", Some(json!({"delta": "baz"})))
        .await
        .unwrap();
    assert_eq!(records.as_array().map(Vec::len), Some(3));
    assert_eq!(
        server.calls().last(),
        Some(&(Method::POST, "/posts/1/history".to_string()))
    );

    let err = post.action("history").unwrap().call(None).await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousAction { .. }));
    assert!(err.to_string().contains("fetch"));

    let err = post
        .action("history")
        .unwrap()
        .invoke("archive", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownMethod { .. }));
}

#[tokio::test]
async fn refreshing_action_syncs_the_instance() {
    let (registry, server) = setup();
    let posts = registry.model("posts").unwrap();
    let mut post = posts.get(1i64).await.unwrap().unwrap();
    assert_eq!(post.value("archived"), Some(json!(false)));

    post.action("archive").unwrap().call(None).await.unwrap();

    assert_eq!(post.value("archived"), Some(json!(true)));
    assert_eq!(posts.find(1i64).unwrap().unwrap().value("archived"), Some(json!(true)));
    assert_eq!(
        server.calls(),
        vec![
            (Method::GET, "/posts/1".to_string()),
            (Method::POST, "/posts/1/archive".to_string()),
            (Method::GET, "/posts/1".to_string()),
        ]
    );
}

#[tokio::test]
async fn actions_need_a_saved_instance() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();

    let mut draft = posts.build(record(json!({"title": "Draft"}))).unwrap();
    let err = draft.action("archive").unwrap().call(None).await.unwrap_err();
    assert!(matches!(err, Error::MissingId { .. }));
    assert!(matches!(
        draft.action("publish"),
        Err(Error::UnknownAction { .. })
    ));
}

#[tokio::test]
async fn singleton_instance() {
    let (registry, server) = setup();
    let profile = registry.model("profile").unwrap();
    assert!(profile.is_singleton());

    let anonymous = profile.instance().unwrap();
    assert_eq!(anonymous.value("username"), Some(json!("<anonymous>")));

    let fetched = profile.fetch().await.unwrap();
    assert_eq!(fetched[0].value("username"), Some(json!("admin")));

    let mut me = profile.instance().unwrap();
    me.set("username", "Editor").unwrap();
    me.commit().await.unwrap();
    assert_eq!(me.value("username"), Some(json!("editor")));
    assert_eq!(server.db().profile["username"], json!("editor"));

    me.delete().await.unwrap();
    assert_eq!(
        profile.instance().unwrap().value("username"),
        Some(json!("<anonymous>"))
    );

    assert!(matches!(profile.query(), Err(Error::SingletonQuery { .. })));
    assert!(registry.model("posts").unwrap().instance().is_err());
}

#[tokio::test]
async fn template_defaults_and_clear() {
    let (registry, _server) = setup();
    let posts = registry.model("posts").unwrap();

    assert_eq!(
        Value::Object(posts.defaults().unwrap()),
        json!({"title": "My Post Title", "footer": "footer"})
    );
    assert_eq!(posts.template().unwrap()["slug"], Value::Null);

    posts.fetch().await.unwrap();
    assert_eq!(posts.sample(2).unwrap().len(), 2);
    posts.clear().unwrap();
    assert_eq!(posts.query().unwrap().count(), 0);
}
