//! Integration tests for the mapper, model runtime and index coordination

use std::sync::Arc;

use mogwai::{
    ConnectionSettings, ElementId, Found, IndexFailurePolicy, Mapper, MogwaiError, PropertyType,
    QueryResponse, Schema, ScriptBundle,
};
use mogwai_core::ClientKind;
use mogwai_graph::testing::{MockConnection, MockConnector};
use serde_json::json;

fn user_schema() -> Schema {
    Schema::from_json(&json!({"name": "string"})).unwrap()
}

/// a (indexed), b (plain), c (unique)
fn abc_schema() -> Schema {
    Schema::builder()
        .indexed("a", PropertyType::String)
        .field("b", PropertyType::String)
        .unique("c", PropertyType::Integer)
        .build()
        .unwrap()
}

/// Backend reporting `keys` as indexed and refusing to create `failing`
fn titan_backend(keys: &'static [&'static str], failing: Option<&'static str>) -> MockConnection {
    MockConnection::with_handler(move |script| {
        if script.script().starts_with("g.getIndexedKeys") {
            return Ok(QueryResponse::with_results(
                keys.iter().map(|k| json!(k)).collect(),
            ));
        }
        if let Some(name) = failing {
            if script.script().contains("makeKey") && script.param("name") == Some(&json!(name))
            {
                return Err(MogwaiError::Backend(format!("cannot create key {name}")));
            }
        }
        Ok(QueryResponse::default())
    })
}

fn created_keys(connection: &MockConnection) -> Vec<String> {
    connection
        .scripts_containing("makeKey")
        .iter()
        .filter_map(|s| s.param("name").and_then(|n| n.as_str()).map(str::to_string))
        .collect()
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_same_name_compiles_once() {
    let mut mapper = Mapper::new();
    let first = mapper.model("User", user_schema()).unwrap();
    let second = mapper.model("user", user_schema()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(mapper.model_names().count(), 1);
}

#[test]
fn test_unique_properties_are_indexed() {
    let schema = abc_schema();
    for property in schema.properties() {
        if property.is_unique() {
            assert!(property.is_indexed());
        }
    }
}

#[test]
fn test_default_and_property_finders_exist() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();

    assert!(user.finder("findById").is_some());
    assert!(user.finder("findByKeyValue").is_some());
    assert!(user.finder("findByName").is_some());
}

// ============================================================================
// Model runtime
// ============================================================================

#[tokio::test]
async fn test_save_new_instance_inserts() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({
        "_id": "1",
        "_type": "vertex",
        "name": "Batman",
        "$type": "user"
    })]);

    let mut batman = user.instance(json!({"name": "Batman"})).unwrap();
    assert!(batman.is_new());

    batman.save(&connection).await.unwrap();

    assert_eq!(batman.id(), Some(&ElementId::from("1")));
    assert_eq!(batman.get("$type"), Some(&json!("user")));
    assert_eq!(batman.get("name"), Some(&json!("Batman")));
    assert_eq!(batman.get("_type"), None);

    let sent = connection.last().unwrap();
    assert_eq!(connection.execution_count(), 1);
    assert!(sent.script().starts_with("v = g.addVertex()"));
    assert_eq!(sent.param("p0"), Some(&json!("$type")));
    assert_eq!(sent.param("p1"), Some(&json!("user")));
}

#[tokio::test]
async fn test_insert_attaches_indexed_and_plain_properties_differently() {
    let mut mapper = Mapper::new();
    let model = mapper.model("thing", abc_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": 7})]);

    let mut thing = model.instance(json!({"a": "x", "b": "y"})).unwrap();
    thing.insert(&connection).await.unwrap();

    let sent = connection.last().unwrap();
    // $type -> p0/p1, a -> p2/p3, b -> p4/p5
    assert!(sent.script().contains("v.addProperty(p2, p3)"));
    assert!(sent.script().contains("v.setProperty(p4, p5)"));
    assert_eq!(thing.id(), Some(&ElementId::Number(7)));
}

#[tokio::test]
async fn test_failed_insert_merges_nothing() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection =
        MockConnection::with_handler(|_| Err(MogwaiError::Backend("server down".to_string())));

    let mut batman = user.instance(json!({"name": "Batman"})).unwrap();
    let err = batman.save(&connection).await.unwrap_err();

    assert!(matches!(err, MogwaiError::Backend(ref m) if m == "server down"));
    assert!(batman.is_new());
    assert_eq!(batman.get("$type"), None);
}

#[tokio::test]
async fn test_invalid_value_rejected_before_round_trip() {
    let mut mapper = Mapper::new();
    let model = mapper.model("thing", abc_schema()).unwrap();

    let err = model.instance(json!({"c": "not a number"})).unwrap_err();
    assert!(matches!(err, MogwaiError::Validation(_)));
}

#[tokio::test]
async fn test_save_existing_instance_updates_declared_properties_only() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": "1", "name": "Bruce"})]);

    let mut bruce = user
        .from_element(json!({"_id": "1", "_type": "vertex", "$type": "user", "name": "Batman"}))
        .unwrap();
    bruce.set("name", "Bruce").unwrap();
    bruce.set("nickname", "The Bat").unwrap();

    bruce.save(&connection).await.unwrap();

    let sent = connection.last().unwrap();
    assert_eq!(connection.execution_count(), 1);
    assert!(sent.script().starts_with("v = g.v(id)"));
    assert_eq!(sent.param("id"), Some(&json!("1")));
    assert_eq!(sent.param("properties"), Some(&json!({"name": "Bruce"})));
}

#[tokio::test]
async fn test_update_missing_vertex_is_not_found() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![]);

    let bruce = user.from_element(json!({"_id": 42, "name": "Bruce"})).unwrap();
    let err = bruce.update(&connection).await.unwrap_err();

    assert!(matches!(err, MogwaiError::NotFound(_)));
}

#[tokio::test]
async fn test_update_uses_bundle_procedure() {
    let bundle = ScriptBundle::parse(
        "def update(id, Map properties) {\n  v = g.v(id)\n  properties.each { k, val -> v.setProperty(k, val) }\n  v\n}",
    )
    .unwrap();
    let mut mapper = Mapper::new();
    let user = mapper
        .model_with_scripts("user", user_schema(), bundle)
        .unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": 1})]);

    let bruce = user.from_element(json!({"_id": 1, "name": "Bruce"})).unwrap();
    bruce.update(&connection).await.unwrap();

    let sent = connection.last().unwrap();
    assert!(sent.script().starts_with("def update(id, Map properties)"));
    assert!(sent.script().ends_with("update(p0, p1)"));
    assert_eq!(sent.param("p0"), Some(&json!(1)));
    assert_eq!(sent.param("p1"), Some(&json!({"name": "Bruce"})));
}

#[tokio::test]
async fn test_managed_fields_cannot_be_set() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let mut batman = user.new_instance();

    assert!(matches!(
        batman.set("$type", "group"),
        Err(MogwaiError::Validation(_))
    ));
    assert!(matches!(batman.set("_id", 3), Err(MogwaiError::Validation(_))));
}

#[tokio::test]
async fn test_to_object_includes_id_once_saved() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();

    let fresh = user.instance(json!({"name": "Robin"})).unwrap();
    assert_eq!(
        serde_json::Value::Object(fresh.to_object()),
        json!({"name": "Robin"})
    );

    let saved = user.from_element(json!({"_id": 5, "name": "Robin"})).unwrap();
    assert_eq!(
        serde_json::Value::Object(saved.to_object()),
        json!({"name": "Robin", "_id": 5})
    );
}

// ============================================================================
// Edges
// ============================================================================

#[tokio::test]
async fn test_edge_with_unsaved_endpoint_fails_without_round_trip() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::new();

    let saved = user.from_element(json!({"_id": 1, "name": "Alfred"})).unwrap();
    let unsaved = user.instance(json!({"name": "Joker"})).unwrap();

    let err = saved
        .add_outgoing_edge(&connection, &unsaved, "knows", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, MogwaiError::Validation(_)));

    let err = unsaved
        .add_outgoing_edge(&connection, &saved, "knows", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, MogwaiError::Validation(_)));

    assert_eq!(connection.execution_count(), 0);
}

#[tokio::test]
async fn test_outgoing_edge_between_saved_users() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": 9, "_label": "follows"})]);

    let u1 = user.from_element(json!({"_id": 1, "name": "Bruce"})).unwrap();
    let u2 = user.from_element(json!({"_id": 2, "name": "Dick"})).unwrap();

    u1.add_outgoing_edge(&connection, &u2, "follows", json!({"foo": "bar"}))
        .await
        .unwrap();

    assert_eq!(connection.execution_count(), 1);
    let sent = connection.last().unwrap();
    assert!(sent.script().contains("g.addEdge(v1, v2, label, properties)"));
    assert_eq!(sent.param("outId"), Some(&json!(1)));
    assert_eq!(sent.param("inId"), Some(&json!(2)));
    assert_eq!(sent.param("label"), Some(&json!("follows")));
    assert_eq!(sent.param("properties"), Some(&json!({"foo": "bar"})));
}

#[tokio::test]
async fn test_incoming_edge_from_raw_id() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": 10})]);

    let u2 = user.from_element(json!({"_id": 2, "name": "Dick"})).unwrap();
    let source = ElementId::from(1);

    u2.add_incoming_edge(&connection, &source, "follows", serde_json::Value::Null)
        .await
        .unwrap();

    let sent = connection.last().unwrap();
    assert_eq!(sent.param("outId"), Some(&json!(1)));
    assert_eq!(sent.param("inId"), Some(&json!(2)));
    assert_eq!(sent.param("properties"), Some(&json!({})));
}

// ============================================================================
// Finders
// ============================================================================

#[tokio::test]
async fn test_find_by_property_wraps_models() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![
        json!({"_id": 1, "_type": "vertex", "$type": "user", "name": "Bruce"}),
        json!({"_id": 2, "_type": "vertex", "$type": "user", "name": "Bruce"}),
    ]);

    let found = user.find_by(&connection, "name", "Bruce").await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[1].id(), Some(&ElementId::from(2)));
    let sent = connection.last().unwrap();
    assert_eq!(sent.param("key"), Some(&json!("name")));
    assert_eq!(sent.param("modelType"), Some(&json!("user")));

    let err = user.find_by(&connection, "age", 3).await.unwrap_err();
    assert!(matches!(err, MogwaiError::Validation(_)));
}

#[tokio::test]
async fn test_find_by_id_missing_vertex() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![serde_json::Value::Null]);

    let found = user.find_by_id(&connection, 404i64).await.unwrap();
    assert!(found.is_none());
    assert_eq!(connection.last().unwrap().param("id"), Some(&json!(404)));
}

#[tokio::test]
async fn test_raw_find() {
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!(3)]);

    match user.find(&connection, "g.V.count()", false).await.unwrap() {
        Found::Raw(results) => assert_eq!(results, vec![json!(3)]),
        Found::Models(_) => panic!("expected raw results"),
    }
}

// ============================================================================
// Connection lifecycle and index coordination
// ============================================================================

#[tokio::test]
async fn test_connect_creates_indexes_then_signals_ready() {
    let connection = Arc::new(titan_backend(&[], None));
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    mapper.model("thing", abc_schema()).unwrap();
    let ready = mapper.subscribe_ready();
    assert!(!*ready.borrow());

    let report = mapper
        .connect_with(ConnectionSettings::default(), &connector)
        .await
        .unwrap();

    assert_eq!(report.created, vec!["$type", "a", "c"]);
    assert!(mapper.is_ready());
    assert!(*ready.borrow());
    assert_eq!(connector.open_count(), 1);

    let executed = connection.executed();
    assert!(executed[0].script().starts_with("g.getIndexedKeys"));
    assert_eq!(executed[1].param("name"), Some(&json!("$type")));
    assert_eq!(created_keys(&connection).len(), 3);
    assert!(mapper.connection().is_ok());
}

#[tokio::test]
async fn test_reconnect_only_creates_new_keys() {
    let connection = Arc::new(titan_backend(&["$type", "a"], None));
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    mapper.model("thing", abc_schema()).unwrap();

    let report = mapper
        .connect_with(ConnectionSettings::default(), &connector)
        .await
        .unwrap();

    assert_eq!(created_keys(&connection), vec!["c"]);
    assert_eq!(report.existing, vec!["$type", "a"]);
    assert_eq!(report.created, vec!["c"]);
}

#[tokio::test]
async fn test_strict_policy_fails_connect() {
    let connection = Arc::new(titan_backend(&[], Some("c")));
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    mapper.model("thing", abc_schema()).unwrap();

    let err = mapper
        .connect_with(ConnectionSettings::default(), &connector)
        .await
        .unwrap_err();

    assert!(matches!(err, MogwaiError::Backend(_)));
    assert!(!mapper.is_ready());
    assert!(mapper.connection().is_err());
    // The batch settled before the error surfaced
    assert_eq!(created_keys(&connection).len(), 3);
}

#[tokio::test]
async fn test_degraded_policy_reports_failures() {
    let connection = Arc::new(titan_backend(&[], Some("c")));
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    mapper.model("thing", abc_schema()).unwrap();

    let settings =
        ConnectionSettings::default().with_index_failure_policy(IndexFailurePolicy::Degraded);
    let report = mapper.connect_with(settings, &connector).await.unwrap();

    assert!(mapper.is_ready());
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "c");
    assert_eq!(report.created, vec!["$type", "a"]);
}

#[tokio::test]
async fn test_rexster_connect_issues_no_index_commands() {
    let connection = Arc::new(MockConnection::new());
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    mapper.model("thing", abc_schema()).unwrap();

    let settings = ConnectionSettings::new("localhost", 8182, "tinkergraph", ClientKind::Rexster);
    let report = mapper.connect_with(settings, &connector).await.unwrap();

    assert!(mapper.is_ready());
    assert_eq!(report, Default::default());
    assert_eq!(connection.execution_count(), 0);
}

#[tokio::test]
async fn test_open_failure_leaves_mapper_disconnected() {
    let connector = MockConnector::failing("connection refused");
    let mut mapper = Mapper::new();

    let err = mapper
        .connect_with(ConnectionSettings::default(), &connector)
        .await
        .unwrap_err();

    assert!(matches!(err, MogwaiError::Backend(ref m) if m == "connection refused"));
    assert!(!mapper.is_ready());
}

#[tokio::test]
async fn test_models_use_mapper_connection() {
    let connection = Arc::new(MockConnection::with_handler(|script| {
        if script.script().starts_with("v = g.addVertex()") {
            Ok(QueryResponse::with_results(vec![json!({"_id": "1"})]))
        } else {
            Ok(QueryResponse::default())
        }
    }));
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    let user = mapper.model("user", user_schema()).unwrap();
    mapper
        .connect_with(ConnectionSettings::default(), &connector)
        .await
        .unwrap();

    let graph = mapper.connection().unwrap();
    let mut batman = user.instance(json!({"name": "Batman"})).unwrap();
    batman.save(graph.as_ref()).await.unwrap();

    assert_eq!(batman.id(), Some(&ElementId::from("1")));
    assert_eq!(batman.get("$type"), Some(&json!("user")));
}

// ============================================================================
// Backend value representation
// ============================================================================

fn event_schema() -> Schema {
    Schema::builder()
        .indexed("at", PropertyType::Date)
        .field("title", PropertyType::String)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_insert_writes_dates_as_epoch_millis() {
    let mut mapper = Mapper::new();
    let event = mapper.model("event", event_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": 3})]);

    let mut launch = event
        .instance(json!({"at": "2014-01-20T10:00:00Z", "title": "Launch"}))
        .unwrap();
    launch.insert(&connection).await.unwrap();

    let sent = connection.last().unwrap();
    // $type -> p0/p1, at -> p2/p3
    assert!(sent.script().contains("v.addProperty(p2, p3)"));
    assert_eq!(sent.param("p2"), Some(&json!("at")));
    let written = sent.param("p3").unwrap();
    assert!(written.is_i64());
    assert_eq!(written, &json!(1390212000000_i64));
}

#[tokio::test]
async fn test_update_and_finder_write_dates_as_epoch_millis() {
    let mut mapper = Mapper::new();
    let event = mapper.model("event", event_schema()).unwrap();
    let connection = MockConnection::replying(vec![json!({"_id": 3})]);

    let launch = event
        .from_element(json!({"_id": 3, "at": "2014-01-20T10:00:00Z"}))
        .unwrap();
    launch.update(&connection).await.unwrap();
    assert_eq!(
        connection.last().unwrap().param("properties"),
        Some(&json!({"at": 1390212000000_i64}))
    );

    event
        .find_by(&connection, "at", "2014-01-20T10:00:00Z")
        .await
        .unwrap();
    assert_eq!(
        connection.last().unwrap().param("value"),
        Some(&json!(1390212000000_i64))
    );
}

#[tokio::test]
async fn test_discriminator_key_is_not_unique() {
    let connection = Arc::new(titan_backend(&[], None));
    let connector = MockConnector::new(connection.clone());
    let mut mapper = Mapper::new();
    mapper.model("user", user_schema()).unwrap();

    mapper
        .connect_with(ConnectionSettings::default(), &connector)
        .await
        .unwrap();

    let scripts = connection.scripts_containing("makeKey");
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].param("name"), Some(&json!("$type")));
    assert!(scripts[0].script().contains("indexed(Vertex.class)"));
    assert!(!scripts[0].script().contains(".unique()"));
}
