//! Search index shipping against a local axum server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Router};
use mbmirror::hooks::search::{
    default_fetchers, EntityKind, IndexSchema, SearchHook, SearchUpdate,
};
use mbmirror_replication::{Fields, ReplicationHook, RowLookup, TableName};
use tempfile::TempDir;
use tokio::net::TcpListener;

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

#[derive(Clone)]
struct ServerState {
    received: Received,
    status: StatusCode,
}

async fn update(State(state): State<ServerState>, body: String) -> StatusCode {
    let value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    state.received.lock().unwrap().push(value);
    state.status
}

async fn start_index(status: StatusCode) -> (String, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/solr/mb/update", post(update))
        .with_state(ServerState {
            received: received.clone(),
            status,
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/solr/mb", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (url, received)
}

/// Rows keyed by `(table, id)`.
struct Catalog(HashMap<(&'static str, &'static str), Fields>);

#[async_trait]
impl RowLookup for Catalog {
    async fn fetch_rows(
        &self,
        table: &TableName,
        key_column: &str,
        key: &str,
        _columns: &[&str],
    ) -> Result<Vec<Fields>> {
        if table.table == "artist_alias" && key_column == "artist" && key == "1" {
            return Ok(vec![row(&[("name", "Fu")])]);
        }
        if key_column != "id" {
            return Ok(Vec::new());
        }
        Ok(self
            .0
            .iter()
            .filter(|((t, id), _)| *t == table.table && *id == key)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

fn row(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (*k, Some(v.to_string())))
        .collect()
}

fn catalog() -> Catalog {
    let mut rows = HashMap::new();
    rows.insert(
        ("artist", "1"),
        row(&[("gid", "a-1"), ("name", "Foo"), ("comment", "x"), ("sort_name", "Foo")]),
    );
    rows.insert(("artist", "2"), row(&[("gid", "a-2"), ("name", "Gone")]));
    Catalog(rows)
}

fn search_hook(url: &str, fallback: &std::path::Path) -> SearchHook {
    let index = Arc::new(IndexSchema::musicbrainz(&EntityKind::ALL));
    let fetchers = default_fetchers(&index);
    SearchHook::new(
        index,
        "musicbrainz",
        fetchers,
        Arc::new(catalog()),
        url,
        fallback,
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn replay_changes(hook: &mut SearchHook, sequence: i64) {
    let artist = TableName::new("musicbrainz", "artist");
    hook.begin(sequence).await.unwrap();
    hook.after_update(&artist, &row(&[("id", "1")]), &row(&[("name", "Foo")]))
        .await
        .unwrap();
    hook.before_delete(&artist, &row(&[("id", "2")])).await.unwrap();
    hook.before_commit().await.unwrap();
    hook.after_commit().await.unwrap();
}

#[tokio::test]
async fn test_update_shipped_after_commit() {
    let (url, received) = start_index(StatusCode::OK).await;
    let fallback = TempDir::new().unwrap();
    let mut hook = search_hook(&url, fallback.path());

    replay_changes(&mut hook, 7).await;

    let received = received.lock().unwrap().clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], serde_json::json!({ "delete": ["a-2"] }));
    assert_eq!(
        received[1],
        serde_json::json!([{
            "kind": "artist",
            "id": "a-1",
            "name": "Foo",
            "disambiguation": "x",
            "sort_name": "Foo",
            "aliases": ["Fu"],
        }])
    );
    assert_eq!(std::fs::read_dir(fallback.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_rejected_update_kept_on_disk() {
    let (url, received) = start_index(StatusCode::SERVICE_UNAVAILABLE).await;
    let fallback = TempDir::new().unwrap();
    let mut hook = search_hook(&url, fallback.path());

    replay_changes(&mut hook, 8).await;

    assert_eq!(received.lock().unwrap().len(), 1);
    let saved: SearchUpdate = serde_json::from_slice(
        &std::fs::read(fallback.path().join("mbmirror-search-8.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved.delete, vec!["a-2".to_string()]);
    assert_eq!(saved.add.len(), 1);
    assert_eq!(saved.add[0]["id"], "a-1");
}
