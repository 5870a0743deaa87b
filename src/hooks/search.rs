//! Search index maintenance.
//!
//! The hook collects, over one packet, which indexed entities changed and
//! which were deleted, translating changes of alias and join tables to
//! their owning entity. After the packet commits it fetches the current
//! documents and ships them to a Solr-style JSON update endpoint.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mbmirror_replication::{Fields, ReplicationHook, RowLookup, TableName};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// A search document: field name to value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Entities that have a search document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Label,
    Release,
    ReleaseGroup,
    Recording,
    Work,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Artist,
        EntityKind::Label,
        EntityKind::Release,
        EntityKind::ReleaseGroup,
        EntityKind::Recording,
        EntityKind::Work,
    ];

    /// Table holding the entity rows.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Label => "label",
            EntityKind::Release => "release",
            EntityKind::ReleaseGroup => "release_group",
            EntityKind::Recording => "recording",
            EntityKind::Work => "work",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A table whose rows belong to an entity through `owner_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildTable {
    pub table: &'static str,
    pub owner: EntityKind,
    pub owner_column: &'static str,
}

/// A change of `from` also changes the `to` documents found by
/// `SELECT target_column FROM via_table WHERE via_column = <id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cascade {
    pub from: EntityKind,
    pub to: EntityKind,
    pub via_table: &'static str,
    pub via_column: &'static str,
    pub target_column: &'static str,
}

/// How a table relates to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole<'a> {
    Entity(EntityKind),
    Child(&'a ChildTable),
}

/// Which tables feed which documents. Built once at startup.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    indexed: HashSet<EntityKind>,
    children: Vec<ChildTable>,
    cascades: Vec<Cascade>,
}

impl IndexSchema {
    /// The MusicBrainz layout, indexing `indexed` entities.
    pub fn musicbrainz(indexed: &[EntityKind]) -> Self {
        let children = vec![
            ChildTable {
                table: "artist_alias",
                owner: EntityKind::Artist,
                owner_column: "artist",
            },
            ChildTable {
                table: "label_alias",
                owner: EntityKind::Label,
                owner_column: "label",
            },
            ChildTable {
                table: "work_alias",
                owner: EntityKind::Work,
                owner_column: "work",
            },
            ChildTable {
                table: "release_label",
                owner: EntityKind::Release,
                owner_column: "release",
            },
        ];
        let cascades = vec![
            Cascade {
                from: EntityKind::ReleaseGroup,
                to: EntityKind::Release,
                via_table: "release",
                via_column: "release_group",
                target_column: "id",
            },
            Cascade {
                from: EntityKind::Label,
                to: EntityKind::Release,
                via_table: "release_label",
                via_column: "label",
                target_column: "release",
            },
        ];
        Self {
            indexed: indexed.iter().copied().collect(),
            children,
            cascades,
        }
    }

    pub fn is_indexed(&self, kind: EntityKind) -> bool {
        self.indexed.contains(&kind)
    }

    pub fn indexed(&self) -> impl Iterator<Item = EntityKind> + '_ {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| self.indexed.contains(kind))
    }

    pub fn role(&self, table: &str) -> Option<TableRole<'_>> {
        if let Some(kind) = EntityKind::ALL.into_iter().find(|k| k.table() == table) {
            return Some(TableRole::Entity(kind));
        }
        self.children
            .iter()
            .find(|child| child.table == table)
            .map(TableRole::Child)
    }

    pub fn cascades_from(&self, kind: EntityKind) -> impl Iterator<Item = &Cascade> {
        self.cascades
            .iter()
            .filter(move |c| c.from == kind && self.indexed.contains(&c.to))
    }
}

/// Builds the search documents of one entity kind.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, lookup: &dyn RowLookup, schema: &str, ids: &[String]) -> Result<Vec<Document>>;
}

/// A multi-valued document field gathered from child rows:
/// `SELECT column FROM table WHERE key_column = <entity id>`. With
/// `resolve = Some((table, column))` each value is an id looked up in that
/// table first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListField {
    pub field: &'static str,
    pub table: &'static str,
    pub key_column: &'static str,
    pub column: &'static str,
    pub resolve: Option<(&'static str, &'static str)>,
}

impl ListField {
    pub fn new(field: &'static str, table: &'static str, key_column: &'static str, column: &'static str) -> Self {
        Self {
            field,
            table,
            key_column,
            column,
            resolve: None,
        }
    }

    pub fn resolved_in(mut self, table: &'static str, column: &'static str) -> Self {
        self.resolve = Some((table, column));
        self
    }

    async fn collect(&self, lookup: &dyn RowLookup, schema: &str, id: &str) -> Result<BTreeSet<String>> {
        let rows = lookup
            .fetch_rows(&TableName::new(schema, self.table), self.key_column, id, &[self.column])
            .await?;
        let mut values = BTreeSet::new();
        for value in rows.iter().filter_map(|row| row.value(self.column)) {
            match self.resolve {
                None => {
                    values.insert(value.to_string());
                }
                Some((table, column)) => {
                    let targets = lookup
                        .fetch_rows(&TableName::new(schema, table), "id", value, &[column])
                        .await?;
                    values.extend(
                        targets
                            .iter()
                            .filter_map(|row| row.value(column).map(str::to_string)),
                    );
                }
            }
        }
        Ok(values)
    }
}

/// Fetcher that copies columns of the entity row into document fields and
/// gathers list fields from its child tables.
#[derive(Debug, Clone)]
pub struct ColumnFetcher {
    kind: EntityKind,
    /// `(document field, column)` pairs.
    fields: Vec<(&'static str, &'static str)>,
    lists: Vec<ListField>,
}

impl ColumnFetcher {
    pub fn new(kind: EntityKind, fields: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            kind,
            fields,
            lists: Vec::new(),
        }
    }

    pub fn with_list(mut self, list: ListField) -> Self {
        self.lists.push(list);
        self
    }

    /// Entity columns plus aliases, and catalog numbers and label names for releases.
    pub fn default_for(kind: EntityKind) -> Self {
        let mut fields = vec![("id", "gid"), ("name", "name"), ("disambiguation", "comment")];
        match kind {
            EntityKind::Artist => fields.push(("sort_name", "sort_name")),
            EntityKind::Release => fields.push(("barcode", "barcode")),
            _ => {}
        }
        let fetcher = Self::new(kind, fields);
        match kind {
            EntityKind::Artist => {
                fetcher.with_list(ListField::new("aliases", "artist_alias", "artist", "name"))
            }
            EntityKind::Label => {
                fetcher.with_list(ListField::new("aliases", "label_alias", "label", "name"))
            }
            EntityKind::Work => {
                fetcher.with_list(ListField::new("aliases", "work_alias", "work", "name"))
            }
            EntityKind::Release => fetcher
                .with_list(ListField::new("catnos", "release_label", "release", "catalog_number"))
                .with_list(
                    ListField::new("labels", "release_label", "release", "label")
                        .resolved_in("label", "name"),
                ),
            EntityKind::ReleaseGroup | EntityKind::Recording => fetcher,
        }
    }
}

#[async_trait]
impl DocumentFetcher for ColumnFetcher {
    async fn fetch(&self, lookup: &dyn RowLookup, schema: &str, ids: &[String]) -> Result<Vec<Document>> {
        let table = TableName::new(schema, self.kind.table());
        let columns: Vec<&str> = self.fields.iter().map(|(_, column)| *column).collect();

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            for row in lookup.fetch_rows(&table, "id", id, &columns).await? {
                let mut doc = Document::new();
                doc.insert("kind".to_string(), self.kind.table().into());
                for (field, column) in &self.fields {
                    let value = match row.value(column) {
                        Some(v) => serde_json::Value::String(v.to_string()),
                        None => serde_json::Value::Null,
                    };
                    doc.insert(field.to_string(), value);
                }
                for list in &self.lists {
                    let values = list.collect(lookup, schema, id).await?;
                    doc.insert(
                        list.field.to_string(),
                        values.into_iter().map(serde_json::Value::String).collect(),
                    );
                }
                documents.push(doc);
            }
        }
        Ok(documents)
    }
}

/// Column fetchers for every indexed entity.
pub fn default_fetchers(index: &IndexSchema) -> HashMap<EntityKind, Box<dyn DocumentFetcher>> {
    index
        .indexed()
        .map(|kind| {
            let fetcher: Box<dyn DocumentFetcher> = Box::new(ColumnFetcher::default_for(kind));
            (kind, fetcher)
        })
        .collect()
}

/// Batch shipped to the index, and kept on disk if shipping fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchUpdate {
    pub delete: Vec<String>,
    pub add: Vec<Document>,
}

pub struct SearchHook {
    index: Arc<IndexSchema>,
    schema: String,
    fetchers: HashMap<EntityKind, Box<dyn DocumentFetcher>>,
    lookup: Arc<dyn RowLookup>,
    client: reqwest::Client,
    url: String,
    fallback_directory: PathBuf,
    sequence: i64,
    added: BTreeSet<(EntityKind, String)>,
    /// Deleted entities and their external id, captured before the row went away.
    deleted: BTreeMap<(EntityKind, String), String>,
}

impl SearchHook {
    /// `schema` is the destination schema of the indexed tables.
    pub fn new(
        index: Arc<IndexSchema>,
        schema: impl Into<String>,
        fetchers: HashMap<EntityKind, Box<dyn DocumentFetcher>>,
        lookup: Arc<dyn RowLookup>,
        url: impl Into<String>,
        fallback_directory: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        if let Some(kind) = index.indexed().find(|kind| !fetchers.contains_key(kind)) {
            anyhow::bail!("No document fetcher for indexed entity {kind}");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            index,
            schema: schema.into(),
            fetchers,
            lookup,
            client,
            url: url.into().trim_end_matches('/').to_string(),
            fallback_directory: fallback_directory.into(),
            sequence: 0,
            added: BTreeSet::new(),
            deleted: BTreeMap::new(),
        })
    }

    /// Entities queued for re-indexing.
    pub fn pending_updates(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        self.added.iter().map(|(kind, id)| (*kind, id.as_str()))
    }

    /// External ids queued for deletion.
    pub fn pending_deletes(&self) -> impl Iterator<Item = &str> {
        self.deleted.values().map(String::as_str)
    }

    fn role<'a>(&'a self, table: &TableName) -> Option<TableRole<'a>> {
        if table.schema != self.schema {
            return None;
        }
        self.index.role(&table.table)
    }

    fn add_update(&mut self, kind: EntityKind, id: &str) {
        if !self.index.is_indexed(kind) {
            return;
        }
        let key = (kind, id.to_string());
        self.deleted.remove(&key);
        self.added.insert(key);
    }

    async fn lookup_column(&self, table: &str, key_column: &str, key: &str, column: &str) -> Result<Vec<String>> {
        let rows = self
            .lookup
            .fetch_rows(&TableName::new(&self.schema, table), key_column, key, &[column])
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.value(column).map(str::to_string))
            .collect())
    }

    async fn entity_changed(&mut self, kind: EntityKind, id: &str) -> Result<()> {
        self.add_update(kind, id);
        let cascades: Vec<Cascade> = self.index.cascades_from(kind).cloned().collect();
        for cascade in cascades {
            for target in self
                .lookup_column(cascade.via_table, cascade.via_column, id, cascade.target_column)
                .await?
            {
                self.add_update(cascade.to, &target);
            }
        }
        Ok(())
    }

    /// Owner of a child row, from the row values or the current row.
    async fn child_owner(&self, child: &ChildTable, keys: &Fields, values: &Fields) -> Result<Vec<String>> {
        if let Some(owner) = values.value(child.owner_column) {
            return Ok(vec![owner.to_string()]);
        }
        match keys.value("id") {
            Some(id) => self.lookup_column(child.table, "id", id, child.owner_column).await,
            None => Ok(Vec::new()),
        }
    }

    async fn build_update(&self) -> Result<SearchUpdate> {
        let mut ids: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
        for (kind, id) in &self.added {
            ids.entry(*kind).or_default().push(id.clone());
        }

        let mut add = Vec::new();
        for (kind, ids) in ids {
            let fetcher = self
                .fetchers
                .get(&kind)
                .with_context(|| format!("No document fetcher for {kind}"))?;
            add.extend(fetcher.fetch(self.lookup.as_ref(), &self.schema, &ids).await?);
        }

        let delete: BTreeSet<String> = self.deleted.values().cloned().collect();
        Ok(SearchUpdate {
            delete: delete.into_iter().collect(),
            add,
        })
    }

    async fn post(&self, body: Vec<u8>) -> Result<()> {
        let url = format!("{}/update?commit=true", self.url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach search index at {url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Search index update failed with status {status}");
        }
        Ok(())
    }

    async fn ship(&self, update: &SearchUpdate) -> Result<()> {
        if !update.delete.is_empty() {
            let body = serde_json::to_vec(&serde_json::json!({ "delete": update.delete }))?;
            self.post(body).await?;
        }
        if !update.add.is_empty() {
            self.post(serde_json::to_vec(&update.add)?).await?;
        }
        Ok(())
    }

    fn write_fallback(&self, update: &SearchUpdate) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.fallback_directory)?;
        let path = self
            .fallback_directory
            .join(format!("mbmirror-search-{}.json", self.sequence));
        std::fs::write(&path, serde_json::to_vec_pretty(update)?)?;
        Ok(path)
    }
}

#[async_trait]
impl ReplicationHook for SearchHook {
    async fn begin(&mut self, sequence: i64) -> Result<()> {
        self.sequence = sequence;
        self.added.clear();
        self.deleted.clear();
        Ok(())
    }

    async fn after_insert(&mut self, table: &TableName, values: &Fields) -> Result<()> {
        match self.role(table) {
            Some(TableRole::Entity(kind)) => {
                if let Some(id) = values.value("id") {
                    self.add_update(kind, id);
                }
            }
            Some(TableRole::Child(child)) => {
                if let Some(owner) = values.value(child.owner_column) {
                    let owner_kind = child.owner;
                    let owner = owner.to_string();
                    self.add_update(owner_kind, &owner);
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn after_update(&mut self, table: &TableName, keys: &Fields, values: &Fields) -> Result<()> {
        match self.role(table) {
            Some(TableRole::Entity(kind)) => {
                if let Some(id) = keys.value("id") {
                    self.entity_changed(kind, id).await?;
                }
            }
            Some(TableRole::Child(child)) => {
                let child = child.clone();
                for owner in self.child_owner(&child, keys, values).await? {
                    self.add_update(child.owner, &owner);
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn before_delete(&mut self, table: &TableName, keys: &Fields) -> Result<()> {
        let Some(id) = keys.value("id") else {
            return Ok(());
        };
        match self.role(table) {
            Some(TableRole::Entity(kind)) => {
                if !self.index.is_indexed(kind) {
                    return Ok(());
                }
                let key = (kind, id.to_string());
                self.added.remove(&key);
                if let Some(gid) = self
                    .lookup_column(kind.table(), "id", id, "gid")
                    .await?
                    .into_iter()
                    .next()
                {
                    self.deleted.insert(key, gid);
                }
            }
            Some(TableRole::Child(child)) => {
                let child = child.clone();
                for owner in self.lookup_column(child.table, "id", id, child.owner_column).await? {
                    self.add_update(child.owner, &owner);
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn after_commit(&mut self) -> Result<()> {
        if self.added.is_empty() && self.deleted.is_empty() {
            debug!("No search index changes in packet {}", self.sequence);
            return Ok(());
        }

        let update = self.build_update().await?;
        match self.ship(&update).await {
            Ok(()) => {
                info!(
                    "Updated search index at {} ({} added, {} deleted)",
                    self.url,
                    update.add.len(),
                    update.delete.len()
                );
            }
            Err(e) => {
                error!("Search index update for packet {} failed: {e:#}", self.sequence);
                let path = self.write_fallback(&update)?;
                info!("Saved search index update to {}", path.display());
            }
        }
        self.added.clear();
        self.deleted.clear();
        Ok(())
    }
}
