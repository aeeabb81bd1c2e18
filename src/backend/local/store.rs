use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use super::{generate_id, LocalBackend};
use crate::backend::{
    BackendError, BackendResult, Direction, Document, DocumentStore, ErrorCode, FieldUpdate,
    ListenerHandle, Query, SnapshotCallback,
};
use crate::timestamp;

const DOCUMENT_ID_LEN: usize = 20;

impl LocalBackend {
    /// Evaluate a query against the current contents of the store.
    pub(crate) fn run_query(&self, query: &Query) -> BackendResult<Vec<Document>> {
        self.check_index(query)?;

        let conn = self.inner.db.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, data FROM documents WHERE collection = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![query.collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, raw) in rows {
            let data: Value = serde_json::from_str(&raw)?;
            if let Some(filter) = &query.filter {
                if data.get(&filter.field) != Some(&filter.value) {
                    continue;
                }
            }
            docs.push(Document { id, data });
        }

        if let Some(order) = &query.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_fields(a.get(&order.field), b.get(&order.field));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        Ok(docs)
    }

    fn check_index(&self, query: &Query) -> BackendResult<()> {
        let Some(order) = &query.order_by else {
            return Ok(());
        };

        let index = match &query.filter {
            Some(filter) => format!("{}.{},{}", query.collection, filter.field, order.field),
            None => format!("{}.{}", query.collection, order.field),
        };

        if self.inner.options.indexes.contains(&index) {
            Ok(())
        } else {
            Err(BackendError::new(
                ErrorCode::FailedPrecondition,
                format!("The query requires an index: {}", index),
            ))
        }
    }
}

#[async_trait]
impl DocumentStore for LocalBackend {
    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Document>> {
        let conn = self.inner.db.get()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |r| r.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(Document {
                id: id.to_string(),
                data: serde_json::from_str(&raw)?,
            })),
            None => Ok(None),
        }
    }

    async fn add(&self, collection: &str, data: Value) -> BackendResult<String> {
        ensure_object(&data)?;
        let id = generate_id(DOCUMENT_ID_LEN);
        {
            let conn = self.inner.db.get()?;
            conn.execute(
                "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
                params![collection, id, serde_json::to_string(&data)?],
            )?;
        }
        self.notify(collection);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> BackendResult<()> {
        ensure_object(&data)?;
        {
            let conn = self.inner.db.get()?;
            conn.execute(
                "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection, id) DO UPDATE
                 SET data = excluded.data, updated_at = datetime('now')",
                params![collection, id, serde_json::to_string(&data)?],
            )?;
        }
        self.notify(collection);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<(String, FieldUpdate)>,
    ) -> BackendResult<()> {
        {
            let mut conn = self.inner.db.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let raw: Option<String> = tx
                .query_row(
                    "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |r| r.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| {
                BackendError::not_found(format!("No document to update: {}/{}", collection, id))
            })?;

            let mut data: Map<String, Value> = serde_json::from_str(&raw)?;
            for (field, update) in updates {
                apply_update(&mut data, field, update);
            }

            tx.execute(
                "UPDATE documents SET data = ?1, updated_at = datetime('now')
                 WHERE collection = ?2 AND id = ?3",
                params![serde_json::to_string(&data)?, collection, id],
            )?;
            tx.commit()?;
        }
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        let removed = {
            let conn = self.inner.db.get()?;
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?
        };
        if removed > 0 {
            self.notify(collection);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> BackendResult<Vec<Document>> {
        self.run_query(query)
    }

    fn listen(&self, query: Query, mut callback: SnapshotCallback) -> ListenerHandle {
        let backend = self.clone();
        // Subscribe before the first read so no write slips between them.
        let mut changes = self.inner.changes.subscribe();
        let poll_interval = self.inner.options.poll_interval;

        let task = tokio::spawn(async move {
            let mut last = match backend.run_query(&query) {
                Ok(docs) => {
                    tracing::debug!("{} snapshot: {} docs", query.collection, docs.len());
                    callback(Ok(docs.clone()));
                    docs
                }
                Err(e) => {
                    tracing::error!("Listener on {} failed: {}", query.collection, e);
                    callback(Err(e));
                    return;
                }
            };

            let mut ticker = poll_interval.map(|period| {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });

            loop {
                let woke = match ticker.as_mut() {
                    Some(interval) => tokio::select! {
                        change = changes.recv() => Some(change),
                        _ = interval.tick() => None,
                    },
                    None => Some(changes.recv().await),
                };

                match woke {
                    Some(Ok(collection)) if collection != query.collection => continue,
                    Some(Err(RecvError::Closed)) => break,
                    // Lagged receivers just re-read.
                    _ => {}
                }

                match backend.run_query(&query) {
                    Ok(docs) => {
                        if docs != last {
                            tracing::debug!("{} snapshot: {} docs", query.collection, docs.len());
                            callback(Ok(docs.clone()));
                            last = docs;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Listener on {} failed: {}", query.collection, e);
                        callback(Err(e));
                        break;
                    }
                }
            }
        });

        ListenerHandle::new(task.abort_handle())
    }
}

fn ensure_object(data: &Value) -> BackendResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(BackendError::new(
            ErrorCode::InvalidArgument,
            "Document data must be an object",
        ))
    }
}

fn apply_update(data: &mut Map<String, Value>, field: String, update: FieldUpdate) {
    match update {
        FieldUpdate::Set(value) => {
            data.insert(field, value);
        }
        FieldUpdate::ArrayUnion(elements) => {
            let entry = data.entry(field).or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(items) = entry {
                for element in elements {
                    if !items.contains(&element) {
                        items.push(element);
                    }
                }
            }
        }
        FieldUpdate::ArrayRemove(elements) => {
            if let Some(Value::Array(items)) = data.get_mut(&field) {
                items.retain(|item| !elements.contains(item));
            } else {
                data.insert(field, Value::Array(Vec::new()));
            }
        }
    }
}

/// Sort key for ordered queries: nulls, then booleans, numbers,
/// timestamps, strings. Strings and objects that decode as timestamps
/// sort as timestamps.
#[derive(Debug, PartialEq, PartialOrd)]
enum SortKey<'a> {
    Null,
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    String(&'a str),
    Other,
}

fn sort_key(value: Option<&Value>) -> SortKey<'_> {
    match value {
        None | Some(Value::Null) => SortKey::Null,
        Some(Value::Bool(b)) => SortKey::Bool(*b),
        Some(Value::Number(n)) => SortKey::Number(n.as_f64().unwrap_or(0.0)),
        Some(v @ (Value::String(_) | Value::Object(_))) => match timestamp::decode(v) {
            Some(dt) => SortKey::Timestamp(dt),
            None => match v {
                Value::String(s) => SortKey::String(s),
                _ => SortKey::Other,
            },
        },
        Some(Value::Array(_)) => SortKey::Other,
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    sort_key(a).partial_cmp(&sort_key(b)).unwrap_or(Ordering::Equal)
}
