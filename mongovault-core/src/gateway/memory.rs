/*!
In-memory gateway adapter.

Backs the engine test suites: collections live in a map, and failures can be
injected mid-cursor or at insert time to exercise the engines' isolation
guarantees without a live server. Cursors clone their collection up front,
which is fine at test scale.
*/

use super::{DocumentStore, DocumentStream};
use crate::{Result, VaultError};
use async_trait::async_trait;
use bson::Document;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct State {
    databases: HashMap<String, BTreeMap<String, Vec<Document>>>,
    // key "database/collection" → number of documents to yield before erroring
    cursor_failures: HashMap<String, u64>,
    insert_failures: HashSet<String>,
    insert_log: Vec<(String, usize)>,
}

fn key(database: &str, collection: &str) -> String {
    format!("{database}/{collection}")
}

/// In-memory document store used by the engine tests
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with documents, creating database and collection
    pub fn insert_fixture(&self, database: &str, collection: &str, documents: Vec<Document>) {
        let mut state = self.state.lock().unwrap();
        state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// Make the cursor over a collection fail after yielding `after` documents
    pub fn fail_cursor(&self, database: &str, collection: &str, after: u64) {
        let mut state = self.state.lock().unwrap();
        state.cursor_failures.insert(key(database, collection), after);
    }

    /// Make every bulk insert into a collection fail
    pub fn fail_inserts(&self, database: &str, collection: &str) {
        let mut state = self.state.lock().unwrap();
        state.insert_failures.insert(key(database, collection));
    }

    /// Documents currently held by a collection
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(database)
            .and_then(|db| db.get(collection))
            .cloned()
            .unwrap_or_default()
    }

    /// True when the collection exists in the store
    pub fn collection_exists(&self, database: &str, collection: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(database)
            .map(|db| db.contains_key(collection))
            .unwrap_or(false)
    }

    /// Sizes of every bulk insert performed, in order, as (collection, size)
    pub fn insert_batches(&self) -> Vec<(String, usize)> {
        let state = self.state.lock().unwrap();
        state.insert_log.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn collection_names(&self, database: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        _budget: Duration,
    ) -> Result<Option<u64>> {
        let state = self.state.lock().unwrap();
        Ok(Some(
            state
                .databases
                .get(database)
                .and_then(|db| db.get(collection))
                .map(|docs| docs.len() as u64)
                .unwrap_or(0),
        ))
    }

    async fn open_cursor(&self, database: &str, collection: &str) -> Result<DocumentStream> {
        let state = self.state.lock().unwrap();
        let documents = state
            .databases
            .get(database)
            .and_then(|db| db.get(collection))
            .cloned()
            .unwrap_or_default();

        let mut items: Vec<Result<Document>> = Vec::with_capacity(documents.len());
        match state.cursor_failures.get(&key(database, collection)) {
            Some(&after) => {
                items.extend(documents.into_iter().take(after as usize).map(Ok));
                items.push(Err(VaultError::database("cursor interrupted (injected)")));
            }
            None => items.extend(documents.into_iter().map(Ok)),
        }

        Ok(futures::stream::iter(items).boxed())
    }

    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        batch: Vec<Document>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .insert_log
            .push((collection.to_string(), batch.len()));

        if state.insert_failures.contains(&key(database, collection)) {
            return Err(VaultError::database("duplicate key error (injected)"));
        }

        state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(batch);
        Ok(())
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(db) = state.databases.get_mut(database) {
            db.remove(collection);
        }
        Ok(())
    }
}
