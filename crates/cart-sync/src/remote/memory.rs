//! In-memory realtime document store.
//!
//! Models a realtime JSON database: the whole store is one JSON tree,
//! addressed by `/`-separated paths. Writing `Null` (or an empty object)
//! deletes a node and prunes parents left empty. Every write notifies the
//! listeners whose path lies above or below the written path and whose value
//! actually changed.
//!
//! Deny rules, an offline switch and lost acknowledgements let tests exercise
//! the failure paths of the stores built on top of it. Cloning the store
//! shares the same tree, so clones act as separate devices of one backend.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{DocumentStore, StoreError, ValueListener};
use crate::subscription::Subscription;

/// Characters that may not appear in a path segment.
const ILLEGAL_SEGMENT_CHARS: &[char] = &['.', '#', '$', '[', ']'];

#[derive(Default)]
struct StoreState {
    root: Value,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,
    denied_reads: Vec<Vec<String>>,
    denied_writes: Vec<Vec<String>>,
    offline: bool,
    drop_next_ack: bool,
    writes: u64,
}

struct ListenerEntry {
    id: u64,
    path: Vec<String>,
    listener: ValueListener,
    last: Value,
}

/// Realtime JSON document store held in memory.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject reads at or beneath `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a valid path.
    pub fn deny_reads(&self, path: &str) -> Result<(), StoreError> {
        let path = parse_path(path)?;
        self.state.lock().denied_reads.push(path);
        Ok(())
    }

    /// Reject writes at, above or beneath `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a valid path.
    pub fn deny_writes(&self, path: &str) -> Result<(), StoreError> {
        let path = parse_path(path)?;
        self.state.lock().denied_writes.push(path);
        Ok(())
    }

    /// Drop every deny rule.
    pub fn allow_all(&self) {
        let mut state = self.state.lock();
        state.denied_reads.clear();
        state.denied_writes.clear();
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Apply the next write but report it as failed, as when the connection
    /// drops before the acknowledgement arrives.
    pub fn drop_next_ack(&self) {
        self.state.lock().drop_next_ack = true;
    }

    /// Number of writes applied so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Read a value directly, bypassing rules.
    #[must_use]
    pub fn value_at(&self, path: &str) -> Value {
        parse_path(path).map_or(Value::Null, |path| value_at(&self.state.lock().root, &path))
    }

    fn check_online(state: &StoreState) -> Result<(), StoreError> {
        if state.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn check_read(state: &StoreState, path: &[String], raw: &str) -> Result<(), StoreError> {
        Self::check_online(state)?;
        if state
            .denied_reads
            .iter()
            .any(|denied| path.starts_with(denied))
        {
            return Err(StoreError::PermissionDenied(raw.to_string()));
        }
        Ok(())
    }

    fn check_write(state: &StoreState, path: &[String], raw: &str) -> Result<(), StoreError> {
        Self::check_online(state)?;
        if state
            .denied_writes
            .iter()
            .any(|denied| path.starts_with(denied) || denied.starts_with(path))
        {
            return Err(StoreError::PermissionDenied(raw.to_string()));
        }
        Ok(())
    }

    /// Apply `changes` (paths relative to the root) as one write and notify.
    fn write(&self, raw: &str, changes: Vec<(Vec<String>, Value)>) -> Result<(), StoreError> {
        let (calls, ack_lost) = {
            let mut state = self.state.lock();
            for (path, _) in &changes {
                Self::check_write(&state, path, raw)?;
            }
            for (path, value) in changes {
                if is_empty_node(&value) {
                    remove_at(&mut state.root, &path);
                } else {
                    insert_at(&mut state.root, &path, value);
                }
            }
            state.writes += 1;

            let root = state.root.clone();
            let mut calls = Vec::new();
            for entry in &mut state.listeners {
                let current = value_at(&root, &entry.path);
                if current != entry.last {
                    entry.last = current.clone();
                    calls.push((Arc::clone(&entry.listener), current));
                }
            }
            (calls, std::mem::take(&mut state.drop_next_ack))
        };

        // Listeners run outside the lock so they may call back into the store.
        for (listener, value) in calls {
            listener(&value);
        }

        if ack_lost {
            return Err(StoreError::Unavailable(format!(
                "connection lost before acknowledging write to {raw}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Value, StoreError> {
        let segments = parse_path(path)?;
        let state = self.state.lock();
        Self::check_read(&state, &segments, path)?;
        Ok(value_at(&state.root, &segments))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = parse_path(path)?;
        self.write(path, vec![(segments, value)])
    }

    async fn update(&self, path: &str, children: Map<String, Value>) -> Result<(), StoreError> {
        let base = parse_path(path)?;
        let mut changes = Vec::with_capacity(children.len());
        for (key, value) in children {
            let mut child = base.clone();
            child.extend(parse_path(&key)?);
            changes.push((child, value));
        }
        self.write(path, changes)
    }

    async fn subscribe(
        &self,
        path: &str,
        listener: ValueListener,
    ) -> Result<Subscription, StoreError> {
        let segments = parse_path(path)?;
        let (id, current) = {
            let mut state = self.state.lock();
            Self::check_read(&state, &segments, path)?;
            let current = value_at(&state.root, &segments);
            state.next_listener_id += 1;
            let id = state.next_listener_id;
            state.listeners.push(ListenerEntry {
                id,
                path: segments,
                listener: Arc::clone(&listener),
                last: current.clone(),
            });
            (id, current)
        };

        listener(&current);

        let state: Weak<Mutex<StoreState>> = Arc::downgrade(&self.state);
        Ok(Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().listeners.retain(|entry| entry.id != id);
            }
        }))
    }
}

impl std::fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDocumentStore")
            .field("listeners", &state.listeners.len())
            .field("writes", &state.writes)
            .field("offline", &state.offline)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tree Helpers
// =============================================================================

fn parse_path(path: &str) -> Result<Vec<String>, StoreError> {
    let segments: Vec<String> = path.split('/').map(str::to_string).collect();
    let valid = segments.iter().all(|segment| {
        !segment.is_empty()
            && !segment
                .chars()
                .any(|c| c.is_control() || ILLEGAL_SEGMENT_CHARS.contains(&c))
    });
    if !valid {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn value_at(root: &Value, path: &[String]) -> Value {
    path.iter()
        .try_fold(root, |node, segment| node.get(segment))
        .cloned()
        .unwrap_or(Value::Null)
}

fn insert_at(node: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        insert_at(map.entry(head.clone()).or_insert(Value::Null), rest, value);
    }
}

fn remove_at(node: &mut Value, path: &[String]) {
    let Some((head, rest)) = path.split_first() else {
        *node = Value::Null;
        return;
    };
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        map.remove(head);
        return;
    }
    let prune = map.get_mut(head).is_some_and(|child| {
        remove_at(child, rest);
        is_empty_node(child)
    });
    if prune {
        map.remove(head);
    }
}
