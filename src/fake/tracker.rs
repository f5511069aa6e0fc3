// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory object store backing the fake API server.
//!
//! Every mutation bumps a single resource version counter and is appended to
//! a bounded event history, so watches can resume from any recent version.

use crate::constants::fake::{
    EVENT_CHANNEL_CAPACITY, EVENT_HISTORY_CAPACITY, GENERATE_NAME_ALPHABET, GENERATE_NAME_SUFFIX_LEN,
};
use crate::fake::selector::{FieldSelector, LabelSelector};
use crate::kubernetes::scheme::RegisteredKind;
use k8s_openapi::chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// A failed request, rendered as a Kubernetes `Status` object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub code: u16,
    pub reason: &'static str,
    pub message: String,
}

impl StatusError {
    pub fn not_found(kind: &RegisteredKind, name: &str) -> Self {
        Self {
            code: 404,
            reason: "NotFound",
            message: format!("{} \"{}\" not found", kind.resource.plural, name),
        }
    }

    pub fn resource_not_found() -> Self {
        Self {
            code: 404,
            reason: "NotFound",
            message: "the server could not find the requested resource".to_string(),
        }
    }

    pub fn already_exists(kind: &RegisteredKind, name: &str) -> Self {
        Self {
            code: 409,
            reason: "AlreadyExists",
            message: format!("{} \"{}\" already exists", kind.resource.plural, name),
        }
    }

    pub fn conflict(kind: &RegisteredKind, name: &str) -> Self {
        Self {
            code: 409,
            reason: "Conflict",
            message: format!(
                "Operation cannot be fulfilled on {} \"{}\": the object has been modified; please apply your changes to the latest version and try again",
                kind.resource.plural, name
            ),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            reason: "BadRequest",
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: 422,
            reason: "Invalid",
            message: message.into(),
        }
    }

    /// The requested version is older than the kept event history.
    pub fn expired(version: u64, oldest: u64) -> Self {
        Self {
            code: 410,
            reason: "Expired",
            message: format!("too old resource version: {} ({})", version, oldest.saturating_sub(1)),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            code: 405,
            reason: "MethodNotAllowed",
            message: "the server does not allow this method on the requested resource".to_string(),
        }
    }

    pub fn unsupported_media_type(content_type: &str) -> Self {
        Self {
            code: 415,
            reason: "UnsupportedMediaType",
            message: format!("the body of the request was in an unknown format: {}", content_type),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": self.message,
            "reason": self.reason,
            "code": self.code
        })
    }
}

type TrackerResult<T> = std::result::Result<T, StatusError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub group: String,
    pub plural: String,
    pub resource_version: u64,
    pub event_type: EventType,
    pub object: Value,
    /// State before a modification, for watchers whose selector the object
    /// moves in or out of
    pub previous: Option<Value>,
}

impl RecordedEvent {
    /// One line of a watch response body, reported as `event_type`.
    pub fn to_line(&self, event_type: EventType) -> String {
        format!("{}\n", json!({"type": event_type.as_str(), "object": self.object}))
    }
}

/// How a patch body should be applied
#[derive(Debug, Clone)]
pub enum PatchBody {
    Merge(Value),
    /// Server-side apply; creates the object when it does not exist yet.
    Apply(Value),
    Json(json_patch::Patch),
}

/// Which objects a list, watch or delete-collection call selects
#[derive(Debug, Clone)]
pub struct Filter {
    pub group: String,
    pub plural: String,
    pub namespace: Option<String>,
    pub labels: Option<LabelSelector>,
    pub fields: Option<FieldSelector>,
}

impl Filter {
    pub fn new(kind: &RegisteredKind, namespace: Option<&str>) -> Self {
        Self {
            group: kind.resource.group.clone(),
            plural: kind.resource.plural.clone(),
            namespace: namespace.map(str::to_string),
            labels: None,
            fields: None,
        }
    }

    fn matches_key(&self, key: &ObjectKey) -> bool {
        key.group == self.group
            && key.plural == self.plural
            && (self.namespace.is_none() || key.namespace == self.namespace)
    }

    fn matches_object(&self, obj: &Value) -> bool {
        self.labels.as_ref().map_or(true, |l| l.matches(obj))
            && self.fields.as_ref().map_or(true, |f| f.matches(obj))
    }

    /// The event as a watcher with this filter sees it, if at all. A
    /// modification that moves an object into the selection is an add, one
    /// that moves it out is a delete.
    pub fn event_type_for(&self, event: &RecordedEvent) -> Option<EventType> {
        if event.group != self.group || event.plural != self.plural {
            return None;
        }
        if self.namespace.is_some() && meta_str(&event.object, "namespace") != self.namespace.as_deref() {
            return None;
        }

        let before = event.previous.as_ref().map(|p| self.matches_object(p));
        let now = self.matches_object(&event.object);
        match (event.event_type, before, now) {
            (EventType::Modified, Some(false), true) => Some(EventType::Added),
            (EventType::Modified, Some(true), false) => Some(EventType::Deleted),
            (EventType::Deleted, Some(true), false) => Some(EventType::Deleted),
            (event_type, _, true) => Some(event_type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    group: String,
    plural: String,
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    fn new(kind: &RegisteredKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            group: kind.resource.group.clone(),
            plural: kind.resource.plural.clone(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }
}

struct TrackerState {
    resource_version: u64,
    generated_names: u64,
    objects: BTreeMap<ObjectKey, Value>,
    history: VecDeque<Arc<RecordedEvent>>,
    events: broadcast::Sender<Arc<RecordedEvent>>,
}

/// Thread-safe object store shared by every request the fake server handles
pub struct ObjectTracker {
    state: Mutex<TrackerState>,
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(TrackerState {
                resource_version: 0,
                generated_names: 0,
                objects: BTreeMap::new(),
                history: VecDeque::with_capacity(EVENT_HISTORY_CAPACITY),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn resource_version(&self) -> u64 {
        self.state().resource_version
    }

    pub fn get(&self, kind: &RegisteredKind, namespace: Option<&str>, name: &str) -> TrackerResult<Value> {
        self.state()
            .objects
            .get(&ObjectKey::new(kind, namespace, name))
            .cloned()
            .ok_or_else(|| StatusError::not_found(kind, name))
    }

    /// Matching objects, ordered by namespace and name, plus the current
    /// resource version.
    pub fn list(&self, filter: &Filter) -> (Vec<Value>, u64) {
        let state = self.state();
        let items = state
            .objects
            .iter()
            .filter(|(key, obj)| filter.matches_key(key) && filter.matches_object(obj))
            .map(|(_, obj)| obj.clone())
            .collect();
        (items, state.resource_version)
    }

    pub fn create(&self, kind: &RegisteredKind, namespace: Option<&str>, obj: Value) -> TrackerResult<Value> {
        self.state().create(kind, namespace, obj)
    }

    /// Replace an object. With `status_only` set, only `.status` is taken
    /// from the request body.
    pub fn replace(
        &self,
        kind: &RegisteredKind,
        namespace: Option<&str>,
        name: &str,
        obj: Value,
        status_only: bool,
    ) -> TrackerResult<Value> {
        let mut state = self.state();
        let key = ObjectKey::new(kind, namespace, name);
        let current = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StatusError::not_found(kind, name))?;

        if let Some(body_name) = meta_str(&obj, "name") {
            if body_name != name {
                return Err(StatusError::bad_request(format!(
                    "the name of the object ({}) does not match the name on the URL ({})",
                    body_name, name
                )));
            }
        }
        if let Some(rv) = meta_str(&obj, "resourceVersion") {
            if Some(rv) != meta_str(&current, "resourceVersion") {
                return Err(StatusError::conflict(kind, name));
            }
        }

        let updated = if status_only {
            with_status_of(&current, &obj)
        } else {
            obj
        };
        state.commit_update(kind, key, &current, updated)
    }

    pub fn patch(
        &self,
        kind: &RegisteredKind,
        namespace: Option<&str>,
        name: &str,
        patch: PatchBody,
        status_only: bool,
    ) -> TrackerResult<Value> {
        let mut state = self.state();
        let key = ObjectKey::new(kind, namespace, name);
        let current = match state.objects.get(&key) {
            Some(current) => current.clone(),
            None => {
                return match patch {
                    PatchBody::Apply(obj) if !status_only => state.create(kind, namespace, obj),
                    _ => Err(StatusError::not_found(kind, name)),
                };
            }
        };

        let mut patched = current.clone();
        match patch {
            PatchBody::Merge(p) | PatchBody::Apply(p) => json_patch::merge(&mut patched, &p),
            PatchBody::Json(p) => json_patch::patch(&mut patched, &p.0)
                .map_err(|e| StatusError::invalid(format!("json patch failed: {}", e)))?,
        }

        if meta_str(&patched, "resourceVersion") != meta_str(&current, "resourceVersion") {
            return Err(StatusError::conflict(kind, name));
        }

        let updated = if status_only {
            with_status_of(&current, &patched)
        } else {
            patched
        };
        state.commit_update(kind, key, &current, updated)
    }

    /// Delete an object. Objects carrying finalizers are only marked with a
    /// deletion timestamp; they go away once the finalizers are removed.
    pub fn delete(&self, kind: &RegisteredKind, namespace: Option<&str>, name: &str) -> TrackerResult<Value> {
        self.state().delete(kind, ObjectKey::new(kind, namespace, name))
    }

    pub fn delete_collection(&self, kind: &RegisteredKind, filter: &Filter) -> TrackerResult<Vec<Value>> {
        let mut state = self.state();
        let keys: Vec<ObjectKey> = state
            .objects
            .iter()
            .filter(|(key, obj)| filter.matches_key(key) && filter.matches_object(obj))
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter().map(|key| state.delete(kind, key)).collect()
    }

    /// Events to replay for a new watch, and a receiver for everything after.
    ///
    /// Without a starting version every matching object is replayed as
    /// `ADDED`, matching a watch started with `resourceVersion=0`. A version
    /// older than the kept history fails with `410 Expired`.
    pub fn subscribe(
        &self,
        filter: &Filter,
        since: Option<u64>,
    ) -> TrackerResult<(Vec<Arc<RecordedEvent>>, broadcast::Receiver<Arc<RecordedEvent>>)> {
        let state = self.state();
        let replay = match since {
            Some(version) => {
                if let Some(oldest) = state.history.front() {
                    if oldest.resource_version > version + 1 {
                        return Err(StatusError::expired(version, oldest.resource_version));
                    }
                }
                state
                    .history
                    .iter()
                    .filter(|e| e.resource_version > version && filter.event_type_for(e).is_some())
                    .cloned()
                    .collect()
            }
            None => state
                .objects
                .iter()
                .filter(|(key, obj)| filter.matches_key(key) && filter.matches_object(obj))
                .map(|(key, obj)| {
                    Arc::new(RecordedEvent {
                        group: key.group.clone(),
                        plural: key.plural.clone(),
                        resource_version: meta_str(obj, "resourceVersion")
                            .and_then(|rv| rv.parse().ok())
                            .unwrap_or(state.resource_version),
                        event_type: EventType::Added,
                        object: obj.clone(),
                        previous: None,
                    })
                })
                .collect(),
        };
        Ok((replay, state.events.subscribe()))
    }
}

impl TrackerState {
    fn create(&mut self, kind: &RegisteredKind, namespace: Option<&str>, mut obj: Value) -> TrackerResult<Value> {
        if let Some(body_kind) = obj.get("kind").and_then(Value::as_str) {
            if body_kind != kind.resource.kind {
                return Err(StatusError::bad_request(format!(
                    "the kind of the provided object ({}) does not match {}",
                    body_kind, kind.resource.kind
                )));
            }
        }
        if let Some(body_ns) = meta_str(&obj, "namespace") {
            if kind.namespaced && Some(body_ns) != namespace {
                return Err(StatusError::bad_request(
                    "the namespace of the provided object does not match the namespace sent on the request",
                ));
            }
        }

        let name = match (meta_str(&obj, "name"), meta_str(&obj, "generateName")) {
            (Some(name), _) if !name.is_empty() => name.to_string(),
            (_, Some(prefix)) if !prefix.is_empty() => {
                let prefix = prefix.to_string();
                self.generate_name(&prefix)
            }
            _ => return Err(StatusError::invalid("name or generateName is required")),
        };

        let key = ObjectKey::new(kind, namespace, &name);
        if self.objects.contains_key(&key) {
            return Err(StatusError::already_exists(kind, &name));
        }

        let uid = format!("00000000-0000-4000-8000-{:012x}", self.resource_version + 1);
        set_type_meta(&mut obj, kind)?;
        let meta = metadata_mut(&mut obj)?;
        meta.insert("name".to_string(), json!(name));
        match namespace {
            Some(ns) if kind.namespaced => {
                meta.insert("namespace".to_string(), json!(ns));
            }
            _ => {
                meta.remove("namespace");
            }
        }
        meta.insert("uid".to_string(), json!(uid));
        meta.insert("creationTimestamp".to_string(), json!(now()));
        meta.insert("generation".to_string(), json!(1));
        meta.remove("deletionTimestamp");

        debug!("Creating {} {}", kind.resource.kind, name);
        Ok(self.record(EventType::Added, key, obj, None))
    }

    fn commit_update(
        &mut self,
        kind: &RegisteredKind,
        key: ObjectKey,
        current: &Value,
        mut updated: Value,
    ) -> TrackerResult<Value> {
        set_type_meta(&mut updated, kind)?;
        {
            let current_meta = current.get("metadata").and_then(Value::as_object);
            let meta = metadata_mut(&mut updated)?;
            for field in [
                "name",
                "namespace",
                "uid",
                "creationTimestamp",
                "deletionTimestamp",
                "resourceVersion",
                "generation",
            ] {
                match current_meta.and_then(|m| m.get(field)) {
                    Some(value) => meta.insert(field.to_string(), value.clone()),
                    None => meta.remove(field),
                };
            }
        }

        if updated == *current {
            return Ok(updated);
        }

        if updated.get("spec") != current.get("spec") {
            let generation = current
                .pointer("/metadata/generation")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            metadata_mut(&mut updated)?.insert("generation".to_string(), json!(generation + 1));
        }

        let finalized = updated.pointer("/metadata/deletionTimestamp").is_some() && !has_finalizers(&updated);
        if finalized {
            self.objects.remove(&key);
            return Ok(self.record(EventType::Deleted, key, updated, Some(current.clone())));
        }

        Ok(self.record(EventType::Modified, key, updated, Some(current.clone())))
    }

    fn delete(&mut self, kind: &RegisteredKind, key: ObjectKey) -> TrackerResult<Value> {
        let Some(current) = self.objects.get(&key).cloned() else {
            return Err(StatusError::not_found(kind, &key.name));
        };

        if has_finalizers(&current) {
            if current.pointer("/metadata/deletionTimestamp").is_some() {
                return Ok(current);
            }
            let mut marked = current.clone();
            metadata_mut(&mut marked)?.insert("deletionTimestamp".to_string(), json!(now()));
            return Ok(self.record(EventType::Modified, key, marked, Some(current)));
        }

        self.objects.remove(&key);
        debug!("Deleted {} {}", kind.resource.kind, key.name);
        Ok(self.record(EventType::Deleted, key, current, None))
    }

    /// Bump the resource version, store the object (unless deleted) and
    /// publish the event.
    fn record(&mut self, event_type: EventType, key: ObjectKey, mut obj: Value, previous: Option<Value>) -> Value {
        self.resource_version += 1;
        if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert(
                "resourceVersion".to_string(),
                json!(self.resource_version.to_string()),
            );
        }
        if event_type != EventType::Deleted {
            self.objects.insert(key.clone(), obj.clone());
        }

        let event = Arc::new(RecordedEvent {
            group: key.group,
            plural: key.plural,
            resource_version: self.resource_version,
            event_type,
            object: obj.clone(),
            previous,
        });
        if self.history.len() == EVENT_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
        // no receivers is fine
        let _ = self.events.send(event);
        obj
    }

    fn generate_name(&mut self, prefix: &str) -> String {
        self.generated_names += 1;
        let alphabet = GENERATE_NAME_ALPHABET.as_bytes();
        let mut n = self.generated_names;
        let mut suffix = String::with_capacity(GENERATE_NAME_SUFFIX_LEN);
        for _ in 0..GENERATE_NAME_SUFFIX_LEN {
            suffix.push(alphabet[(n % alphabet.len() as u64) as usize] as char);
            n /= alphabet.len() as u64;
        }
        format!("{}{}", prefix, suffix)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn meta_str<'a>(obj: &'a Value, field: &str) -> Option<&'a str> {
    obj.get("metadata")
        .and_then(|m| m.get(field))
        .and_then(Value::as_str)
}

fn metadata_mut(obj: &mut Value) -> TrackerResult<&mut Map<String, Value>> {
    obj.as_object_mut()
        .ok_or_else(|| StatusError::bad_request("object must be a JSON object"))?
        .entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| StatusError::bad_request("metadata must be a JSON object"))
}

fn set_type_meta(obj: &mut Value, kind: &RegisteredKind) -> TrackerResult<()> {
    let map = obj
        .as_object_mut()
        .ok_or_else(|| StatusError::bad_request("object must be a JSON object"))?;
    map.insert("apiVersion".to_string(), json!(kind.resource.api_version));
    map.insert("kind".to_string(), json!(kind.resource.kind));
    Ok(())
}

fn has_finalizers(obj: &Value) -> bool {
    obj.pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty())
}

/// `current` with its status replaced by the one in `source`.
fn with_status_of(current: &Value, source: &Value) -> Value {
    let mut updated = current.clone();
    if let Some(map) = updated.as_object_mut() {
        match source.get("status") {
            Some(status) => map.insert("status".to_string(), status.clone()),
            None => map.remove("status"),
        };
    }
    updated
}
