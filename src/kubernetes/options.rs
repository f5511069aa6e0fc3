// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Options shared by list, watch and delete-collection calls.

use kube::api::{ListParams, WatchParams};
use kube_runtime::watcher::Config as WatcherConfig;
use std::fmt;

/// Filters applied to list and watch calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
    /// Token from a previous page's `metadata.continue`
    pub continue_token: Option<String>,
}

impl ListOptions {
    pub fn in_namespace(namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    /// Require every given label to equal its value.
    pub fn matching_labels<I, K, V>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let selector = equality_selector(labels);
        self.label_selector(&selector)
    }

    pub fn matching_fields<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let selector = equality_selector(fields);
        self.field_selector(&selector)
    }

    /// Add a raw label selector; combined with any existing one.
    pub fn label_selector(mut self, selector: &str) -> Self {
        self.label_selector = join_selector(self.label_selector.take(), selector);
        self
    }

    pub fn field_selector(mut self, selector: &str) -> Self {
        self.field_selector = join_selector(self.field_selector.take(), selector);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume a limited list where the previous page ended.
    pub fn continue_from(mut self, token: &str) -> Self {
        self.continue_token = Some(token.to_string());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn to_list_params(&self) -> ListParams {
        let mut lp = ListParams::default();
        if let Some(labels) = &self.label_selector {
            lp = lp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            lp = lp.fields(fields);
        }
        if let Some(limit) = self.limit {
            lp = lp.limit(limit);
        }
        if let Some(token) = &self.continue_token {
            lp = lp.continue_token(token);
        }
        lp
    }

    pub fn to_watch_params(&self) -> WatchParams {
        let mut wp = WatchParams::default();
        if let Some(labels) = &self.label_selector {
            wp = wp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            wp = wp.fields(fields);
        }
        wp
    }

    /// Watcher configuration with the same selectors. Paging only applies
    /// to one-off lists; the watcher pages on its own.
    pub fn to_watcher_config(&self) -> WatcherConfig {
        let mut config = WatcherConfig::default();
        if let Some(labels) = &self.label_selector {
            config = config.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            config = config.fields(fields);
        }
        config
    }
}

fn equality_selector<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

fn join_selector(existing: Option<String>, selector: &str) -> Option<String> {
    match (existing, selector.is_empty()) {
        (existing, true) => existing,
        (Some(existing), false) if !existing.is_empty() => Some(format!("{},{}", existing, selector)),
        (_, false) => Some(selector.to_string()),
    }
}

/// Identifies a single object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    pub namespace: Option<String>,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster_scoped(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
