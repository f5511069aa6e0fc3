// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Environment variables read by [`crate::config::Config`]
pub mod env {
    /// Path to a kubeconfig file; in-cluster config is used when unset
    pub const KUBE_CREDENTIAL_FILE: &str = "GENKUBE_KUBE_CREDENTIAL_FILE";
    /// Namespace to watch (all namespaces when unset)
    pub const NAMESPACE: &str = "GENKUBE_NAMESPACE";
    pub const LABEL_SELECTOR: &str = "GENKUBE_LABEL_SELECTOR";
}

/// Fake API server settings
pub mod fake {
    /// Namespace used for objects that don't carry one
    pub const DEFAULT_NAMESPACE: &str = "default";
    /// Live watch events buffered per watcher before it must re-watch
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
    /// Events kept for resuming watches; older versions get `410 Expired`
    pub const EVENT_HISTORY_CAPACITY: usize = 1000;
    /// Same alphabet the API server uses for generateName suffixes
    pub const GENERATE_NAME_ALPHABET: &str = "bcdfghjklmnpqrstvwxz2456789";
    pub const GENERATE_NAME_SUFFIX_LEN: usize = 5;
}
