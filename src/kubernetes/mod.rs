// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes client wrapper: scheme registry, typed operations and the
//! informer-style watcher.

pub mod client;
pub mod options;
pub mod patch;
pub mod scheme;
pub mod watcher;

pub use client::Client;
pub use options::{ListOptions, NamespacedName};
pub use patch::merge_from;
pub use scheme::{AddToSchemeFn, ApiScope, Scheme};
pub use watcher::{EventHandlerFuncs, ResourceEventHandler};
