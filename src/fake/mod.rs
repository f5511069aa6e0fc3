// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory client for tests, backed by a fake API server instead of a cluster.

pub mod selector;
pub mod server;
pub mod tracker;

pub use server::FakeApiServer;
pub use tracker::ObjectTracker;

use crate::constants::fake::DEFAULT_NAMESPACE;
use crate::error::{GenkubeError, Result};
use crate::kubernetes::scheme::{self, AddToSchemeFn, Scheme};
use crate::kubernetes::Client;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, Span};

/// Builds a [`Client`] backed by a [`FakeApiServer`].
///
/// The scheme always starts out with the built-in Kubernetes kinds; callbacks
/// add to it.
pub struct FakeClientBuilder {
    logger: Span,
    add_to_scheme_fns: Vec<AddToSchemeFn>,
    objects: Vec<(Option<String>, Value)>,
}

impl Default for FakeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClientBuilder {
    pub fn new() -> Self {
        Self {
            logger: Span::none(),
            add_to_scheme_fns: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Span) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_scheme(mut self, add_to_scheme: AddToSchemeFn) -> Self {
        self.add_to_scheme_fns.push(add_to_scheme);
        self
    }

    /// Seed an object that exists before the client is handed out.
    pub fn with_object<K>(mut self, obj: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut value = serde_json::to_value(obj)?;
        if let Some(map) = value.as_object_mut() {
            map.entry("apiVersion")
                .or_insert_with(|| Value::String(K::api_version(&()).to_string()));
            map.entry("kind")
                .or_insert_with(|| Value::String(K::kind(&()).to_string()));
        }
        self.objects.push((obj.namespace(), value));
        Ok(self)
    }

    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Client> {
        let mut scheme = Scheme::new();
        scheme::kubernetes(&mut scheme)?;
        for add_to_scheme in &self.add_to_scheme_fns {
            add_to_scheme(&mut scheme)?;
        }
        let scheme = Arc::new(scheme);

        let server = FakeApiServer::new(scheme.clone());
        for (namespace, obj) in self.objects {
            seed(&server, namespace, obj)?;
        }

        debug!("Built fake client with {} registered kinds", scheme.len());
        let inner = kube::Client::new(server, DEFAULT_NAMESPACE);
        Ok(Client::from_parts(self.logger, scheme, inner))
    }
}

fn seed(server: &FakeApiServer, namespace: Option<String>, obj: Value) -> Result<()> {
    let api_version = obj.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    let kind_name = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
    let gvk = kube::core::GroupVersionKind::gvk(group, version, kind_name);

    let kind = server
        .scheme()
        .kind(&gvk)
        .ok_or_else(|| GenkubeError::NotRegistered(gvk.clone()))?;
    let namespace = if kind.namespaced {
        Some(namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
    } else {
        None
    };

    server
        .tracker()
        .create(kind, namespace.as_deref(), obj)
        .map_err(|e| GenkubeError::FakeSeed(format!("{}/{}: {}", gvk.kind, e.code, e.message)))?;
    Ok(())
}

impl Client {
    /// Create a client backed by an in-memory fake API server.
    ///
    /// Fails with [`GenkubeError::NoScheme`] when no callback is given, like
    /// [`Client::new`]. Must be called from within a tokio runtime.
    pub fn new_fake(logger: Span, add_to_scheme_fns: &[AddToSchemeFn]) -> Result<Client> {
        if add_to_scheme_fns.is_empty() {
            return Err(GenkubeError::NoScheme);
        }

        add_to_scheme_fns
            .iter()
            .fold(FakeClientBuilder::new().with_logger(logger), |builder, f| {
                builder.with_scheme(*f)
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::{ListOptions, NamespacedName};
    use crate::types::post::{self, Post, PostSpec};
    use k8s_openapi::api::core::v1::{Namespace, Pod};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::chrono::Utc;
    use kube::api::ObjectMeta;

    fn make_pod(name: &str, namespace: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_fake_without_scheme() {
        let result = Client::new_fake(Span::none(), &[]);
        assert!(matches!(result, Err(GenkubeError::NoScheme)));
    }

    #[tokio::test]
    async fn test_new_fake_create_and_list() {
        let fake = Client::new_fake(Span::none(), &[post::add_to_scheme]).unwrap();

        fake.create(&make_pod("my-pod", "my-namespace")).await.unwrap();

        let pods = fake.list::<Pod>(&ListOptions::default()).await.unwrap();
        assert_eq!(pods.items.len(), 1);
        assert_eq!(pods.items[0].name_any(), "my-pod");
        assert_eq!(pods.items[0].namespace().as_deref(), Some("my-namespace"));

        fake.close();
    }

    #[tokio::test]
    async fn test_new_fake_serves_custom_resources() {
        let fake = Client::new_fake(Span::none(), &[post::add_to_scheme]).unwrap();

        let mut post = Post::new(
            "hello",
            PostSpec {
                post_at: Time("2026-01-01T12:00:00Z".parse().unwrap()),
                text: "hello world".to_string(),
            },
        );
        post.metadata.namespace = Some("blog".to_string());
        fake.create(&post).await.unwrap();

        let fetched: Post = fake.get(&NamespacedName::new("blog", "hello")).await.unwrap();
        assert_eq!(fetched.spec.text, "hello world");
        assert!(fetched.status.is_none());
    }

    #[tokio::test]
    async fn test_builder_seeds_objects() {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some("team-a".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let client = FakeClientBuilder::new()
            .with_object(&make_pod("seeded", "team-a"))
            .unwrap()
            .with_object(&namespace)
            .unwrap()
            .build()
            .unwrap();

        let pod: Pod = client.get(&NamespacedName::new("team-a", "seeded")).await.unwrap();
        assert_eq!(pod.name_any(), "seeded");
        assert!(pod.resource_version().is_some());

        let ns: Namespace = client.get(&NamespacedName::cluster_scoped("team-a")).await.unwrap();
        assert_eq!(ns.name_any(), "team-a");
    }

    #[tokio::test]
    async fn test_builder_rejects_unregistered_seed() {
        let post = Post::new(
            "hello",
            PostSpec {
                post_at: Time(Utc::now()),
                text: String::new(),
            },
        );

        let result = FakeClientBuilder::new().with_object(&post).unwrap().build();
        assert!(matches!(result, Err(GenkubeError::NotRegistered(_))));
    }
}
