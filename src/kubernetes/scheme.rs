// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry of the resource kinds a client is allowed to work with.

use crate::error::{GenkubeError, Result};
use k8s_openapi::api::{apps, batch, core};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::core::discovery::ApiResource;
use kube::core::GroupVersionKind;
use kube::{Api, Resource};
use std::collections::HashMap;

/// Callback that teaches a [`Scheme`] about a group of resource kinds.
pub type AddToSchemeFn = fn(&mut Scheme) -> Result<()>;

/// Maps a resource's compile time scope onto the runtime world.
pub trait ApiScope {
    const NAMESPACED: bool;

    /// Build an `Api` for `K`, scoped to `namespace` when the kind is namespaced.
    fn api<K>(client: kube::Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>;

    /// Like [`ApiScope::api`], but falls back to the client's default
    /// namespace instead of all namespaces.
    fn object_api<K>(client: kube::Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>;
}

impl ApiScope for NamespaceResourceScope {
    const NAMESPACED: bool = true;

    fn api<K>(client: kube::Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }

    fn object_api<K>(client: kube::Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::default_namespaced(client),
        }
    }
}

impl ApiScope for ClusterResourceScope {
    const NAMESPACED: bool = false;

    fn api<K>(client: kube::Client, _namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        Api::all(client)
    }

    fn object_api<K>(client: kube::Client, _namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        Api::all(client)
    }
}

/// A kind known to the scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredKind {
    pub resource: ApiResource,
    pub namespaced: bool,
}

impl RegisteredKind {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(
            &self.resource.group,
            &self.resource.version,
            &self.resource.kind,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: HashMap<GroupVersionKind, RegisteredKind>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scheme by running every callback in order.
    pub fn from_fns(add_to_scheme_fns: &[AddToSchemeFn]) -> Result<Self> {
        let mut scheme = Self::new();
        for add_to_scheme in add_to_scheme_fns {
            add_to_scheme(&mut scheme)?;
        }
        Ok(scheme)
    }

    /// Register a statically typed resource
    pub fn add<K>(&mut self) -> Result<()>
    where
        K: Resource<DynamicType = ()>,
        K::Scope: ApiScope,
    {
        self.add_api_resource(ApiResource::erase::<K>(&()), <K::Scope as ApiScope>::NAMESPACED)
    }

    /// Register a kind known only at runtime.
    ///
    /// Registering the same kind again is a no-op, unless the plural or the
    /// scope differ from the first registration.
    pub fn add_api_resource(&mut self, resource: ApiResource, namespaced: bool) -> Result<()> {
        let registered = RegisteredKind {
            resource,
            namespaced,
        };
        let gvk = registered.gvk();

        match self.kinds.get(&gvk) {
            Some(existing) if *existing != registered => Err(GenkubeError::SchemeConflict(format!(
                "{}/{} is already registered as {} (namespaced={})",
                existing.resource.api_version,
                existing.resource.kind,
                existing.resource.plural,
                existing.namespaced
            ))),
            Some(_) => Ok(()),
            None => {
                self.kinds.insert(gvk, registered);
                Ok(())
            }
        }
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds.contains_key(gvk)
    }

    pub fn kind(&self, gvk: &GroupVersionKind) -> Option<&RegisteredKind> {
        self.kinds.get(gvk)
    }

    /// Look up the registration for `K`, failing when it was never added.
    pub fn kind_for<K>(&self) -> Result<&RegisteredKind>
    where
        K: Resource<DynamicType = ()>,
    {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.kinds
            .get(&gvk)
            .ok_or(GenkubeError::NotRegistered(gvk))
    }

    /// Resolve a REST path segment (the plural) back to a registered kind.
    pub fn kind_for_plural(&self, group: &str, version: &str, plural: &str) -> Option<&RegisteredKind> {
        self.kinds.values().find(|k| {
            k.resource.group == group && k.resource.version == version && k.resource.plural == plural
        })
    }

    pub fn kinds(&self) -> impl Iterator<Item = &RegisteredKind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Core group (`v1`) kinds.
pub fn core_v1(scheme: &mut Scheme) -> Result<()> {
    scheme.add::<core::v1::ConfigMap>()?;
    scheme.add::<core::v1::Endpoints>()?;
    scheme.add::<core::v1::Event>()?;
    scheme.add::<core::v1::Namespace>()?;
    scheme.add::<core::v1::Node>()?;
    scheme.add::<core::v1::PersistentVolume>()?;
    scheme.add::<core::v1::PersistentVolumeClaim>()?;
    scheme.add::<core::v1::Pod>()?;
    scheme.add::<core::v1::Secret>()?;
    scheme.add::<core::v1::Service>()?;
    scheme.add::<core::v1::ServiceAccount>()?;
    Ok(())
}

pub fn apps_v1(scheme: &mut Scheme) -> Result<()> {
    scheme.add::<apps::v1::DaemonSet>()?;
    scheme.add::<apps::v1::Deployment>()?;
    scheme.add::<apps::v1::ReplicaSet>()?;
    scheme.add::<apps::v1::StatefulSet>()?;
    Ok(())
}

pub fn batch_v1(scheme: &mut Scheme) -> Result<()> {
    scheme.add::<batch::v1::CronJob>()?;
    scheme.add::<batch::v1::Job>()?;
    Ok(())
}

/// All built-in kinds this crate knows about.
pub fn kubernetes(scheme: &mut Scheme) -> Result<()> {
    core_v1(scheme)?;
    apps_v1(scheme)?;
    batch_v1(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::post::{self, Post};
    use k8s_openapi::api::core::v1::{Namespace, Pod};

    #[test]
    fn test_add_records_scope_and_plural() {
        let mut scheme = Scheme::new();
        scheme.add::<Pod>().unwrap();
        scheme.add::<Namespace>().unwrap();

        let pod = scheme.kind_for::<Pod>().unwrap();
        assert!(pod.namespaced);
        assert_eq!(pod.resource.plural, "pods");
        assert_eq!(pod.resource.api_version, "v1");

        let ns = scheme.kind_for::<Namespace>().unwrap();
        assert!(!ns.namespaced);
    }

    #[test]
    fn test_kind_for_unregistered() {
        let scheme = Scheme::new();
        match scheme.kind_for::<Pod>() {
            Err(GenkubeError::NotRegistered(gvk)) => assert_eq!(gvk.kind, "Pod"),
            other => panic!("expected NotRegistered, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let mut scheme = Scheme::new();
        scheme.add::<Pod>().unwrap();
        scheme.add::<Pod>().unwrap();
        assert_eq!(scheme.len(), 1);
    }

    #[test]
    fn test_conflicting_registration() {
        let mut scheme = Scheme::new();
        scheme.add::<Pod>().unwrap();

        let mut resource = ApiResource::erase::<Pod>(&());
        resource.plural = "poddies".to_string();
        let result = scheme.add_api_resource(resource, true);

        assert!(matches!(result, Err(GenkubeError::SchemeConflict(_))));
    }

    #[test]
    fn test_kind_for_plural() {
        let scheme = Scheme::from_fns(&[post::add_to_scheme]).unwrap();

        let kind = scheme.kind_for_plural("post.funny.com", "v1", "posts").unwrap();
        assert_eq!(kind.resource.kind, "Post");
        assert!(kind.namespaced);
        assert!(scheme.kind_for_plural("post.funny.com", "v2", "posts").is_none());
        assert!(scheme.kind_for::<Post>().is_ok());
    }

    #[test]
    fn test_kubernetes_includes_all_groups() {
        let scheme = Scheme::from_fns(&[kubernetes]).unwrap();

        assert!(scheme.kind_for_plural("", "v1", "pods").is_some());
        assert!(scheme.kind_for_plural("apps", "v1", "deployments").is_some());
        assert!(scheme.kind_for_plural("batch", "v1", "cronjobs").is_some());
    }

    #[test]
    fn test_from_fns_propagates_error() {
        fn failing(_: &mut Scheme) -> Result<()> {
            Err(GenkubeError::SchemeConflict("boom".to_string()))
        }

        let result = Scheme::from_fns(&[core_v1, failing]);
        assert!(matches!(result, Err(GenkubeError::SchemeConflict(_))));
    }
}
