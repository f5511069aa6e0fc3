// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client creation and typed call-through operations

use crate::error::{GenkubeError, Result};
use crate::kubernetes::options::{ListOptions, NamespacedName};
use crate::kubernetes::scheme::{AddToSchemeFn, ApiScope, Scheme};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::api::{DeleteParams, ObjectList, Patch, PatchParams, PostParams, WatchEvent};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Span};

/// A `kube::Client` with a scheme, a logger and a stop signal shared by every
/// watch loop started from it.
///
/// Clones share the stop signal, so closing any clone stops the watches of
/// all of them.
#[derive(Clone)]
pub struct Client {
    logger: Span,
    scheme: Arc<Scheme>,
    close: Arc<Mutex<CancellationToken>>,
    inner: kube::Client,
}

impl Client {
    /// Create a client for the given resource groups.
    ///
    /// Pass `None` as `kube_credential_file` to use the in-cluster service
    /// account. At least one scheme callback is required; no kinds are
    /// registered by default.
    pub async fn new(
        logger: Span,
        kube_credential_file: Option<&Path>,
        add_to_scheme_fns: &[AddToSchemeFn],
    ) -> Result<Self> {
        if add_to_scheme_fns.is_empty() {
            return Err(GenkubeError::NoScheme);
        }

        let config = match kube_credential_file {
            Some(path) => {
                info!(parent: &logger, "Loading kube credentials from {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
            }
            None => {
                info!(parent: &logger, "Using in-cluster configuration");
                kube::Config::incluster()?
            }
        };

        let scheme = Scheme::from_fns(add_to_scheme_fns)?;
        debug!(
            parent: &logger,
            "Registered {} kinds, connecting to {}",
            scheme.len(),
            config.cluster_url
        );

        let inner = kube::Client::try_from(config)?;
        Ok(Self::from_parts(logger, Arc::new(scheme), inner))
    }

    pub(crate) fn from_parts(logger: Span, scheme: Arc<Scheme>, inner: kube::Client) -> Self {
        Self {
            logger,
            scheme,
            close: Arc::new(Mutex::new(CancellationToken::new())),
            inner,
        }
    }

    /// Stop every running watch loop. Watches started afterwards run until the
    /// next call.
    pub fn close(&self) {
        let mut close = self.close.lock().unwrap_or_else(PoisonError::into_inner);
        close.cancel();
        *close = CancellationToken::new();
        debug!(parent: &self.logger, "Closed stop signal");
    }

    /// The signal the next watch loop will stop on.
    pub fn stop_signal(&self) -> CancellationToken {
        self.close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn logger(&self) -> &Span {
        &self.logger
    }

    /// Api for list-like calls; `None` means all namespaces.
    fn list_api<K>(&self, namespace: Option<&str>) -> Result<Api<K>>
    where
        K: Resource<DynamicType = ()>,
        K::Scope: ApiScope,
    {
        self.scheme.kind_for::<K>()?;
        Ok(<K::Scope as ApiScope>::api::<K>(self.inner.clone(), namespace))
    }

    /// Api for single-object calls; `None` means the client's default namespace.
    fn object_api<K>(&self, namespace: Option<&str>) -> Result<Api<K>>
    where
        K: Resource<DynamicType = ()>,
        K::Scope: ApiScope,
    {
        self.scheme.kind_for::<K>()?;
        Ok(<K::Scope as ApiScope>::object_api::<K>(self.inner.clone(), namespace))
    }

    pub async fn get<K>(&self, key: &NamespacedName) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        K::Scope: ApiScope,
    {
        let api = self.object_api::<K>(key.namespace.as_deref())?;
        Ok(api.get(&key.name).await?)
    }

    pub async fn list<K>(&self, opts: &ListOptions) -> Result<ObjectList<K>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        K::Scope: ApiScope,
    {
        let api = self.list_api::<K>(opts.namespace())?;
        Ok(api.list(&opts.to_list_params()).await?)
    }

    pub async fn create<K>(&self, obj: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
        K::Scope: ApiScope,
    {
        debug!(parent: &self.logger, "Creating {} {}", K::kind(&()), obj.name_any());
        let api = self.object_api::<K>(obj.meta().namespace.as_deref())?;
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    /// Replace an object. The stored resource version must match the one on
    /// `obj`, otherwise the server answers with a conflict.
    pub async fn update<K>(&self, obj: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
        K::Scope: ApiScope,
    {
        debug!(parent: &self.logger, "Updating {} {}", K::kind(&()), obj.name_any());
        let api = self.object_api::<K>(obj.meta().namespace.as_deref())?;
        Ok(api.replace(&obj.name_any(), &PostParams::default(), obj).await?)
    }

    pub async fn update_status<K>(&self, obj: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
        K::Scope: ApiScope,
    {
        let api = self.object_api::<K>(obj.meta().namespace.as_deref())?;
        let data = serde_json::to_vec(obj)?;
        Ok(api
            .replace_status(&obj.name_any(), &PostParams::default(), data)
            .await?)
    }

    /// Patch the object identified by `obj`'s name and namespace.
    pub async fn patch<K, P>(&self, obj: &K, pp: &PatchParams, patch: &Patch<P>) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        K::Scope: ApiScope,
        P: Serialize + Debug,
    {
        debug!(parent: &self.logger, "Patching {} {}", K::kind(&()), obj.name_any());
        let api = self.object_api::<K>(obj.meta().namespace.as_deref())?;
        Ok(api.patch(&obj.name_any(), pp, patch).await?)
    }

    pub async fn patch_status<K, P>(&self, obj: &K, pp: &PatchParams, patch: &Patch<P>) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        K::Scope: ApiScope,
        P: Serialize + Debug,
    {
        let api = self.object_api::<K>(obj.meta().namespace.as_deref())?;
        Ok(api.patch_status(&obj.name_any(), pp, patch).await?)
    }

    pub async fn delete<K>(&self, obj: &K) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        K::Scope: ApiScope,
    {
        debug!(parent: &self.logger, "Deleting {} {}", K::kind(&()), obj.name_any());
        let api = self.object_api::<K>(obj.meta().namespace.as_deref())?;
        api.delete(&obj.name_any(), &DeleteParams::default()).await?;
        Ok(())
    }

    /// Delete every object matching `opts`.
    pub async fn delete_all_of<K>(&self, opts: &ListOptions) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        K::Scope: ApiScope,
    {
        debug!(parent: &self.logger, "Deleting all {} matching {:?}", K::kind(&()), opts);
        let api = self.list_api::<K>(opts.namespace())?;
        api.delete_collection(&DeleteParams::default(), &opts.to_list_params())
            .await?;
        Ok(())
    }

    /// Raw watch starting after `resource_version`. The stream ends when the
    /// server closes it; use [`Client::watch_resource`] for a managed watch.
    pub async fn watch<K>(
        &self,
        opts: &ListOptions,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent<K>>>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
        K::Scope: ApiScope,
    {
        let api = self.list_api::<K>(opts.namespace())?;
        let stream = api.watch(&opts.to_watch_params(), resource_version).await?;
        Ok(stream.map_err(GenkubeError::from).boxed())
    }
}

impl Deref for Client {
    type Target = kube::Client;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
