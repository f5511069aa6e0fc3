// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Informer-style watch loop: list, then watch, and turn the results into
//! add/update/delete callbacks.

use crate::error::Result;
use crate::kubernetes::client::Client;
use crate::kubernetes::options::ListOptions;
use crate::kubernetes::scheme::ApiScope;
use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::WatchStreamExt;
use kube::{Resource, ResourceExt};
use kube_runtime::watcher::{self, Event};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Receives the changes observed by [`Client::watch_resource`].
///
/// Every method defaults to doing nothing.
pub trait ResourceEventHandler<K>: Send + 'static {
    fn on_add(&mut self, _obj: &K) {}

    fn on_update(&mut self, _old: &K, _new: &K) {}

    /// Called with the last state the server reported for the object.
    fn on_delete(&mut self, _obj: &K) {}
}

type ObjFn<K> = Box<dyn FnMut(&K) + Send>;
type UpdateFn<K> = Box<dyn FnMut(&K, &K) + Send>;

/// A [`ResourceEventHandler`] made of optional closures.
pub struct EventHandlerFuncs<K> {
    add_func: Option<ObjFn<K>>,
    update_func: Option<UpdateFn<K>>,
    delete_func: Option<ObjFn<K>>,
}

impl<K> Default for EventHandlerFuncs<K> {
    fn default() -> Self {
        Self {
            add_func: None,
            update_func: None,
            delete_func: None,
        }
    }
}

impl<K> EventHandlerFuncs<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(mut self, f: impl FnMut(&K) + Send + 'static) -> Self {
        self.add_func = Some(Box::new(f));
        self
    }

    pub fn update_func(mut self, f: impl FnMut(&K, &K) + Send + 'static) -> Self {
        self.update_func = Some(Box::new(f));
        self
    }

    pub fn delete_func(mut self, f: impl FnMut(&K) + Send + 'static) -> Self {
        self.delete_func = Some(Box::new(f));
        self
    }
}

impl<K: 'static> ResourceEventHandler<K> for EventHandlerFuncs<K> {
    fn on_add(&mut self, obj: &K) {
        if let Some(f) = self.add_func.as_mut() {
            f(obj);
        }
    }

    fn on_update(&mut self, old: &K, new: &K) {
        if let Some(f) = self.update_func.as_mut() {
            f(old, new);
        }
    }

    fn on_delete(&mut self, obj: &K) {
        if let Some(f) = self.delete_func.as_mut() {
            f(obj);
        }
    }
}

/// Known objects plus the handler they are reported to.
struct Informer<K, H>
where
    K: Resource<DynamicType = ()>,
{
    handler: H,
    store: HashMap<ObjectRef<K>, K>,
    relist: Option<HashMap<ObjectRef<K>, K>>,
}

impl<K, H> Informer<K, H>
where
    K: Resource<DynamicType = ()> + Clone,
    H: ResourceEventHandler<K>,
{
    fn new(handler: H) -> Self {
        Self {
            handler,
            store: HashMap::new(),
            relist: None,
        }
    }

    fn apply(&mut self, event: Event<K>) {
        match event {
            Event::Apply(obj) => {
                let key = ObjectRef::from_obj(&obj);
                match self.store.insert(key, obj.clone()) {
                    Some(old) => self.handler.on_update(&old, &obj),
                    None => self.handler.on_add(&obj),
                }
            }
            Event::Delete(obj) => {
                self.store.remove(&ObjectRef::from_obj(&obj));
                self.handler.on_delete(&obj);
            }
            Event::Init => self.relist = Some(HashMap::new()),
            Event::InitApply(obj) => {
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(ObjectRef::from_obj(&obj), obj);
            }
            Event::InitDone => self.finish_relist(),
        }
    }

    /// Diff a completed (re)list against the store. Objects that vanished
    /// while the watch was down are reported as deleted; unchanged ones are
    /// not reported again.
    fn finish_relist(&mut self) {
        let fresh = self.relist.take().unwrap_or_default();
        let mut previous = std::mem::take(&mut self.store);

        for (key, obj) in &fresh {
            match previous.remove(key) {
                None => self.handler.on_add(obj),
                Some(old) if old.resource_version() != obj.resource_version() => {
                    self.handler.on_update(&old, obj)
                }
                Some(_) => {}
            }
        }
        for obj in previous.values() {
            self.handler.on_delete(obj);
        }

        self.store = fresh;
    }
}

impl Client {
    /// Watch resources of kind `K` and report changes to `handler` from a
    /// background task.
    ///
    /// The task lists everything matching `opts`, then keeps watching with
    /// the same options. There is no periodic resync. It runs until
    /// [`Client::close`] is called; watch errors are retried with backoff.
    /// Must be called from within a tokio runtime.
    pub fn watch_resource<K, H>(&self, handler: H, opts: ListOptions) -> Result<JoinHandle<()>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::Scope: ApiScope,
        H: ResourceEventHandler<K>,
    {
        self.scheme().kind_for::<K>()?;
        let api = <K::Scope as ApiScope>::api::<K>((**self).clone(), opts.namespace());
        let stream = watcher::watcher(api, opts.to_watcher_config()).default_backoff();

        let span = info_span!(
            parent: self.logger(),
            "watch_resource",
            kind = %K::kind(&()),
            namespace = opts.namespace().unwrap_or("*"),
        );
        let stop = self.stop_signal();

        Ok(tokio::spawn(
            run_informer(stream, Informer::new(handler), stop).instrument(span),
        ))
    }
}

async fn run_informer<K, H, S>(stream: S, mut informer: Informer<K, H>, stop: CancellationToken)
where
    K: Resource<DynamicType = ()> + Clone,
    H: ResourceEventHandler<K>,
    S: futures::Stream<Item = std::result::Result<Event<K>, watcher::Error>> + Send,
{
    info!("Starting watch");
    let mut stream = std::pin::pin!(stream);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!("Stop signal closed, stopping watch");
                return;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => informer.apply(event),
                Some(Err(e)) => warn!("Watch error, retrying: {}", e),
                None => {
                    debug!("Watch stream ended");
                    return;
                }
            }
        }
    }
}
