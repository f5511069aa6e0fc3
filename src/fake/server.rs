// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A tower service that answers Kubernetes REST requests from an in-memory
//! object tracker.

use crate::fake::selector::{FieldSelector, LabelSelector};
use crate::fake::tracker::{Filter, ObjectTracker, PatchBody, StatusError};
use crate::kubernetes::scheme::{RegisteredKind, Scheme};
use bytes::Bytes;
use futures::{stream, StreamExt};
use http::header::CONTENT_TYPE;
use http::{request::Parts, HeaderValue, Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use kube::client::Body;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast::error::RecvError;
use tower::Service;
use tracing::{debug, trace};

pub type FakeBody = UnsyncBoxBody<Bytes, Infallible>;

type HandlerResult = Result<(StatusCode, Value), StatusError>;

/// In-memory stand-in for the Kubernetes API server.
#[derive(Clone)]
pub struct FakeApiServer {
    scheme: Arc<Scheme>,
    tracker: Arc<ObjectTracker>,
}

impl FakeApiServer {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            scheme,
            tracker: Arc::new(ObjectTracker::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.tracker
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn handle(&self, parts: &Parts, body: &[u8]) -> Response<FakeBody> {
        trace!("{} {}", parts.method, parts.uri);

        let Some(route) = Route::parse(&self.scheme, parts.uri.path()) else {
            return status_response(&StatusError::resource_not_found());
        };
        let query = Query::parse(parts.uri.query());
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let result = match (parts.method.as_str(), route.name.as_deref()) {
            ("GET", None) if query.watch => match self.watch(&route, &query) {
                Ok(response) => return response,
                Err(e) => Err(e),
            },
            ("GET", None) => self.list(&route, &query),
            ("GET", Some(name)) => self.get(&route, name),
            ("POST", None) if route.subresource.is_none() => self.create(&route, body),
            ("PUT", Some(name)) => self.replace(&route, name, body),
            ("PATCH", Some(name)) => self.patch(&route, name, content_type, body),
            ("DELETE", Some(name)) if route.subresource.is_none() => self.delete(&route, name),
            ("DELETE", None) => self.delete_collection(&route, &query),
            _ => Err(StatusError::method_not_allowed()),
        };

        match result {
            Ok((status, value)) => json_response(status, &value),
            Err(e) => {
                debug!("{} {} failed: {} ({})", parts.method, parts.uri, e.message, e.code);
                status_response(&e)
            }
        }
    }

    fn get(&self, route: &Route<'_>, name: &str) -> HandlerResult {
        let obj = self.tracker.get(route.kind, route.object_namespace()?, name)?;
        Ok((StatusCode::OK, obj))
    }

    /// One page of matching objects. With `limit` set, `metadata.continue`
    /// carries the key of the last returned object while more remain.
    fn list(&self, route: &Route<'_>, query: &Query) -> HandlerResult {
        let (items, resource_version) = self.tracker.list(&route.filter(query)?);
        let limit = query.limit()?;
        let mut items: Vec<Value> = match query.continue_after()? {
            Some(after) => items.into_iter().filter(|item| page_key(item) > after).collect(),
            None => items,
        };

        let mut list = list_json(route.kind, Vec::new(), resource_version);
        if let Some(limit) = limit.filter(|l| *l > 0 && items.len() > *l) {
            let remaining = items.split_off(limit);
            if let Some(last) = items.last() {
                let (namespace, name) = page_key(last);
                list["metadata"]["continue"] = json!(format!("{}/{}", namespace, name));
                list["metadata"]["remainingItemCount"] = json!(remaining.len());
            }
        }
        list["items"] = json!(items);
        Ok((StatusCode::OK, list))
    }

    fn create(&self, route: &Route<'_>, body: &[u8]) -> HandlerResult {
        let obj = parse_json(body)?;
        let created = self.tracker.create(route.kind, route.object_namespace()?, obj)?;
        Ok((StatusCode::CREATED, created))
    }

    fn replace(&self, route: &Route<'_>, name: &str, body: &[u8]) -> HandlerResult {
        let obj = parse_json(body)?;
        let status_only = route.subresource.is_some();
        let updated = self
            .tracker
            .replace(route.kind, route.object_namespace()?, name, obj, status_only)?;
        Ok((StatusCode::OK, updated))
    }

    fn patch(&self, route: &Route<'_>, name: &str, content_type: &str, body: &[u8]) -> HandlerResult {
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        let patch = match media_type {
            "application/merge-patch+json" | "application/strategic-merge-patch+json" => {
                PatchBody::Merge(parse_json(body)?)
            }
            "application/apply-patch+yaml" => PatchBody::Apply(
                serde_yaml::from_slice(body)
                    .map_err(|e| StatusError::bad_request(format!("invalid apply patch: {}", e)))?,
            ),
            "application/json-patch+json" => PatchBody::Json(
                serde_json::from_slice(body)
                    .map_err(|e| StatusError::bad_request(format!("invalid json patch: {}", e)))?,
            ),
            other => return Err(StatusError::unsupported_media_type(other)),
        };
        let status_only = route.subresource.is_some();
        let patched = self
            .tracker
            .patch(route.kind, route.object_namespace()?, name, patch, status_only)?;
        Ok((StatusCode::OK, patched))
    }

    fn delete(&self, route: &Route<'_>, name: &str) -> HandlerResult {
        let deleted = self.tracker.delete(route.kind, route.object_namespace()?, name)?;
        Ok((StatusCode::OK, deleted))
    }

    fn delete_collection(&self, route: &Route<'_>, query: &Query) -> HandlerResult {
        let deleted = self.tracker.delete_collection(route.kind, &route.filter(query)?)?;
        let resource_version = self.tracker.resource_version();
        Ok((StatusCode::OK, list_json(route.kind, deleted, resource_version)))
    }

    /// Stream replayed and live events as newline-delimited JSON. The stream
    /// stays open until the client drops it. A version older than the kept
    /// history gets a single `ERROR` event with a `410 Expired` status.
    fn watch(&self, route: &Route<'_>, query: &Query) -> Result<Response<FakeBody>, StatusError> {
        let filter = route.filter(query)?;
        let since = match query.resource_version.as_deref() {
            None | Some("") | Some("0") => None,
            Some(rv) => Some(
                rv.parse::<u64>()
                    .map_err(|_| StatusError::bad_request(format!("invalid resource version: {}", rv)))?,
            ),
        };

        let (replay, receiver) = match self.tracker.subscribe(&filter, since) {
            Ok(subscription) => subscription,
            Err(e) if e.code == 410 => {
                debug!("Watch on {} expired: {}", route.kind.resource.plural, e.message);
                let line = format!("{}\n", json!({"type": "ERROR", "object": e.to_json()}));
                return Ok(with_json_content(
                    StatusCode::OK,
                    Full::new(Bytes::from(line)).boxed_unsync(),
                ));
            }
            Err(e) => return Err(e),
        };
        debug!(
            "Watching {} from {:?}, replaying {} events",
            route.kind.resource.plural,
            since,
            replay.len()
        );

        let replay: Vec<String> = replay
            .iter()
            .filter_map(|event| filter.event_type_for(event).map(|t| event.to_line(t)))
            .collect();

        let live = stream::unfold((receiver, filter), |(mut receiver, filter)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => match filter.event_type_for(&event) {
                        Some(event_type) => return Some((event.to_line(event_type), (receiver, filter))),
                        None => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        // the client re-watches from its last seen version
                        debug!("Watch lagged by {} events, closing stream", skipped);
                        return None;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        let frames = stream::iter(replay)
            .chain(live)
            .map(|line: String| Ok::<_, Infallible>(Frame::data(Bytes::from(line))));

        Ok(with_json_content(
            StatusCode::OK,
            StreamBody::new(frames).boxed_unsync(),
        ))
    }
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<FakeBody>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok(server.handle(&parts, &body))
        })
    }
}

/// A request path resolved against the scheme
struct Route<'a> {
    kind: &'a RegisteredKind,
    namespace: Option<String>,
    name: Option<String>,
    subresource: Option<String>,
}

impl<'a> Route<'a> {
    /// Resolve `/api/{v}/...` and `/apis/{g}/{v}/...` paths. Only the `status`
    /// subresource is served.
    fn parse(scheme: &'a Scheme, path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let (group, version, rest) = match segments.as_slice() {
            ["api", version, rest @ ..] => ("", *version, rest),
            ["apis", group, version, rest @ ..] => (*group, *version, rest),
            _ => return None,
        };

        // `namespaces/{ns}/{plural}` unless that names the Namespace kind itself
        if let ["namespaces", namespace, plural, tail @ ..] = rest {
            if let Some(kind) = scheme
                .kind_for_plural(group, version, plural)
                .filter(|k| k.namespaced)
            {
                return Self::build(kind, Some(*namespace), tail);
            }
        }

        let [plural, tail @ ..] = rest else {
            return None;
        };
        let kind = scheme.kind_for_plural(group, version, plural)?;
        Self::build(kind, None, tail)
    }

    fn build(kind: &'a RegisteredKind, namespace: Option<&str>, tail: &[&str]) -> Option<Self> {
        let (name, subresource) = match tail {
            [] => (None, None),
            [name] => (Some(*name), None),
            [name, "status"] => (Some(*name), Some("status")),
            _ => return None,
        };
        Some(Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.map(str::to_string),
            subresource: subresource.map(str::to_string),
        })
    }

    /// Namespace for single-object requests; namespaced kinds must have one.
    fn object_namespace(&self) -> Result<Option<&str>, StatusError> {
        match (self.kind.namespaced, self.namespace.as_deref()) {
            (true, None) => Err(StatusError::resource_not_found()),
            (true, namespace) => Ok(namespace),
            (false, _) => Ok(None),
        }
    }

    fn filter(&self, query: &Query) -> Result<Filter, StatusError> {
        let mut filter = Filter::new(self.kind, self.namespace.as_deref());
        if let Some(selector) = &query.label_selector {
            filter.labels = Some(LabelSelector::parse(selector).map_err(StatusError::bad_request)?);
        }
        if let Some(selector) = &query.field_selector {
            filter.fields = Some(FieldSelector::parse(selector).map_err(StatusError::bad_request)?);
        }
        Ok(filter)
    }
}

#[derive(Debug, Default)]
struct Query {
    watch: bool,
    resource_version: Option<String>,
    label_selector: Option<String>,
    field_selector: Option<String>,
    limit: Option<String>,
    continue_token: Option<String>,
}

impl Query {
    fn parse(query: Option<&str>) -> Self {
        let mut parsed = Self::default();
        let Some(query) = query else {
            return parsed;
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "watch" => parsed.watch = value == "true" || value == "1",
                "resourceVersion" => parsed.resource_version = Some(value.into_owned()),
                "labelSelector" => parsed.label_selector = Some(value.into_owned()),
                "fieldSelector" => parsed.field_selector = Some(value.into_owned()),
                "limit" => parsed.limit = Some(value.into_owned()),
                "continue" => parsed.continue_token = Some(value.into_owned()),
                _ => {}
            }
        }
        parsed
    }

    fn limit(&self) -> Result<Option<usize>, StatusError> {
        self.limit
            .as_deref()
            .map(|l| {
                l.parse::<usize>()
                    .map_err(|_| StatusError::bad_request(format!("invalid limit: {}", l)))
            })
            .transpose()
    }

    /// The `(namespace, name)` key a continued list resumes after
    fn continue_after(&self) -> Result<Option<(String, String)>, StatusError> {
        let Some(token) = self.continue_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        match token.split_once('/') {
            Some((namespace, name)) if !name.is_empty() && !name.contains('/') => {
                Ok(Some((namespace.to_string(), name.to_string())))
            }
            _ => Err(StatusError::bad_request(format!("continue key is not valid: {}", token))),
        }
    }
}

/// Position of an object in list order; cluster-scoped objects sort first
fn page_key(obj: &Value) -> (String, String) {
    let field = |name: &str| {
        obj.get("metadata")
            .and_then(|m| m.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("namespace"), field("name"))
}

fn parse_json(body: &[u8]) -> Result<Value, StatusError> {
    serde_json::from_slice(body).map_err(|e| StatusError::bad_request(format!("invalid JSON body: {}", e)))
}

fn list_json(kind: &RegisteredKind, items: Vec<Value>, resource_version: u64) -> Value {
    json!({
        "apiVersion": kind.resource.api_version,
        "kind": format!("{}List", kind.resource.kind),
        "metadata": {"resourceVersion": resource_version.to_string()},
        "items": items
    })
}

fn with_json_content(status: StatusCode, body: FakeBody) -> Response<FakeBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn json_response(status: StatusCode, value: &Value) -> Response<FakeBody> {
    let body = Full::new(Bytes::from(value.to_string())).boxed_unsync();
    with_json_content(status, body)
}

fn status_response(error: &StatusError) -> Response<FakeBody> {
    let status = StatusCode::from_u16(error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &error.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::scheme;
    use tower::ServiceExt;

    fn server() -> FakeApiServer {
        let scheme = Scheme::from_fns(&[scheme::kubernetes, crate::types::post::add_to_scheme]).unwrap();
        FakeApiServer::new(Arc::new(scheme))
    }

    fn request(method: &str, uri: &str, content_type: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string().into_bytes()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(server: &FakeApiServer, req: Request<Body>) -> (StatusCode, Value) {
        let response = server.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn pod(name: &str, labels: Value) -> Value {
        json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name, "labels": labels}})
    }

    #[test]
    fn test_route_parse() {
        let scheme = Scheme::from_fns(&[scheme::kubernetes, crate::types::post::add_to_scheme]).unwrap();

        let route = Route::parse(&scheme, "/api/v1/namespaces/ns/pods/my-pod/status").unwrap();
        assert_eq!(route.kind.resource.kind, "Pod");
        assert_eq!(route.namespace.as_deref(), Some("ns"));
        assert_eq!(route.name.as_deref(), Some("my-pod"));
        assert_eq!(route.subresource.as_deref(), Some("status"));

        let route = Route::parse(&scheme, "/api/v1/namespaces/team-a").unwrap();
        assert_eq!(route.kind.resource.kind, "Namespace");
        assert_eq!(route.name.as_deref(), Some("team-a"));
        assert!(route.namespace.is_none());

        let route = Route::parse(&scheme, "/api/v1/namespaces/team-a/status").unwrap();
        assert_eq!(route.kind.resource.kind, "Namespace");
        assert_eq!(route.subresource.as_deref(), Some("status"));

        let route = Route::parse(&scheme, "/apis/post.funny.com/v1/posts").unwrap();
        assert_eq!(route.kind.resource.kind, "Post");
        assert!(route.namespace.is_none());
        assert!(route.name.is_none());

        assert!(Route::parse(&scheme, "/apis/unknown.io/v1/things").is_none());
        assert!(Route::parse(&scheme, "/api/v1/namespaces/ns/pods/p/log").is_none());
        assert!(Route::parse(&scheme, "/healthz").is_none());
    }

    #[test]
    fn test_query_parse() {
        let query = Query::parse(Some("watch=true&resourceVersion=12&labelSelector=app%3Dweb"));
        assert!(query.watch);
        assert_eq!(query.resource_version.as_deref(), Some("12"));
        assert_eq!(query.label_selector.as_deref(), Some("app=web"));
        assert!(query.field_selector.is_none());

        let query = Query::parse(Some("limit=abc"));
        assert_eq!(query.limit().unwrap_err().code, 400);
        let query = Query::parse(Some("limit=2&continue=ns%2Fp1"));
        assert_eq!(query.limit().unwrap(), Some(2));
        assert_eq!(query.continue_after().unwrap(), Some(("ns".to_string(), "p1".to_string())));
        assert_eq!(Query::parse(Some("continue=garbage")).continue_after().unwrap_err().code, 400);
    }

    #[tokio::test]
    async fn test_unknown_resource_is_not_found() {
        let (status, body) = call(&server(), get("/apis/unknown.io/v1/things")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "Status");
        assert_eq!(body["reason"], "NotFound");
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let server = server();
        let (status, created) = call(
            &server,
            request("POST", "/api/v1/namespaces/ns/pods", "application/json", pod("p", json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["metadata"]["namespace"], "ns");

        let (status, fetched) = call(&server, get("/api/v1/namespaces/ns/pods/p")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["metadata"]["uid"], created["metadata"]["uid"]);
    }

    #[tokio::test]
    async fn test_list_with_label_selector() {
        let server = server();
        for (name, app) in [("a", "web"), ("b", "db"), ("c", "web")] {
            let body = pod(name, json!({"app": app}));
            call(&server, request("POST", "/api/v1/namespaces/ns/pods", "application/json", body)).await;
        }

        let (status, list) = call(&server, get("/api/v1/namespaces/ns/pods?labelSelector=app%3Dweb")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["kind"], "PodList");
        assert_eq!(list["metadata"]["resourceVersion"], "3");
        let names: Vec<_> = list["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["metadata"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_invalid_selector_is_bad_request() {
        let (status, _) = call(&server(), get("/api/v1/pods?labelSelector=env%20in%20(dev")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patch_content_types() {
        let server = server();
        call(
            &server,
            request("POST", "/api/v1/namespaces/ns/pods", "application/json", pod("p", json!({}))),
        )
        .await;

        let (status, patched) = call(
            &server,
            request(
                "PATCH",
                "/api/v1/namespaces/ns/pods/p",
                "application/merge-patch+json",
                json!({"metadata": {"labels": {"app": "web"}}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["metadata"]["labels"]["app"], "web");

        let (status, _) = call(
            &server,
            request("PATCH", "/api/v1/namespaces/ns/pods/p", "text/plain", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_namespaced_kind_requires_namespace() {
        let (status, _) = call(&server(), get("/api/v1/pods/p")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let server = server();
        let req = request("POST", "/api/v1/namespaces/ns/pods/p", "application/json", json!({}));
        let (status, body) = call(&server, req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["code"], 405);
    }

    #[tokio::test]
    async fn test_watch_replays_and_streams() {
        let server = server();
        call(
            &server,
            request("POST", "/api/v1/namespaces/ns/pods", "application/json", pod("first", json!({}))),
        )
        .await;

        let response = server
            .clone()
            .oneshot(get("/api/v1/namespaces/ns/pods?watch=true&resourceVersion=0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body();

        let line = body.frame().await.unwrap().unwrap().into_data().unwrap();
        let event: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(event["type"], "ADDED");
        assert_eq!(event["object"]["metadata"]["name"], "first");

        call(
            &server,
            request("POST", "/api/v1/namespaces/other/pods", "application/json", pod("elsewhere", json!({}))),
        )
        .await;
        call(
            &server,
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/namespaces/ns/pods/first")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        let line = body.frame().await.unwrap().unwrap().into_data().unwrap();
        let event: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(event["type"], "DELETED");
        assert_eq!(event["object"]["metadata"]["name"], "first");
    }

    async fn create_pods(server: &FakeApiServer, pods: &[(&str, &str, &str)]) {
        for (namespace, name, app) in pods {
            let uri = format!("/api/v1/namespaces/{}/pods", namespace);
            let body = pod(name, json!({"app": app}));
            call(server, request("POST", &uri, "application/json", body)).await;
        }
    }

    fn names(list: &Value) -> Vec<String> {
        list["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["metadata"]["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_list_pages_with_limit_and_continue() {
        let server = server();
        create_pods(&server, &[("a", "p1", "web"), ("a", "p2", "web"), ("b", "p3", "web")]).await;

        let (status, page) = call(&server, get("/api/v1/pods?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&page), vec!["p1", "p2"]);
        assert_eq!(page["metadata"]["remainingItemCount"], 1);
        let token = page["metadata"]["continue"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/pods?limit=2&continue={}", token.replace('/', "%2F"));
        let (status, page) = call(&server, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&page), vec!["p3"]);
        assert!(page["metadata"].get("continue").is_none());

        let (_, page) = call(&server, get("/api/v1/pods?limit=0")).await;
        assert_eq!(names(&page).len(), 3);

        let (status, _) = call(&server, get("/api/v1/pods?limit=1&continue=nonsense")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    async fn next_event(body: &mut FakeBody) -> Value {
        let line = body.frame().await.unwrap().unwrap().into_data().unwrap();
        serde_json::from_slice(&line).unwrap()
    }

    #[tokio::test]
    async fn test_watch_reports_objects_leaving_the_selector() {
        let server = server();
        create_pods(&server, &[("ns", "p", "web")]).await;

        let response = server
            .clone()
            .oneshot(get("/api/v1/namespaces/ns/pods?watch=true&resourceVersion=0&labelSelector=app%3Dweb"))
            .await
            .unwrap();
        let mut body = response.into_body();
        assert_eq!(next_event(&mut body).await["type"], "ADDED");

        let relabel = |app: &str| {
            request(
                "PATCH",
                "/api/v1/namespaces/ns/pods/p",
                "application/merge-patch+json",
                json!({"metadata": {"labels": {"app": app}}}),
            )
        };
        call(&server, relabel("db")).await;
        let event = next_event(&mut body).await;
        assert_eq!(event["type"], "DELETED");
        assert_eq!(event["object"]["metadata"]["labels"]["app"], "db");

        call(&server, relabel("web")).await;
        assert_eq!(next_event(&mut body).await["type"], "ADDED");
    }

    #[tokio::test]
    async fn test_watch_from_evicted_version_is_expired() {
        let server = server();
        for i in 0..crate::constants::fake::EVENT_HISTORY_CAPACITY + 2 {
            let uri = "/api/v1/namespaces/ns/pods";
            call(&server, request("POST", uri, "application/json", pod(&format!("p{}", i), json!({})))).await;
        }

        let response = server
            .clone()
            .oneshot(get("/api/v1/namespaces/ns/pods?watch=true&resourceVersion=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body();
        let event = next_event(&mut body).await;
        assert_eq!(event["type"], "ERROR");
        assert_eq!(event["object"]["code"], 410);
        assert_eq!(event["object"]["reason"], "Expired");
        assert!(body.frame().await.is_none());

        let response = server
            .clone()
            .oneshot(get("/api/v1/namespaces/ns/pods?watch=true&resourceVersion=2"))
            .await
            .unwrap();
        let mut body = response.into_body();
        assert_eq!(next_event(&mut body).await["type"], "ADDED");
    }
}
