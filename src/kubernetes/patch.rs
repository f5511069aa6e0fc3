// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! JSON merge patch (RFC 7386) helpers.

use crate::error::Result;
use kube::api::Patch;
use serde::Serialize;
use serde_json::{Map, Value};

/// Build a merge patch that turns `original` into `modified`.
pub fn merge_from<T: Serialize>(original: &T, modified: &T) -> Result<Patch<Value>> {
    let original = serde_json::to_value(original)?;
    let modified = serde_json::to_value(modified)?;
    Ok(Patch::Merge(create_merge_patch(&original, &modified)))
}

/// Compute the RFC 7386 difference between two JSON documents.
///
/// Removed keys become `null`, nested objects are diffed recursively, and
/// everything else (arrays included) is replaced wholesale.
pub fn create_merge_patch(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();
            for key in original.keys() {
                if !modified.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, value) in modified {
                match original.get(key) {
                    Some(old) if old == value => {}
                    Some(old @ Value::Object(_)) if value.is_object() => {
                        patch.insert(key.clone(), create_merge_patch(old, value));
                    }
                    _ => {
                        patch.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(patch)
        }
        (_, modified) => modified.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
    use kube::api::ObjectMeta;
    use serde_json::json;

    #[test]
    fn test_unchanged_is_empty() {
        let doc = json!({"a": 1, "b": {"c": 2}});
        assert_eq!(create_merge_patch(&doc, &doc), json!({}));
    }

    #[test]
    fn test_removed_key_is_null() {
        let patch = create_merge_patch(&json!({"a": 1, "b": 2}), &json!({"a": 1}));
        assert_eq!(patch, json!({"b": null}));
    }

    #[test]
    fn test_nested_objects_are_diffed() {
        let patch = create_merge_patch(
            &json!({"spec": {"replicas": 1, "paused": false}}),
            &json!({"spec": {"replicas": 3, "paused": false}}),
        );
        assert_eq!(patch, json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn test_arrays_are_replaced() {
        let patch = create_merge_patch(&json!({"a": [1, 2]}), &json!({"a": [1, 2, 3]}));
        assert_eq!(patch, json!({"a": [1, 2, 3]}));
    }

    #[test]
    fn test_patch_applies_back_to_modified() {
        let original = json!({"a": {"b": 1, "c": [1]}, "d": "x"});
        let modified = json!({"a": {"b": 2}, "e": true});

        let patch = create_merge_patch(&original, &modified);
        let mut doc = original.clone();
        json_patch::merge(&mut doc, &patch);

        assert_eq!(doc, modified);
    }

    #[test]
    fn test_merge_from_pod_image_change() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("my-pod".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "my-container".to_string(),
                    image: Some("nginx:latest".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut modified = pod.clone();
        modified.spec.as_mut().unwrap().containers[0].image = Some("nginx:modified".to_string());

        let Patch::Merge(patch) = merge_from(&pod, &modified).unwrap() else {
            panic!("expected a merge patch");
        };
        assert_eq!(patch["spec"]["containers"][0]["image"], "nginx:modified");
        assert!(patch.get("metadata").is_none());
    }
}
