// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Sample `Post` custom resource used to exercise the client against a CRD.

use crate::error::Result;
use crate::kubernetes::Scheme;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "post.funny.com";
pub const VERSION: &str = "v1";
pub const KIND: &str = "Post";
pub const RESOURCE: &str = "posts";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "post.funny.com", version = "v1", kind = "Post")]
#[kube(namespaced)]
#[kube(status = "PostStatus")]
pub struct PostSpec {
    /// When the post should go out; RFC 3339 on the wire
    pub post_at: Time,
    pub text: String,
}

/// Whether an operator processed the post, per platform
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct PostStatus {
    #[serde(default)]
    pub posted_on_twitter: bool,
    #[serde(default)]
    pub posted_on_facebook: bool,
    #[serde(default)]
    pub posted_on_instagram: bool,
}

/// Adds the `post.funny.com/v1` kinds to the given scheme.
pub fn add_to_scheme(scheme: &mut Scheme) -> Result<()> {
    scheme.add::<Post>()
}
