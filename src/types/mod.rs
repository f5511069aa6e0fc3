// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource definitions used as fixtures for the client.

pub mod post;

pub use post::{Post, PostSpec, PostStatus};
