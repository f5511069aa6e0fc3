// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod error;
pub mod fake;
pub mod kubernetes;
pub mod types;

pub use error::{GenkubeError, Result};
pub use kubernetes::Client;
