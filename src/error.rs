// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::core::GroupVersionKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenkubeError {
    /// Returned by the constructors before any network activity.
    #[error("add_to_scheme functions are empty, register e.g. core/v1 or other CRD groups")]
    NoScheme,

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Failed to load in-cluster config: {0}")]
    InCluster(#[from] kube::config::InClusterError),

    #[error("No kind is registered for {0:?} in scheme")]
    NotRegistered(GroupVersionKind),

    #[error("Scheme conflict: {0}")]
    SchemeConflict(String),

    #[error("Failed to seed fake object: {0}")]
    FakeSeed(String),

    #[error("Failed to serialize object: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GenkubeError>;
