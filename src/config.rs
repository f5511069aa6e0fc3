// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::env as vars;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Watcher configuration loaded from environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Kubeconfig to load; in-cluster configuration when `None`
    pub kube_credential_file: Option<PathBuf>,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("{} environment variable is invalid", key)),
        })
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        // Empty values count as unset
        let get = |key: &str| -> Result<Option<String>> {
            Ok(lookup(key)?.filter(|v| !v.trim().is_empty()))
        };

        let kube_credential_file = get(vars::KUBE_CREDENTIAL_FILE)?.map(PathBuf::from);
        if let Some(path) = &kube_credential_file {
            if !path.is_file() {
                anyhow::bail!(
                    "{} points to {}, which is not a file",
                    vars::KUBE_CREDENTIAL_FILE,
                    path.display()
                );
            }
        }

        Ok(Config {
            kube_credential_file,
            namespace: get(vars::NAMESPACE)?,
            label_selector: get(vars::LABEL_SELECTOR)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| Ok(vars.get(key).cloned()))
    }

    #[test]
    fn test_defaults_to_in_cluster() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let kubeconfig = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/kubeconfig");
        let config = load(&[
            (vars::KUBE_CREDENTIAL_FILE, kubeconfig),
            (vars::NAMESPACE, "team-a"),
            (vars::LABEL_SELECTOR, "app=web"),
        ])
        .unwrap();

        assert_eq!(config.kube_credential_file, Some(PathBuf::from(kubeconfig)));
        assert_eq!(config.namespace.as_deref(), Some("team-a"));
        assert_eq!(config.label_selector.as_deref(), Some("app=web"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = load(&[(vars::NAMESPACE, ""), (vars::KUBE_CREDENTIAL_FILE, " ")]).unwrap();
        assert!(config.namespace.is_none());
        assert!(config.kube_credential_file.is_none());
    }

    #[test]
    fn test_missing_credential_file() {
        let err = load(&[(vars::KUBE_CREDENTIAL_FILE, "/does/not/exist")]).unwrap_err();
        assert!(err.to_string().contains(vars::KUBE_CREDENTIAL_FILE));
    }
}
