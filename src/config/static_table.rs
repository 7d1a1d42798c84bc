// ABOUTME: In-memory host-alias table, optionally loaded from YAML.
// ABOUTME: Lets callers describe bastion hosts without an ssh_config file.

use super::HostConfig;
use crate::error::Result;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// Host-alias configuration held in memory.
///
/// The YAML form maps each alias to its ssh_config-style keys:
///
/// ```yaml
/// bastion:
///   Port: 22
///   User: ops
///   PubkeyAuthentication: yes
///   IdentityFile: ~/.ssh/id_ed25519
/// ```
///
/// Unlike [`SshConfig`](super::SshConfig) there are no wildcard blocks
/// and no defaults: unset keys read as empty.
#[derive(Debug, Clone, Default)]
pub struct StaticHostConfig {
    hosts: HashMap<String, HashMap<String, String>>,
}

impl StaticHostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` for `alias`, replacing any previous value.
    pub fn set(
        mut self,
        alias: impl Into<String>,
        key: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Self {
        self.hosts
            .entry(alias.into())
            .or_default()
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, Value>> = serde_yaml::from_str(yaml)?;
        let hosts = raw
            .into_iter()
            .map(|(alias, entries)| {
                let entries = entries
                    .into_iter()
                    .filter_map(|(key, value)| {
                        scalar_to_string(&value).map(|v| (key.to_ascii_lowercase(), v))
                    })
                    .collect();
                (alias, entries)
            })
            .collect();
        Ok(Self { hosts })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}

impl HostConfig for StaticHostConfig {
    fn get(&self, alias: &str, key: &str) -> String {
        self.hosts
            .get(alias)
            .and_then(|entries| entries.get(&key.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Render a YAML scalar the way it would be written in ssh_config.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("yes".to_string()),
        Value::Bool(false) => Some("no".to_string()),
        Value::Sequence(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            Some(parts.join(","))
        }
        _ => None,
    }
}
