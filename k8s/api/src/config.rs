//! Configuration file schema (§6, §3.3). Loading the file and watching it
//! for changes are external collaborators; only the schema and a one-shot
//! loader live here.

use crate::duration::K8sDuration;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub group_mapping: GroupMappingConfig,
    pub reconciliation: ReconciliationConfig,
}

impl Config {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(file)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourcesConfig {
    pub service: SourceConfig,
    pub ingress: SourceConfig,
    pub dns_endpoint: SourceConfig,
    pub istio_gateway: SourceConfig,
    pub istio_virtual_service: SourceConfig,
    /// Ordered list of source-kind identifiers (§4.3.1); empty means no priority.
    pub priority: Vec<String>,
}

impl SourcesConfig {
    /// `service` and `ingress` default to enabled; the rest default to disabled (§3.3).
    pub fn service_enabled(&self) -> bool {
        self.service.enabled.unwrap_or(true)
    }

    pub fn ingress_enabled(&self) -> bool {
        self.ingress.enabled.unwrap_or(true)
    }

    pub fn dns_endpoint_enabled(&self) -> bool {
        self.dns_endpoint.enabled.unwrap_or(false)
    }

    pub fn istio_gateway_enabled(&self) -> bool {
        self.istio_gateway.enabled.unwrap_or(false)
    }

    pub fn istio_virtual_service_enabled(&self) -> bool {
        self.istio_virtual_service.enabled.unwrap_or(false)
    }
}

/// Per-source-kind options; fields beyond `enabled`/`namespace` are passed
/// verbatim to the owning adapter.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub enabled: Option<bool>,
    /// Empty/unset means cluster-wide.
    pub namespace: Option<String>,
    pub service_type_filter: Vec<String>,
    pub ingress_class_names: Vec<String>,
    pub annotation_filter: Option<String>,
    pub label_filter: Option<String>,
    pub fqdn_template: Option<String>,
    pub ignore_hostname_annotation: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupMappingConfig {
    pub default_group: String,
    pub label_key: Option<String>,
    pub by_namespace: BTreeMap<String, String>,
}

impl Default for GroupMappingConfig {
    fn default() -> Self {
        GroupMappingConfig {
            default_group: "Services".to_string(),
            label_key: None,
            by_namespace: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconciliationConfig {
    pub interval: K8sDuration,
    pub retry_on_error: K8sDuration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        ReconciliationConfig {
            interval: Duration::from_secs(5 * 60).into(),
            retry_on_error: Duration::from_secs(30).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::from_reader("{}".as_bytes()).unwrap();
        assert!(config.sources.service_enabled());
        assert!(config.sources.ingress_enabled());
        assert!(!config.sources.dns_endpoint_enabled());
        assert_eq!(config.group_mapping.default_group, "Services");
        assert_eq!(
            Duration::from(config.reconciliation.interval),
            Duration::from_secs(300)
        );
        assert_eq!(
            Duration::from(config.reconciliation.retry_on_error),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
sources:
  service:
    enabled: true
  ingress:
    enabled: false
  dnsEndpoint:
    enabled: true
    namespace: dns-system
  priority: ["service", "ingress"]
groupMapping:
  defaultGroup: Apps
  labelKey: team
  byNamespace:
    payments: Payments
reconciliation:
  interval: 1m
  retryOnError: 5s
"#;
        let config = Config::from_reader(yaml.as_bytes()).unwrap();
        assert!(config.sources.service_enabled());
        assert!(!config.sources.ingress_enabled());
        assert!(config.sources.dns_endpoint_enabled());
        assert_eq!(
            config.sources.dns_endpoint.namespace.as_deref(),
            Some("dns-system")
        );
        assert_eq!(config.sources.priority, vec!["service", "ingress"]);
        assert_eq!(config.group_mapping.default_group, "Apps");
        assert_eq!(config.group_mapping.label_key.as_deref(), Some("team"));
        assert_eq!(
            config.group_mapping.by_namespace.get("payments").map(String::as_str),
            Some("Payments")
        );
        assert_eq!(
            Duration::from(config.reconciliation.interval),
            Duration::from_secs(60)
        );
        assert_eq!(
            Duration::from(config.reconciliation.retry_on_error),
            Duration::from_secs(5)
        );
    }
}
