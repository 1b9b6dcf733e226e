#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! C2 (store writer) and C3 (aggregation chain) — the two reconcilers that
//! turn routed source endpoints into the final per-portal FQDN view (§4.2,
//! §4.3).

mod aggregate;
mod writer;

pub use self::aggregate::{aggregate_portal, AggregateError};
pub use self::writer::{source_record_name, sync_bucket, WriterError};

use dns_portal_controller_core::{GroupMappingConfig, SourceKind};
use dns_portal_controller_k8s_api::annotations::GROUPS_ANNOTATION;
use dns_portal_controller_k8s_api::config::Config;
use std::str::FromStr;

/// The subset of [`Config`] the aggregation chain needs, translated into
/// `core` types once per tick rather than re-parsed per portal.
#[derive(Clone, Debug)]
pub struct GroupMappingSettings {
    pub priority: Vec<SourceKind>,
    pub group_mapping: GroupMappingConfig,
}

impl GroupMappingSettings {
    pub fn from_config(config: &Config) -> Self {
        let priority = config
            .sources
            .priority
            .iter()
            .filter_map(|kind| SourceKind::from_str(kind).ok())
            .collect();

        GroupMappingSettings {
            priority,
            group_mapping: GroupMappingConfig {
                groups_label: GROUPS_ANNOTATION.to_string(),
                label_key: config.group_mapping.label_key.clone(),
                by_namespace: config.group_mapping.by_namespace.clone(),
                default_group: config.group_mapping.default_group.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_priority_entries_are_dropped() {
        let mut config = Config::default();
        config.sources.priority = vec!["service".to_string(), "bogus".to_string()];
        let settings = GroupMappingSettings::from_config(&config);
        assert_eq!(settings.priority, vec![SourceKind::Service]);
    }
}
