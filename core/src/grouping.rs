use std::collections::BTreeMap;

/// Static configuration for the group-mapping fallback chain (§4.3.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMappingConfig {
    /// Annotation/label key carrying an explicit, comma-separated group list.
    pub groups_label: String,
    /// Label key whose value becomes the sole group name, when present.
    pub label_key: Option<String>,
    /// Namespace -> group name overrides, consulted before `default_group`.
    pub by_namespace: BTreeMap<String, String>,
    /// Final fallback when nothing else resolves.
    pub default_group: String,
}

impl Default for GroupMappingConfig {
    fn default() -> Self {
        GroupMappingConfig {
            groups_label: "groups".to_string(),
            label_key: None,
            by_namespace: BTreeMap::new(),
            default_group: "default".to_string(),
        }
    }
}

/// Resolves an endpoint's labels and namespace to the group(s) it belongs to,
/// walking the fallback chain: explicit groups annotation, then labelKey,
/// then byNamespace, then defaultGroup (§4.3.2).
#[derive(Clone, Debug)]
pub struct GroupMapping {
    config: GroupMappingConfig,
}

impl GroupMapping {
    pub fn new(config: GroupMappingConfig) -> Self {
        GroupMapping { config }
    }

    /// Returns the ordered, deduplicated list of group names `labels`/`namespace`
    /// resolve to. Never empty: the chain always bottoms out at `defaultGroup`.
    pub fn resolve(&self, labels: &BTreeMap<String, String>, namespace: &str) -> Vec<String> {
        if let Some(raw) = labels.get(&self.config.groups_label) {
            let groups: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !groups.is_empty() {
                return dedup(groups);
            }
        }

        if let Some(key) = &self.config.label_key {
            if let Some(value) = labels.get(key) {
                if !value.is_empty() {
                    return vec![value.clone()];
                }
            }
        }

        if let Some(group) = self.config.by_namespace.get(namespace) {
            return vec![group.clone()];
        }

        vec![self.config.default_group.clone()]
    }
}

fn dedup(groups: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    groups.into_iter().filter(|g| seen.insert(g.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn explicit_groups_label_wins_and_splits_on_comma() {
        let mapping = GroupMapping::new(GroupMappingConfig::default());
        let labels = labels(&[("groups", "team-a, team-b ,team-a")]);
        assert_eq!(mapping.resolve(&labels, "default"), vec!["team-a", "team-b"]);
    }

    #[test]
    fn falls_back_to_label_key() {
        let mapping = GroupMapping::new(GroupMappingConfig {
            label_key: Some("team".to_string()),
            ..GroupMappingConfig::default()
        });
        let labels = labels(&[("team", "payments")]);
        assert_eq!(mapping.resolve(&labels, "default"), vec!["payments"]);
    }

    #[test]
    fn falls_back_to_namespace_override() {
        let mapping = GroupMapping::new(GroupMappingConfig {
            by_namespace: labels(&[("payments-ns", "Payments")]),
            ..GroupMappingConfig::default()
        });
        assert_eq!(
            mapping.resolve(&BTreeMap::new(), "payments-ns"),
            vec!["Payments"]
        );
    }

    #[test]
    fn falls_back_to_default_group() {
        let mapping = GroupMapping::new(GroupMappingConfig::default());
        assert_eq!(
            mapping.resolve(&BTreeMap::new(), "anything"),
            vec!["default"]
        );
    }

    #[test]
    fn empty_groups_label_value_falls_through() {
        let mapping = GroupMapping::new(GroupMappingConfig {
            by_namespace: labels(&[("ns", "Namespaced")]),
            ..GroupMappingConfig::default()
        });
        let labels = labels(&[("groups", "  , ,")]);
        assert_eq!(mapping.resolve(&labels, "ns"), vec!["Namespaced"]);
    }
}
