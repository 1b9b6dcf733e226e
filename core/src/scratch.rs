use crate::Group;

/// Carries the aggregation chain's intermediate state across its four phases
/// (§4.3, §9): a typed replacement for passing a dynamic map between phases.
/// Each phase consumes the previous phase's field and populates its own.
#[derive(Clone, Debug, Default)]
pub struct AggregationScratch {
    /// Phase A (Aggregate): per-group FQDNs deduped from `SourceRecord`s by
    /// source priority, not yet merged with manual records.
    pub external_groups: Vec<Group>,
    /// Phase B (Collect): per-group FQDNs collected from `ManualDNS` objects.
    pub manual_groups: Vec<Group>,
    /// Phase C (Merge): `external_groups` and `manual_groups` combined per
    /// group name, manual entries winning same-name conflicts.
    pub merged_groups: Vec<Group>,
    /// Phase D (Resolve DNS): `merged_groups` with each FQDN's `SyncStatus`
    /// filled in from a live lookup. This is the chain's final output.
    pub resolved_groups: Vec<Group>,
}

impl AggregationScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_external_groups(mut self, groups: Vec<Group>) -> Self {
        self.external_groups = groups;
        self
    }

    pub fn with_manual_groups(mut self, groups: Vec<Group>) -> Self {
        self.manual_groups = groups;
        self
    }

    pub fn with_merged_groups(mut self, groups: Vec<Group>) -> Self {
        self.merged_groups = groups;
        self
    }

    pub fn with_resolved_groups(mut self, groups: Vec<Group>) -> Self {
        self.resolved_groups = groups;
        self
    }

    /// Consumes the scratch, returning Phase D's output. Panics is not
    /// possible: an empty `resolved_groups` is a legitimate "no groups" state.
    pub fn into_resolved(self) -> Vec<Group> {
        self.resolved_groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupSource;

    fn group(name: &str) -> Group {
        Group {
            name: name.to_string(),
            description: None,
            source: GroupSource::ExternalDns,
            fqdns: vec![],
        }
    }

    #[test]
    fn phases_chain_through_builder() {
        let scratch = AggregationScratch::new()
            .with_external_groups(vec![group("a")])
            .with_manual_groups(vec![group("b")])
            .with_merged_groups(vec![group("a"), group("b")])
            .with_resolved_groups(vec![group("a"), group("b")]);

        assert_eq!(scratch.external_groups.len(), 1);
        assert_eq!(scratch.manual_groups.len(), 1);
        assert_eq!(scratch.into_resolved().len(), 2);
    }
}
