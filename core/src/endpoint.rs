use std::collections::BTreeMap;
use std::fmt;

/// One of the source kinds a cluster-resident endpoint can be discovered from (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Service,
    Ingress,
    DnsEndpoint,
    MeshGateway,
    MeshVirtualService,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Service,
        SourceKind::Ingress,
        SourceKind::DnsEndpoint,
        SourceKind::MeshGateway,
        SourceKind::MeshVirtualService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Service => "service",
            SourceKind::Ingress => "ingress",
            SourceKind::DnsEndpoint => "dnsendpoint",
            SourceKind::MeshGateway => "mesh-gateway",
            SourceKind::MeshVirtualService => "mesh-virtualservice",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(SourceKind::Service),
            "ingress" => Ok(SourceKind::Ingress),
            "dnsendpoint" => Ok(SourceKind::DnsEndpoint),
            "mesh-gateway" => Ok(SourceKind::MeshGateway),
            "mesh-virtualservice" => Ok(SourceKind::MeshVirtualService),
            other => Err(UnknownSourceKind(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown source kind: {0}")]
pub struct UnknownSourceKind(pub String);

/// DNS record type. Unset (`None`) means "infer from target shape", as plain
/// Service/Ingress sources don't always carry an explicit type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown record type: {0}")]
pub struct UnknownRecordType(pub String);

impl std::str::FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "TXT" => Ok(RecordType::Txt),
            other => Err(UnknownRecordType(other.to_string())),
        }
    }
}

/// Identifies the Kubernetes-shaped object an endpoint or FQDN originated from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    /// Parses a `kind/namespace/name` resource label. Malformed labels yield `None`
    /// (§4.3.2: "malformed labels yield no originRef").
    pub fn parse(label: &str) -> Option<Self> {
        let mut parts = label.splitn(3, '/');
        let kind = parts.next()?;
        let namespace = parts.next()?;
        let name = parts.next()?;
        if kind.is_empty() || namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(ResourceRef {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

/// A single discovered DNS endpoint, as yielded by a source adapter before
/// enrichment (§4.1 steps 3-4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: Option<RecordType>,
    pub targets: Vec<String>,
    pub ttl: Option<i64>,
    pub labels: BTreeMap<String, String>,
    pub resource: ResourceRef,
}

impl Endpoint {
    /// True when the endpoint carries the literal `ignore` annotation value (§4.1 step 5, §6).
    pub fn is_ignored(&self, ignore_label: &str) -> bool {
        self.labels
            .get(ignore_label)
            .is_some_and(|v| v == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_resource_ref() {
        let r = ResourceRef::parse("Service/default/api").unwrap();
        assert_eq!(r.kind, "Service");
        assert_eq!(r.namespace, "default");
        assert_eq!(r.name, "api");
    }

    #[test]
    fn rejects_malformed_resource_ref() {
        assert!(ResourceRef::parse("Service/default").is_none());
        assert!(ResourceRef::parse("").is_none());
        assert!(ResourceRef::parse("//name").is_none());
    }

    #[test]
    fn ignore_label_is_exact_match() {
        let mut labels = BTreeMap::new();
        labels.insert("ignore".to_string(), "true".to_string());
        let ep = Endpoint {
            dns_name: "a.example.com".into(),
            record_type: None,
            targets: vec![],
            ttl: None,
            labels,
            resource: ResourceRef {
                kind: "Service".into(),
                namespace: "default".into(),
                name: "a".into(),
            },
        };
        assert!(ep.is_ignored("ignore"));

        let mut ep2 = ep.clone();
        ep2.labels.insert("ignore".to_string(), "yes".to_string());
        assert!(!ep2.is_ignored("ignore"));
    }
}
