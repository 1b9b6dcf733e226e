use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;

use crate::SyncStatus;

/// What a live lookup for an FQDN returned, collapsed to the shape we compare
/// against expected targets (§4.3.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedAnswer {
    Cname(String),
    Addresses(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no records found for {0}")]
    NotFound(String),
    #[error("dns lookup failed: {0}")]
    Resolve(#[from] ResolveError),
}

/// Abstracts live DNS resolution so the aggregation chain can be tested
/// without a real resolver (§2 ambient stack).
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, fqdn: &str) -> Result<ResolvedAnswer, LookupError>;
}

/// `hickory-resolver`-backed implementation used in production.
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Builds a resolver from the system configuration (`/etc/resolv.conf`
    /// on Linux), falling back to the given defaults if that can't be read.
    pub fn from_system_conf() -> Result<Self, LookupError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .or_else(|_| Ok::<_, ResolveError>(TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())))?;
        Ok(HickoryResolver { inner })
    }

    pub fn new(config: ResolverConfig, opts: ResolverOpts) -> Self {
        HickoryResolver {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn resolve(&self, fqdn: &str) -> Result<ResolvedAnswer, LookupError> {
        if let Ok(lookup) = self.inner.cname_lookup(fqdn).await {
            if let Some(target) = lookup.iter().next() {
                return Ok(ResolvedAnswer::Cname(target.to_string()));
            }
        }

        match self.inner.lookup_ip(fqdn).await {
            Ok(lookup) => {
                let addrs: Vec<String> = lookup.iter().map(|ip| ip.to_string()).collect();
                if addrs.is_empty() {
                    Err(LookupError::NotFound(fqdn.to_string()))
                } else {
                    Ok(ResolvedAnswer::Addresses(addrs))
                }
            }
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Err(LookupError::NotFound(fqdn.to_string())),
                _ => Err(LookupError::Resolve(err)),
            },
        }
    }
}

/// Normalizes a DNS name for comparison: lowercased, trailing dot stripped.
fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Classifies an FQDN's [`SyncStatus`] by comparing expected targets against
/// a live lookup (§4.3.3, lines 126-128): no records (or any other resolve
/// failure) is `notavailable`; for manual entries with no declared targets,
/// a successful lookup means `sync` regardless of what it returned — mere
/// existence is enough; otherwise exact match (order-insensitive) is `sync`
/// and a present-but-differing answer is `notsync`. `unchecked` is not a
/// live-lookup outcome — it's reserved for remote-sourced groups that were
/// never locally resolved at all.
pub fn classify_sync_status(
    expected_targets: &[String],
    resolved: &Result<ResolvedAnswer, LookupError>,
) -> SyncStatus {
    match resolved {
        Err(LookupError::NotFound(_)) => SyncStatus::NotAvailable,
        Err(LookupError::Resolve(_)) => SyncStatus::NotAvailable,
        Ok(_) if expected_targets.is_empty() => SyncStatus::Sync,
        Ok(ResolvedAnswer::Cname(target)) => {
            if expected_targets.len() == 1 && normalize(&expected_targets[0]) == normalize(target) {
                SyncStatus::Sync
            } else {
                SyncStatus::NotSync
            }
        }
        Ok(ResolvedAnswer::Addresses(addrs)) => {
            let mut got: Vec<String> = addrs.iter().map(|a| normalize(a)).collect();
            let mut want: Vec<String> = expected_targets.iter().map(|a| normalize(a)).collect();
            got.sort();
            want.sort();
            if got == want {
                SyncStatus::Sync
            } else {
                SyncStatus::NotSync
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_addresses_are_sync() {
        let resolved = Ok(ResolvedAnswer::Addresses(vec![
            "10.0.0.2".into(),
            "10.0.0.1".into(),
        ]));
        let expected = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        assert_eq!(classify_sync_status(&expected, &resolved), SyncStatus::Sync);
    }

    #[test]
    fn differing_addresses_are_notsync() {
        let resolved = Ok(ResolvedAnswer::Addresses(vec!["10.0.0.9".into()]));
        let expected = vec!["10.0.0.1".to_string()];
        assert_eq!(
            classify_sync_status(&expected, &resolved),
            SyncStatus::NotSync
        );
    }

    #[test]
    fn matching_cname_ignores_trailing_dot_and_case() {
        let resolved = Ok(ResolvedAnswer::Cname("LB.Example.com.".into()));
        let expected = vec!["lb.example.com".to_string()];
        assert_eq!(classify_sync_status(&expected, &resolved), SyncStatus::Sync);
    }

    #[test]
    fn no_declared_targets_is_sync_on_any_answer() {
        let resolved = Ok(ResolvedAnswer::Addresses(vec!["10.0.0.9".into()]));
        assert_eq!(classify_sync_status(&[], &resolved), SyncStatus::Sync);
    }

    #[test]
    fn not_found_is_notavailable() {
        let resolved = Err(LookupError::NotFound("x.example.com".to_string()));
        assert_eq!(
            classify_sync_status(&[], &resolved),
            SyncStatus::NotAvailable
        );
    }
}
