//! Resolves a source endpoint's portal label into the portal it should be
//! attributed to (§4.1 step 5, §4.5).

use std::collections::BTreeSet;

/// Snapshot of known portal names, rebuilt from a `Portal` list each tick.
#[derive(Clone, Debug, Default)]
pub struct PortalLookup {
    main: String,
    local: BTreeSet<String>,
    remote: BTreeSet<String>,
}

impl PortalLookup {
    pub fn new(main: impl Into<String>) -> Self {
        let main = main.into();
        let mut local = BTreeSet::new();
        local.insert(main.clone());
        PortalLookup {
            main,
            local,
            remote: BTreeSet::new(),
        }
    }

    pub fn with_local(mut self, name: impl Into<String>) -> Self {
        self.local.insert(name.into());
        self
    }

    pub fn with_remote(mut self, name: impl Into<String>) -> Self {
        self.remote.insert(name.into());
        self
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.local.contains(name)
    }

    pub fn is_remote(&self, name: &str) -> bool {
        self.remote.contains(name)
    }

    pub fn local_portals(&self) -> impl Iterator<Item = &str> {
        self.local.iter().map(String::as_str)
    }
}

/// Routes an endpoint's `dnsportal.io/portal` annotation value to the portal
/// it belongs to: unset, unknown, or pointing at a remote portal all fall
/// back to `main`; anything naming a known local portal routes there.
pub fn route(portal_label: Option<&str>, lookup: &PortalLookup) -> String {
    match portal_label {
        Some(name) if lookup.is_local(name) => name.to_string(),
        _ => lookup.main().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> PortalLookup {
        PortalLookup::new("main")
            .with_local("billing")
            .with_remote("partner-a")
    }

    #[test]
    fn no_label_routes_to_main() {
        assert_eq!(route(None, &lookup()), "main");
    }

    #[test]
    fn known_local_portal_routes_to_itself() {
        assert_eq!(route(Some("billing"), &lookup()), "billing");
    }

    #[test]
    fn unknown_portal_falls_back_to_main() {
        assert_eq!(route(Some("does-not-exist"), &lookup()), "main");
    }

    #[test]
    fn remote_portal_falls_back_to_main() {
        assert_eq!(route(Some("partner-a"), &lookup()), "main");
    }
}
