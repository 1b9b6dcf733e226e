//! C5: portal bootstrap and the local-portal reconciler (§4.5).

use dns_portal_controller_k8s_api::conditions;
use dns_portal_controller_k8s_api::{
    Api, Client, ObjectMeta, Patch, PatchParams, Portal, PortalSpec, PortalStatus, PostParams,
};

const FIELD_MANAGER: &str = "dns-portal-lifecycle";
const DEFAULT_MAIN_PORTAL: &str = "main";

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("listing portals failed: {0}")]
    List(#[source] kube::Error),
    #[error("creating main portal failed: {0}")]
    Create(#[source] kube::Error),
    #[error("fetching portal failed: {0}")]
    Get(#[source] kube::Error),
    #[error("patching portal status failed: {0}")]
    Patch(#[source] kube::Error),
}

/// Creates a `main` portal if the namespace has no local portal with
/// `main=true` (§4.5: "bootstrap a main portal on startup if none exists").
pub async fn bootstrap_main_portal(
    client: &Client,
    namespace: &str,
) -> Result<(), LifecycleError> {
    let api: Api<Portal> = Api::namespaced(client.clone(), namespace);
    let portals = api
        .list(&Default::default())
        .await
        .map_err(LifecycleError::List)?;

    let has_main = portals
        .items
        .iter()
        .any(|p| p.spec.remote.is_none() && p.spec.main);
    if has_main {
        return Ok(());
    }

    let portal = Portal {
        metadata: ObjectMeta {
            name: Some(DEFAULT_MAIN_PORTAL.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: PortalSpec {
            title: "Main Portal".to_string(),
            main: true,
            sub_path: None,
            remote: None,
        },
        status: None,
    };

    match api.create(&PostParams::default(), &portal).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 409 => Ok(()),
        Err(err) => Err(LifecycleError::Create(err)),
    }
}

/// Marks a local portal ready, clearing any stale `remoteSync` left over from
/// a prior configuration. Remote portals are left untouched; C4 owns them.
///
/// `main` and `remote` set together is rejected at admission, but a Portal
/// already stored with both (e.g. edited past an older admission policy)
/// must still be hard-rejected here rather than silently reconciled.
pub async fn reconcile_local_portal(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<(), LifecycleError> {
    let api: Api<Portal> = Api::namespaced(client.clone(), namespace);
    let portal = api.get(name).await.map_err(LifecycleError::Get)?;

    if portal.spec.main && portal.spec.remote.is_some() {
        return reject_invalid_config(&api, name, portal.status).await;
    }

    if portal.spec.remote.is_some() {
        return Ok(());
    }

    let mut status = portal.status.unwrap_or_default();
    status.ready = true;
    status.remote_sync = None;
    conditions::set(
        &mut status.conditions,
        conditions::READY,
        true,
        "PortalConfigured",
        "portal is locally owned and ready",
    );

    let patch = Patch::Merge(serde_json::json!({ "status": status }));
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &patch)
        .await
        .map_err(LifecycleError::Patch)?;
    Ok(())
}

/// Refuses to sync a Portal that has both `main: true` and `remote` set,
/// recording why rather than attempting either reconciliation path.
async fn reject_invalid_config(
    api: &Api<Portal>,
    name: &str,
    status: Option<PortalStatus>,
) -> Result<(), LifecycleError> {
    let mut status = status.unwrap_or_default();
    status.ready = false;
    conditions::set(
        &mut status.conditions,
        conditions::READY,
        false,
        "InvalidPortalConfig",
        "a portal cannot set both main and remote; refusing to sync",
    );

    let patch = Patch::Merge(serde_json::json!({ "status": status }));
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &patch)
        .await
        .map_err(LifecycleError::Patch)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_main_portal_name_is_stable() {
        assert_eq!(DEFAULT_MAIN_PORTAL, "main");
    }
}
