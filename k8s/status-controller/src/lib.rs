#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! C4: the remote portal syncer (§4.4) — peer channel/TLS setup plus the
//! healthcheck/fetch/materialize/status-update reconcile body.

mod sync;
mod tls;

pub use self::sync::{sync_portal, view_object_name, SyncError};
pub use self::tls::TlsError;
