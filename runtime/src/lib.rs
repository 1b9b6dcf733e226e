pub use dns_portal_controller_core as core;
pub use dns_portal_controller_grpc as grpc;
pub use dns_portal_controller_k8s_api as k8s;
pub use dns_portal_controller_k8s_index as index;
pub use dns_portal_controller_k8s_status as status;
pub use dns_portal_controller_k8s_status_controller as status_controller;

mod args;
mod data_source;
mod reconcile;

pub use self::args::Args;
