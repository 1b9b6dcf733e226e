#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use dns_portal_controller_grpc as grpc;
pub use dns_portal_controller_k8s_api as api;
pub use dns_portal_controller_k8s_index as index;
pub use dns_portal_controller_k8s_status as status;
pub use dns_portal_controller_k8s_status_controller as status_controller;
