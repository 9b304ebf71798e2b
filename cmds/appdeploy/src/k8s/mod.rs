//! Kubernetes cluster access.
//!
//! Only resource creation is supported; everything goes through typed
//! kube-rs APIs.

pub mod client;
pub mod dispatch;

/// Namespace every resource is created in.
pub const DEFAULT_NAMESPACE: &str = "default";
