//! Mock Kubernetes API server for testing.
//!
//! Serves `/version`, resource creation (POST) and resource reads (GET) over
//! HTTP so that real kubeconfig-based clients can talk to it. Every creation
//! request is recorded for later assertions.

pub mod http;

pub use http::{CreateRequest, HttpMockK8sServer, RunningHttpMockK8sServer};
