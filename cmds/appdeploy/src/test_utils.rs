//! Common test utilities.

use std::cell::RefCell;

use crate::{
	k8s::dispatch::{Created, DispatchError, ResourceDispatcher},
	manifest::Resource,
};

/// A dispatcher that records every creation call instead of contacting a
/// cluster.
#[derive(Default)]
pub struct RecordingDispatcher {
	calls: RefCell<Vec<(String, Resource)>>,
}

impl RecordingDispatcher {
	/// Recorded `(namespace, resource)` pairs, in call order.
	pub fn calls(&self) -> Vec<(String, Resource)> {
		self.calls.borrow().clone()
	}
}

impl ResourceDispatcher for RecordingDispatcher {
	async fn create(&self, namespace: &str, resource: &Resource) -> Result<Created, DispatchError> {
		self.calls
			.borrow_mut()
			.push((namespace.to_string(), resource.clone()));

		Ok(Created {
			kind: resource.kind().to_string(),
			name: resource.name(),
			namespace: namespace.to_string(),
			uid: None,
		})
	}
}

/// A dispatcher whose every creation is refused by the API server with
/// `409 AlreadyExists`.
pub struct FailingDispatcher;

impl ResourceDispatcher for FailingDispatcher {
	async fn create(&self, namespace: &str, resource: &Resource) -> Result<Created, DispatchError> {
		let status = kube::core::Status::failure(
			&format!("{} \"{}\" already exists", resource.kind(), resource.name()),
			"AlreadyExists",
		)
		.with_code(409);

		Err(DispatchError::Create {
			kind: resource.kind().to_string(),
			name: resource.name(),
			namespace: namespace.to_string(),
			source: Box::new(kube::Error::Api(status.boxed())),
		})
	}
}
