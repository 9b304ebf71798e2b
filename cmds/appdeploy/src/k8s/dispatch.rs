//! Resource creation against the cluster.

use std::future::Future;

use k8s_openapi::NamespaceResourceScope;
use kube::{
	api::{Api, PostParams},
	Client, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::manifest::{with_resource, Resource};

/// Errors that can occur while creating a resource.
#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("{kind}/{name} sets namespace `{manifest}`, but resources are created in `{target}`")]
	NamespaceMismatch {
		kind: String,
		name: String,
		manifest: String,
		target: String,
	},

	#[error("creating {kind}/{name} in namespace `{namespace}`")]
	Create {
		kind: String,
		name: String,
		namespace: String,
		#[source]
		source: Box<kube::Error>,
	},
}

impl DispatchError {
	/// HTTP status reported by the API server, if the request got that far.
	pub fn status_code(&self) -> Option<u16> {
		match self {
			DispatchError::Create { source, .. } => match source.as_ref() {
				kube::Error::Api(status) => Some(status.code),
				_ => None,
			},
			DispatchError::NamespaceMismatch { .. } => None,
		}
	}

	/// The resource already exists.
	pub fn is_conflict(&self) -> bool {
		self.status_code() == Some(409)
	}
}

/// Acknowledgement of a created resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
	pub kind: String,
	pub name: String,
	pub namespace: String,
	/// Server-assigned UID, when the server returned one.
	pub uid: Option<String>,
}

/// Creates decoded resources in a cluster.
pub trait ResourceDispatcher {
	/// Submit `resource` for creation in `namespace`.
	fn create(
		&self,
		namespace: &str,
		resource: &Resource,
	) -> impl Future<Output = Result<Created, DispatchError>>;
}

/// Refuse a manifest that pins itself to another namespace.
pub fn check_namespace(namespace: &str, resource: &Resource) -> Result<(), DispatchError> {
	match resource.namespace() {
		Some(ns) if ns != namespace => Err(DispatchError::NamespaceMismatch {
			kind: resource.kind().to_string(),
			name: resource.name(),
			manifest: ns,
			target: namespace.to_string(),
		}),
		_ => Ok(()),
	}
}

/// Dispatcher backed by a kube client.
#[derive(Clone)]
pub struct KubeDispatcher {
	client: Client,
}

impl KubeDispatcher {
	pub fn new(client: Client) -> Self {
		Self { client }
	}
}

impl ResourceDispatcher for KubeDispatcher {
	#[instrument(skip_all, fields(namespace = %namespace, resource = %resource))]
	async fn create(&self, namespace: &str, resource: &Resource) -> Result<Created, DispatchError> {
		check_namespace(namespace, resource)?;

		let created = with_resource!(resource, obj => {
			create_typed(self.client.clone(), namespace, obj)
				.await
				.map(|created| created.uid())
		});

		let uid = created.map_err(|e| DispatchError::Create {
			kind: resource.kind().to_string(),
			name: resource.name(),
			namespace: namespace.to_string(),
			source: Box::new(e),
		})?;

		info!(uid = ?uid, "created resource");

		Ok(Created {
			kind: resource.kind().to_string(),
			name: resource.name(),
			namespace: namespace.to_string(),
			uid,
		})
	}
}

async fn create_typed<K>(client: Client, namespace: &str, obj: &K) -> Result<K, kube::Error>
where
	K: kube::Resource<Scope = NamespaceResourceScope>
		+ Clone
		+ DeserializeOwned
		+ Serialize
		+ std::fmt::Debug,
	<K as kube::Resource>::DynamicType: Default,
{
	let api: Api<K> = Api::namespaced(client, namespace);
	api.create(&PostParams::default(), obj).await
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;
	use crate::{
		manifest::{ManifestDecoder, SchemaDecoder},
		template::RenderedManifest,
	};

	fn service(namespace: Option<&str>) -> Resource {
		let ns = namespace
			.map(|ns| format!("  namespace: {ns}\n"))
			.unwrap_or_default();
		let text = format!("apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n{ns}");
		SchemaDecoder.decode(&RenderedManifest::new(text)).unwrap()
	}

	#[test]
	fn test_namespace_unset_is_accepted() {
		assert!(check_namespace("default", &service(None)).is_ok());
	}

	#[test]
	fn test_matching_namespace_is_accepted() {
		assert!(check_namespace("default", &service(Some("default"))).is_ok());
	}

	#[test]
	fn test_other_namespace_is_refused() {
		assert_matches!(
			check_namespace("default", &service(Some("kube-system"))),
			Err(DispatchError::NamespaceMismatch { manifest, target, .. })
				if manifest == "kube-system" && target == "default"
		);
	}

	#[test]
	fn test_namespace_mismatch_has_no_status_code() {
		let err = check_namespace("default", &service(Some("other"))).unwrap_err();
		assert_eq!(err.status_code(), None);
		assert!(!err.is_conflict());
	}
}
