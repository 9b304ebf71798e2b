//! Decoding rendered manifests into typed Kubernetes objects.

use std::fmt;

use k8s_openapi::api::{
	apps::v1::{DaemonSet, Deployment, StatefulSet},
	core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount},
};
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::template::RenderedManifest;

/// Errors that can occur while decoding a rendered manifest.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("manifest is empty")]
	Empty,

	#[error("manifest contains {0} YAML documents, only a single resource per template is supported")]
	MultipleDocuments(usize),

	#[error("parsing manifest YAML")]
	Yaml(#[source] serde_yaml_with_quirks::Error),

	#[error("manifest missing apiVersion or kind")]
	MissingTypeMeta,

	#[error("unsupported resource type: {api_version}/{kind}")]
	UnsupportedKind { api_version: String, kind: String },

	#[error("manifest does not match the {kind} schema")]
	Schema {
		kind: String,
		#[source]
		source: serde_json::Error,
	},
}

/// A single decoded Kubernetes object.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
	Service(Service),
	Pod(Pod),
	ConfigMap(ConfigMap),
	Secret(Secret),
	ServiceAccount(ServiceAccount),
	PersistentVolumeClaim(PersistentVolumeClaim),
	Deployment(Deployment),
	StatefulSet(StatefulSet),
	DaemonSet(DaemonSet),
}

/// Apply `$body` to the inner object of every [`Resource`] variant.
macro_rules! with_resource {
	($resource:expr, $obj:ident => $body:expr) => {
		match $resource {
			Resource::Service($obj) => $body,
			Resource::Pod($obj) => $body,
			Resource::ConfigMap($obj) => $body,
			Resource::Secret($obj) => $body,
			Resource::ServiceAccount($obj) => $body,
			Resource::PersistentVolumeClaim($obj) => $body,
			Resource::Deployment($obj) => $body,
			Resource::StatefulSet($obj) => $body,
			Resource::DaemonSet($obj) => $body,
		}
	};
}
pub(crate) use with_resource;

impl Resource {
	pub fn kind(&self) -> &'static str {
		fn kind_of<K: k8s_openapi::Resource>(_: &K) -> &'static str {
			K::KIND
		}
		with_resource!(self, obj => kind_of(obj))
	}

	pub fn api_version(&self) -> &'static str {
		fn api_version_of<K: k8s_openapi::Resource>(_: &K) -> &'static str {
			K::API_VERSION
		}
		with_resource!(self, obj => api_version_of(obj))
	}

	/// `metadata.name`, or an empty string when unset.
	pub fn name(&self) -> String {
		with_resource!(self, obj => obj.name_any())
	}

	/// `metadata.namespace`, if the manifest sets one.
	pub fn namespace(&self) -> Option<String> {
		with_resource!(self, obj => obj.namespace())
	}
}

impl fmt::Display for Resource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.kind(), self.name())
	}
}

/// Turns rendered manifest text into a [`Resource`].
pub trait ManifestDecoder {
	fn decode(&self, manifest: &RenderedManifest) -> Result<Resource, DecodeError>;
}

/// Decoder that validates the manifest against the typed Kubernetes schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaDecoder;

impl ManifestDecoder for SchemaDecoder {
	#[instrument(skip_all)]
	fn decode(&self, manifest: &RenderedManifest) -> Result<Resource, DecodeError> {
		let text = manifest.as_str();

		match count_documents(text) {
			0 => return Err(DecodeError::Empty),
			1 => {}
			n => return Err(DecodeError::MultipleDocuments(n)),
		}

		let value: serde_json::Value =
			serde_yaml_with_quirks::from_str(text).map_err(DecodeError::Yaml)?;

		if value.is_null() {
			return Err(DecodeError::Empty);
		}

		let resource = decode_value(value)?;
		debug!(resource = %resource, "decoded manifest");
		Ok(resource)
	}
}

/// Decode a parsed manifest by its `apiVersion` and `kind`.
pub fn decode_value(value: serde_json::Value) -> Result<Resource, DecodeError> {
	let api_version = value
		.get("apiVersion")
		.and_then(|v| v.as_str())
		.ok_or(DecodeError::MissingTypeMeta)?
		.to_string();
	let kind = value
		.get("kind")
		.and_then(|v| v.as_str())
		.ok_or(DecodeError::MissingTypeMeta)?
		.to_string();

	let resource = match (api_version.as_str(), kind.as_str()) {
		("v1", "Service") => Resource::Service(typed(value)?),
		("v1", "Pod") => Resource::Pod(typed(value)?),
		("v1", "ConfigMap") => Resource::ConfigMap(typed(value)?),
		("v1", "Secret") => Resource::Secret(typed(value)?),
		("v1", "ServiceAccount") => Resource::ServiceAccount(typed(value)?),
		("v1", "PersistentVolumeClaim") => Resource::PersistentVolumeClaim(typed(value)?),
		("apps/v1", "Deployment") => Resource::Deployment(typed(value)?),
		("apps/v1", "StatefulSet") => Resource::StatefulSet(typed(value)?),
		("apps/v1", "DaemonSet") => Resource::DaemonSet(typed(value)?),
		_ => return Err(DecodeError::UnsupportedKind { api_version, kind }),
	};

	Ok(resource)
}

fn typed<K: k8s_openapi::Resource + DeserializeOwned>(
	value: serde_json::Value,
) -> Result<K, DecodeError> {
	serde_json::from_value(value).map_err(|source| DecodeError::Schema {
		kind: K::KIND.to_string(),
		source,
	})
}

/// Count non-empty documents in a YAML stream.
///
/// A document is non-empty when it has a line that is neither blank nor a
/// comment. Separators are lines starting with `---`.
fn count_documents(text: &str) -> usize {
	let mut count = 0;
	let mut current_has_content = false;

	for line in text.lines() {
		if line.starts_with("---") {
			if current_has_content {
				count += 1;
			}
			// Content may follow the marker on the same line (`--- !tag` or `--- {}`)
			let rest = line[3..].trim();
			current_has_content = !rest.is_empty() && !rest.starts_with('#');
			continue;
		}
		if line.starts_with("...") {
			if current_has_content {
				count += 1;
			}
			current_has_content = false;
			continue;
		}
		let trimmed = line.trim();
		if !trimmed.is_empty() && !trimmed.starts_with('#') {
			current_has_content = true;
		}
	}

	if current_has_content {
		count += 1;
	}
	count
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;
	use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
	use rstest::rstest;

	use super::*;

	const SERVICE: &str = indoc! {"
		apiVersion: v1
		kind: Service
		metadata:
		  name: jupyter
		  labels:
		    app: jupyter
		spec:
		  ports:
		  - port: 80
		    name: http
		    targetPort: 8888
		  selector:
		    app: jupyter
		  type: LoadBalancer
	"};

	fn decode(text: &str) -> Result<Resource, DecodeError> {
		SchemaDecoder.decode(&RenderedManifest::new(text))
	}

	#[test]
	fn test_decode_service() {
		let resource = decode(SERVICE).unwrap();
		assert_eq!(resource.kind(), "Service");
		assert_eq!(resource.api_version(), "v1");
		assert_eq!(resource.name(), "jupyter");
		assert_eq!(resource.namespace(), None);
		assert_eq!(resource.to_string(), "Service/jupyter");

		let Resource::Service(service) = resource else {
			panic!("expected a Service");
		};
		let spec = service.spec.unwrap();
		assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
		let port = &spec.ports.unwrap()[0];
		assert_eq!(port.port, 80);
		assert_eq!(port.name.as_deref(), Some("http"));
		assert_eq!(port.target_port, Some(IntOrString::Int(8888)));
	}

	#[test]
	fn test_decode_deployment() {
		let resource = decode(indoc! {"
			apiVersion: apps/v1
			kind: Deployment
			metadata:
			  name: web
			  namespace: default
			spec:
			  selector:
			    matchLabels:
			      app: web
			  template:
			    metadata:
			      labels:
			        app: web
			    spec:
			      containers:
			      - name: web
			        image: nginx:1.25
		"})
		.unwrap();
		assert_matches!(resource, Resource::Deployment(_));
		assert_eq!(resource.namespace().as_deref(), Some("default"));
	}

	#[test]
	fn test_leading_document_marker_is_single_document() {
		let text = format!("---\n{SERVICE}");
		assert_matches!(decode(&text), Ok(Resource::Service(_)));
	}

	#[test]
	fn test_multiple_documents_rejected() {
		let text = format!("{SERVICE}---\n{SERVICE}");
		assert_matches!(decode(&text), Err(DecodeError::MultipleDocuments(2)));
	}

	#[rstest]
	#[case("")]
	#[case("\n\n")]
	#[case("# only a comment\n")]
	#[case("---\n---\n")]
	fn test_empty_manifest(#[case] text: &str) {
		assert_matches!(decode(text), Err(DecodeError::Empty));
	}

	#[test]
	fn test_malformed_yaml() {
		assert_matches!(
			decode("apiVersion: v1\nkind: [Service\n"),
			Err(DecodeError::Yaml(_))
		);
	}

	#[rstest]
	#[case("kind: Service\nmetadata:\n  name: x\n")]
	#[case("apiVersion: v1\nmetadata:\n  name: x\n")]
	#[case("apiVersion: 1\nkind: Service\n")]
	fn test_missing_type_meta(#[case] text: &str) {
		assert_matches!(decode(text), Err(DecodeError::MissingTypeMeta));
	}

	#[rstest]
	#[case("apiVersion: v1\nkind: Frobnicator\n", "v1", "Frobnicator")]
	#[case("apiVersion: apps/v2\nkind: Deployment\n", "apps/v2", "Deployment")]
	#[case("apiVersion: v1\nkind: Deployment\n", "v1", "Deployment")]
	fn test_unsupported_kind(#[case] text: &str, #[case] api: &str, #[case] k: &str) {
		assert_matches!(
			decode(text),
			Err(DecodeError::UnsupportedKind { api_version, kind }) if api_version == api && kind == k
		);
	}

	#[test]
	fn test_schema_mismatch() {
		let err = decode(indoc! {"
			apiVersion: v1
			kind: Service
			metadata:
			  name: broken
			spec:
			  ports: not-a-list
		"})
		.unwrap_err();
		assert_matches!(err, DecodeError::Schema { kind, .. } if kind == "Service");
	}

	#[rstest]
	#[case("a: 1\n", 1)]
	#[case("---\na: 1\n", 1)]
	#[case("a: 1\n---\nb: 2\n", 2)]
	#[case("a: 1\n...\n---\nb: 2\n---\n", 2)]
	#[case("--- {}\n", 1)]
	#[case("---\n# comment\n---\n", 0)]
	fn test_count_documents(#[case] text: &str, #[case] expected: usize) {
		assert_eq!(count_documents(text), expected);
	}
}
