//! HTTP-based mock Kubernetes server using wiremock.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

/// Stored objects keyed by `(collection path, name)`.
pub type SharedResources = Arc<RwLock<HashMap<(String, String), serde_json::Value>>>;

/// A creation request received by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
	/// Collection path, e.g. `/api/v1/namespaces/default/services`.
	pub path: String,
	/// Raw query string, if any.
	pub query: Option<String>,
	pub body: serde_json::Value,
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Objects that already exist. Creating one of them again answers 409.
	#[builder(default)]
	resources: Vec<serde_json::Value>,

	/// Reject every creation request with this HTTP status.
	reject_creates_with: Option<u16>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
	creates: Arc<Mutex<Vec<CreateRequest>>>,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources = HashMap::new();
		for manifest in self.resources {
			if let Some((api_path, name)) = api_path_for_manifest(&manifest) {
				trace!(api_path = %api_path, name = %name, "Registered resource");
				resources.insert((api_path, name), manifest);
			}
		}

		let resources = Arc::new(RwLock::new(resources));
		let creates = Arc::new(Mutex::new(Vec::new()));

		mount_version(&server).await;
		mount_create(&server, &resources, &creates, self.reject_creates_with).await;
		mount_get(&server, &resources).await;

		RunningHttpMockK8sServer {
			server,
			resources,
			creates,
		}
	}
}

/// Collection path and name for a manifest.
///
/// Plurals are derived by lowercasing the kind and appending `s`, which holds
/// for every kind the mock is used with.
fn api_path_for_manifest(manifest: &serde_json::Value) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(|n| n.as_str())
		.unwrap_or("default");

	let plural = format!("{}s", kind.to_lowercase());
	let prefix = if api_version.contains('/') {
		format!("/apis/{}", api_version)
	} else {
		format!("/api/{}", api_version)
	};

	Some((
		format!("{}/namespaces/{}/{}", prefix, namespace, plural),
		name,
	))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// All creation requests received so far, in arrival order.
	pub fn creates(&self) -> Vec<CreateRequest> {
		self.creates
			.lock()
			.expect("create log lock poisoned")
			.clone()
	}

	/// A stored object, if it exists.
	pub fn resource(&self, collection: &str, name: &str) -> Option<serde_json::Value> {
		self.resources
			.read()
			.expect("resources lock poisoned")
			.get(&(collection.to_string(), name.to_string()))
			.cloned()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

fn status(code: u16, reason: &str, message: String) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(serde_json::json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

fn reason_for(code: u16) -> &'static str {
	match code {
		400 => "BadRequest",
		401 => "Unauthorized",
		403 => "Forbidden",
		404 => "NotFound",
		409 => "AlreadyExists",
		422 => "Invalid",
		_ => "InternalError",
	}
}

async fn mount_create(
	server: &MockServer,
	resources: &SharedResources,
	creates: &Arc<Mutex<Vec<CreateRequest>>>,
	reject_with: Option<u16>,
) {
	let resources = Arc::clone(resources);
	let creates = Arc::clone(creates);

	// POST for create - record, then store the object or refuse it
	Mock::given(method("POST"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let collection = req.url.path().trim_end_matches('/').to_string();
			let body: serde_json::Value =
				serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);

			creates
				.lock()
				.expect("create log lock poisoned")
				.push(CreateRequest {
					path: collection.clone(),
					query: req.url.query().map(str::to_string),
					body: body.clone(),
				});

			if let Some(code) = reject_with {
				return status(code, reason_for(code), "rejected by mock".to_string());
			}

			let name = body
				.pointer("/metadata/name")
				.and_then(|v| v.as_str())
				.unwrap_or("")
				.to_string();
			if name.is_empty() {
				return status(422, "Invalid", "metadata.name: Required value".to_string());
			}

			let mut resources = resources.write().expect("resources lock poisoned");
			let key = (collection, name.clone());
			if resources.contains_key(&key) {
				return status(409, "AlreadyExists", format!("\"{}\" already exists", name));
			}

			let mut stored = body;
			if let Some(metadata) = stored
				.get_mut("metadata")
				.and_then(|m| m.as_object_mut())
			{
				metadata.insert(
					"uid".to_string(),
					serde_json::Value::String(format!("mock-uid-{}", resources.len() + 1)),
				);
				metadata.insert(
					"resourceVersion".to_string(),
					serde_json::Value::String("1".to_string()),
				);
			}
			resources.insert(key, stored.clone());

			ResponseTemplate::new(201).set_body_json(stored)
		})
		.mount(server)
		.await;
}

async fn mount_get(server: &MockServer, resources: &SharedResources) {
	let resources = Arc::clone(resources);

	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let (collection, name) = parse_resource_path(req.url.path());
			let resources = resources.read().expect("resources lock poisoned");

			match resources.get(&(collection, name.clone())) {
				Some(resource) => ResponseTemplate::new(200).set_body_json(resource.clone()),
				None => status(404, "NotFound", format!("\"{}\" not found", name)),
			}
		})
		.mount(server)
		.await;
}

/// Split a Kubernetes API path into (collection path, resource name).
///
/// `/api/v1/namespaces/default/services/web` -> (`/api/v1/namespaces/default/services`, `web`)
fn parse_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => (collection.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}
