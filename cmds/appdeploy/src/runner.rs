//! The deploy pipeline: locate, render, decode, dispatch.
//!
//! Each stage runs once, in order, and the first failure ends the run. Nothing
//! is sent to the cluster unless every earlier stage succeeded.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
	invocation::Invocation,
	k8s::{
		dispatch::{Created, DispatchError, ResourceDispatcher},
		DEFAULT_NAMESPACE,
	},
	manifest::{DecodeError, ManifestDecoder, Resource},
	template::{self, LocateError, RenderError, RenderedManifest, TemplateRef},
};

/// Error from any stage of a run.
#[derive(Debug, Error)]
pub enum RunError {
	#[error("locating template")]
	Locate(#[from] LocateError),

	#[error("rendering template")]
	Render(#[from] RenderError),

	#[error("decoding manifest")]
	Decode(#[from] DecodeError),

	#[error("dispatching to cluster")]
	Dispatch(#[from] DispatchError),
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunReport {
	pub template: TemplateRef,
	pub manifest: RenderedManifest,
	pub resource: Resource,
	/// `None` on dry runs.
	pub created: Option<Created>,
}

/// Runs the pipeline with pluggable decoding and dispatch.
pub struct Runner<D, P> {
	decoder: D,
	/// `None` for dry runs.
	dispatcher: Option<P>,
	namespace: String,
}

impl<D: ManifestDecoder, P: ResourceDispatcher> Runner<D, P> {
	pub fn new(decoder: D, dispatcher: P) -> Self {
		Self {
			decoder,
			dispatcher: Some(dispatcher),
			namespace: DEFAULT_NAMESPACE.to_string(),
		}
	}

	/// A runner that stops after decoding and never touches the cluster.
	pub fn dry_run(decoder: D) -> Self {
		Self {
			decoder,
			dispatcher: None,
			namespace: DEFAULT_NAMESPACE.to_string(),
		}
	}

	pub fn dispatcher(&self) -> Option<&P> {
		self.dispatcher.as_ref()
	}

	#[instrument(skip_all, fields(app = %invocation.app()))]
	pub async fn run(&self, invocation: &Invocation) -> Result<RunReport, RunError> {
		let template = template::locate(invocation.app(), invocation.config_path())?;
		debug!(template = %template, "located template");

		let manifest = template::render(&template, invocation.template_data())?;

		let resource = self.decoder.decode(&manifest)?;
		debug!(resource = %resource, "decoded resource");

		let Some(dispatcher) = &self.dispatcher else {
			info!(resource = %resource, "dry run, not creating resource");
			return Ok(RunReport {
				template,
				manifest,
				resource,
				created: None,
			});
		};

		let created = dispatcher.create(&self.namespace, &resource).await?;
		info!(
			resource = %resource,
			namespace = %created.namespace,
			"resource created"
		);

		Ok(RunReport {
			template,
			manifest,
			resource,
			created: Some(created),
		})
	}
}
