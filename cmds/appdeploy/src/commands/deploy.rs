//! Deploy command handler.
//!
//! Renders the application's manifest template and creates the resulting
//! resource in the `default` namespace.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{instrument, Level};

use crate::{
	invocation::{Invocation, TemplateData},
	k8s::{client::ClusterConnection, dispatch::KubeDispatcher},
	manifest::SchemaDecoder,
	runner::{RunReport, Runner},
	telemetry::LogFormat,
	template::bundled,
};

#[derive(Args, Debug)]
pub struct DeployArgs {
	/// Name of the application; selects the `<app>.yaml` template
	#[arg(long, required_unless_present = "list_bundled")]
	pub app: Option<String>,

	/// Directory to search for the template instead of the bundled ones
	#[arg(long = "configPath", visible_alias = "config-path", value_name = "DIR")]
	pub config_path: Option<PathBuf>,

	/// Template data as a JSON object of strings, e.g. '{"version":"1.0"}'
	#[arg(
		long = "templateData",
		visible_alias = "template-data",
		value_name = "JSON",
		required_unless_present = "list_bundled"
	)]
	pub template_data: Option<String>,

	/// Kubeconfig context to use (defaults to the current context)
	#[arg(long)]
	pub context: Option<String>,

	/// Print the rendered manifest instead of creating it
	#[arg(long)]
	pub dry_run: bool,

	/// List the applications with a bundled template and exit
	#[arg(long)]
	pub list_bundled: bool,

	/// Log level (possible values: error, warn, info, debug, trace)
	#[arg(long)]
	pub log_level: Option<Level>,

	/// Log output format
	#[arg(long, value_enum, default_value_t = LogFormat::Auto)]
	pub log_format: LogFormat,
}

/// Options for [`deploy_app`].
#[derive(Debug, Clone, Default)]
pub struct DeployOpts {
	/// Stop after decoding and print the rendered manifest.
	pub dry_run: bool,

	/// Kubeconfig context used when no connection is passed in.
	pub context: Option<String>,
}

impl DeployArgs {
	/// Build the invocation from the parsed flags.
	pub fn invocation(&self) -> Result<Invocation> {
		let app = self.app.as_deref().context("--app is required")?;
		let literal = self
			.template_data
			.as_deref()
			.context("--templateData is required")?;

		let template_data = TemplateData::parse(literal)?;
		Ok(Invocation::new(
			app,
			self.config_path.clone(),
			template_data,
		)?)
	}

	pub fn opts(&self) -> DeployOpts {
		DeployOpts {
			dry_run: self.dry_run,
			context: self.context.clone(),
		}
	}
}

/// Run the deploy command.
pub fn run<W: Write>(args: DeployArgs, mut writer: W) -> Result<()> {
	if args.list_bundled {
		for name in bundled::names() {
			writeln!(writer, "{name}")?;
		}
		return Ok(());
	}

	let invocation = args.invocation()?;

	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("building async runtime")?;

	runtime.block_on(deploy_app(&invocation, None, args.opts(), &mut writer))?;
	Ok(())
}

/// Deploy one application.
///
/// When `connection` is `None` and this is not a dry run, a connection is
/// made from the local kubeconfig. Output is written only after the whole
/// pipeline has succeeded.
#[instrument(skip_all, fields(app = %invocation.app(), dry_run = opts.dry_run))]
pub async fn deploy_app<W: Write>(
	invocation: &Invocation,
	connection: Option<ClusterConnection>,
	opts: DeployOpts,
	writer: &mut W,
) -> Result<RunReport> {
	if opts.dry_run {
		let runner = Runner::<_, KubeDispatcher>::dry_run(SchemaDecoder);
		let report = runner.run(invocation).await?;

		let manifest = report.manifest.as_str();
		writer.write_all(manifest.as_bytes())?;
		if !manifest.ends_with('\n') {
			writeln!(writer)?;
		}
		return Ok(report);
	}

	let connection = match connection {
		Some(connection) => connection,
		None => ClusterConnection::connect(opts.context.as_deref())
			.await
			.context("connecting to Kubernetes cluster")?,
	};
	tracing::debug!(
		cluster = %connection.cluster_identifier(),
		version = %connection.server_version().git_version,
		"using cluster"
	);

	let runner = Runner::new(SchemaDecoder, KubeDispatcher::new(connection.client().clone()));
	let report = runner.run(invocation).await?;

	writeln!(
		writer,
		"{}/{} created",
		report.resource.kind().to_lowercase(),
		report.resource.name()
	)?;
	Ok(report)
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	#[derive(Parser)]
	struct TestCli {
		#[command(flatten)]
		deploy: DeployArgs,
	}

	fn parse(args: &[&str]) -> Result<DeployArgs, clap::Error> {
		TestCli::try_parse_from(std::iter::once("appdeploy").chain(args.iter().copied()))
			.map(|cli| cli.deploy)
	}

	#[test]
	fn test_parse_original_flag_names() {
		let args = parse(&[
			"--app",
			"jupyter",
			"--configPath",
			"/tmp/templates",
			"--templateData",
			r#"{"jupyter_version":"notebook-6.0.3"}"#,
		])
		.unwrap();

		let invocation = args.invocation().unwrap();
		assert_eq!(invocation.app(), "jupyter");
		assert_eq!(
			invocation.config_path(),
			Some(std::path::Path::new("/tmp/templates"))
		);
		assert_eq!(
			invocation.template_data().get("jupyter_version"),
			Some("notebook-6.0.3")
		);
	}

	#[test]
	fn test_parse_kebab_aliases() {
		let args = parse(&[
			"--app",
			"jupyter",
			"--config-path",
			"/tmp/templates",
			"--template-data",
			"{}",
			"--dry-run",
			"--log-level",
			"debug",
		])
		.unwrap();

		assert!(args.dry_run);
		assert_eq!(args.log_level, Some(Level::DEBUG));
		assert!(args.invocation().unwrap().template_data().is_empty());
	}

	#[test]
	fn test_app_and_template_data_are_required() {
		assert!(parse(&["--templateData", "{}"]).is_err());
		assert!(parse(&["--app", "jupyter"]).is_err());
	}

	#[test]
	fn test_list_bundled_needs_no_app() {
		let args = parse(&["--list-bundled"]).unwrap();
		let mut out = Vec::new();
		run(args, &mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), "jupyter\n");
	}

	#[test]
	fn test_single_quoted_template_data_is_rejected() {
		let args = parse(&[
			"--app",
			"jupyter",
			"--templateData",
			"{'jupyter_version':'notebook-6.0.3'}",
		])
		.unwrap();
		assert!(args.invocation().is_err());
	}

	#[tokio::test]
	async fn test_dry_run_prints_manifest() {
		let invocation = Invocation::new("jupyter", None, TemplateData::default()).unwrap();
		let mut out = Vec::new();

		let report = deploy_app(
			&invocation,
			None,
			DeployOpts {
				dry_run: true,
				..Default::default()
			},
			&mut out,
		)
		.await
		.unwrap();

		assert!(report.created.is_none());
		let printed = String::from_utf8(out).unwrap();
		assert!(printed.starts_with("apiVersion: v1\nkind: Service\n"));
		assert!(printed.ends_with('\n'));
	}
}
