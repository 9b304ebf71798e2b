//! Template lookup.
//!
//! With a search path, the template must exist under it in one of these
//! layouts (first match wins):
//!
//! - `<dir>/<app>/<app>.yaml`
//! - `<dir>/<app>/<app>.yml`
//! - `<dir>/<app>.yaml`
//! - `<dir>/<app>.yml`
//!
//! Without a search path, the bundled template for `<app>` is used.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, trace};

use super::{bundled, TemplateRef};

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

#[derive(Debug, Error)]
pub enum LocateError {
	#[error("template for `{app}` not found, searched: {}", display_paths(.searched))]
	TemplateNotFound { app: String, searched: Vec<PathBuf> },

	#[error("no bundled template for `{app}` (available: {})", .available.join(", "))]
	NoBundledTemplate {
		app: String,
		available: Vec<&'static str>,
	},

	#[error("resolving template path {}", .path.display())]
	Canonicalize {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

fn display_paths(paths: &[PathBuf]) -> String {
	paths
		.iter()
		.map(|p| p.display().to_string())
		.collect::<Vec<_>>()
		.join(", ")
}

/// Candidate template paths under `dir`, in probe order.
pub fn candidates(dir: &Path, app: &str) -> Vec<PathBuf> {
	let nested = EXTENSIONS
		.iter()
		.map(|ext| dir.join(app).join(format!("{app}.{ext}")));
	let flat = EXTENSIONS
		.iter()
		.map(|ext| dir.join(format!("{app}.{ext}")));
	nested.chain(flat).collect()
}

/// Resolve the template for `app`.
///
/// A missing template under an explicit `search_path` is an error, never a
/// reason to fall back to the bundled one.
#[instrument(skip_all, fields(app = %app))]
pub fn locate(app: &str, search_path: Option<&Path>) -> Result<TemplateRef, LocateError> {
	let Some(dir) = search_path else {
		let source = bundled::lookup(app).ok_or_else(|| LocateError::NoBundledTemplate {
			app: app.to_string(),
			available: bundled::names(),
		})?;
		debug!("using bundled template");
		return Ok(TemplateRef::Bundled {
			app: app.to_string(),
			source,
		});
	};

	let searched = candidates(dir, app);
	for candidate in &searched {
		trace!(path = %candidate.display(), "probing template path");
		if candidate.is_file() {
			let path = candidate
				.canonicalize()
				.map_err(|source| LocateError::Canonicalize {
					path: candidate.clone(),
					source,
				})?;
			debug!(path = %path.display(), "found template");
			return Ok(TemplateRef::File { path });
		}
	}

	Err(LocateError::TemplateNotFound {
		app: app.to_string(),
		searched,
	})
}
