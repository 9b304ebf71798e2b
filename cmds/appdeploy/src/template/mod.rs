//! Manifest templates: finding them and filling them in.

pub mod bundled;
pub mod locate;
pub mod render;

use std::{fmt, path::PathBuf};

pub use locate::{locate, LocateError};
pub use render::{render, RenderError};

/// A resolved manifest template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
	/// Template file found under a user-supplied search path.
	File { path: PathBuf },

	/// Default template compiled into the binary.
	Bundled {
		app: String,
		source: &'static str,
	},
}

impl fmt::Display for TemplateRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TemplateRef::File { path } => write!(f, "{}", path.display()),
			TemplateRef::Bundled { app, .. } => write!(f, "<bundled>/{app}/{app}.yaml"),
		}
	}
}

/// Template output, ready to be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedManifest(String);

impl RenderedManifest {
	pub fn new(text: impl Into<String>) -> Self {
		Self(text.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RenderedManifest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
