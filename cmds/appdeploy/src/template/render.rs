//! Template rendering.
//!
//! Templates use Go text/template syntax (via `gtmpl`), with the template data
//! as the root object: `image: jupyter/base-notebook:{{ .jupyter_version }}`.
//! Every field a template references must be present in the data.

use std::{collections::HashMap, sync::LazyLock};

use gtmpl::{Context, Value};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use super::{RenderedManifest, TemplateRef};
use crate::invocation::TemplateData;

/// What `gtmpl` prints for a missing value.
const NO_VALUE: &str = "<no value>";

/// `{{ ... }}` actions, including trim markers.
static ACTION: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)\{\{-?(.*?)-?\}\}").expect("valid action regex"));

/// String and raw-string literals inside an action.
static LITERAL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#""(?:[^"\\]|\\.)*"|`[^`]*`"#).expect("valid literal regex")
});

/// A root field reference: `.name`, possibly followed by `.more`.
static FIELD: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?:^|[\s(|,])\.([A-Za-z_][A-Za-z0-9_]*)").expect("valid field regex")
});

#[derive(Debug, Error)]
pub enum RenderError {
	#[error("reading template {path}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("template {template}: parse error: {message}")]
	Parse { template: String, message: String },

	#[error("template {template}: execution error: {message}")]
	Execute { template: String, message: String },

	#[error("template {template}: unresolved placeholder `{name}`")]
	UnresolvedPlaceholder { template: String, name: String },

	#[error("template {template}: a placeholder rendered to `<no value>`")]
	NoValue { template: String },
}

/// Byte offset of the first `{{` that is not closed by a later `}}`.
fn unclosed_action(source: &str) -> Option<usize> {
	let mut closed_until = 0;
	let mut actions = ACTION.find_iter(source).peekable();

	for (offset, _) in source.match_indices("{{") {
		if offset < closed_until {
			continue;
		}
		while actions.next_if(|m| m.end() <= offset).is_some() {}
		match actions.peek() {
			Some(action) if action.start() == offset => closed_until = action.end(),
			_ => return Some(offset),
		}
	}

	None
}

/// Root fields referenced by the template's actions, in order of appearance.
pub fn referenced_fields(source: &str) -> Vec<String> {
	let mut fields: Vec<String> = Vec::new();

	for action in ACTION.captures_iter(source) {
		let body = action[1].trim();
		if body.starts_with("/*") {
			continue;
		}
		let body = LITERAL.replace_all(body, "\"\"");
		for field in FIELD.captures_iter(&body) {
			let name = &field[1];
			if !fields.iter().any(|f| f == name) {
				fields.push(name.to_string());
			}
		}
	}

	fields
}

fn read_source(template: &TemplateRef) -> Result<String, RenderError> {
	match template {
		TemplateRef::Bundled { source, .. } => Ok((*source).to_string()),
		TemplateRef::File { path } => {
			std::fs::read_to_string(path).map_err(|source| RenderError::Read {
				path: path.display().to_string(),
				source,
			})
		}
	}
}

/// Template root object. With `scrub`, marker text is removed from values.
fn context(data: &TemplateData, scrub: bool) -> Context {
	let root: HashMap<String, Value> = data
		.iter()
		.map(|(k, v)| {
			let v = if scrub { v.replace(NO_VALUE, "") } else { v.to_string() };
			(k.to_string(), Value::String(v))
		})
		.collect();
	Context::from(Value::Map(root))
}

/// Render `template` with `data`.
#[instrument(skip_all, fields(template = %template))]
pub fn render(template: &TemplateRef, data: &TemplateData) -> Result<RenderedManifest, RenderError> {
	let source = read_source(template)?;
	render_str(&template.to_string(), &source, data)
}

/// Render template text directly. `name` is only used in errors.
pub fn render_str(
	name: &str,
	source: &str,
	data: &TemplateData,
) -> Result<RenderedManifest, RenderError> {
	if let Some(offset) = unclosed_action(source) {
		return Err(RenderError::Parse {
			template: name.to_string(),
			message: format!("unclosed action at byte {offset}"),
		});
	}

	if let Some(missing) = referenced_fields(source)
		.into_iter()
		.find(|field| !data.contains_key(field))
	{
		return Err(RenderError::UnresolvedPlaceholder {
			template: name.to_string(),
			name: missing,
		});
	}

	let mut tmpl = gtmpl::Template::default();
	tmpl.parse(source).map_err(|e| RenderError::Parse {
		template: name.to_string(),
		message: format!("{:?}", e),
	})?;

	let execute = |scrub: bool| {
		tmpl.render(&context(data, scrub))
			.map_err(|e| RenderError::Execute {
				template: name.to_string(),
				message: format!("{:?}", e),
			})
	};

	let rendered = execute(false)?;

	// Data values may carry the marker themselves; only count what the engine
	// printed for a missing value.
	if rendered.contains(NO_VALUE) {
		let scrubbed = if data.iter().any(|(_, v)| v.contains(NO_VALUE)) {
			execute(true)?
		} else {
			rendered.clone()
		};
		if scrubbed.matches(NO_VALUE).count() > source.matches(NO_VALUE).count() {
			return Err(RenderError::NoValue {
				template: name.to_string(),
			});
		}
	}

	debug!(bytes = rendered.len(), "rendered template");
	Ok(RenderedManifest::new(rendered))
}
