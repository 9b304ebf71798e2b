//! Parsed invocation of a single deploy run.
//!
//! An [`Invocation`] is built once from the command line and never changes
//! afterwards. Template data is accepted as a strict JSON object whose values
//! are all strings, e.g. `{"jupyter_version": "notebook-6.0.3"}`.

use std::{collections::BTreeMap, path::PathBuf};

use thiserror::Error;

/// Errors produced while building an [`Invocation`].
#[derive(Debug, Error)]
pub enum InvocationError {
	#[error("application name must not be empty")]
	EmptyAppName,

	#[error(
		"invalid application name `{0}`: only ASCII letters, digits, '-', '_' and '.' are allowed"
	)]
	InvalidAppName(String),

	#[error("invalid template data: {0}")]
	InvalidTemplateData(String),

	#[error("invalid template data: expected a JSON object")]
	TemplateDataNotObject,

	#[error("invalid template data: value of `{key}` must be a string, got {found}")]
	NonStringValue { key: String, found: &'static str },
}

/// Key/value substitutions applied to a manifest template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateData(BTreeMap<String, String>);

impl TemplateData {
	/// Parse template data from a JSON object literal.
	///
	/// Single-quoted JSON-like literals (`{'a':'b'}`) are rejected with a hint
	/// pointing at the strict form.
	pub fn parse(literal: &str) -> Result<Self, InvocationError> {
		let value: serde_json::Value = serde_json::from_str(literal).map_err(|e| {
			if literal.contains('\'') && !literal.contains('"') {
				InvocationError::InvalidTemplateData(format!(
					"{e} (template data must be strict JSON; use double quotes, e.g. {{\"key\": \"value\"}})"
				))
			} else {
				InvocationError::InvalidTemplateData(e.to_string())
			}
		})?;

		let serde_json::Value::Object(map) = value else {
			return Err(InvocationError::TemplateDataNotObject);
		};

		let mut entries = BTreeMap::new();
		for (key, value) in map {
			match value {
				serde_json::Value::String(s) => {
					entries.insert(key, s);
				}
				other => {
					return Err(InvocationError::NonStringValue {
						key,
						found: json_type_name(&other),
					})
				}
			}
		}

		Ok(Self(entries))
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateData {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(
			iter.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		)
	}
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "a boolean",
		serde_json::Value::Number(_) => "a number",
		serde_json::Value::String(_) => "a string",
		serde_json::Value::Array(_) => "an array",
		serde_json::Value::Object(_) => "an object",
	}
}

/// A single deploy request.
#[derive(Debug, Clone)]
pub struct Invocation {
	app: String,
	config_path: Option<PathBuf>,
	template_data: TemplateData,
}

impl Invocation {
	pub fn new(
		app: impl Into<String>,
		config_path: Option<PathBuf>,
		template_data: TemplateData,
	) -> Result<Self, InvocationError> {
		let app = app.into();
		validate_app_name(&app)?;
		Ok(Self {
			app,
			config_path,
			template_data,
		})
	}

	/// Application name, used to find `<app>.yaml`.
	pub fn app(&self) -> &str {
		&self.app
	}

	/// User-supplied template search directory, if any.
	pub fn config_path(&self) -> Option<&std::path::Path> {
		self.config_path.as_deref()
	}

	pub fn template_data(&self) -> &TemplateData {
		&self.template_data
	}
}

/// The name ends up in a file path, so separators and `..` are refused.
fn validate_app_name(app: &str) -> Result<(), InvocationError> {
	if app.is_empty() {
		return Err(InvocationError::EmptyAppName);
	}

	let valid_chars = app
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

	if !valid_chars || app.starts_with('.') {
		return Err(InvocationError::InvalidAppName(app.to_string()));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_parse_template_data() {
		let data = TemplateData::parse(r#"{"jupyter_version": "notebook-6.0.3"}"#).unwrap();
		assert_eq!(data.get("jupyter_version"), Some("notebook-6.0.3"));
		assert_eq!(data.len(), 1);
	}

	#[test]
	fn test_parse_empty_object() {
		let data = TemplateData::parse("{}").unwrap();
		assert!(data.is_empty());
	}

	#[test]
	fn test_single_quoted_literal_rejected_with_hint() {
		let err = TemplateData::parse("{'jupyter_version':'notebook-6.0.3'}").unwrap_err();
		assert_matches!(err, InvocationError::InvalidTemplateData(ref msg) if msg.contains("strict JSON"));
	}

	#[rstest]
	#[case(r#"{"replicas": 3}"#, "replicas", "a number")]
	#[case(r#"{"enabled": true}"#, "enabled", "a boolean")]
	#[case(r#"{"nested": {"a": "b"}}"#, "nested", "an object")]
	#[case(r#"{"missing": null}"#, "missing", "null")]
	fn test_non_string_values_rejected(
		#[case] literal: &str,
		#[case] expected_key: &str,
		#[case] expected_type: &str,
	) {
		let err = TemplateData::parse(literal).unwrap_err();
		assert_matches!(
			err,
			InvocationError::NonStringValue { key, found } if key == expected_key && found == expected_type
		);
	}

	#[rstest]
	#[case("[]")]
	#[case(r#""text""#)]
	#[case("42")]
	fn test_non_object_rejected(#[case] literal: &str) {
		assert_matches!(
			TemplateData::parse(literal),
			Err(InvocationError::TemplateDataNotObject)
		);
	}

	#[rstest]
	#[case("jupyter")]
	#[case("my-app_2.0")]
	fn test_valid_app_names(#[case] app: &str) {
		assert!(Invocation::new(app, None, TemplateData::default()).is_ok());
	}

	#[rstest]
	#[case("../etc/passwd")]
	#[case("a/b")]
	#[case(".hidden")]
	#[case("with space")]
	fn test_invalid_app_names(#[case] app: &str) {
		assert_matches!(
			Invocation::new(app, None, TemplateData::default()),
			Err(InvocationError::InvalidAppName(_))
		);
	}

	#[test]
	fn test_empty_app_name() {
		assert_matches!(
			Invocation::new("", None, TemplateData::default()),
			Err(InvocationError::EmptyAppName)
		);
	}
}
