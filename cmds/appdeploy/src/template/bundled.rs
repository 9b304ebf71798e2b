//! Default templates shipped inside the binary.

/// Templates keyed by application name.
static BUNDLED_TEMPLATES: phf::Map<&'static str, &'static str> = phf::phf_map! {
	"jupyter" => include_str!("../../templates/jupyter/jupyter.yaml"),
};

/// Get the bundled template for an application.
pub fn lookup(app: &str) -> Option<&'static str> {
	BUNDLED_TEMPLATES.get(app).copied()
}

/// Names of all bundled applications, sorted.
pub fn names() -> Vec<&'static str> {
	let mut names: Vec<_> = BUNDLED_TEMPLATES.keys().copied().collect();
	names.sort_unstable();
	names
}
