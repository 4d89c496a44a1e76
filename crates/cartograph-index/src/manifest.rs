//! Third-party dependencies declared in root-level manifests.
//!
//! A manifest that cannot be parsed is logged and skipped; it never fails
//! fact production.

use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version_spec: String,
}

/// Dependencies from `pyproject.toml`, `requirements.txt`, `Cargo.toml` and
/// `package.json` at the repository root. The first declaration of a name wins.
pub fn read_dependencies(root: &Path) -> Vec<Dependency> {
    let mut found: BTreeMap<String, String> = BTreeMap::new();
    let mut record = |name: String, spec: String| {
        found.entry(name).or_insert(spec);
    };

    if let Some(text) = read_manifest(root, "pyproject.toml") {
        match toml::from_str::<toml::Table>(&text) {
            Ok(doc) => pyproject_dependencies(&doc, &mut record),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed pyproject.toml"),
        }
    }

    if let Some(text) = read_manifest(root, "requirements.txt") {
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.starts_with('-') {
                continue;
            }
            if let Some((name, spec)) = split_requirement(line) {
                record(name, spec);
            }
        }
    }

    if let Some(text) = read_manifest(root, "Cargo.toml") {
        match toml::from_str::<toml::Table>(&text) {
            Ok(doc) => {
                if let Some(deps) = doc.get("dependencies").and_then(|d| d.as_table()) {
                    for (name, value) in deps {
                        record(name.clone(), toml_version(value));
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping malformed Cargo.toml"),
        }
    }

    if let Some(text) = read_manifest(root, "package.json") {
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(doc) => {
                for section in ["dependencies", "devDependencies"] {
                    if let Some(deps) = doc.get(section).and_then(|d| d.as_object()) {
                        for (name, value) in deps {
                            record(name.clone(), value.as_str().unwrap_or("").to_string());
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping malformed package.json"),
        }
    }

    found
        .into_iter()
        .map(|(name, version_spec)| Dependency { name, version_spec })
        .collect()
}

fn read_manifest(root: &Path, name: &str) -> Option<String> {
    let path = root.join(name);
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(manifest = name, error = %e, "Could not read manifest");
            None
        }
    }
}

fn pyproject_dependencies(doc: &toml::Table, record: &mut impl FnMut(String, String)) {
    let project_deps = doc
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array());
    for entry in project_deps.into_iter().flatten() {
        if let Some((name, spec)) = entry.as_str().and_then(split_requirement) {
            record(name, spec);
        }
    }

    let poetry_deps = doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_table());
    for (name, value) in poetry_deps.into_iter().flatten() {
        if name == "python" {
            continue;
        }
        record(name.clone(), toml_version(value));
    }
}

/// `"1.0"` or `{ version = "1.0", ... }`.
fn toml_version(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(t) => t
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

/// Split a PEP 508 requirement into name and version constraint.
///
/// Extras and environment markers are dropped: `uvicorn[standard]>=0.20; python_version>"3.8"`
/// gives `("uvicorn", ">=0.20")`.
fn split_requirement(requirement: &str) -> Option<(String, String)> {
    let requirement = requirement.split(';').next().unwrap_or("").trim();
    let name_end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(requirement.len());
    let name = &requirement[..name_end];
    if name.is_empty() {
        return None;
    }
    let mut rest = requirement[name_end..].trim_start();
    if rest.starts_with('[') {
        rest = rest.find(']').map_or("", |end| &rest[end + 1..]);
    }
    let spec = rest.trim().trim_start_matches('(').trim_end_matches(')').trim();
    Some((name.to_string(), spec.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_split_requirement() {
        assert_eq!(
            split_requirement("requests>=2.31"),
            Some(("requests".into(), ">=2.31".into()))
        );
        assert_eq!(
            split_requirement("uvicorn[standard] >=0.20; python_version > \"3.8\""),
            Some(("uvicorn".into(), ">=0.20".into()))
        );
        assert_eq!(split_requirement("numpy"), Some(("numpy".into(), String::new())));
        assert_eq!(split_requirement(">=1.0"), None);
    }

    #[test]
    fn test_reads_all_manifest_kinds() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            r#"
[project]
dependencies = ["pydantic>=2", "loguru"]

[tool.poetry.dependencies]
python = "^3.11"
httpx = { version = "^0.27", extras = ["http2"] }
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("requirements.txt"),
            "# pinned\n-r base.txt\npydantic==1.10\nase==3.22.1  # atoms\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"x\"\n\n[dependencies]\nserde = { version = \"1\", features = [\"derive\"] }\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"react": "^18.0.0"}, "devDependencies": {"vite": "5.0.0"}}"#,
        )
        .unwrap();

        let deps = read_dependencies(dir.path());
        let pairs: Vec<(&str, &str)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.version_spec.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("ase", "==3.22.1"),
                ("httpx", "^0.27"),
                ("loguru", ""),
                ("pydantic", ">=2"),
                ("react", "^18.0.0"),
                ("serde", "1"),
                ("vite", "5.0.0"),
            ]
        );
    }

    #[test]
    fn test_malformed_manifest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pyproject.toml"), "[project\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        let deps = read_dependencies(dir.path());
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "flask");
    }
}
