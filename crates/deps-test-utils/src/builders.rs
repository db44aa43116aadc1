//! Builders for fetched sources and manifests.

use deps_resolver::{FetchedEntry, FetchedSource};

/// A fetched source made of plain files.
///
/// Parent directories are not listed; add them with
/// [`FetchedEntry::directory`] where a test needs them.
///
/// ```rust
/// use deps_test_utils::source;
///
/// let src = source(&[("README.md", "# A"), ("src/lib.txt", "lib")]);
/// assert_eq!(src.len(), 2);
/// ```
pub fn source(files: &[(&str, &str)]) -> FetchedSource {
    files
        .iter()
        .map(|(path, content)| FetchedEntry::file(*path, content.as_bytes().to_vec()))
        .collect()
}

/// Builds a `deps.toml` document.
///
/// ```rust
/// use deps_test_utils::ManifestBuilder;
///
/// let toml = ManifestBuilder::new()
///     .registry("c", "1.x")
///     .local("d", "../d")
///     .build();
/// assert!(toml.contains("c = \"1.x\""));
/// ```
#[derive(Debug, Default, Clone)]
pub struct ManifestBuilder {
    lines: Vec<String>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, name: &str, constraint: &str) -> Self {
        self.lines.push(format!("{name} = \"{constraint}\""));
        self
    }

    pub fn registry_subpath(mut self, name: &str, constraint: &str, subpath: &str) -> Self {
        self.lines.push(format!(
            "{name} = {{ version = \"{constraint}\", subpath = \"{subpath}\" }}"
        ));
        self
    }

    pub fn local(mut self, name: &str, path: &str) -> Self {
        self.lines.push(format!("{name} = {{ path = \"{path}\" }}"));
        self
    }

    pub fn git(mut self, name: &str, url: &str, reference: &str) -> Self {
        self.lines
            .push(format!("{name} = {{ git = \"{url}\", ref = \"{reference}\" }}"));
        self
    }

    /// Append a raw line, for malformed-manifest tests.
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::from("[dependencies]\n");
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// The manifest as a file entry named `deps.toml`.
    pub fn entry(&self) -> FetchedEntry {
        FetchedEntry::file(deps_resolver::MANIFEST_FILENAME, self.build().into_bytes())
    }
}
