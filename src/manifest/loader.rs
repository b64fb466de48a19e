//! Loads manifests from file paths.

use std::path::{Path, PathBuf};

use crate::error::ManifestError;
use crate::manifest::parser;
use crate::manifest::types::Manifest;

/// Loads manifests, resolving relative paths against a base directory.
pub struct Loader {
    base_path: PathBuf,
}

impl Loader {
    /// Create a loader with the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Read and parse a manifest from a file path.
    ///
    /// The resolved path is recorded on the manifest so that relative
    /// public-key paths can later resolve against the manifest directory.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
        let path = path.as_ref();
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        };

        let data = std::fs::read_to_string(&full_path).map_err(|source| ManifestError::Read {
            path: full_path.display().to_string(),
            source,
        })?;

        let mut manifest = parser::parse(&data)?;
        manifest.source_path = Some(full_path);
        Ok(manifest)
    }

    /// Load multiple manifests, failing on the first error.
    pub fn load_all(
        &self,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Result<Vec<Manifest>, ManifestError> {
        paths.into_iter().map(|path| self.load(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "agent.yaml", "name: rel-agent\n");

        let loader = Loader::new(dir.path());
        let manifest = loader.load("agent.yaml").unwrap();
        assert_eq!(manifest.name, "rel-agent");
        assert_eq!(
            manifest.source_path.as_deref(),
            Some(dir.path().join("agent.yaml").as_path())
        );
    }

    #[test]
    fn load_accepts_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), "abs.yaml", "name: abs-agent\n");

        let loader = Loader::new("/somewhere/else");
        let manifest = loader.load(&path).unwrap();
        assert_eq!(manifest.name, "abs-agent");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let loader = Loader::new(".");
        let err = loader.load("does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[test]
    fn load_all_fails_on_first_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "good.yaml", "name: good\n");
        write_manifest(dir.path(), "bad.yaml", "version: \"1.0\"\n");

        let loader = Loader::new(dir.path());
        assert!(loader.load_all(["good.yaml", "bad.yaml"]).is_err());

        let manifests = loader.load_all(["good.yaml"]).unwrap();
        assert_eq!(manifests.len(), 1);
    }
}
