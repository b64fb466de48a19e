//! Manifest YAML parsing, validation, and defaults.

use std::time::Duration;

use crate::error::ManifestError;
use crate::manifest::types::Manifest;

/// Timeout applied to actions that do not declare one.
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse YAML data into a validated [`Manifest`] with defaults applied.
pub fn parse(data: &str) -> Result<Manifest, ManifestError> {
    let mut manifest: Manifest = serde_yaml::from_str(data)?;
    validate(&manifest)?;
    set_defaults(&mut manifest);
    Ok(manifest)
}

fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    if manifest.name.is_empty() {
        return Err(ManifestError::MissingName);
    }
    Ok(())
}

fn set_defaults(manifest: &mut Manifest) {
    for action in &mut manifest.actions {
        if action.timeout.is_zero() {
            action.timeout = DEFAULT_ACTION_TIMEOUT;
        }
        if action.http.method.is_empty() {
            action.http.method = "POST".to_string();
        }
    }
}
