//! Typed in-memory form of an agent manifest.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// An agent's capabilities and routes.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub jwt: Option<JwtSettings>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Absolute path the manifest was loaded from. Relative key paths
    /// resolve against this file's directory.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// JWT validation settings for an agent's `auth: bearer` actions.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    #[serde(default)]
    pub algorithm: String,
    /// Path to a PEM public key, resolved against the manifest directory
    /// when relative.
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub audience: String,
}

/// A single API action: one HTTP endpoint bound to one bus event.
#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub http: HttpBinding,
    #[serde(default)]
    pub auth: AuthMode,
    #[serde(default)]
    pub permission: String,
    #[serde(default)]
    pub rate_limit: String,
    #[serde(default, with = "duration_spec")]
    pub timeout: Duration,
    #[serde(default)]
    pub request: RequestSpec,
    #[serde(default)]
    pub response: ResponseSpec,
}

/// HTTP method and path for an action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpBinding {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
}

/// Authentication required by an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    None,
    Bearer,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::None => write!(f, "none"),
            AuthMode::Bearer => write!(f, "bearer"),
        }
    }
}

/// The request event an action publishes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub schema: Option<Value>,
}

/// Response mappings for an action.
///
/// Only the failure mapping is consulted when translating a reply to an
/// HTTP status; success and timeout are carried for manifests that declare
/// them but any non-failure reply maps to 200.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseSpec {
    #[serde(default)]
    pub success: ResponseMapping,
    #[serde(default)]
    pub failure: ResponseMapping,
    #[serde(default)]
    pub timeout: ResponseMapping,
}

/// Maps one reply event to an HTTP response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMapping {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Serde helper for manifest durations.
///
/// Accepts a bare integer (seconds) or a suffixed string: `"500ms"`,
/// `"30s"`, `"2m"`, `"1h"`.
pub(crate) mod duration_spec {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::Deserializer;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration in seconds or a string like \"30s\"")
        }

        fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(secs))
        }

        fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Duration, E> {
            if secs < 0 {
                return Err(E::custom("duration cannot be negative"));
            }
            Ok(Duration::from_secs(secs as u64))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse(value).map_err(E::custom)
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Duration, String> {
        let value = value.trim();
        let split = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        let (digits, unit) = value.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration: {value:?}"))?;
        match unit {
            "" | "s" => Ok(Duration::from_secs(amount)),
            "ms" => Ok(Duration::from_millis(amount)),
            "m" => Ok(Duration::from_secs(amount * 60)),
            "h" => Ok(Duration::from_secs(amount * 3600)),
            _ => Err(format!("invalid duration unit: {unit:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::duration_spec;
    use std::time::Duration;

    #[test]
    fn parse_duration_units() {
        assert_eq!(duration_spec::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(
            duration_spec::parse("1500ms").unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(duration_spec::parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(duration_spec::parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(duration_spec::parse("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(duration_spec::parse("soon").is_err());
        assert!(duration_spec::parse("10 parsecs").is_err());
        assert!(duration_spec::parse("").is_err());
    }
}
