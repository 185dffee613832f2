//! The part of the piped config the launcher needs.
//!
//! The full document belongs to piped; the launcher only reads the control
//! plane address and the credentials used to ask for the desired version.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::domain::error::LauncherError;

pub const PIPED_KIND: &str = "Piped";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    spec: LauncherSpec,
}

/// Control plane connection settings read from the piped config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherSpec {
    #[serde(default)]
    pub api_address: String,
    #[serde(default, rename = "projectID")]
    pub project_id: String,
    #[serde(default, rename = "pipedID")]
    pub piped_id: String,
    #[serde(default)]
    pub piped_key_file: String,
    #[serde(default)]
    pub piped_key_data: String,
}

/// Where the piped key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipedKeySource {
    /// Decoded from `pipedKeyData`.
    Inline(Vec<u8>),
    /// Read from `pipedKeyFile`.
    File(String),
}

impl LauncherSpec {
    /// Parse and validate the piped config bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LauncherError::InvalidConfig`] for malformed YAML, a kind
    /// other than `Piped`, or missing connection fields.
    pub fn parse(data: &[u8]) -> Result<Self, LauncherError> {
        let doc: Document = serde_yaml::from_slice(data)
            .map_err(|e| LauncherError::InvalidConfig(e.to_string()))?;
        if doc.kind != PIPED_KIND {
            return Err(LauncherError::InvalidConfig(format!(
                "kind must be {PIPED_KIND}, got {:?}",
                doc.kind
            )));
        }
        doc.spec.validate()?;
        Ok(doc.spec)
    }

    fn validate(&self) -> Result<(), LauncherError> {
        let missing = |what: &str| Err(LauncherError::InvalidConfig(format!("{what} must be set")));
        if self.project_id.is_empty() {
            return missing("projectID");
        }
        if self.piped_id.is_empty() {
            return missing("pipedID");
        }
        if self.piped_key_data.is_empty() && self.piped_key_file.is_empty() {
            return missing("either pipedKeyFile or pipedKeyData");
        }
        if !self.piped_key_data.is_empty() && !self.piped_key_file.is_empty() {
            return Err(LauncherError::InvalidConfig(
                "only pipedKeyFile or pipedKeyData can be set".into(),
            ));
        }
        if self.api_address.is_empty() {
            return missing("apiAddress");
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`LauncherError::InvalidConfig`] when `pipedKeyData` is not
    /// valid base64.
    pub fn piped_key_source(&self) -> Result<PipedKeySource, LauncherError> {
        if self.piped_key_data.is_empty() {
            return Ok(PipedKeySource::File(self.piped_key_file.clone()));
        }
        STANDARD
            .decode(self.piped_key_data.trim())
            .map(PipedKeySource::Inline)
            .map_err(|e| LauncherError::InvalidConfig(format!("pipedKeyData is not base64: {e}")))
    }
}
