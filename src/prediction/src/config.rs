//! Version configuration supplied by the environment.
//!
//! The serving environment may describe the model version being served as a JSON
//! document in the `create_version_request` variable. Only the custom model class
//! and the package locations (for diagnostics) are read here.
use crate::error::{PredictionError, Result};
use serde::Deserialize;
use std::env;

/// Environment variable holding the version request document.
pub const CREATE_VERSION_REQUEST_ENV: &str = "create_version_request";

/// The version request document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CreateVersionRequest {
    /// The version being created.
    #[serde(default)]
    pub version: Option<VersionSpec>,
}

/// Model version settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct VersionSpec {
    /// Fully qualified name of a user supplied model class.
    #[serde(default)]
    pub model_class: Option<String>,
    /// Packages the user code was installed from.
    #[serde(default)]
    pub package_uris: Vec<String>,
}

impl CreateVersionRequest {
    /// Read the request from the environment. `None` when the variable is unset or
    /// empty, or the document is `null`.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var(CREATE_VERSION_REQUEST_ENV) {
            Ok(json) => Self::from_json(&json),
            Err(_) => Ok(None),
        }
    }

    /// Parse a request document.
    pub fn from_json(json: &str) -> Result<Option<Self>> {
        if json.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<CreateVersionRequest>>(json).map_err(|e| {
            PredictionError::invalid_user_code(format!(
                "Could not parse {}: {}",
                CREATE_VERSION_REQUEST_ENV, e
            ))
        })
    }

    /// The configured model class, if any.
    pub fn model_class(&self) -> Option<&str> {
        self.version
            .as_ref()
            .and_then(|version| version.model_class.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// The configured package locations.
    pub fn package_uris(&self) -> &[String] {
        self.version
            .as_ref()
            .map(|version| version.package_uris.as_slice())
            .unwrap_or(&[])
    }
}
