use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CREDENTIALS_ENV: &str = "PUTTBOARD_CREDENTIALS";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no credentials: pass --credentials or set {CREDENTIALS_ENV}")]
    Missing,
    #[error("failed to read credentials {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("credentials {path} are not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("credentials {path} have an empty {field}")]
    EmptyField { path: String, field: &'static str },
}

#[derive(Debug, Deserialize)]
struct RawCredentials {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    data_path: String,
}

/// Target environment the run talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub project_id: String,
    /// Document set backing the store; relative paths resolve against the
    /// credentials file's directory.
    pub data_path: PathBuf,
}

impl Credentials {
    /// Load from `flag`, falling back to the environment variable.
    pub fn resolve(flag: Option<&Path>) -> Result<Self, CredentialsError> {
        let path = match flag {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CREDENTIALS_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .ok_or(CredentialsError::Missing)?,
        };
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: display.clone(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, CredentialsError> {
        let display = path.display().to_string();
        let parsed: RawCredentials =
            serde_json::from_str(raw).map_err(|source| CredentialsError::Parse {
                path: display.clone(),
                source,
            })?;
        let project_id = parsed.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(CredentialsError::EmptyField {
                path: display,
                field: "project_id",
            });
        }
        let data_path = parsed.data_path.trim();
        if data_path.is_empty() {
            return Err(CredentialsError::EmptyField {
                path: display,
                field: "data_path",
            });
        }
        let data_path = PathBuf::from(data_path);
        let data_path = if data_path.is_relative() {
            path.parent()
                .map_or_else(|| data_path.clone(), |dir| dir.join(&data_path))
        } else {
            data_path
        };
        Ok(Self {
            project_id,
            data_path,
        })
    }
}
