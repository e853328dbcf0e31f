//! Registry credentials
//!
//! Images and data containers may carry a base64-encoded JSON auth blob.
//! Credentials are keyed by registry host; when several references point at
//! the same registry the last one scanned wins.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use conveyor_core::domain::job::Job;

/// Username and password for one registry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthInfo {
    pub username: String,
    pub password: String,
}

/// Registry host → credentials, ordered by host
pub type RegistryCredentials = BTreeMap<String, AuthInfo>;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("auth token for '{image}' is not valid base64: {source}")]
    Base64 {
        image: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("auth token for '{image}' is not a valid credentials object: {source}")]
    Json {
        image: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Returns the registry host of an image reference
///
/// This is the text before the first `/`, or an empty string when the
/// reference has no namespace.
pub fn parse_repo(image: &str) -> &str {
    match image.split_once('/') {
        Some((registry, _)) => registry,
        None => "",
    }
}

/// Decodes a base64 JSON auth blob
pub fn parse_auth(image: &str, token: &str) -> Result<AuthInfo, CredentialError> {
    let raw = STANDARD
        .decode(token)
        .map_err(|source| CredentialError::Base64 {
            image: image.to_string(),
            source,
        })?;

    serde_json::from_slice(&raw).map_err(|source| CredentialError::Json {
        image: image.to_string(),
        source,
    })
}

/// Collects the credentials of every step in the job
///
/// Scans each step's tool image and then its data containers, in order.
/// Missing or empty tokens are skipped; any malformed token fails the whole
/// scan.
pub fn resolve(job: &Job) -> Result<RegistryCredentials, CredentialError> {
    let mut creds = RegistryCredentials::new();

    for step in &job.steps {
        let container = step.container();

        let references = std::iter::once((&container.image.name, &container.image.auth)).chain(
            container
                .volumes_from
                .iter()
                .map(|data| (&data.name, &data.auth)),
        );

        for (image, auth) in references {
            let Some(token) = auth.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            let info = parse_auth(image, token)?;
            creds.insert(parse_repo(image).to_string(), info);
        }
    }

    Ok(creds)
}
