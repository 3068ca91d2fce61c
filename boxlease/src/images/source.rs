//! Where image references are checked for existence.

use std::collections::HashSet;

use async_trait::async_trait;
use oci_client::client::ClientConfig;
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference};

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// Confirms that a fully qualified reference exists.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Returns the manifest digest (or another stable identifier) of `reference`.
    async fn lookup(&self, reference: &str) -> BoxleaseResult<String>;
}

/// Anonymous manifest lookups against OCI registries.
#[derive(Clone)]
pub struct OciRegistrySource {
    client: Client,
}

impl Default for OciRegistrySource {
    fn default() -> Self {
        Self::new()
    }
}

impl OciRegistrySource {
    pub fn new() -> Self {
        Self {
            client: Client::new(ClientConfig::default()),
        }
    }
}

#[async_trait]
impl ImageSource for OciRegistrySource {
    async fn lookup(&self, reference: &str) -> BoxleaseResult<String> {
        let parsed: Reference = reference.parse().map_err(|e| {
            BoxleaseError::Parse(format!("invalid image reference '{}': {}", reference, e))
        })?;

        tracing::debug!(reference, "Probing registry for manifest");
        self.client
            .fetch_manifest_digest(&parsed, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| BoxleaseError::NotFound(format!("{}: {}", reference, e)))
    }
}

/// A fixed catalogue of known references.
///
/// Useful on hosts without registry access, where images are provisioned out
/// of band.
#[derive(Clone, Debug, Default)]
pub struct StaticImageSource {
    known: HashSet<String>,
}

impl StaticImageSource {
    pub fn new<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: references.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ImageSource for StaticImageSource {
    async fn lookup(&self, reference: &str) -> BoxleaseResult<String> {
        if self.known.contains(reference) {
            Ok(format!("static:{}", reference))
        } else {
            Err(BoxleaseError::NotFound(reference.to_string()))
        }
    }
}
