//! Ordered registry fallback for unqualified references.

use std::sync::Arc;

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

use super::{ImageReference, ImageSource};

/// A reference pinned to a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub reference: String,
    pub digest: String,
}

/// Tries registries strictly in the configured order and stops at the first hit.
#[derive(Clone)]
pub struct ImageResolver {
    registries: Vec<String>,
    source: Arc<dyn ImageSource>,
}

impl ImageResolver {
    pub fn new(registries: Vec<String>, source: Arc<dyn ImageSource>) -> Self {
        Self { registries, source }
    }

    pub fn registries(&self) -> &[String] {
        &self.registries
    }

    pub async fn resolve(&self, reference: &str) -> BoxleaseResult<ResolvedImage> {
        let parsed = ImageReference::parse(reference)?;

        let candidates: Vec<String> = if parsed.is_fully_qualified() {
            vec![parsed.to_string()]
        } else {
            self.registries
                .iter()
                .map(|registry| parsed.qualified_for(registry))
                .collect()
        };

        let mut attempts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.source.lookup(&candidate).await {
                Ok(digest) => {
                    tracing::info!(reference, resolved = %candidate, "Resolved image");
                    return Ok(ResolvedImage {
                        reference: candidate,
                        digest,
                    });
                }
                Err(e) => {
                    tracing::debug!(candidate = %candidate, error = %e, "Image not found");
                    attempts.push(candidate);
                }
            }
        }

        Err(BoxleaseError::ImageResolution {
            reference: reference.to_string(),
            attempts,
        })
    }
}
