use boxlease_shared::constants::defaults;
use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

/// A parsed image reference: `[registry/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Explicit registry host, if the reference carries one.
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> BoxleaseResult<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BoxleaseError::Parse("empty image reference".into()));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => {
                return Err(BoxleaseError::Parse(format!(
                    "empty digest in image reference '{}'",
                    reference
                )));
            }
            None => (reference, None),
        };

        // A tag colon only counts after the last slash; earlier colons are ports.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, name.to_string()),
        };

        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(BoxleaseError::Parse(format!(
                "malformed image reference '{}'",
                reference
            )));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// True when the reference names its registry and must be used as-is.
    pub fn is_fully_qualified(&self) -> bool {
        self.registry.is_some()
    }

    /// This reference placed on `registry`.
    ///
    /// Single-segment repositories live under `library/`.
    pub fn qualified_for(&self, registry: &str) -> String {
        let repository = if self.repository.contains('/') {
            self.repository.clone()
        } else {
            format!("library/{}", self.repository)
        };
        format!("{}/{}{}", registry, repository, self.suffix())
    }

    fn suffix(&self) -> String {
        match (&self.tag, &self.digest) {
            (_, Some(digest)) => match &self.tag {
                Some(tag) => format!(":{}@{}", tag, digest),
                None => format!("@{}", digest),
            },
            (Some(tag), None) => format!(":{}", tag),
            (None, None) => format!(":{}", defaults::TAG),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.registry {
            Some(registry) => write!(f, "{}/{}{}", registry, self.repository, self.suffix()),
            None => write!(f, "{}{}", self.repository, self.suffix()),
        }
    }
}

/// Docker's rule: the first component is a host if it has a dot or a port,
/// or is `localhost`.
fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}
