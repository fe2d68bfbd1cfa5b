//! Repository descriptors
//!
//! Typed forms of the two descriptor files carried as signed target files
//! of the authentication repository:
//!
//! - `repositories.json`; namespaced repository name to urls + custom
//!   attributes
//! - `mirrors.json`; ordered URL templates with `{org_name}` and
//!   `{repo_name}` placeholders, used when a repository entry carries no
//!   direct urls
//!
//! Both are parsed through schema-validated deserialization: malformed
//! input fails fast instead of propagating ad hoc dictionary lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canonical filename of the repositories descriptor target file.
pub const REPOSITORIES_JSON: &str = "repositories.json";
/// Canonical filename of the mirrors descriptor target file.
pub const MIRRORS_JSON: &str = "mirrors.json";

/// Descriptor parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("malformed {file}: {reason}")]
    Malformed { file: String, reason: String },
    #[error("repository name {0} is not namespaced (expected ns/name)")]
    NotNamespaced(String),
}

/// One entry of the repositories descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Direct urls (or filesystem paths) for the repository. May be empty
    /// when a mirrors descriptor supplies templates instead.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Opaque custom attributes, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

/// The authenticated mapping of namespaced repository names to their
/// locations. Consumed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoriesDescriptor {
    pub repositories: BTreeMap<String, RepositoryEntry>,
}

impl RepositoriesDescriptor {
    /// Parse and schema-validate the descriptor, checking that every name
    /// is namespaced.
    pub fn parse(raw: &[u8]) -> Result<Self, DescriptorError> {
        let descriptor: RepositoriesDescriptor =
            serde_json::from_slice(raw).map_err(|e| DescriptorError::Malformed {
                file: REPOSITORIES_JSON.to_string(),
                reason: e.to_string(),
            })?;
        for name in descriptor.repositories.keys() {
            split_namespaced(name)?;
        }
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryEntry> {
        self.repositories.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.repositories.keys()
    }
}

/// Ordered URL templates used to resolve a repository name to concrete
/// urls when its entry has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MirrorsDescriptor(Vec<String>);

impl MirrorsDescriptor {
    pub fn parse(raw: &[u8]) -> Result<Self, DescriptorError> {
        serde_json::from_slice(raw).map_err(|e| DescriptorError::Malformed {
            file: MIRRORS_JSON.to_string(),
            reason: e.to_string(),
        })
    }

    /// Substitute a namespaced name into every template, in order.
    pub fn resolve(&self, namespaced_name: &str) -> Result<Vec<String>, DescriptorError> {
        let (org_name, repo_name) = split_namespaced(namespaced_name)?;
        Ok(self
            .0
            .iter()
            .map(|template| {
                template
                    .replace("{org_name}", org_name)
                    .replace("{repo_name}", repo_name)
            })
            .collect())
    }
}

/// Split a `ns/name` repository name into its namespace and name parts.
pub fn split_namespaced(name: &str) -> Result<(&str, &str), DescriptorError> {
    match name.split_once('/') {
        Some((ns, repo)) if !ns.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((ns, repo))
        }
        _ => Err(DescriptorError::NotNamespaced(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repositories() {
        let raw = br#"{
            "repositories": {
                "ns/repo1": { "urls": ["https://example.com/ns/repo1.git"] },
                "ns/repo2": { "custom": { "type": "html" } }
            }
        }"#;
        let descriptor = RepositoriesDescriptor::parse(raw).unwrap();
        assert_eq!(descriptor.repositories.len(), 2);
        assert_eq!(
            descriptor.get("ns/repo1").unwrap().urls,
            vec!["https://example.com/ns/repo1.git"]
        );
        assert!(descriptor.get("ns/repo2").unwrap().urls.is_empty());
    }

    #[test]
    fn test_parse_rejects_unnamespaced_names() {
        let raw = br#"{ "repositories": { "repo1": {} } }"#;
        assert!(matches!(
            RepositoriesDescriptor::parse(raw),
            Err(DescriptorError::NotNamespaced(_))
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(RepositoriesDescriptor::parse(b"[1, 2, 3]").is_err());
        assert!(RepositoriesDescriptor::parse(b"not json").is_err());
    }

    #[test]
    fn test_mirror_substitution() {
        let mirrors =
            MirrorsDescriptor::parse(br#"["https://github.com/{org_name}/{repo_name}.git"]"#)
                .unwrap();
        assert_eq!(
            mirrors.resolve("ns/repo1").unwrap(),
            vec!["https://github.com/ns/repo1.git"]
        );
    }
}
