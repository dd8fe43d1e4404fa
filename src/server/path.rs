//! Path segment parsing shared by the module and provider routes

use crate::catalog::{ModuleId, validate_identifier};
use crate::error::RegistryError;

const TOKEN_SEPARATOR: &str = "__";

/// A namespace path segment, optionally prefixed with `<token>__`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSegment {
    pub namespace: String,
    pub analytics_token: Option<String>,
}

impl NamespaceSegment {
    /// Split off the analytics token, which must itself be a valid identifier
    ///
    /// The token is echoed into redirect locations, so a token such as `a/b`
    /// is rejected here rather than producing a broken path.
    pub fn parse(segment: &str) -> Result<Self, RegistryError> {
        match segment.split_once(TOKEN_SEPARATOR) {
            Some(("", namespace)) => Ok(Self {
                namespace: namespace.to_string(),
                analytics_token: None,
            }),
            Some((token, namespace)) => {
                validate_identifier("analytics token", token)?;
                Ok(Self {
                    namespace: namespace.to_string(),
                    analytics_token: Some(token.to_string()),
                })
            }
            None => Ok(Self {
                namespace: segment.to_string(),
                analytics_token: None,
            }),
        }
    }
}

/// Build a validated module identity from raw path segments
pub fn module_id(namespace: &str, name: &str, target: &str) -> Result<ModuleId, RegistryError> {
    validate_identifier("namespace", namespace)?;
    validate_identifier("name", name)?;
    validate_identifier("target", target)?;
    Ok(ModuleId::new(namespace, name, target))
}
