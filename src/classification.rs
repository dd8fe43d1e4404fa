//! Trust and verification labels for catalog entries
//!
//! Classification is display metadata only. It is derived from the
//! namespace's trusted flag, the configured trusted namespaces and the
//! module's verified flag, and never influences resolution.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{ModuleMetadata, Namespace};
use crate::config::ClassificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Trusted,
    Verified,
    Contributed,
}

/// Labels attached to one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub trusted: bool,
    pub verified: bool,
    pub labels: Vec<Label>,
}

impl Classification {
    pub fn contributed(&self) -> bool {
        self.labels.contains(&Label::Contributed)
    }
}

pub struct ClassificationEngine {
    config: ClassificationConfig,
    trusted_namespaces: HashSet<String>,
    case_insensitive: bool,
}

impl ClassificationEngine {
    pub fn new(config: ClassificationConfig, case_insensitive: bool) -> Self {
        let trusted_namespaces = config
            .trusted_namespaces
            .iter()
            .map(|ns| normalize(ns, case_insensitive))
            .collect();
        Self {
            config,
            trusted_namespaces,
            case_insensitive,
        }
    }

    /// Whether the namespace is trusted by configuration or by its stored flag
    pub fn is_trusted_namespace(&self, namespace: &Namespace) -> bool {
        namespace.trusted
            || self
                .trusted_namespaces
                .contains(&normalize(&namespace.name, self.case_insensitive))
    }

    pub fn classify(&self, namespace: &Namespace, module: &ModuleMetadata) -> Classification {
        let trusted = self.is_trusted_namespace(namespace);
        let verified = module.verified;

        let mut labels = Vec::with_capacity(2);
        if trusted {
            labels.push(Label::Trusted);
        }
        if verified {
            labels.push(Label::Verified);
        }
        if labels.is_empty() {
            labels.push(Label::Contributed);
        }

        Classification {
            trusted,
            verified,
            labels,
        }
    }

    /// Configured display strings for a classification, in label order
    pub fn display_labels(&self, classification: &Classification) -> Vec<String> {
        classification
            .labels
            .iter()
            .map(|label| match label {
                Label::Trusted => self.config.trusted_label.clone(),
                Label::Verified => self.config.verified_label.clone(),
                Label::Contributed => self.config.contributed_label.clone(),
            })
            .collect()
    }
}

fn normalize(namespace: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        namespace.to_lowercase()
    } else {
        namespace.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModuleId, ModuleKind};
    use chrono::Utc;
    use rstest::rstest;

    fn namespace(name: &str, trusted: bool) -> Namespace {
        Namespace {
            name: name.to_string(),
            display_name: None,
            trusted,
        }
    }

    fn module(verified: bool) -> ModuleMetadata {
        ModuleMetadata {
            id: ModuleId::new("acme", "vpc", "aws"),
            kind: ModuleKind::Module,
            verified,
            description: None,
            owner: None,
            source_url: None,
            created_at: Utc::now(),
        }
    }

    fn engine(trusted: &[&str], case_insensitive: bool) -> ClassificationEngine {
        ClassificationEngine::new(
            ClassificationConfig {
                trusted_namespaces: trusted.iter().map(|s| s.to_string()).collect(),
                ..ClassificationConfig::default()
            },
            case_insensitive,
        )
    }

    #[rstest]
    #[case(false, false, vec![Label::Contributed])]
    #[case(true, false, vec![Label::Trusted])]
    #[case(false, true, vec![Label::Verified])]
    #[case(true, true, vec![Label::Trusted, Label::Verified])]
    fn classify_combines_trust_and_verification(
        #[case] trusted: bool,
        #[case] verified: bool,
        #[case] expected: Vec<Label>,
    ) {
        let result = engine(&[], false).classify(&namespace("acme", trusted), &module(verified));

        assert_eq!(result.labels, expected);
        assert_eq!(result.contributed(), !trusted && !verified);
    }

    #[test]
    fn configured_trusted_namespace_is_trusted_without_flag() {
        let engine = engine(&["platform"], false);

        assert!(engine.is_trusted_namespace(&namespace("platform", false)));
        assert!(!engine.is_trusted_namespace(&namespace("Platform", false)));
    }

    #[test]
    fn configured_trusted_namespace_honors_case_policy() {
        let engine = engine(&["Platform"], true);
        assert!(engine.is_trusted_namespace(&namespace("platform", false)));
    }

    #[test]
    fn display_labels_use_configured_strings() {
        let engine = ClassificationEngine::new(
            ClassificationConfig {
                trusted_label: "Official".to_string(),
                ..ClassificationConfig::default()
            },
            false,
        );
        let classification = engine.classify(&namespace("acme", true), &module(true));

        assert_eq!(
            engine.display_labels(&classification),
            vec!["Official".to_string(), "Verified".to_string()]
        );
    }
}
