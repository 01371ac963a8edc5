//! Environment Classifier
//!
//! Maps a resource to an environment label with a strict priority chain.
//! First match wins:
//!
//! 1. recognized tag with a non-empty value
//! 2. manual mapping on the resource id
//! 3. mapping on the account id
//! 4. naming patterns, in configured order
//! 5. the configured default

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{ClassificationSource, ResourceRecord, UNCLASSIFIED_LABEL};

/// Classification rules, read-only for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Tag keys that carry an environment, matched case-insensitively
    pub tag_keys: Vec<String>,
    /// Resource id -> environment
    pub instance_mappings: HashMap<String, String>,
    /// Account id -> environment
    pub account_mappings: HashMap<String, String>,
    /// Ordered naming rules
    pub naming_patterns: Vec<NamingRule>,
    pub default_environment: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            tag_keys: ["Environment", "environment", "Env", "env", "Stage", "stage"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            instance_mappings: HashMap::new(),
            account_mappings: HashMap::new(),
            naming_patterns: Vec::new(),
            default_environment: UNCLASSIFIED_LABEL.to_string(),
        }
    }
}

/// Patterns that map resource ids to one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingRule {
    pub environment: String,
    pub patterns: Vec<NamePattern>,
}

/// One id pattern, e.g. `{"prefix": "dev-"}` or `{"regex": "^stg\\d+"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamePattern {
    Prefix(String),
    Suffix(String),
    Regex(String),
}

enum CompiledPattern {
    Prefix(String),
    Suffix(String),
    Regex(Regex),
}

impl CompiledPattern {
    fn compile(pattern: &NamePattern) -> Result<Self, regex::Error> {
        Ok(match pattern {
            NamePattern::Prefix(p) => CompiledPattern::Prefix(p.to_lowercase()),
            NamePattern::Suffix(s) => CompiledPattern::Suffix(s.to_lowercase()),
            NamePattern::Regex(r) => CompiledPattern::Regex(Regex::new(r)?),
        })
    }

    fn matches(&self, id: &str, id_lower: &str) -> bool {
        match self {
            CompiledPattern::Prefix(p) => id_lower.starts_with(p.as_str()),
            CompiledPattern::Suffix(s) => id_lower.ends_with(s.as_str()),
            CompiledPattern::Regex(r) => r.is_match(id),
        }
    }
}

/// Compiled form of a [`ClassificationConfig`]
pub struct EnvironmentClassifier {
    tag_keys: Vec<String>,
    instance_mappings: HashMap<String, String>,
    account_mappings: HashMap<String, String>,
    rules: Vec<(String, Vec<CompiledPattern>)>,
    default_environment: String,
}

impl EnvironmentClassifier {
    /// Compile the rules; fails only on an invalid regex
    pub fn new(config: &ClassificationConfig) -> Result<Self, regex::Error> {
        let mut rules = Vec::with_capacity(config.naming_patterns.len());
        for rule in &config.naming_patterns {
            let Some(environment) = normalize_label(&rule.environment) else {
                continue;
            };
            let patterns = rule
                .patterns
                .iter()
                .map(CompiledPattern::compile)
                .collect::<Result<Vec<_>, _>>()?;
            rules.push((environment, patterns));
        }

        Ok(Self {
            tag_keys: config.tag_keys.iter().map(|k| k.to_lowercase()).collect(),
            instance_mappings: normalize_mappings(&config.instance_mappings),
            account_mappings: normalize_mappings(&config.account_mappings),
            rules,
            default_environment: normalize_label(&config.default_environment)
                .unwrap_or_else(|| UNCLASSIFIED_LABEL.to_string()),
        })
    }

    /// Resolve the label and the rule that produced it
    pub fn classify(&self, record: &ResourceRecord) -> (String, ClassificationSource) {
        if let Some(label) = self.from_tags(record) {
            return (label, ClassificationSource::Tag);
        }
        if let Some(label) = self.instance_mappings.get(&record.id) {
            return (label.clone(), ClassificationSource::ManualMapping);
        }
        if let Some(label) = self.account_mappings.get(&record.account_id) {
            return (label.clone(), ClassificationSource::AccountMapping);
        }
        if let Some(label) = self.from_naming(&record.id) {
            return (label, ClassificationSource::NamingPattern);
        }
        (self.default_environment.clone(), ClassificationSource::Default)
    }

    /// Classify in place
    pub fn apply(&self, record: &mut ResourceRecord) {
        let (label, source) = self.classify(record);
        record.environment_label = label;
        record.classification_source = source;
    }

    fn from_tags(&self, record: &ResourceRecord) -> Option<String> {
        self.tag_keys.iter().find_map(|wanted| {
            record
                .tags
                .iter()
                .filter(|(key, _)| key.to_lowercase() == *wanted)
                .find_map(|(_, value)| normalize_label(value))
        })
    }

    fn from_naming(&self, id: &str) -> Option<String> {
        let id_lower = id.to_lowercase();
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.matches(id, &id_lower)))
            .map(|(environment, _)| environment.clone())
    }
}

fn normalize_label(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn normalize_mappings(mappings: &HashMap<String, String>) -> HashMap<String, String> {
    mappings
        .iter()
        .filter_map(|(key, label)| normalize_label(label).map(|l| (key.clone(), l)))
        .collect()
}
