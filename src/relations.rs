//! # Relation Matcher
//!
//! Soft foreign keys resolved from an entity's name. A source can say "every
//! host whose name starts with `lab-` lives in site `Lab`" with an ordered
//! list of `"<regex> = <label>"` rules; the first matching rule wins.

use crate::config::SourceConfig;
use crate::model::EntityKind;
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("relation rule `{0}` has no `=` separating pattern and label")]
    MissingSeparator(String),

    #[error("relation rule `{0}` has an empty pattern or label")]
    Empty(String),

    #[error("relation rule `{rule}` has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RelationRule {
    pattern: Regex,
    label: String,
}

impl RelationRule {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn new(pattern: &str, label: &str) -> Result<Self, RuleParseError> {
        let regex = Regex::new(pattern).map_err(|source| RuleParseError::InvalidPattern {
            rule: format!("{pattern} = {label}"),
            source,
        })?;
        Ok(Self {
            pattern: regex,
            label: label.to_string(),
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl FromStr for RelationRule {
    type Err = RuleParseError;

    /// Parse `"<regex> = <label>"`, splitting on the first `=`.
    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let (pattern, label) = rule
            .split_once('=')
            .ok_or_else(|| RuleParseError::MissingSeparator(rule.to_string()))?;
        let (pattern, label) = (pattern.trim(), label.trim());
        if pattern.is_empty() || label.is_empty() {
            return Err(RuleParseError::Empty(rule.to_string()));
        }
        Self::new(pattern, label)
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct RelationRules(Vec<RelationRule>);

impl RelationRules {
    #[must_use]
    pub fn new(rules: Vec<RelationRule>) -> Self {
        Self(rules)
    }

    /// # Errors
    ///
    /// Returns the first rule that fails to parse.
    pub fn parse<S: AsRef<str>>(rules: &[S]) -> Result<Self, RuleParseError> {
        rules
            .iter()
            .map(|rule| rule.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Label of the first rule matching `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|rule| rule.pattern.is_match(name))
            .map(RelationRule::label)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rules applied to one relation field of one kind.
#[derive(Debug, Clone)]
pub struct RelationBinding {
    pub subject: EntityKind,
    pub field: &'static str,
    pub target: EntityKind,
    pub rules: RelationRules,
}

/// All relation rules of one source.
#[derive(Debug, Clone, Default)]
pub struct SourceRelations {
    bindings: Vec<RelationBinding>,
}

impl SourceRelations {
    /// # Errors
    ///
    /// Returns the first rule that fails to parse.
    pub fn from_config(config: &SourceConfig) -> Result<Self, RuleParseError> {
        let relations = Self::default()
            .bind(EntityKind::Cluster, "site", RelationRules::parse(&config.cluster_site_relations)?)
            .bind(EntityKind::Device, "site", RelationRules::parse(&config.host_site_relations)?)
            .bind(EntityKind::Cluster, "tenant", RelationRules::parse(&config.cluster_tenant_relations)?)
            .bind(EntityKind::Device, "tenant", RelationRules::parse(&config.host_tenant_relations)?)
            .bind(EntityKind::VirtualMachine, "tenant", RelationRules::parse(&config.vm_tenant_relations)?);
        Ok(relations)
    }

    /// Attach `rules` to `subject.field`. Empty rule lists and fields that are
    /// not relations of `subject` are ignored.
    #[must_use]
    pub fn bind(mut self, subject: EntityKind, field: &'static str, rules: RelationRules) -> Self {
        if let Some(target) = subject.relation_target(field) {
            if !rules.is_empty() {
                self.bindings.push(RelationBinding {
                    subject,
                    field,
                    target,
                    rules,
                });
            }
        }
        self
    }

    /// Bindings that apply to entities of `kind`.
    pub fn for_kind(&self, kind: EntityKind) -> impl Iterator<Item = &RelationBinding> {
        self.bindings.iter().filter(move |binding| binding.subject == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let rules = RelationRules::parse(&["^web-.* = A", ".* = B"]).unwrap();

        assert_eq!(rules.resolve("web-01"), Some("A"));
        assert_eq!(rules.resolve("db-01"), Some("B"));
    }

    #[test]
    fn test_no_match_is_none() {
        let rules = RelationRules::parse(&["^web-.* = A"]).unwrap();
        assert_eq!(rules.resolve("db-01"), None);
        assert_eq!(RelationRules::default().resolve("anything"), None);
    }

    #[test]
    fn test_split_on_first_equals_and_trim() {
        let rule: RelationRule = " ^web-  =  Site = One ".parse().unwrap();
        assert_eq!(rule.label(), "Site = One");
        assert!(rule.pattern.is_match("web-01"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "no separator".parse::<RelationRule>(),
            Err(RuleParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            " = Site".parse::<RelationRule>(),
            Err(RuleParseError::Empty(_))
        ));
        assert!(matches!(
            "([a-z = Site".parse::<RelationRule>(),
            Err(RuleParseError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_bindings_from_source_config() {
        let config: SourceConfig = serde_yaml::from_str(
            r#"
name: lab
type: file
path: lab.yaml
host_site_relations: ["^lab- = Lab"]
vm_tenant_relations: [".* = Ops"]
"#,
        )
        .unwrap();

        let relations = SourceRelations::from_config(&config).unwrap();

        let device: Vec<_> = relations.for_kind(EntityKind::Device).collect();
        assert_eq!(device.len(), 1);
        assert_eq!(device[0].field, "site");
        assert_eq!(device[0].target, EntityKind::Site);
        assert_eq!(device[0].rules.resolve("lab-h1"), Some("Lab"));

        let vm: Vec<_> = relations.for_kind(EntityKind::VirtualMachine).collect();
        assert_eq!(vm.len(), 1);
        assert_eq!(vm[0].target, EntityKind::Tenant);

        assert_eq!(relations.for_kind(EntityKind::Cluster).count(), 0);
    }
}
