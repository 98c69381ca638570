//! Label selector model for picking backend services.
//!
//! Mirrors the Kubernetes `LabelSelector` shape: `matchLabels` and
//! `matchExpressions` are ANDed, and an empty selector matches everything.
//! Operators are kept as strings on the wire so a bad operator surfaces as a
//! [`SelectorError`] at evaluation time instead of a decode failure.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while evaluating a label selector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector requirement has an empty key")]
    EmptyKey,

    #[error("unknown operator {operator:?} for key {key:?}")]
    UnknownOperator { key: String, operator: String },

    #[error("operator {operator} for key {key:?} requires at least one value")]
    MissingValues { key: String, operator: String },

    #[error("operator {operator} for key {key:?} does not take values")]
    UnexpectedValues { key: String, operator: String },
}

/// Label selector to match Kubernetes resources
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact label matches, all of which must hold
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements, all of which must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based selector requirement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LabelSelectorRequirement {
    /// The label key that the requirement applies to
    pub key: String,

    /// One of In, NotIn, Exists, DoesNotExist
    pub operator: String,

    /// Values for In and NotIn, must be empty for Exists and DoesNotExist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl LabelSelectorRequirement {
    fn operator(&self) -> Result<Operator, SelectorError> {
        if self.key.is_empty() {
            return Err(SelectorError::EmptyKey);
        }

        let op = match self.operator.as_str() {
            "In" => Operator::In,
            "NotIn" => Operator::NotIn,
            "Exists" => Operator::Exists,
            "DoesNotExist" => Operator::DoesNotExist,
            other => {
                return Err(SelectorError::UnknownOperator {
                    key: self.key.clone(),
                    operator: other.to_string(),
                })
            }
        };

        match op {
            Operator::In | Operator::NotIn if self.values.is_empty() => {
                Err(SelectorError::MissingValues {
                    key: self.key.clone(),
                    operator: self.operator.clone(),
                })
            }
            Operator::Exists | Operator::DoesNotExist if !self.values.is_empty() => {
                Err(SelectorError::UnexpectedValues {
                    key: self.key.clone(),
                    operator: self.operator.clone(),
                })
            }
            _ => Ok(op),
        }
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, SelectorError> {
        let value = labels.get(&self.key);
        Ok(match self.operator()? {
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        })
    }

    fn to_query(&self) -> Result<String, SelectorError> {
        Ok(match self.operator()? {
            Operator::In => format!("{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => format!("{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => self.key.clone(),
            Operator::DoesNotExist => format!("!{}", self.key),
        })
    }
}

impl LabelSelector {
    /// Selector matching a single `key=value` label
    pub fn from_label(key: &str, value: &str) -> Self {
        Self {
            match_labels: BTreeMap::from([(key.to_string(), value.to_string())]),
            match_expressions: Vec::new(),
        }
    }

    /// Check every requirement is well formed
    pub fn validate(&self) -> Result<(), SelectorError> {
        if self.match_labels.keys().any(|k| k.is_empty()) {
            return Err(SelectorError::EmptyKey);
        }
        for requirement in &self.match_expressions {
            requirement.operator()?;
        }
        Ok(())
    }

    /// Evaluate the selector against a label set
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, SelectorError> {
        self.validate()?;

        let labels_match = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));
        if !labels_match {
            return Ok(false);
        }

        for requirement in &self.match_expressions {
            if !requirement.matches(labels)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Render the selector in the API server's list query syntax.
    ///
    /// Returns an empty string for a selector that matches everything.
    pub fn to_query(&self) -> Result<String, SelectorError> {
        self.validate()?;

        let mut parts: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        for requirement in &self.match_expressions {
            parts.push(requirement.to_query()?);
        }
        Ok(parts.join(","))
    }
}
