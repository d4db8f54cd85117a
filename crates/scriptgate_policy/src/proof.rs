//! Decision proofs for access decisions.
//!
//! Every access decision is recorded as a proof carrying the subject, the
//! resource, the outcome, and the facts the outcome was based on. Proofs are
//! emitted through `tracing` so the audit trail lives with the rest of the
//! execution log.

use scriptgate_core::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Kind of proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofKind {
    /// Access granted
    Allow,
    /// Access denied
    Deny,
}

/// Proof field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofField {
    /// Field name
    pub name: String,
    /// Field value
    pub value: String,
}

impl ProofField {
    /// Create a field from any displayable value
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl std::fmt::Display) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }

    /// Create a boolean field
    #[must_use]
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, value)
    }
}

/// Record of one access decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionProof {
    /// Unique proof ID
    pub id: String,
    /// Proof kind
    pub kind: ProofKind,
    /// When the decision was made
    pub timestamp: Timestamp,
    /// Decision result (true = allowed)
    pub decision: bool,
    /// User the decision was made for
    pub subject: Option<UserId>,
    /// Data source name
    pub resource: Option<String>,
    /// Facts behind the decision
    pub fields: Vec<ProofField>,
}

impl DecisionProof {
    /// Create a proof for a decision
    #[must_use]
    pub fn new(decision: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: if decision { ProofKind::Allow } else { ProofKind::Deny },
            timestamp: Timestamp::now(),
            decision,
            subject: None,
            resource: None,
            fields: Vec::new(),
        }
    }

    /// Set subject
    #[must_use]
    pub fn with_subject(mut self, user: UserId) -> Self {
        self.subject = Some(user);
        self
    }

    /// Set resource
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Add a field
    #[must_use]
    pub fn with_field(mut self, field: ProofField) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by name
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&ProofField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get all field names
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_creation() {
        let proof = DecisionProof::new(true)
            .with_subject(UserId(1))
            .with_resource("datasource_7")
            .with_field(ProofField::boolean("super_admin", false))
            .with_field(ProofField::new("overlap", "group_2"));

        assert_eq!(proof.kind, ProofKind::Allow);
        assert!(proof.decision);
        assert_eq!(proof.field_names(), vec!["super_admin", "overlap"]);
        assert_eq!(proof.get_field("overlap").map(|f| f.value.as_str()), Some("group_2"));
        assert!(proof.get_field("missing").is_none());
    }

    #[test]
    fn test_deny_kind() {
        let proof = DecisionProof::new(false);
        assert_eq!(proof.kind, ProofKind::Deny);
        assert_ne!(proof.id, DecisionProof::new(false).id);
    }
}
