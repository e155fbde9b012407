//! Revision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier pair addressing a revision inside its data set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId {
    /// Owning data set (the container)
    pub data_set_id: String,

    /// Revision within the data set
    pub revision_id: String,
}

impl RevisionId {
    pub fn new(data_set_id: impl Into<String>, revision_id: impl Into<String>) -> Self {
        Self {
            data_set_id: data_set_id.into(),
            revision_id: revision_id.into(),
        }
    }

    /// State key (`data_set_id:revision_id`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.data_set_id, self.revision_id)
    }
}

impl std::fmt::Display for RevisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.data_set_id, self.revision_id)
    }
}

/// A versioned container grouping assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,

    pub arn: String,

    pub comment: Option<String>,

    /// Finalized revisions reject most mutations
    pub finalized: bool,

    pub tags: HashMap<String, String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a revision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateRevision {
    pub data_set_id: String,
    pub comment: Option<String>,
    pub tags: HashMap<String, String>,
}

impl CreateRevision {
    pub fn new(data_set_id: impl Into<String>) -> Self {
        Self {
            data_set_id: data_set_id.into(),
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Partial update of a revision; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionUpdate {
    pub comment: Option<String>,
    pub finalized: Option<bool>,
}

impl RevisionUpdate {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            finalized: None,
        }
    }

    pub fn finalized(finalized: bool) -> Self {
        Self {
            comment: None,
            finalized: Some(finalized),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.finalized.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_id_key_and_display() {
        let id = RevisionId::new("ds-1", "rev-9");
        assert_eq!(id.key(), "ds-1:rev-9");
        assert_eq!(id.to_string(), "ds-1/rev-9");
    }

    #[test]
    fn test_revision_update_builders() {
        assert!(RevisionUpdate::default().is_empty());
        assert_eq!(RevisionUpdate::finalized(true).finalized, Some(true));
        assert_eq!(
            RevisionUpdate::comment("hello").comment.as_deref(),
            Some("hello")
        );
    }
}
