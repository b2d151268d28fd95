//! Core types for the watch probe.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Document fields, as a JSON object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for one probe run.
///
/// Used as the default collection suffix and as the value every document of
/// the run is tagged with, so concurrent runs never see each other's data.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a document within its collection.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// Reference to a stored document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub collection: String,
    pub id: DocumentId,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: DocumentId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }

    /// Slash-separated path of the document (`collection/id`).
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

/// Identifier of a watch target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetId({})", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of documents matching a target at one point in time.
///
/// Comparison is by set membership, so delivery order never matters.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    ids: BTreeSet<DocumentId>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.ids.contains(id)
    }

    /// Iterate over document ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.ids.iter()
    }

    /// Ids present in both snapshots.
    pub fn intersection(&self, other: &Snapshot) -> Snapshot {
        self.ids.intersection(&other.ids).cloned().collect()
    }
}

impl FromIterator<DocumentId> for Snapshot {
    fn from_iter<I: IntoIterator<Item = DocumentId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a DocumentRef> for Snapshot {
    fn from_iter<I: IntoIterator<Item = &'a DocumentRef>>(iter: I) -> Self {
        iter.into_iter().map(|r| r.id.clone()).collect()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ids.iter().map(|id| &id.0)).finish()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} document(s) {{", self.ids.len())?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&id.0)?;
        }
        f.write_str("}")
    }
}

/// Field equality predicate a target filters its collection by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: serde_json::Value,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check whether a document's fields satisfy this predicate.
    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Describes a target being re-established from an earlier snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Resume {
    /// Snapshot the previous incarnation of the target observed.
    pub from: Snapshot,
    /// Number of documents the client believes still match.
    pub expected_count: usize,
}

/// Everything needed to register a target on a watch channel.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetSpec {
    pub id: TargetId,
    pub project: String,
    pub collection: String,
    pub filter: FieldFilter,
    pub resume: Option<Resume>,
}

impl TargetSpec {
    pub fn new(
        id: TargetId,
        project: impl Into<String>,
        collection: impl Into<String>,
        filter: FieldFilter,
    ) -> Self {
        Self {
            id,
            project: project.into(),
            collection: collection.into(),
            filter,
            resume: None,
        }
    }

    /// Turn this target into a resumption of `from`.
    pub fn resuming(mut self, from: Snapshot, expected_count: usize) -> Self {
        self.resume = Some(Resume {
            from,
            expected_count,
        });
        self
    }
}
