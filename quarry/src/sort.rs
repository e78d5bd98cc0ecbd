//! Sort expressions.

use crate::{error::UsageError, query::FieldRef};
use mongodb::bson::{Document, RawDocumentBuf, doc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortEntry {
    pub path: String,
    pub direction: Direction,
}

/// Ordered list of sort keys, highest priority first.
///
/// ```rust,ignore
/// let sort = publisher::founded()?.desc()?.then(publisher::name()?.asc()?);
/// assert_eq!(sort.to_document(), doc! { "founded": -1, "name": 1 });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortExpression {
    entries: Vec<SortEntry>,
}

impl SortExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn single(path: String, direction: Direction) -> Self {
        Self {
            entries: vec![SortEntry { path, direction }],
        }
    }

    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `other` after the entries of `self`.
    pub fn then(mut self, other: SortExpression) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// `(path, direction)` pairs in priority order, duplicates included.
    pub fn to_pairs(&self) -> Vec<(String, i32)> {
        self.entries
            .iter()
            .map(|entry| (entry.path.clone(), entry.direction.as_i32()))
            .collect()
    }

    /// The sort specification with one key per entry, repeating a path sorted
    /// more than once.
    pub fn to_raw_document(&self) -> RawDocumentBuf {
        let mut document = RawDocumentBuf::new();

        for entry in &self.entries {
            document.append(&entry.path, entry.direction.as_i32());
        }

        document
    }

    /// The `$sort` document. A path sorted more than once keeps the position of
    /// its first entry and the direction of its last, see
    /// [`to_raw_document`](Self::to_raw_document) to keep every entry.
    pub fn to_document(&self) -> Document {
        let mut document = doc! {};

        for entry in &self.entries {
            document.insert(entry.path.clone(), entry.direction.as_i32());
        }

        document
    }
}

impl FromIterator<SortExpression> for SortExpression {
    fn from_iter<I: IntoIterator<Item = SortExpression>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::then)
    }
}

/// Ascending sort on a field.
pub fn asc(field: impl AsRef<FieldRef>) -> Result<SortExpression, UsageError> {
    field.as_ref().asc()
}

/// Descending sort on a field.
pub fn desc(field: impl AsRef<FieldRef>) -> Result<SortExpression, UsageError> {
    field.as_ref().desc()
}

impl TryFrom<&FieldRef> for SortExpression {
    type Error = UsageError;

    /// A bare field sorts ascending.
    fn try_from(field: &FieldRef) -> Result<Self, Self::Error> {
        field.asc()
    }
}
