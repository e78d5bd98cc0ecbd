//! Error types.

use mongodb::bson::Bson;
use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any error surfaced by Quarry.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Parsing(#[from] DocumentParsingError),

    /// The primary key of a loaded or constructed instance was assigned in place.
    #[error(
        "reassigning the primary key of `{model}` is not supported, use `copy_with` to build a copy with a new key"
    )]
    PrimaryKeyMutation { model: String },

    /// `MongoDB` driver error.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),
}

impl Error {
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_parsing(&self) -> bool {
        matches!(self, Self::Parsing(_))
    }
}

/// Invalid or conflicting model declaration, reported when a schema is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("`{model}` declares more than one primary key: {}", fields.join(", "))]
    MultiplePrimaryKeys { model: String, fields: Vec<String> },

    #[error("`{model}` is embedded and cannot declare the primary key `{field}`")]
    PrimaryKeyInEmbedded { model: String, field: String },

    #[error(
        "cannot generate a primary key for `{model}` since an `id` field already exists, mark a field as primary"
    )]
    ImplicitIdConflict { model: String },

    #[error("field `{field}` is declared twice in `{model}`")]
    DuplicateField { model: String, field: String },

    #[error("storage key `{key}` is used by more than one field of `{model}`")]
    DuplicateKey { model: String, key: String },

    #[error("invalid storage key `{key}` for `{model}.{field}`: {reason}")]
    InvalidKey {
        model: String,
        field: String,
        key: String,
        reason: &'static str,
    },

    #[error("invalid collection name `{name}` for `{model}`: {reason}")]
    InvalidCollectionName {
        model: String,
        name: String,
        reason: &'static str,
    },

    #[error(
        "`{model}.{field}` stores references inside a container, reference fan-out is not supported"
    )]
    ReferenceInContainer { model: String, field: String },

    #[error("`{model}.{field}` declares both a default value and a default factory")]
    ConflictingDefaults { model: String, field: String },

    #[error("default value of `{model}.{field}` is invalid: {source}")]
    InvalidDefault {
        model: String,
        field: String,
        source: ValidationError,
    },

    #[error("`{model}` embeds itself, recursive models are not supported")]
    RecursiveModel { model: String },

    #[error("`{model}.{field}` references `{target}`, which is embedded and has no primary key")]
    ReferenceToEmbedded {
        model: String,
        field: String,
        target: String,
    },

    #[error("`{model}.{field}` embeds `{target}`, which is not an embedded model")]
    NotEmbeddable {
        model: String,
        field: String,
        target: String,
    },
}

/// Malformed expression composition or misuse of a field reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("`{operator}` requires at least two operands, got {count}")]
    TooFewOperands {
        operator: &'static str,
        count: usize,
    },

    #[error("filtering across references is not supported (`{path}` is a reference)")]
    AcrossReference { path: String },

    #[error("`{path}` is not an embedded model field")]
    NotEmbedded { path: String },

    #[error("field `{field}` not found in `{model}`")]
    UnknownField { model: String, field: String },

    #[error("operator `{operator}` is not allowed on {kind} field `{path}`")]
    OperatorNotAllowed {
        operator: &'static str,
        kind: &'static str,
        path: String,
    },

    #[error("`{model}` is embedded and cannot be queried directly, go through a parent field")]
    EmbeddedRoot { model: String },

    #[error("field of `{found}` cannot be appended to a path ending in `{expected}`")]
    ModelMismatch { expected: String, found: String },

    #[error("limit has to be strictly positive, got {0}")]
    InvalidLimit(i64),
}

/// Machine readable classification of a [`FieldIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueCode {
    Missing,
    KeyNotFoundInDocument,
    TypeMismatch,
    OutOfRange,
    UnknownField,
    ModelMismatch,
    InvalidObjectId,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::KeyNotFoundInDocument => "key_not_found_in_document",
            Self::TypeMismatch => "type_mismatch",
            Self::OutOfRange => "out_of_range",
            Self::UnknownField => "unknown_field",
            Self::ModelMismatch => "model_mismatch",
            Self::InvalidObjectId => "invalid_object_id",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failing location reported by validation or document parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    /// Path of the failing value, outermost segment first.
    pub loc: Vec<String>,
    pub code: IssueCode,
    /// The offending value, when there is one.
    pub value: Option<Bson>,
    pub message: String,
}

impl FieldIssue {
    pub fn new(code: IssueCode, value: Option<Bson>, message: impl Into<String>) -> Self {
        Self {
            loc: Vec::new(),
            code,
            value,
            message: message.into(),
        }
    }

    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.loc.insert(0, segment.into());
        self
    }

    pub fn loc_string(&self) -> String {
        self.loc.join(".")
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loc.is_empty() {
            write!(f, "{} [{}]", self.message, self.code)
        } else {
            write!(f, "{}: {} [{}]", self.loc_string(), self.message, self.code)
        }
    }
}

fn write_issues(f: &mut fmt::Formatter<'_>, issues: &[FieldIssue]) -> fmt::Result {
    for issue in issues {
        write!(f, "\n  {issue}")?;
    }
    Ok(())
}

/// A value failed the constraints of its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub model: Option<String>,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self {
            model: None,
            issues,
        }
    }

    pub fn single(issue: FieldIssue) -> Self {
        Self::new(vec![issue])
    }

    pub fn for_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Prefixes every issue location with `segment`.
    pub fn at(mut self, segment: &str) -> Self {
        for issue in &mut self.issues {
            issue.loc.insert(0, segment.to_owned());
        }
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{} validation error(s) for {model}", self.issues.len())?,
            None => write!(f, "{} validation error(s)", self.issues.len())?,
        }
        write_issues(f, &self.issues)
    }
}

impl std::error::Error for ValidationError {}

/// A document could not be turned into an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentParsingError {
    pub model: String,
    pub issues: Vec<FieldIssue>,
}

impl DocumentParsingError {
    /// Whether an issue is reported for the field at `loc` (dotted field names).
    pub fn has_issue_at(&self, loc: &str) -> bool {
        self.issues.iter().any(|issue| issue.loc_string() == loc)
    }
}

impl fmt::Display for DocumentParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document parsing error for {}", self.model)?;
        write_issues(f, &self.issues)
    }
}

impl std::error::Error for DocumentParsingError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_issue_location_is_prefixed() {
        let error = ValidationError::single(
            FieldIssue::new(IssueCode::TypeMismatch, Some(Bson::Int32(1)), "expected string")
                .at("[2]"),
        )
        .at("tags");

        assert_eq!(error.issues[0].loc, vec!["tags", "[2]"]);
        assert_eq!(error.issues[0].loc_string(), "tags.[2]");
    }

    #[test]
    fn test_error_display() {
        let err = UsageError::TooFewOperands {
            operator: "$and",
            count: 1,
        };
        assert_eq!(
            err.to_string(),
            "`$and` requires at least two operands, got 1"
        );

        let err = DocumentParsingError {
            model: "Publisher".into(),
            issues: vec![
                FieldIssue::new(
                    IssueCode::KeyNotFoundInDocument,
                    None,
                    "key `founded` not found in document",
                )
                .at("founded"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "document parsing error for Publisher\n  founded: key `founded` not found in document [key_not_found_in_document]"
        );
        assert!(err.has_issue_at("founded"));
    }

    #[test]
    fn test_error_classification() {
        let err: Error = SchemaError::ImplicitIdConflict {
            model: "User".into(),
        }
        .into();
        assert!(err.is_schema());
        assert!(!err.is_usage());

        let err: Error = ValidationError::new(vec![]).into();
        assert!(err.is_validation());
    }
}
