//! Query expressions and field references.

use crate::{
    Model,
    error::{Result, UsageError, ValidationError},
    field::{FieldKind, FieldMetadata, FieldType},
    instance::Value,
    schema::ModelSchema,
    sort::{Direction, SortExpression},
    types::FieldValue,
    validate::validate_value,
};
use mongodb::bson::{Bson, Document, Regex, doc};
use std::{
    fmt,
    marker::PhantomData,
    ops::{BitAnd, BitOr},
    sync::Arc,
};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Regex,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Regex => "$regex",
        }
    }

    /// Whether the operator can be applied to a field of `kind`.
    pub fn allowed_on(self, kind: &FieldKind) -> bool {
        match kind {
            FieldKind::Scalar => true,
            FieldKind::Embedded(_) | FieldKind::Reference(_) => {
                matches!(self, Self::Eq | Self::Ne | Self::In | Self::Nin)
            }
            FieldKind::EmbeddedArray(_) => matches!(self, Self::Eq | Self::Ne),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter tree, materialized with [`to_document`](Self::to_document).
///
/// Expressions are immutable values: combining them builds a new tree.
///
/// ```rust,ignore
/// let query = publisher::founded()?.lte(2000)? & publisher::location()?.eq(Some("US".to_owned()))?;
///
/// assert_eq!(query.to_document(), doc! { "$and": [
///     { "founded": { "$lte": 2000_i64 } },
///     { "location": "US" },
/// ]});
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpression {
    Comparison {
        path: String,
        operator: Operator,
        value: Bson,
    },
    And(Vec<QueryExpression>),
    Or(Vec<QueryExpression>),
    Nor(Vec<QueryExpression>),
    /// A filter document used as-is.
    Raw(Document),
}

impl QueryExpression {
    /// The expression matching every document.
    pub fn empty() -> Self {
        Self::Raw(Document::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Raw(document) if document.is_empty())
    }

    pub fn to_document(&self) -> Document {
        match self {
            Self::Comparison {
                path,
                operator: Operator::Eq,
                value,
            } => doc! { path: value.clone() },
            Self::Comparison {
                path,
                operator,
                value,
            } => doc! { path: { operator.as_str(): value.clone() } },
            Self::And(operands) => doc! { "$and": materialize(operands) },
            Self::Or(operands) => doc! { "$or": materialize(operands) },
            Self::Nor(operands) => doc! { "$nor": materialize(operands) },
            Self::Raw(document) => document.clone(),
        }
    }
}

fn materialize(operands: &[QueryExpression]) -> Vec<Bson> {
    operands
        .iter()
        .map(|operand| Bson::Document(operand.to_document()))
        .collect()
}

impl From<Document> for QueryExpression {
    fn from(document: Document) -> Self {
        Self::Raw(document)
    }
}

impl From<QueryExpression> for Document {
    fn from(query: QueryExpression) -> Self {
        query.to_document()
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

impl BitAnd for QueryExpression {
    type Output = QueryExpression;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(flatten(vec![self, rhs], |e| match e {
            Self::And(operands) => Ok(operands),
            other => Err(other),
        }))
    }
}

impl BitOr for QueryExpression {
    type Output = QueryExpression;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(flatten(vec![self, rhs], |e| match e {
            Self::Or(operands) => Ok(operands),
            other => Err(other),
        }))
    }
}

fn flatten(
    operands: Vec<QueryExpression>,
    same_kind: impl Fn(QueryExpression) -> Result<Vec<QueryExpression>, QueryExpression>,
) -> Vec<QueryExpression> {
    let mut flat = Vec::with_capacity(operands.len());

    for operand in operands {
        match same_kind(operand) {
            Ok(nested) => flat.extend(nested),
            Err(operand) => flat.push(operand),
        }
    }

    flat
}

fn operands<I>(operator: &'static str, operands: I) -> Result<Vec<QueryExpression>, UsageError>
where
    I: IntoIterator,
    I::Item: Into<QueryExpression>,
{
    let operands = operands.into_iter().map(Into::into).collect::<Vec<_>>();

    if operands.len() < 2 {
        return Err(UsageError::TooFewOperands {
            operator,
            count: operands.len(),
        });
    }

    Ok(operands)
}

/// Logical AND of two or more expressions, nested ANDs are flattened.
pub fn and_<I>(expressions: I) -> Result<QueryExpression, UsageError>
where
    I: IntoIterator,
    I::Item: Into<QueryExpression>,
{
    let operands = operands("$and", expressions)?;
    Ok(QueryExpression::And(flatten(operands, |e| match e {
        QueryExpression::And(operands) => Ok(operands),
        other => Err(other),
    })))
}

/// Logical OR of two or more expressions, nested ORs are flattened.
pub fn or_<I>(expressions: I) -> Result<QueryExpression, UsageError>
where
    I: IntoIterator,
    I::Item: Into<QueryExpression>,
{
    let operands = operands("$or", expressions)?;
    Ok(QueryExpression::Or(flatten(operands, |e| match e {
        QueryExpression::Or(operands) => Ok(operands),
        other => Err(other),
    })))
}

/// Logical NOR of two or more expressions.
pub fn nor_<I>(expressions: I) -> Result<QueryExpression, UsageError>
where
    I: IntoIterator,
    I::Item: Into<QueryExpression>,
{
    operands("$nor", expressions).map(QueryExpression::Nor)
}

/// Combines the queries given to a find call: no query matches everything, a
/// single query is used as-is, several are ANDed.
pub fn build_query<I>(queries: I) -> QueryExpression
where
    I: IntoIterator<Item = QueryExpression>,
{
    let mut queries = queries.into_iter().collect::<Vec<_>>();

    match queries.len() {
        0 => QueryExpression::empty(),
        1 => queries.remove(0),
        _ => QueryExpression::And(queries),
    }
}

/// A resolved path from a root model to a field, possibly through embedded models.
#[derive(Clone)]
pub struct FieldRef {
    root: Arc<ModelSchema>,
    keys: Vec<String>,
    names: Vec<String>,
    field: FieldMetadata,
}

#[allow(clippy::should_implement_trait)]
impl FieldRef {
    pub fn new(schema: &Arc<ModelSchema>, name: &str) -> Result<Self, UsageError> {
        let field = lookup(schema, name)?;

        Ok(Self {
            root: schema.clone(),
            keys: vec![field.storage_key().to_owned()],
            names: vec![field.name().to_owned()],
            field: field.clone(),
        })
    }

    /// Reference to the field `name` of the embedded model this field holds.
    pub fn child(&self, name: &str) -> Result<Self, UsageError> {
        let schema = self.embedded_schema()?;
        let field = lookup(schema, name)?;

        let mut child = self.clone();
        child.keys.push(field.storage_key().to_owned());
        child.names.push(field.name().to_owned());
        child.field = field.clone();

        Ok(child)
    }

    /// Appends a reference rooted at the embedded model this field holds.
    pub fn join(&self, other: &FieldRef) -> Result<Self, UsageError> {
        let schema = self.embedded_schema()?;

        if schema.name() != other.root.name() {
            return Err(UsageError::ModelMismatch {
                expected: schema.name().to_owned(),
                found: other.root.name().to_owned(),
            });
        }

        let mut joined = self.clone();
        joined.keys.extend(other.keys.iter().cloned());
        joined.names.extend(other.names.iter().cloned());
        joined.field = other.field.clone();

        Ok(joined)
    }

    fn embedded_schema(&self) -> Result<&Arc<ModelSchema>, UsageError> {
        match self.field.kind() {
            FieldKind::Embedded(schema) => Ok(schema),
            FieldKind::Reference(_) => Err(UsageError::AcrossReference { path: self.name() }),
            _ => Err(UsageError::NotEmbedded { path: self.name() }),
        }
    }

    pub fn root(&self) -> &Arc<ModelSchema> {
        &self.root
    }

    pub fn metadata(&self) -> &FieldMetadata {
        &self.field
    }

    /// Dotted path of storage keys, as used in filters and sorts.
    pub fn path(&self) -> String {
        self.keys.join(".")
    }

    /// Dotted path of field names.
    pub fn name(&self) -> String {
        self.names.join(".")
    }

    fn check(&self, operator: &'static str, allowed: bool) -> Result<(), UsageError> {
        if self.root.is_embedded() {
            return Err(UsageError::EmbeddedRoot {
                model: self.root.name().to_owned(),
            });
        }

        if !allowed {
            return Err(UsageError::OperatorNotAllowed {
                operator,
                kind: self.field.kind().name(),
                path: self.name(),
            });
        }

        Ok(())
    }

    /// Comparison of this field against `value`, which is first validated for the
    /// declared type of the field. Array fields also compare against one element.
    pub fn compare(&self, operator: Operator, value: impl Into<Value>) -> Result<QueryExpression> {
        self.check(operator.as_str(), operator.allowed_on(self.field.kind()))?;

        let value = self
            .validate(value.into())
            .map_err(|err| self.locate(err))?;

        Ok(self.node(operator, value))
    }

    fn node(&self, operator: Operator, value: Bson) -> QueryExpression {
        QueryExpression::Comparison {
            path: self.path(),
            operator,
            value,
        }
    }

    fn validate(&self, value: Value) -> Result<Bson, ValidationError> {
        let field_type = comparand_type(self.field.field_type(), &value);

        validate_value(self.root.validator(), field_type, value).map(|value| value.to_bson())
    }

    fn locate(&self, err: ValidationError) -> ValidationError {
        self.names
            .iter()
            .rev()
            .fold(err, |err, name| err.at(name))
            .for_model(self.root.name())
    }

    fn membership<I>(&self, operator: Operator, values: I) -> Result<QueryExpression>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.check(operator.as_str(), operator.allowed_on(self.field.kind()))?;

        let mut issues = Vec::new();
        let mut items = Vec::new();

        for (i, value) in values.into_iter().enumerate() {
            match self.validate(value.into()) {
                Ok(item) => items.push(item),
                Err(err) => issues.extend(err.at(&format!("[{i}]")).issues),
            }
        }

        if !issues.is_empty() {
            return Err(self.locate(ValidationError::new(issues)).into());
        }

        Ok(self.node(operator, Bson::Array(items)))
    }

    pub fn eq(&self, value: impl Into<Value>) -> Result<QueryExpression> {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Result<QueryExpression> {
        self.compare(Operator::Ne, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Result<QueryExpression> {
        self.compare(Operator::Lt, value)
    }

    pub fn lte(&self, value: impl Into<Value>) -> Result<QueryExpression> {
        self.compare(Operator::Lte, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Result<QueryExpression> {
        self.compare(Operator::Gt, value)
    }

    pub fn gte(&self, value: impl Into<Value>) -> Result<QueryExpression> {
        self.compare(Operator::Gte, value)
    }

    /// Membership in `values`, which are consumed once, in order and with duplicates.
    pub fn in_<I>(&self, values: I) -> Result<QueryExpression>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.membership(Operator::In, values)
    }

    pub fn not_in<I>(&self, values: I) -> Result<QueryExpression>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.membership(Operator::Nin, values)
    }

    /// Pattern match, the pattern is passed through to the server unmodified.
    pub fn regex(&self, pattern: &str) -> Result<QueryExpression, UsageError> {
        self.check(Operator::Regex.as_str(), Operator::Regex.allowed_on(self.field.kind()))?;

        Ok(self.node(Operator::Regex, Bson::String(pattern.to_owned())))
    }

    pub fn regex_with_options(
        &self,
        pattern: &str,
        options: &str,
    ) -> Result<QueryExpression, UsageError> {
        if options.is_empty() {
            return self.regex(pattern);
        }

        self.check(Operator::Regex.as_str(), Operator::Regex.allowed_on(self.field.kind()))?;

        Ok(self.node(
            Operator::Regex,
            Bson::RegularExpression(Regex {
                pattern: pattern.to_owned(),
                options: options.to_owned(),
            }),
        ))
    }

    fn sort(&self, direction: Direction) -> Result<SortExpression, UsageError> {
        let operator = match direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        self.check(operator, matches!(self.field.kind(), FieldKind::Scalar))?;

        Ok(SortExpression::single(self.path(), direction))
    }

    pub fn asc(&self) -> Result<SortExpression, UsageError> {
        self.sort(Direction::Ascending)
    }

    pub fn desc(&self) -> Result<SortExpression, UsageError> {
        self.sort(Direction::Descending)
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldRef({}.{})", self.root.name(), self.name())
    }
}

impl AsRef<FieldRef> for FieldRef {
    fn as_ref(&self) -> &FieldRef {
        self
    }
}

fn lookup<'a>(schema: &'a ModelSchema, name: &str) -> Result<&'a FieldMetadata, UsageError> {
    schema.field(name).ok_or_else(|| UsageError::UnknownField {
        model: schema.name().to_owned(),
        field: name.to_owned(),
    })
}

/// Array fields also compare against a single element.
fn comparand_type<'a>(field_type: &'a FieldType, value: &Value) -> &'a FieldType {
    if value.is_null() || matches!(value, Value::Array(_) | Value::Bson(Bson::Array(_))) {
        return field_type;
    }

    match field_type {
        FieldType::Array(inner) => inner,
        FieldType::Optional(inner) if matches!(**inner, FieldType::Array(_)) => {
            comparand_type(inner, value)
        }
        _ => field_type,
    }
}

/// A [`FieldRef`] with the Rust type of the field.
///
/// Generated by `#[derive(Model)]` in the field module of each model.
pub struct Field<T> {
    inner: FieldRef,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> AsRef<FieldRef> for Field<T> {
    fn as_ref(&self) -> &FieldRef {
        &self.inner
    }
}

#[allow(clippy::should_implement_trait)]
impl<T: FieldValue> Field<T> {
    /// Resolves the field `name` of `M`.
    pub fn resolve<M: Model>(name: &str) -> Result<Self> {
        let schema = M::schema()?;
        Ok(Self::from_ref(FieldRef::new(&schema, name)?))
    }

    pub fn from_ref(inner: FieldRef) -> Self {
        Self {
            inner,
            marker: PhantomData,
        }
    }

    pub fn into_ref(self) -> FieldRef {
        self.inner
    }

    /// Continues the path into the embedded model held by this field.
    pub fn then<U: FieldValue>(&self, child: Field<U>) -> Result<Field<U>> {
        Ok(Field::from_ref(self.inner.join(&child.inner)?))
    }

    fn compare(&self, operator: Operator, value: impl Into<T>) -> Result<QueryExpression> {
        self.inner.compare(operator, value.into().into_value()?)
    }

    pub fn eq(&self, value: impl Into<T>) -> Result<QueryExpression> {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(&self, value: impl Into<T>) -> Result<QueryExpression> {
        self.compare(Operator::Ne, value)
    }

    pub fn lt(&self, value: impl Into<T>) -> Result<QueryExpression> {
        self.compare(Operator::Lt, value)
    }

    pub fn lte(&self, value: impl Into<T>) -> Result<QueryExpression> {
        self.compare(Operator::Lte, value)
    }

    pub fn gt(&self, value: impl Into<T>) -> Result<QueryExpression> {
        self.compare(Operator::Gt, value)
    }

    pub fn gte(&self, value: impl Into<T>) -> Result<QueryExpression> {
        self.compare(Operator::Gte, value)
    }

    pub fn in_(&self, values: impl IntoIterator<Item = T>) -> Result<QueryExpression> {
        self.inner.in_(Self::values(values)?)
    }

    pub fn not_in(&self, values: impl IntoIterator<Item = T>) -> Result<QueryExpression> {
        self.inner.not_in(Self::values(values)?)
    }

    fn values(values: impl IntoIterator<Item = T>) -> Result<Vec<Value>> {
        values.into_iter().map(FieldValue::into_value).collect()
    }

    pub fn regex(&self, pattern: &str) -> Result<QueryExpression> {
        Ok(self.inner.regex(pattern)?)
    }

    pub fn regex_with_options(&self, pattern: &str, options: &str) -> Result<QueryExpression> {
        Ok(self.inner.regex_with_options(pattern, options)?)
    }

    pub fn asc(&self) -> Result<SortExpression> {
        Ok(self.inner.asc()?)
    }

    pub fn desc(&self) -> Result<SortExpression> {
        Ok(self.inner.desc()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, FieldSpec, IssueCode, SchemaBuilder};
    use mongodb::bson::oid::ObjectId;
    use pretty_assertions::assert_eq;

    fn usage(err: Error) -> UsageError {
        match err {
            Error::Usage(err) => err,
            other => panic!("expected a usage error, got {other:?}"),
        }
    }

    fn address() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("Address")
                .embedded()
                .field(FieldSpec::new("city", FieldType::String))
                .field(FieldSpec::new("zip", FieldType::String).key("zip_code"))
                .build()
                .unwrap(),
        )
    }

    fn publisher() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("Publisher")
                .field(FieldSpec::new("name", FieldType::String))
                .field(FieldSpec::new("founded", FieldType::Int64))
                .field(FieldSpec::new("tags", FieldType::array(FieldType::String)))
                .field(FieldSpec::new("address", FieldType::Embedded(address())))
                .field(FieldSpec::new(
                    "branches",
                    FieldType::array(FieldType::Embedded(address())),
                ))
                .build()
                .unwrap(),
        )
    }

    fn book() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("Book")
                .field(FieldSpec::new("title", FieldType::String))
                .field(FieldSpec::new("publisher", FieldType::Reference(publisher())))
                .build()
                .unwrap(),
        )
    }

    fn field(schema: &Arc<ModelSchema>, name: &str) -> FieldRef {
        FieldRef::new(schema, name).unwrap()
    }

    #[test]
    fn test_comparisons() {
        let schema = publisher();
        let founded = field(&schema, "founded");

        assert_eq!(founded.eq(1826_i64).unwrap().to_document(), doc! { "founded": 1826_i64 });
        assert_eq!(
            founded.lte(2000_i64).unwrap().to_document(),
            doc! { "founded": { "$lte": 2000_i64 } }
        );
        assert_eq!(
            founded.in_([1_i64, 2, 1]).unwrap().to_document(),
            doc! { "founded": { "$in": [1_i64, 2_i64, 1_i64] } }
        );
        assert_eq!(
            field(&schema, "name").regex("^Hach").unwrap().to_document(),
            doc! { "name": { "$regex": "^Hach" } }
        );
    }

    #[test]
    fn test_embedded_paths() {
        let schema = publisher();
        let zip = field(&schema, "address").child("zip").unwrap();

        assert_eq!(zip.path(), "address.zip_code");
        assert_eq!(zip.name(), "address.zip");
        assert_eq!(
            zip.ne("75001").unwrap().to_document(),
            doc! { "address.zip_code": { "$ne": "75001" } }
        );

        let joined = field(&schema, "address")
            .join(&FieldRef::new(&address(), "city").unwrap())
            .unwrap();
        assert_eq!(joined.path(), "address.city");

        let err = field(&schema, "name").child("x").unwrap_err();
        assert_eq!(err, UsageError::NotEmbedded { path: "name".into() });

        let err = field(&schema, "address").child("street").unwrap_err();
        assert!(matches!(err, UsageError::UnknownField { .. }));
    }

    #[test]
    fn test_reference_paths_are_rejected() {
        let schema = book();
        let err = field(&schema, "publisher").child("name").unwrap_err();
        assert_eq!(
            err,
            UsageError::AcrossReference {
                path: "publisher".into()
            }
        );

        // comparing the reference itself by key is fine
        let key = mongodb::bson::oid::ObjectId::new();
        assert_eq!(
            field(&schema, "publisher").eq(key).unwrap().to_document(),
            doc! { "publisher": key }
        );
    }

    #[test]
    fn test_operator_allowance() {
        let schema = publisher();

        let err = field(&schema, "address").gt("x").unwrap_err();
        assert_eq!(
            usage(err),
            UsageError::OperatorNotAllowed {
                operator: "$gt",
                kind: "embedded",
                path: "address".into()
            }
        );
        assert!(field(&schema, "branches").in_(["x"]).is_err());
        assert!(field(&schema, "branches").eq(Bson::Array(vec![])).is_ok());
        assert!(field(&schema, "address").asc().is_err());

        let err = FieldRef::new(&address(), "city").unwrap().eq("Paris").unwrap_err();
        assert_eq!(
            usage(err),
            UsageError::EmbeddedRoot {
                model: "Address".into()
            }
        );
    }

    #[test]
    fn test_comparison_values_are_validated() {
        let schema = publisher();

        let err = field(&schema, "founded").lte("not a year").unwrap_err();
        let Error::Validation(err) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(err.model.as_deref(), Some("Publisher"));
        assert_eq!(err.issues[0].code, IssueCode::TypeMismatch);
        assert_eq!(err.issues[0].loc_string(), "founded");

        assert_eq!(
            field(&schema, "founded").gt(1800).unwrap().to_document(),
            doc! { "founded": { "$gt": 1800_i64 } }
        );

        let oid = ObjectId::new();
        assert_eq!(
            field(&schema, "id").eq(oid.to_hex()).unwrap().to_document(),
            doc! { "_id": oid }
        );

        let err = field(&schema, "address")
            .child("zip")
            .unwrap()
            .in_(vec![Value::from("75001"), Value::from(75002)])
            .unwrap_err();
        let Error::Validation(err) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].loc_string(), "address.zip.[1]");

        assert_eq!(
            field(&schema, "tags").eq("rare").unwrap().to_document(),
            doc! { "tags": "rare" }
        );
        assert!(field(&schema, "tags").eq(3).is_err());

        // patterns are not checked against the field type
        assert_eq!(
            field(&schema, "founded").regex("^18").unwrap().to_document(),
            doc! { "founded": { "$regex": "^18" } }
        );
    }

    #[test]
    fn test_membership_consumes_iterators_lazily_built() {
        let schema = publisher();
        let years = (0..3_i64).map(|i| 1800 + i * 50).chain([1800]);

        assert_eq!(
            field(&schema, "founded").not_in(years).unwrap().to_document(),
            doc! { "founded": { "$nin": [1800_i64, 1850_i64, 1900_i64, 1800_i64] } }
        );
        assert_eq!(
            field(&schema, "founded")
                .in_(std::iter::empty::<i64>())
                .unwrap()
                .to_document(),
            doc! { "founded": { "$in": [] } }
        );
    }

    #[test]
    fn test_regex_options() {
        let schema = publisher();
        let name = field(&schema, "name");

        let pattern = Regex {
            pattern: "^hach".into(),
            options: "i".into(),
        };
        assert_eq!(
            name.regex_with_options("^hach", "i").unwrap().to_document(),
            doc! { "name": { "$regex": pattern } }
        );
        assert_eq!(
            name.regex_with_options("^Hach", "").unwrap(),
            name.regex("^Hach").unwrap()
        );
        assert!(field(&schema, "address").regex_with_options("a", "i").is_err());
    }

    #[test]
    fn test_logical_operators() {
        let schema = publisher();
        let a = field(&schema, "name").eq("a").unwrap();
        let b = field(&schema, "name").eq("b").unwrap();
        let c = field(&schema, "founded").gt(10_i64).unwrap();

        assert_eq!(
            and_([a.clone()]).unwrap_err(),
            UsageError::TooFewOperands {
                operator: "$and",
                count: 1
            }
        );
        assert!(nor_(Vec::<QueryExpression>::new()).is_err());

        let nested = and_([and_([a.clone(), b.clone()]).unwrap(), c.clone()]).unwrap();
        assert_eq!(nested, QueryExpression::And(vec![a.clone(), b.clone(), c.clone()]));
        assert_eq!(a.clone() & b.clone() & c.clone(), nested);

        let either = a.clone() | b.clone();
        assert_eq!(
            either.to_document(),
            doc! { "$or": [{ "name": "a" }, { "name": "b" }] }
        );

        let neither = nor_([a.clone(), nor_([b.clone(), c.clone()]).unwrap()]).unwrap();
        assert_eq!(
            neither.to_document(),
            doc! { "$nor": [
                { "name": "a" },
                { "$nor": [{ "name": "b" }, { "founded": { "$gt": 10_i64 } }] },
            ]}
        );

        let raw = or_([a.clone(), QueryExpression::from(doc! { "x": 1 })]).unwrap();
        assert_eq!(raw.to_document(), doc! { "$or": [{ "name": "a" }, { "x": 1 }] });
    }

    #[test]
    fn test_build_query() {
        let schema = publisher();
        let a = field(&schema, "name").eq("a").unwrap();
        let b = field(&schema, "founded").lt(5_i64).unwrap();

        assert_eq!(build_query(vec![]).to_document(), doc! {});
        assert_eq!(build_query(vec![a.clone()]), a.clone());
        assert_eq!(
            build_query(vec![a, b]).to_document(),
            doc! { "$and": [{ "name": "a" }, { "founded": { "$lt": 5_i64 } }] }
        );
    }
}
