//! Predicate tree produced by the selector parser.
//!
//! A [`Query`] is an ordered list of predicates combined with logical AND.
//! Predicates are immutable after construction; the store and the metrics
//! layer only ever read them.

use serde_json::{Map, Value};

/// The reserved identity label, addressable by [`Query::id_equal`].
const ID_LABEL: &str = "_id";

/// A single requirement on one label.
///
/// Literal values are untyped: equality is string equality unless both the
/// stored value and the literal parse as numbers, in which case the
/// comparison is numeric. Ordering predicates apply only to numeric stored
/// values and evaluate to false otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The label is present.
    Exists {
        /// Label name.
        label: String,
    },
    /// The label is absent.
    NotExists {
        /// Label name.
        label: String,
    },
    /// The label's value equals the literal.
    Equal {
        /// Label name.
        label: String,
        /// Untyped literal to compare against.
        value: String,
    },
    /// The label is absent or its value differs from the literal.
    NotEqual {
        /// Label name.
        label: String,
        /// Untyped literal to compare against.
        value: String,
    },
    /// The label's value equals one of the literals.
    In {
        /// Label name.
        label: String,
        /// Untyped literals to compare against.
        values: Vec<String>,
    },
    /// The label is absent or its value equals none of the literals.
    NotIn {
        /// Label name.
        label: String,
        /// Untyped literals to compare against.
        values: Vec<String>,
    },
    /// The label's value is numeric and less than the bound.
    LessThan {
        /// Label name.
        label: String,
        /// Numeric bound.
        value: f64,
    },
    /// The label's value is numeric and at most the bound.
    LessOrEqual {
        /// Label name.
        label: String,
        /// Numeric bound.
        value: f64,
    },
    /// The label's value is numeric and greater than the bound.
    GreaterThan {
        /// Label name.
        label: String,
        /// Numeric bound.
        value: f64,
    },
    /// The label's value is numeric and at least the bound.
    GreaterOrEqual {
        /// Label name.
        label: String,
        /// Numeric bound.
        value: f64,
    },
}

impl Predicate {
    /// Returns the label this predicate constrains.
    pub fn label(&self) -> &str {
        match self {
            Predicate::Exists { label }
            | Predicate::NotExists { label }
            | Predicate::Equal { label, .. }
            | Predicate::NotEqual { label, .. }
            | Predicate::In { label, .. }
            | Predicate::NotIn { label, .. }
            | Predicate::LessThan { label, .. }
            | Predicate::LessOrEqual { label, .. }
            | Predicate::GreaterThan { label, .. }
            | Predicate::GreaterOrEqual { label, .. } => label,
        }
    }

    /// Evaluates this predicate against a stored value.
    ///
    /// `value` is `None` when the entity does not carry the label.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Predicate::Exists { .. } => value.is_some(),
            Predicate::NotExists { .. } => value.is_none(),
            Predicate::Equal { value: lit, .. } => {
                value.map_or(false, |v| literal_eq(v, lit))
            }
            Predicate::NotEqual { value: lit, .. } => {
                value.map_or(true, |v| !literal_eq(v, lit))
            }
            Predicate::In { values, .. } => {
                value.map_or(false, |v| values.iter().any(|lit| literal_eq(v, lit)))
            }
            Predicate::NotIn { values, .. } => {
                value.map_or(true, |v| !values.iter().any(|lit| literal_eq(v, lit)))
            }
            Predicate::LessThan { value: bound, .. } => {
                numeric(value).map_or(false, |n| n < *bound)
            }
            Predicate::LessOrEqual { value: bound, .. } => {
                numeric(value).map_or(false, |n| n <= *bound)
            }
            Predicate::GreaterThan { value: bound, .. } => {
                numeric(value).map_or(false, |n| n > *bound)
            }
            Predicate::GreaterOrEqual { value: bound, .. } => {
                numeric(value).map_or(false, |n| n >= *bound)
            }
        }
    }
}

/// Compares a stored JSON value to an untyped literal.
///
/// Both sides parsing as numbers selects numeric comparison; otherwise the
/// stored scalar is rendered to a string and compared byte-wise. Arrays and
/// objects never equal a literal.
fn literal_eq(stored: &Value, literal: &str) -> bool {
    let rendered = match stored {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => return false,
    };
    if let (Ok(a), Ok(b)) = (rendered.parse::<f64>(), literal.parse::<f64>()) {
        return a == b;
    }
    rendered == literal
}

/// Extracts the numeric value of a stored JSON number, if any.
fn numeric(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// An ordered, immutable list of predicates combined with logical AND.
///
/// `labels` is the ordered set of labels the predicates reference; the store
/// and metrics use it without re-walking the tree. An empty query matches
/// every entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    predicates: Vec<Predicate>,
    labels: Vec<String>,
}

impl Query {
    /// Builds a query from a predicate list.
    pub fn new(predicates: Vec<Predicate>) -> Self {
        let mut labels: Vec<String> = Vec::new();
        for p in &predicates {
            if !labels.iter().any(|l| l == p.label()) {
                labels.push(p.label().to_string());
            }
        }
        Self { predicates, labels }
    }

    /// Builds the query `_id = <id>` without going through the parser.
    pub fn id_equal(id: impl Into<String>) -> Self {
        Self::new(vec![Predicate::Equal {
            label: ID_LABEL.to_string(),
            value: id.into(),
        }])
    }

    /// Returns the predicates in selector order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns the ordered set of labels referenced by the query.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns true if the query has no predicates (matches everything).
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluates the query against an entity.
    pub fn matches(&self, entity: &Map<String, Value>) -> bool {
        self.predicates
            .iter()
            .all(|p| p.matches(entity.get(p.label())))
    }
}
