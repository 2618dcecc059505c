//! Filter types for building WHERE clauses.
//!
//! Relation constraints are expressed as [`Filter`] trees over
//! [`FilterValue`]s. A filter renders to parameterized SQL through
//! [`Filter::to_sql`] and can also be evaluated directly against a row with
//! [`Filter::matches`], which is what in-process data stores use.

use serde::{Deserialize, Serialize};

use crate::row::Row;

/// A filter value that can be used in comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// JSON value.
    Json(serde_json::Value),
    /// List of values.
    List(Vec<FilterValue>),
}

/// Hashable identity of a scalar [`FilterValue`].
///
/// Integral floats collapse onto the integer key so `1` and `1.0` correlate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Non-integral float key, stored as raw bits.
    Float(u64),
    /// String key.
    String(String),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert to SQL parameter placeholder.
    pub fn to_sql_placeholder(&self, param_index: usize) -> String {
        format!("${}", param_index)
    }

    /// Key used to correlate rows by value.
    ///
    /// Returns `None` for null, JSON and list values, which never correlate.
    pub fn match_key(&self) -> Option<MatchKey> {
        match self {
            Self::Bool(b) => Some(MatchKey::Bool(*b)),
            Self::Int(i) => Some(MatchKey::Int(*i)),
            Self::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(MatchKey::Int(*f as i64))
                } else {
                    Some(MatchKey::Float(f.to_bits()))
                }
            }
            Self::String(s) => Some(MatchKey::String(s.clone())),
            Self::Null | Self::Json(_) | Self::List(_) => None,
        }
    }

    /// Compare two values the way a correlation does.
    pub fn correlates_with(&self, other: &FilterValue) -> bool {
        match (self.match_key(), other.match_key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Get the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::List(values) => Value::Array(values.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<serde_json::Value> for FilterValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// A complete filter that can be converted to SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, FilterValue),
    /// Not equals comparison.
    NotEquals(String, FilterValue),

    /// In a list of values.
    In(String, Vec<FilterValue>),
    /// Not in a list of values.
    NotIn(String, Vec<FilterValue>),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn none() -> Self {
        Self::None
    }

    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// `column = value`.
    pub fn equals(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Equals(column.into(), value.into())
    }

    /// `column IN (values)`.
    pub fn in_list(column: impl Into<String>, values: impl IntoIterator<Item = FilterValue>) -> Self {
        Self::In(column.into(), values.into_iter().collect())
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.pop().unwrap_or_default(),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.pop().unwrap_or_default(),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Whether `other` already appears as this filter or one of its AND terms.
    pub fn contains(&self, other: &Filter) -> bool {
        match self {
            Self::And(filters) => filters.iter().any(|f| f == other),
            _ => self == other,
        }
    }

    /// Evaluate the filter against a row.
    ///
    /// Columns missing from the row compare as null.
    pub fn matches(&self, row: &Row) -> bool {
        let value = |col: &str| row.get(col).unwrap_or(&FilterValue::Null);
        match self {
            Self::None => true,
            Self::Equals(col, val) => {
                if val.is_null() {
                    value(col).is_null()
                } else {
                    value(col).correlates_with(val)
                }
            }
            Self::NotEquals(col, val) => {
                if val.is_null() {
                    !value(col).is_null()
                } else {
                    !value(col).is_null() && !value(col).correlates_with(val)
                }
            }
            Self::In(col, values) => {
                let current = value(col);
                values.iter().any(|v| current.correlates_with(v))
            }
            Self::NotIn(col, values) => {
                let current = value(col);
                !current.is_null() && !values.iter().any(|v| current.correlates_with(v))
            }
            Self::IsNull(col) => value(col).is_null(),
            Self::IsNotNull(col) => !value(col).is_null(),
            Self::And(filters) => filters.iter().all(|f| f.matches(row)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Self::Not(filter) => !filter.matches(row),
        }
    }

    /// Generate SQL for this filter with parameter placeholders.
    /// Returns (sql, params) where params are the values to bind.
    pub fn to_sql(&self, param_offset: usize) -> (String, Vec<FilterValue>) {
        let mut params = Vec::new();
        let sql = self.to_sql_with_params(param_offset, &mut params);
        (sql, params)
    }

    fn to_sql_with_params(&self, offset: usize, params: &mut Vec<FilterValue>) -> String {
        let bind = |params: &mut Vec<FilterValue>, val: &FilterValue| {
            params.push(val.clone());
            val.to_sql_placeholder(offset + params.len())
        };

        match self {
            Self::None => "TRUE".to_string(),

            Self::Equals(col, val) => {
                if val.is_null() {
                    format!("{} IS NULL", col)
                } else {
                    format!("{} = {}", col, bind(params, val))
                }
            }
            Self::NotEquals(col, val) => {
                if val.is_null() {
                    format!("{} IS NOT NULL", col)
                } else {
                    format!("{} != {}", col, bind(params, val))
                }
            }

            Self::In(col, values) => {
                if values.is_empty() {
                    return "FALSE".to_string();
                }
                let placeholders: Vec<_> = values.iter().map(|v| bind(params, v)).collect();
                format!("{} IN ({})", col, placeholders.join(", "))
            }
            Self::NotIn(col, values) => {
                if values.is_empty() {
                    return "TRUE".to_string();
                }
                let placeholders: Vec<_> = values.iter().map(|v| bind(params, v)).collect();
                format!("{} NOT IN ({})", col, placeholders.join(", "))
            }

            Self::IsNull(col) => format!("{} IS NULL", col),
            Self::IsNotNull(col) => format!("{} IS NOT NULL", col),

            Self::And(filters) => {
                if filters.is_empty() {
                    return "TRUE".to_string();
                }
                let parts: Vec<_> = filters
                    .iter()
                    .map(|f| f.to_sql_with_params(offset, params))
                    .collect();
                format!("({})", parts.join(" AND "))
            }
            Self::Or(filters) => {
                if filters.is_empty() {
                    return "FALSE".to_string();
                }
                let parts: Vec<_> = filters
                    .iter()
                    .map(|f| f.to_sql_with_params(offset, params))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Self::Not(filter) => {
                let inner = filter.to_sql_with_params(offset, params);
                format!("NOT ({})", inner)
            }
        }
    }
}
