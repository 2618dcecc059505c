//! Raw rows exchanged with the data store.
//!
//! A [`Row`] is an insertion-ordered map of column name to value. Rows come
//! back from [`QueryEngine::select`](crate::traits::QueryEngine::select) and
//! become the attributes of a [`Record`](crate::record::Record).

use indexmap::{IndexMap, IndexSet};

use crate::filter::{FilterValue, MatchKey};

/// A single row: column name to value, in column order.
pub type Row = IndexMap<String, FilterValue>;

static NULL: FilterValue = FilterValue::Null;

/// Convenience accessors over [`Row`].
pub trait RowExt {
    /// Value of a column, or null when the column is absent.
    fn value(&self, column: &str) -> &FilterValue;

    /// Value of a column when it is present and not null.
    fn non_null(&self, column: &str) -> Option<&FilterValue>;

    /// Render the row as a JSON object.
    fn to_json(&self) -> serde_json::Value;
}

impl RowExt for Row {
    fn value(&self, column: &str) -> &FilterValue {
        self.get(column).unwrap_or(&NULL)
    }

    fn non_null(&self, column: &str) -> Option<&FilterValue> {
        self.get(column).filter(|v| !v.is_null())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// Distinct non-null values of `column` across `rows`, in first-seen order.
pub fn distinct_values<'a, I>(rows: I, column: &str) -> Vec<FilterValue>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut seen: IndexSet<MatchKey> = IndexSet::new();
    let mut values = Vec::new();
    for row in rows {
        if let Some(value) = row.non_null(column) {
            if let Some(key) = value.match_key() {
                if seen.insert(key) {
                    values.push(value.clone());
                }
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_defaults_to_null() {
        let r = row! { "id" => 1 };
        assert_eq!(r.value("id"), &FilterValue::Int(1));
        assert!(r.value("site_id").is_null());
        assert!(r.non_null("site_id").is_none());
    }

    #[test]
    fn test_distinct_values_skips_nulls_and_duplicates() {
        let rows = vec![
            row! { "site_id" => 1 },
            row! { "site_id" => 2 },
            row! { "site_id" => 1 },
            row! { "site_id" => None::<i64> },
            row! { "other" => 5 },
        ];
        assert_eq!(
            distinct_values(&rows, "site_id"),
            vec![FilterValue::Int(1), FilterValue::Int(2)]
        );
    }

    #[test]
    fn test_row_to_json() {
        let r = row! { "id" => 1, "name" => "knexjs.org" };
        assert_eq!(r.to_json(), serde_json::json!({ "id": 1, "name": "knexjs.org" }));
    }
}
