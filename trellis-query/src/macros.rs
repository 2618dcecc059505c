//! Construction macros for rows.
//!
//! # Examples
//!
//! ```rust
//! use trellis_query::row;
//! use trellis_query::filter::Filter;
//!
//! let site = row! { "id" => 1, "name" => "knexjs.org" };
//! assert_eq!(site.len(), 2);
//! assert!(Filter::equals("id", 1).matches(&site));
//! ```

/// Build a [`Row`](crate::row::Row) from `column => value` pairs.
///
/// Values go through `FilterValue::from`, so integers, strings, booleans,
/// options and JSON values can be mixed freely.
///
/// ```rust
/// use trellis_query::row;
/// use trellis_query::filter::FilterValue;
///
/// let photo = row! {
///     "id" => 3,
///     "imageable_id" => 1,
///     "imageable_type" => "sites",
///     "caption" => None::<String>,
/// };
/// assert_eq!(photo["imageable_type"], FilterValue::from("sites"));
/// assert!(photo["caption"].is_null());
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::row::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::row::Row::new();
        $(
            row.insert(
                ::std::string::String::from($column),
                $crate::filter::FilterValue::from($value),
            );
        )+
        row
    }};
}

#[cfg(test)]
mod tests {
    use crate::filter::FilterValue;

    #[test]
    fn test_row_macro_preserves_order() {
        let r = row! { "b" => 2, "a" => "x", "c" => true };
        let keys: Vec<_> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(r["a"], FilterValue::from("x"));
    }

    #[test]
    fn test_empty_row_macro() {
        let r = row! {};
        assert!(r.is_empty());
    }
}
