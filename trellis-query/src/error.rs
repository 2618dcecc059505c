//! Error types for relation building, loading and pivot operations.
//!
//! Every error carries a code for programmatic handling, a message and an
//! [`ErrorContext`] describing where it happened. Errors raised while an
//! eager relation is loading are tagged with the relation name, so a failure
//! deep inside a nested path still points at the relation that caused it.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: P{category}{number}
//! - 1xxx: Relation errors (unknown relation, missing key, empty response)
//! - 5xxx: Data store errors
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use trellis_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::missing_relation_key("site_id", "site");
//! assert_eq!(err.code, ErrorCode::MissingRelationKey);
//! assert_eq!(err.code.code(), "P1005");
//! assert!(err.to_string().contains("The site_id must be specified."));
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for relation operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Relation errors (1xxx)
    /// A required fetch returned no rows (P1001).
    EmptyResponse = 1001,
    /// An eager path names a relation the model does not declare (P1004).
    UnknownRelation = 1004,
    /// The key that correlates owner and target has no value (P1005).
    MissingRelationKey = 1005,

    // Data store errors (5xxx)
    /// The data store rejected or failed a query (P5005).
    DatabaseError = 5005,

    // Configuration errors (7xxx)
    /// Invalid relation or model configuration (P7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (P9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "P1004").
    pub fn code(&self) -> String {
        format!("P{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "Empty response",
            Self::UnknownRelation => "Unknown relation",
            Self::MissingRelationKey => "Missing relation key",
            Self::DatabaseError => "Database error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The relation being built or loaded.
    pub relation: Option<String>,
    /// The key or column involved.
    pub field: Option<String>,
    /// The SQL query (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while building or loading relations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context
            .suggestions
            .push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL query.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Tag the error with the relation it was raised for.
    ///
    /// An existing tag is kept, so the innermost relation of a nested eager
    /// path wins.
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        if self.context.relation.is_none() {
            self.context.relation = Some(relation.into());
        }
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an error for a relation that is not declared on a model.
    pub fn unknown_relation(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::UnknownRelation,
            format!("{} is not defined on the model.", relation),
        )
        .with_model(&model)
        .with_relation(&relation)
        .with_code_suggestion(
            format!("Declare `{}` on the {} model before loading it", relation, model),
            format!(
                "ModelDef::new(\"{}\", ...).with_relation(\"{}\", RelationDecl::has_many(...))",
                model, relation
            ),
        )
    }

    /// Create an error for a correlating key that has no value.
    pub fn missing_relation_key(key: impl Into<String>, relation: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::MissingRelationKey,
            format!("The {} must be specified.", key),
        )
        .with_field(&key)
        .with_relation(relation)
        .with_suggestion(format!("Fetch or set `{}` on the owning record first", key))
    }

    /// Create an error for a required fetch that matched nothing.
    pub fn empty_response(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::EmptyResponse,
            format!("EmptyResponse: no {} rows matched the query", model),
        )
        .with_model(&model)
        .with_help("Drop `require` from the fetch options to get an empty result instead")
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::DatabaseError, message)
            .with_suggestion("Check the database logs for more details")
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is an unknown relation error.
    pub fn is_unknown_relation(&self) -> bool {
        self.code == ErrorCode::UnknownRelation
    }

    /// Check if this is a missing relation key error.
    pub fn is_missing_relation_key(&self) -> bool {
        self.code == ErrorCode::MissingRelationKey
    }

    /// Check if this is an empty response error.
    pub fn is_empty_response(&self) -> bool {
        self.code == ErrorCode::EmptyResponse
    }

    /// Check if this is a configuration error.
    pub fn is_configuration_error(&self) -> bool {
        self.code == ErrorCode::InvalidConfiguration
    }

    /// Check if this error came from the data store.
    pub fn is_database_error(&self) -> bool {
        self.code == ErrorCode::DatabaseError
    }

    /// The relation this error was raised for, if any.
    pub fn relation(&self) -> Option<&str> {
        self.context.relation.as_deref()
    }

    // ============== Display Functions ==============

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref relation) = self.context.relation {
            output.push_str(&format!("  → Relation: {}\n", relation));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }

        // SQL (truncated if too long)
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                let cut = (0..=200).rev().find(|i| sql.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &sql[..cut])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!(
                        "     ```\n     {}\n     ```\n",
                        code.replace('\n', "\n     ")
                    ));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! query_error {
    ($code:expr, $msg:expr) => {
        $crate::error::QueryError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::QueryError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::EmptyResponse.code(), "P1001");
        assert_eq!(ErrorCode::UnknownRelation.code(), "P1004");
        assert_eq!(ErrorCode::InvalidConfiguration.code(), "P7001");
    }

    #[test]
    fn test_missing_relation_key_message() {
        let err = QueryError::missing_relation_key("site_id", "site");
        assert!(err.is_missing_relation_key());
        assert_eq!(err.message, "The site_id must be specified.");
        assert_eq!(err.context.field.as_deref(), Some("site_id"));
        assert_eq!(err.relation(), Some("site"));
    }

    #[test]
    fn test_unknown_relation_error() {
        let err = QueryError::unknown_relation("Author", "followers");
        assert!(err.is_unknown_relation());
        assert_eq!(err.message, "followers is not defined on the model.");
        assert_eq!(err.context.model.as_deref(), Some("Author"));
        assert!(err.context.suggestions[0].code.is_some());
    }

    #[test]
    fn test_relation_tag_keeps_innermost() {
        let err = QueryError::database("boom")
            .with_relation("comments")
            .with_relation("posts");
        assert_eq!(err.relation(), Some("comments"));
    }

    #[test]
    fn test_database_errors() {
        assert!(QueryError::database("lost").is_database_error());
        assert!(!QueryError::configuration("bad").is_database_error());
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::empty_response("Site")
            .with_context("Fetching site")
            .with_sql("SELECT * FROM sites WHERE id = $1 LIMIT 1");

        let output = err.display_full();
        assert!(output.contains("P1001"));
        assert!(output.contains("Site"));
        assert!(output.contains("SELECT * FROM sites"));
        assert!(output.contains("Help:"));
    }

    #[test]
    fn test_error_macro() {
        let err = query_error!(
            ErrorCode::InvalidConfiguration,
            "morphOne requires a polymorphic name",
            with_relation = "photo",
            with_suggestion = "Pass the name used for the `_type` and `_id` columns"
        );

        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
        assert_eq!(err.relation(), Some("photo"));
        assert_eq!(err.context.suggestions.len(), 1);
    }
}
