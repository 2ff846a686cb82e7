//! Error types for the schema evolution engine.

use thiserror::Error;

/// Main error type for schema evolution operations.
#[derive(Error, Debug)]
pub enum EvolveError {
    /// Configuration error (invalid YAML, unsupported default value, unknown type, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A table or constraint name is already taken where a create/rename targets it.
    #[error("Name collision: {kind} {name} already exists")]
    NameCollision { kind: String, name: String },

    /// A store expected by an alter is missing from the database.
    #[error("Structural consistency error: expected table {0} does not exist")]
    MissingStore(String),

    /// An alter touches a key column, which the engine never rewrites.
    #[error("Key column {column} of table {table} cannot change during an alter")]
    KeyColumnChanged { table: String, column: String },

    /// A create/alter sequence failed; `causes` runs innermost to outermost.
    #[error("{context}: {}", .causes.join(" -> "))]
    Structural {
        context: String,
        causes: Vec<String>,
    },

    /// SQL Server rejected a statement or the connection failed.
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvolveError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        EvolveError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a NameCollision error.
    pub fn collision(kind: impl Into<String>, name: impl Into<String>) -> Self {
        EvolveError::NameCollision {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wrap a failure raised while building or running a DDL sequence.
    ///
    /// The error's source chain is flattened into a list of messages ordered
    /// from the innermost cause to the outermost error. Wrapping an already
    /// structural error keeps its causes and appends the new context.
    pub fn structural(context: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            match e.downcast_ref::<EvolveError>() {
                Some(EvolveError::Structural {
                    context,
                    causes: inner,
                }) => {
                    let mut chain = inner.clone();
                    chain.push(context.clone());
                    chain.reverse();
                    causes.extend(chain);
                }
                _ => causes.push(e.to_string()),
            }
            current = e.source();
        }
        causes.reverse();

        EvolveError::Structural {
            context: context.into(),
            causes,
        }
    }

    /// Whether this error is a tolerated-absence or input error rather than
    /// a failure of the live database.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EvolveError::Config(_)
                | EvolveError::NameCollision { .. }
                | EvolveError::MissingStore(_)
                | EvolveError::KeyColumnChanged { .. }
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            EvolveError::Config(_) | EvolveError::Yaml(_) | EvolveError::Json(_) => 2,
            EvolveError::NameCollision { .. }
            | EvolveError::MissingStore(_)
            | EvolveError::KeyColumnChanged { .. } => 3,
            EvolveError::Structural { .. } | EvolveError::Database(_) => 4,
            EvolveError::Pool { .. } | EvolveError::Io(_) => 5,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let EvolveError::Structural { causes, .. } = self {
            for (depth, cause) in causes.iter().enumerate() {
                output.push_str(&format!("\nCaused by:\n  {}: {}", depth + 1, cause));
            }
            return output;
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for schema evolution operations.
pub type Result<T> = std::result::Result<T, EvolveError>;
