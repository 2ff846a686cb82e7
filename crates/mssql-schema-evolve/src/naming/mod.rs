//! Naming engine for stores and constraints.
//!
//! Table names are a deterministic function of (type identity, scope, locale);
//! constraint names of (kind prefix, table, optional column). Names longer
//! than the identifier limit are truncated and suffixed, see [`NameSuffix`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::identifier::MAX_IDENTIFIER_LENGTH;
use crate::core::schema::{DataScope, Locale, TypeIdentity};
use crate::error::{EvolveError, Result};

/// Length of the disambiguating suffix appended to truncated names.
const SUFFIX_LENGTH: usize = 8;

/// How a truncated name is disambiguated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSuffix {
    /// First hex digits of the SHA-256 of the full name. Stable across runs.
    #[default]
    Hash,

    /// Random hex digits. Differs on every call; two calls for the same
    /// overlong name never agree.
    Random,
}

/// Constraint kinds, identified by their name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    PrimaryKey,
    Default,
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 5] = [
        ConstraintKind::PrimaryKey,
        ConstraintKind::Default,
        ConstraintKind::ForeignKey,
        ConstraintKind::Unique,
        ConstraintKind::Check,
    ];

    /// Name prefix of generated constraints.
    pub fn prefix(self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PK",
            ConstraintKind::Default => "DF",
            ConstraintKind::ForeignKey => "FK",
            ConstraintKind::Unique => "UQ",
            ConstraintKind::Check => "CK",
        }
    }

    /// `sys.objects.type` code.
    pub fn type_code(self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PK",
            ConstraintKind::Default => "D",
            ConstraintKind::ForeignKey => "F",
            ConstraintKind::Unique => "UQ",
            ConstraintKind::Check => "C",
        }
    }

    pub fn from_type_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.type_code().eq_ignore_ascii_case(code))
    }

    /// Classify a constraint by its name prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| {
            let prefix = k.prefix();
            name.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
                && name[prefix.len()..].starts_with('_')
        })
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::PrimaryKey => "primary key",
            ConstraintKind::Default => "default",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::Unique => "unique",
            ConstraintKind::Check => "check",
        };
        f.write_str(name)
    }
}

/// Whether a constraint name denotes a primary key.
pub fn is_primary_key_name(name: &str) -> bool {
    ConstraintKind::from_name(name) == Some(ConstraintKind::PrimaryKey)
}

/// Generates store and constraint names.
#[derive(Debug, Clone)]
pub struct NamingEngine {
    max_length: usize,
    suffix: NameSuffix,
}

impl Default for NamingEngine {
    fn default() -> Self {
        Self::new(MAX_IDENTIFIER_LENGTH, NameSuffix::Hash)
    }
}

impl NamingEngine {
    /// Create a naming engine. `max_length` is clamped to the engine's
    /// identifier limit and to room for the suffix.
    pub fn new(max_length: usize, suffix: NameSuffix) -> Self {
        Self {
            max_length: max_length.clamp(SUFFIX_LENGTH * 2, MAX_IDENTIFIER_LENGTH),
            suffix,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn suffix(&self) -> NameSuffix {
        self.suffix
    }

    /// Name of the table backing (type, scope, locale).
    ///
    /// `Shop.Catalog.Product` / `Published` / `en-US` gives
    /// `Shop_Catalog_Product_Published_en_US`.
    pub fn table_name(&self, identity: &TypeIdentity, scope: &DataScope, locale: &Locale) -> String {
        self.bound(full_table_name(identity, scope, locale))
    }

    /// Name of a table created by an earlier call.
    ///
    /// Random suffixes cannot be recomputed, so under [`NameSuffix::Random`]
    /// a name that needs truncating cannot be located again and is rejected.
    pub fn existing_table_name(
        &self,
        identity: &TypeIdentity,
        scope: &DataScope,
        locale: &Locale,
    ) -> Result<String> {
        let name = full_table_name(identity, scope, locale);
        if self.suffix == NameSuffix::Random && self.exceeds_limit(&name) {
            return Err(EvolveError::Config(format!(
                "Cannot locate existing store {}: name exceeds {} characters and name_suffix is random",
                name, self.max_length
            )));
        }
        Ok(self.bound(name))
    }

    /// Name of a constraint on `table`, optionally tied to one column.
    pub fn constraint_name(&self, kind: ConstraintKind, table: &str, column: Option<&str>) -> String {
        let name = match column {
            Some(column) => format!("{}_{}_{}", kind.prefix(), table, column),
            None => format!("{}_{}", kind.prefix(), table),
        };
        self.bound(name)
    }

    /// Whether `name` would be truncated.
    pub fn exceeds_limit(&self, name: &str) -> bool {
        name.chars().count() > self.max_length
    }

    fn bound(&self, name: String) -> String {
        if !self.exceeds_limit(&name) {
            return name;
        }

        let suffix = match self.suffix {
            NameSuffix::Hash => {
                let digest = Sha256::digest(name.as_bytes());
                format!("{:x}", digest)[..SUFFIX_LENGTH].to_string()
            }
            NameSuffix::Random => Uuid::new_v4().simple().to_string()[..SUFFIX_LENGTH].to_string(),
        };

        let keep = self.max_length - SUFFIX_LENGTH - 1;
        let head: String = name.chars().take(keep).collect();
        format!("{}_{}", head, suffix)
    }
}

fn full_table_name(identity: &TypeIdentity, scope: &DataScope, locale: &Locale) -> String {
    let mut parts = Vec::with_capacity(4);
    if !identity.namespace.is_empty() {
        parts.push(sanitize(&identity.namespace));
    }
    parts.push(sanitize(&identity.name));
    parts.push(sanitize(scope.name()));
    if !locale.is_invariant() {
        parts.push(sanitize(locale.name()));
    }
    parts.join("_")
}

/// Replace separators that read badly in identifiers.
fn sanitize(part: &str) -> String {
    part.trim()
        .chars()
        .map(|c| match c {
            '.' | '-' | ' ' => '_',
            c => c,
        })
        .collect()
}
