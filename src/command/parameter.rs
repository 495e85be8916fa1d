use crate::types::{DbType, ParameterDirection, RowValues, RowVersion};

/// A single named parameter binding on a [`Command`](super::Command).
///
/// A binding either carries a literal `value` or names a `source_column` whose value is read
/// from a table row (at `source_version`) when the command is applied to that row.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub db_type: DbType,
    pub direction: ParameterDirection,
    pub size: Option<u32>,
    pub nullable: bool,
    pub precision: u8,
    pub scale: u8,
    pub source_column: Option<String>,
    pub source_version: RowVersion,
    /// `None` until a value is assigned; `Some(RowValues::Null)` is SQL `NULL`.
    pub value: Option<RowValues>,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            db_type,
            direction: ParameterDirection::Input,
            size: None,
            nullable: true,
            precision: 0,
            scale: 0,
            source_column: None,
            source_version: RowVersion::Current,
            value: None,
        }
    }

    #[must_use]
    pub fn direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn precision_scale(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn source(mut self, column: impl Into<String>, version: RowVersion) -> Self {
        self.source_column = Some(column.into());
        self.source_version = version;
        self
    }

    /// Assign a literal value; `None`-like inputs become [`RowValues::Null`].
    #[must_use]
    pub fn value(mut self, value: impl Into<RowValues>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The name without a leading `@`, `:` or `$` marker.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        self.bare_name().eq_ignore_ascii_case(bare_name(name))
    }
}

pub(crate) fn bare_name(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '$'])
}
