use crate::ast::Value;

/// Semantic column type. Dialect-specific names are chosen by the generator.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Serial,
    Int { big: bool, unsigned: bool },
    String { max_size: Option<u32> },
    Bool,
    /// Single precision
    Float,
    Double,
    Numeric {
        digits: Option<u32>,
        decimal_digits: Option<u32>,
    },
    DateTime,
    Json,
    Enum { values: Vec<String> },
}

impl ColumnKind {
    pub fn is_enum(&self) -> bool {
        matches!(self, ColumnKind::Enum { .. })
    }
}

/// Default clause of a column definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Value(Value),
    CurrentTimestamp,
    /// Raw SQL, rendered verbatim
    Keyword(String),
}

/// Typed column descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
        }
    }

    pub fn serial(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Serial)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Int { big: false, unsigned: false })
    }

    pub fn big_int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Int { big: true, unsigned: false })
    }

    /// Bounded string. `VARCHAR(n)` on both dialects.
    pub fn string(name: impl Into<String>, max_size: u32) -> Self {
        Self::new(name, ColumnKind::String { max_size: Some(max_size) })
    }

    /// Unbounded string.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::String { max_size: None })
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ColumnKind::Bool).default(default)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Double)
    }

    pub fn numeric(name: impl Into<String>, digits: u32, decimal_digits: u32) -> Self {
        Self::new(
            name,
            ColumnKind::Numeric {
                digits: Some(digits),
                decimal_digits: Some(decimal_digits),
            },
        )
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::DateTime)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Json)
    }

    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            ColumnKind::Enum {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn set_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_expr(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(ColumnDefault::CurrentTimestamp);
        self
    }

    pub fn unsigned(mut self) -> Self {
        if let ColumnKind::Int { unsigned, .. } = &mut self.kind {
            *unsigned = true;
        }
        self
    }

    pub fn not_null(&self) -> bool {
        !self.nullable
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        match &self.kind {
            ColumnKind::Enum { values } => Some(values),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_column_has_default() {
        let c = Column::bool("active", true);
        assert_eq!(c.default, Some(ColumnDefault::Value(Value::Bool(true))));
        assert!(c.not_null());
    }

    #[test]
    fn test_unsigned_only_applies_to_ints() {
        let c = Column::text("name").unsigned();
        assert_eq!(c.kind, ColumnKind::String { max_size: None });
        let c = Column::int("n").unsigned();
        assert_eq!(c.kind, ColumnKind::Int { big: false, unsigned: true });
    }
}
