use super::{Condition, IntervalUnit, Value};
use crate::query::Select;

/// A driver-neutral expression usable in select lists, conditions and row values.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference. Accepts `col`, `tbl.col` and `col as alias`.
    Column(String),
    /// Bound value
    Value(Value),
    /// Raw SQL fragment, rendered verbatim
    Keyword(String),
    CurrentTimestamp,
    /// `COUNT(*) AS count` or `COUNT(col) AS col_count`
    Count(Option<String>),
    Distinct(String),
    Sum { expr: Box<Expr>, alias: String },
    Coalesce(Vec<Expr>),
    CaseWhen {
        condition: Box<Condition>,
        then: Value,
        otherwise: Value,
    },
    DateAdd {
        expr: Box<Expr>,
        amount: i64,
        unit: IntervalUnit,
    },
    DateSub {
        expr: Box<Expr>,
        amount: i64,
        unit: IntervalUnit,
    },
    Alias { expr: Box<Expr>, alias: String },
    SubQuery(Box<Select>),
    /// Name of the table a trigger fired on
    CurrentTable,
    /// Column of the row a trigger fired on, or a procedure parameter
    CurrentColumn(String),
}

/// Shorthand for a column reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Shorthand for a bound value.
pub fn val(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

impl Expr {
    pub fn alias(self, alias: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn date_add(self, amount: i64, unit: IntervalUnit) -> Expr {
        Expr::DateAdd {
            expr: Box::new(self),
            amount,
            unit,
        }
    }

    pub fn date_sub(self, amount: i64, unit: IntervalUnit) -> Expr {
        Expr::DateSub {
            expr: Box::new(self),
            amount,
            unit,
        }
    }

    pub fn sum(self, alias: impl Into<String>) -> Expr {
        Expr::Sum {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Name under which this expression shows up in a result row, if known.
    pub fn output_name(&self) -> Option<String> {
        match self {
            Expr::Column(name) => {
                let lower = name.to_lowercase();
                if let Some(idx) = lower.find(" as ") {
                    Some(name[idx + 4..].trim().to_string())
                } else {
                    Some(name.rsplit('.').next().unwrap_or(name).to_string())
                }
            }
            Expr::Alias { alias, .. } | Expr::Sum { alias, .. } => Some(alias.clone()),
            Expr::Count(None) => Some("count".to_string()),
            Expr::Count(Some(c)) => Some(format!("{}_count", c.replace('.', "_").to_lowercase())),
            _ => None,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

impl From<Select> for Expr {
    fn from(select: Select) -> Self {
        Expr::SubQuery(Box::new(select))
    }
}
