use super::{Expr, Operator, Value};
use crate::query::Select;

/// Right-hand side of an IN condition.
#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    Values(Vec<Value>),
    SubQuery(Box<Select>),
}

/// A composable boolean condition.
///
/// Lists passed to `where_` are joined with AND. `Or` and `And` wrap their
/// members in parentheses.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `lhs op rhs`; a NULL right-hand side becomes `IS [NOT] NULL`
    Compare { left: Expr, op: Operator, right: Expr },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// Boolean flag column used as a condition by itself
    Bool(Expr),
    Not(Box<Condition>),
    In { needle: Expr, haystack: InList },
    /// `lhs KEYWORD rhs`, e.g. LIKE
    Keyword { left: Expr, keyword: String, right: Expr },
    Null(Expr),
    Exists(Box<Select>),
    /// `lhs ~ rhs`, PostgreSQL only
    Regex { left: Expr, right: Expr },
}

impl Condition {
    /// `column op value`
    pub fn compare(column: &str, op: Operator, value: impl Into<Value>) -> Self {
        Condition::Compare {
            left: Expr::Column(column.to_string()),
            op,
            right: Expr::Value(value.into()),
        }
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    pub fn ne(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Ne, value)
    }

    /// `column = expr` for non-value right-hand sides.
    pub fn eq_expr(column: &str, right: Expr) -> Self {
        Condition::Compare {
            left: Expr::Column(column.to_string()),
            op: Operator::Eq,
            right,
        }
    }

    /// `a = b` where both sides are columns, as used in join conditions.
    pub fn columns_eq(left: &str, right: &str) -> Self {
        Condition::Compare {
            left: Expr::Column(left.to_string()),
            op: Operator::Eq,
            right: Expr::Column(right.to_string()),
        }
    }

    pub fn flag(column: &str) -> Self {
        Condition::Bool(Expr::Column(column.to_string()))
    }

    pub fn not_flag(column: &str) -> Self {
        Condition::Not(Box::new(Self::flag(column)))
    }

    pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In {
            needle: Expr::Column(column.to_string()),
            haystack: InList::Values(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn in_select(column: &str, select: Select) -> Self {
        Condition::In {
            needle: Expr::Column(column.to_string()),
            haystack: InList::SubQuery(Box::new(select)),
        }
    }

    pub fn like(column: &str, pattern: impl Into<Value>) -> Self {
        Condition::Keyword {
            left: Expr::Column(column.to_string()),
            keyword: "LIKE".to_string(),
            right: Expr::Value(pattern.into()),
        }
    }

    pub fn is_null(column: &str) -> Self {
        Condition::Null(Expr::Column(column.to_string()))
    }

    pub fn exists(select: Select) -> Self {
        Condition::Exists(Box::new(select))
    }

    pub fn regex(column: &str, pattern: impl Into<Value>) -> Self {
        Condition::Regex {
            left: Expr::Column(column.to_string()),
            right: Expr::Value(pattern.into()),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut list) => {
                list.push(other);
                Condition::And(list)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut list) => {
                list.push(other);
                Condition::Or(list)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }
}
