//! SQL transpiler for relmap queries.
//!
//! Renders query builders into dialect-specific SQL plus an ordered list of
//! bound parameters.

pub mod conditions;
pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expr;
pub mod routines;
pub mod sql;
pub mod traits;

#[cfg(test)]
mod tests;

use crate::ast::Value;
use crate::error::RelmapResult;
use crate::query::{ProcedureParam, Query};

pub use conditions::ConditionToSql;
pub use dialect::Dialect;
pub use expr::ExprToSql;
pub use traits::SqlGenerator;

/// A rendered statement ready for a driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Statements that must run once before `sql`, e.g. enum type creation
    pub setup: Vec<String>,
    /// Column whose generated value an INSERT reports back
    pub returning: Option<String>,
}

/// Parameter accumulator threaded through rendering.
///
/// In inline mode values are rendered as literals instead of placeholders,
/// which procedure bodies require.
#[derive(Debug, Clone, Default)]
pub struct ParamContext {
    pub params: Vec<Value>,
    pub setup: Vec<String>,
    inline: bool,
    routine: Vec<ProcedureParam>,
}

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inline() -> Self {
        Self {
            inline: true,
            ..Default::default()
        }
    }

    /// Inline context for the body of a procedure with these parameters.
    pub fn routine(params: &[ProcedureParam]) -> Self {
        Self {
            inline: true,
            routine: params.to_vec(),
            ..Default::default()
        }
    }

    pub fn is_inline(&self) -> bool {
        self.inline
    }

    pub fn routine_params(&self) -> &[ProcedureParam] {
        &self.routine
    }

    /// Bind a value and return its placeholder, or its literal in inline mode.
    pub fn add_param(&mut self, value: &Value, generator: &dyn SqlGenerator) -> String {
        if self.inline {
            return generator.literal(value);
        }
        self.params.push(value.clone());
        generator.placeholder(self.params.len())
    }

    pub fn add_setup(&mut self, sql: String) {
        if !self.setup.contains(&sql) {
            self.setup.push(sql);
        }
    }

    /// MySQL prepared-statement type string, e.g. `"isi"`.
    pub fn mysql_type_tags(&self) -> String {
        self.params.iter().map(Value::mysql_type_tag).collect()
    }
}

/// Trait for converting query nodes to SQL.
pub trait ToSql {
    /// Render into `ctx` using `generator`.
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String>;

    /// Column whose generated value should be returned after execution.
    fn returning_column(&self) -> Option<&str> {
        None
    }

    /// Convert this node to a SQL string using the default dialect.
    fn to_sql(&self) -> RelmapResult<String> {
        self.to_sql_with_dialect(Dialect::default())
    }

    /// Convert this node to a SQL string with a specific dialect.
    fn to_sql_with_dialect(&self, dialect: Dialect) -> RelmapResult<String> {
        let generator = dialect.generator();
        let mut ctx = ParamContext::new();
        self.build(generator.as_ref(), &mut ctx)
    }

    /// Render into a complete [`Statement`].
    fn compile(&self, dialect: Dialect) -> RelmapResult<Statement> {
        let generator = dialect.generator();
        let mut ctx = ParamContext::new();
        let sql = self.build(generator.as_ref(), &mut ctx)?;
        Ok(Statement {
            sql,
            params: ctx.params,
            setup: ctx.setup,
            returning: self.returning_column().map(str::to_string),
        })
    }
}

impl ToSql for Query {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        match self {
            Query::Select(q) => q.build(generator, ctx),
            Query::Insert(q) => q.build(generator, ctx),
            Query::Update(q) => q.build(generator, ctx),
            Query::Delete(q) => q.build(generator, ctx),
            Query::CreateTable(q) => q.build(generator, ctx),
            Query::AlterTable(q) => q.build(generator, ctx),
            Query::Drop(q) => q.build(generator, ctx),
            Query::Truncate(q) => q.build(generator, ctx),
            Query::CreateProcedure(q) => q.build(generator, ctx),
            Query::CreateTrigger(q) => q.build(generator, ctx),
            Query::StartTransaction => Ok(generator.start_transaction().to_string()),
            Query::Commit => Ok("COMMIT".to_string()),
            Query::Rollback => Ok("ROLLBACK".to_string()),
        }
    }

    fn returning_column(&self) -> Option<&str> {
        self.returning()
    }
}
