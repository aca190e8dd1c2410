//! DELETE SQL generation.

use crate::error::RelmapResult;
use crate::query::Delete;
use crate::transpiler::conditions::where_clause;
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

impl ToSql for Delete {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        Ok(format!(
            "DELETE FROM {}{}",
            generator.table_name(&self.table),
            where_clause(&self.conditions, generator, ctx)?
        ))
    }
}
