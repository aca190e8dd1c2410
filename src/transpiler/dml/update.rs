//! UPDATE SQL generation.

use crate::error::{RelmapError, RelmapResult};
use crate::query::Update;
use crate::transpiler::conditions::where_clause;
use crate::transpiler::expr::row_value;
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

impl ToSql for Update {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        if self.values.is_empty() {
            return Err(RelmapError::build("UPDATE requires at least one value to set."));
        }

        let mut assignments = Vec::with_capacity(self.values.len());
        for (column, value) in &self.values {
            assignments.push(format!(
                "{}={}",
                generator.column_name(column),
                row_value(value, generator, ctx)?
            ));
        }

        Ok(format!(
            "UPDATE {} SET {}{}",
            generator.table_name(&self.table),
            assignments.join(","),
            where_clause(&self.conditions, generator, ctx)?
        ))
    }
}
