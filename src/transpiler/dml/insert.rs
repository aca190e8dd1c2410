//! INSERT SQL generation.

use crate::error::{RelmapError, RelmapResult};
use crate::query::Insert;
use crate::transpiler::expr::row_value;
use crate::transpiler::{Dialect, ParamContext, SqlGenerator, ToSql};

impl ToSql for Insert {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        if self.rows.is_empty() {
            return Err(RelmapError::build("No rows to insert given."));
        }

        if self.columns.is_empty() && self.rows.iter().all(Vec::is_empty) {
            let returning = self
                .returning
                .as_deref()
                .map(|column| generator.returning(column))
                .unwrap_or_default();
            let values = match generator.dialect() {
                Dialect::Postgres => " DEFAULT VALUES",
                Dialect::MySQL => " () VALUES ()",
            };
            return Ok(format!(
                "INSERT INTO {}{}{}",
                generator.table_name(&self.table),
                values,
                returning
            ));
        }

        let columns = if self.columns.is_empty() {
            String::new()
        } else {
            format!(" ({})", generator.column_names(&self.columns))
        };

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let values = row
                .iter()
                .map(|v| row_value(v, generator, ctx))
                .collect::<RelmapResult<Vec<_>>>()?;
            rows.push(format!("({})", values.join(",")));
        }

        let on_duplicate = match &self.on_duplicate {
            Some(strategy) => generator.on_duplicate(strategy, ctx)?,
            None => String::new(),
        };

        let returning = match &self.returning {
            Some(column) => generator.returning(column),
            None => String::new(),
        };

        Ok(format!(
            "INSERT INTO {}{} VALUES {}{}{}",
            generator.table_name(&self.table),
            columns,
            rows.join(","),
            on_duplicate,
            returning
        ))
    }

    fn returning_column(&self) -> Option<&str> {
        self.returning.as_deref()
    }
}
