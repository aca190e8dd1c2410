//! SELECT SQL generation.

use crate::error::RelmapResult;
use crate::query::Select;
use crate::transpiler::conditions::{build_conditions, where_clause};
use crate::transpiler::expr::ExprToSql;
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

impl ToSql for Select {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        let values = self
            .values
            .iter()
            .map(|v| v.build_expr(generator, ctx))
            .collect::<RelmapResult<Vec<_>>>()?
            .join(",");

        if self.tables.is_empty() {
            return Ok(format!("SELECT {}", values));
        }

        let tables = self
            .tables
            .iter()
            .map(|t| generator.table_name(t))
            .collect::<Vec<_>>()
            .join(",");

        let mut joins = String::new();
        for join in &self.joins {
            joins.push(' ');
            joins.push_str(join.kind.keyword());
            joins.push(' ');
            joins.push_str(&generator.table_name(&join.table));
            if let Some(alias) = &join.alias {
                joins.push(' ');
                joins.push_str(alias);
            }
            joins.push_str(" ON (");
            joins.push_str(&build_conditions(&join.on, generator, ctx)?);
            joins.push(')');
        }

        let mut sql = format!("SELECT {} FROM {}{}", values, tables, joins);
        sql.push_str(&where_clause(&self.conditions, generator, ctx)?);

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&generator.column_names(&self.group_by));
        }

        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&build_conditions(&self.having, generator, ctx)?);
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&generator.column_names(&self.order_by));
            sql.push(' ');
            sql.push_str(self.sort.keyword());
        }

        if let Some(limit) = self.limit.filter(|n| *n > 0) {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset.filter(|n| *n > 0) {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        if self.for_update {
            sql.push_str(" FOR UPDATE");
        }

        Ok(sql)
    }
}
