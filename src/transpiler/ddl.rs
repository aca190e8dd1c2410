//! DDL (Data Definition Language) SQL generation.

use crate::error::{RelmapError, RelmapResult};
use crate::query::{AlterAction, AlterTable, CreateTable, Drop, Truncate};
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

impl ToSql for CreateTable {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        let mut entries = Vec::with_capacity(self.columns.len() + self.constraints.len());
        for column in &self.columns {
            entries.push(generator.column_definition(column, ctx)?);
        }
        for constraint in &self.constraints {
            entries.push(generator.constraint_definition(constraint));
        }

        let if_not_exists = if self.if_not_exists { " IF NOT EXISTS" } else { "" };
        Ok(format!(
            "CREATE TABLE{} {} ({})",
            if_not_exists,
            generator.table_name(&self.table),
            entries.join(",")
        ))
    }
}

impl ToSql for AlterTable {
    fn build(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        let table = generator.table_name(&self.table);
        let action = self.action.as_ref().ok_or_else(|| {
            RelmapError::build("'ALTER TABLE' requires at least a column or a constraint.")
        })?;

        let clause = match action {
            AlterAction::ResetAutoIncrement => return Ok(generator.reset_auto_increment(&self.table)),
            AlterAction::AddEnumValue { column, value } => {
                if !column.kind.is_enum() {
                    return Err(RelmapError::build(format!(
                        "Column '{}' is not an enum column.",
                        column.name
                    )));
                }
                return generator.add_enum_value(self, column, value, ctx);
            }
            AlterAction::AddColumn(column) => {
                format!("ADD COLUMN {}", generator.column_definition(column, ctx)?)
            }
            AlterAction::ModifyColumn(column) => generator.modify_column(column, ctx)?,
            AlterAction::DropColumn(name) => format!("DROP COLUMN {}", generator.column_name(name)),
            AlterAction::AddConstraint(constraint) => {
                let name = constraint.name.as_ref().ok_or_else(|| {
                    RelmapError::build("Cannot ADD CONSTRAINT without a constraint name.")
                })?;
                format!(
                    "ADD CONSTRAINT {} {}",
                    generator.quote_identifier(name),
                    generator.constraint_definition(constraint)
                )
            }
            AlterAction::ModifyConstraint(_) => {
                return Err(RelmapError::build("MODIFY CONSTRAINT foreign key is not supported."));
            }
            AlterAction::DropConstraint(constraint) if constraint.is_primary_key() => {
                generator.drop_primary_key(&self.table)
            }
            AlterAction::DropConstraint(constraint) => {
                let name = constraint.name.as_ref().ok_or_else(|| {
                    RelmapError::build("Cannot DROP CONSTRAINT without a constraint name.")
                })?;
                format!("DROP CONSTRAINT {}", generator.quote_identifier(name))
            }
        };

        Ok(format!("ALTER TABLE {} {}", table, clause))
    }
}

impl ToSql for Drop {
    fn build(&self, generator: &dyn SqlGenerator, _ctx: &mut ParamContext) -> RelmapResult<String> {
        Ok(format!("DROP TABLE {}", generator.table_name(&self.table)))
    }
}

impl ToSql for Truncate {
    fn build(&self, generator: &dyn SqlGenerator, _ctx: &mut ParamContext) -> RelmapResult<String> {
        Ok(generator.truncate(&self.table))
    }
}
