//! Stored procedure and trigger generation.

use crate::error::{RelmapError, RelmapResult};
use crate::query::{CreateProcedure, CreateTrigger};
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

/// Render the statements of a procedure with inlined literals, each
/// terminated by `;`.
pub fn procedure_body(generator: &dyn SqlGenerator, procedure: &CreateProcedure) -> RelmapResult<String> {
    let mut body = String::new();
    for statement in &procedure.statements {
        let mut ctx = ParamContext::routine(&procedure.params);
        body.push_str(&statement.build(generator, &mut ctx)?);
        body.push(';');
    }
    Ok(body)
}

impl ToSql for CreateProcedure {
    fn build(&self, generator: &dyn SqlGenerator, _ctx: &mut ParamContext) -> RelmapResult<String> {
        generator.create_procedure(self)
    }
}

impl ToSql for CreateTrigger {
    fn build(&self, generator: &dyn SqlGenerator, _ctx: &mut ParamContext) -> RelmapResult<String> {
        let procedure = self.procedure.as_ref().ok_or_else(|| {
            RelmapError::build(format!("Trigger '{}' does not execute any procedure.", self.name))
        })?;
        if self.table.is_empty() {
            return Err(RelmapError::build(format!(
                "Trigger '{}' is not attached to a table.",
                self.name
            )));
        }

        let (after_create, after_trigger) = if self.if_not_exists {
            generator.trigger_if_not_exists()
        } else {
            ("", "")
        };

        Ok(format!(
            "CREATE{} TRIGGER{} {} {} {} ON {} FOR EACH ROW {}",
            after_create,
            after_trigger,
            generator.table_name(&self.name),
            self.time.keyword(),
            self.event.keyword(),
            generator.table_name(&self.table),
            generator.trigger_body(self, procedure)?
        ))
    }
}
