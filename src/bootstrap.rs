//! Schema bootstrap: the audit log and dependency-ordered entity DDL.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::ast::{Condition, Expr};
use crate::driver::Connection;
use crate::entity::{EntityRef, Handler, NmRelation};
use crate::error::{RelmapError, RelmapResult};
use crate::query::{CreateProcedure, CreateTable, Delete, Insert, ProcedureParam, Query, Update};
use crate::schema::Column;

pub const ENTITY_LOG_TABLE: &str = "EntityLog";

fn log_procedure(name: &str) -> CreateProcedure {
    CreateProcedure::new(name)
        .param(ProcedureParam::CurrentTable)
        .param(ProcedureParam::Row(Column::int("id")))
        .returns_trigger()
}

fn matches_entity(column: &str) -> [Condition; 2] {
    [
        Condition::eq_expr(column, Expr::CurrentColumn("id".to_string())),
        Condition::eq_expr("table_name", Expr::CurrentTable),
    ]
}

/// Records a new row of the calling table, kept for `lifetime` days.
pub fn insert_entity_log_procedure() -> CreateProcedure {
    log_procedure("InsertEntityLog")
        .param(ProcedureParam::Argument(Column::int("lifetime").default(90)))
        .exec([Query::Insert(
            Insert::new(ENTITY_LOG_TABLE, ["entity_id", "table_name", "lifetime"]).add_row_exprs([
                Expr::CurrentColumn("id".to_string()),
                Expr::CurrentTable,
                Expr::CurrentColumn("lifetime".to_string()),
            ]),
        )])
}

/// Touches the log entry of an updated row.
pub fn update_entity_log_procedure() -> CreateProcedure {
    let [by_id, by_table] = matches_entity("entity_id");
    log_procedure("UpdateEntityLog").exec([Query::Update(
        Update::new(ENTITY_LOG_TABLE)
            .set_expr("last_modified", Expr::CurrentTimestamp)
            .where_(by_id)
            .where_(by_table),
    )])
}

/// Drops the log entry of a deleted row.
pub fn delete_entity_log_procedure() -> CreateProcedure {
    let [by_id, by_table] = matches_entity("entity_id");
    log_procedure("DeleteEntityLog").exec([Query::Delete(
        Delete::new(ENTITY_LOG_TABLE).where_(by_id).where_(by_table),
    )])
}

/// The `EntityLog` table and the procedures its triggers call.
pub fn entity_log_queries() -> Vec<Query> {
    let table = CreateTable::new(ENTITY_LOG_TABLE)
        .only_if_not_exists()
        .add_int("entity_id")
        .add_string("table_name", None)
        .add_datetime_now("last_modified")
        .add_int_default("lifetime", 90);
    vec![
        Query::CreateTable(table),
        Query::CreateProcedure(insert_entity_log_procedure()),
        Query::CreateProcedure(update_entity_log_procedure()),
        Query::CreateProcedure(delete_entity_log_procedure()),
    ]
}

/// Something that owns a table.
enum Persistable {
    Entity(Arc<Handler>),
    Nm(NmRelation),
}

impl Persistable {
    fn table(&self) -> &str {
        match self {
            Persistable::Entity(handler) => handler.table(),
            Persistable::Nm(nm) => nm.table_name(),
        }
    }

    fn dependencies(&self) -> Vec<String> {
        match self {
            Persistable::Entity(handler) => handler.dependencies(),
            Persistable::Nm(nm) => nm.dependencies(),
        }
    }

    fn create_queries(&self, lifetime: u32) -> RelmapResult<Vec<Query>> {
        match self {
            Persistable::Entity(handler) => handler.create_queries(lifetime),
            Persistable::Nm(nm) => Ok(nm.create_queries()),
        }
    }
}

/// Create queries for `entities`, the entities they relate to and their
/// join tables, ordered so every table comes after the tables it references.
///
/// Tables that already exist count as created when the connection is open.
pub fn entity_queries(conn: &mut Connection, entities: &[EntityRef]) -> RelmapResult<Vec<Query>> {
    let mut pending: Vec<Persistable> = Vec::new();
    let mut seen = HashSet::new();
    for entity in entities {
        let handler = conn.handler(entity)?;
        if seen.insert(handler.table().to_string()) {
            pending.push(Persistable::Entity(handler));
        }
    }

    let mut related: Vec<Arc<Handler>> = conn.registry().handlers().cloned().collect();
    related.sort_by(|a, b| a.table().cmp(b.table()));
    for handler in related {
        if seen.insert(handler.table().to_string()) {
            pending.push(Persistable::Entity(handler));
        }
    }
    for nm in conn.registry().nm_relations() {
        if seen.insert(nm.table_name().to_string()) {
            pending.push(Persistable::Nm(nm.clone()));
        }
    }

    let mut created: HashSet<String> = if conn.is_connected() {
        conn.list_tables()?.into_iter().collect()
    } else {
        HashSet::new()
    };

    let lifetime = conn.entity_log_lifetime();
    let mut queries = Vec::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut remaining = Vec::with_capacity(before);
        for persistable in pending {
            if persistable.dependencies().iter().all(|dep| created.contains(dep)) {
                debug!(table = persistable.table(), "adding create queries");
                queries.extend(persistable.create_queries(lifetime)?);
                created.insert(persistable.table().to_string());
            } else {
                remaining.push(persistable);
            }
        }

        if remaining.len() == before {
            let unmet: BTreeSet<String> = remaining
                .iter()
                .flat_map(Persistable::dependencies)
                .filter(|dep| !created.contains(dep))
                .collect();
            let unmet: Vec<String> = unmet.into_iter().collect();
            return Err(RelmapError::build(format!(
                "Circular or unmet table dependency detected. Unmet dependencies: {}",
                unmet.join(", ")
            )));
        }
        pending = remaining;
    }

    info!(queries = queries.len(), "prepared entity create queries");
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transpiler::{Dialect, ToSql};

    #[test]
    fn test_entity_log_table() {
        let queries = entity_log_queries();
        assert_eq!(queries.len(), 4);
        assert_eq!(
            queries[0].to_sql_with_dialect(Dialect::MySQL).unwrap(),
            "CREATE TABLE IF NOT EXISTS `EntityLog` (`entity_id` INTEGER NOT NULL,`table_name` TEXT NOT NULL,`last_modified` DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,`lifetime` INTEGER NOT NULL DEFAULT 90)"
        );
    }

    #[test]
    fn test_update_procedure_mysql() {
        assert_eq!(
            update_entity_log_procedure()
                .to_sql_with_dialect(Dialect::MySQL)
                .unwrap(),
            "CREATE PROCEDURE UpdateEntityLog(IN CURRENT_TABLE TEXT,IN id INTEGER) BEGIN UPDATE `EntityLog` SET `last_modified`=CURRENT_TIMESTAMP WHERE `entity_id`=`id` AND `table_name`=`CURRENT_TABLE`; END;"
        );
    }

    #[test]
    fn test_procedures_render_for_postgres() {
        for query in entity_log_queries() {
            assert!(query.to_sql_with_dialect(Dialect::Postgres).is_ok());
        }
    }
}
