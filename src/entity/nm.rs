//! Many-to-many join tables and membership synchronization.

use std::collections::BTreeMap;

use tracing::debug;

use super::handler::{Handler, ManyRelation};
use super::schema::snake_case;
use super::{Record, RelatedRecord};
use crate::ast::{Condition, Value};
use crate::driver::Connection;
use crate::error::{RelmapError, RelmapResult};
use crate::query::{CreateTable, Delete, Insert, Query, UpdateStrategy};
use crate::schema::{Column, OnDelete};

/// Join table between two entity tables, owned by the handler registry.
///
/// Each participating table contributes the properties that use the table.
/// When a side declares more than one property over it, every property gets
/// its own boolean flag column and each join row sets exactly one flag.
#[derive(Debug, Clone, PartialEq)]
pub struct NmRelation {
    table_name: String,
    tables: [String; 2],
    properties: BTreeMap<String, Vec<String>>,
}

impl NmRelation {
    pub fn new(a: &str, b: &str) -> RelmapResult<Self> {
        if a == b {
            return Err(RelmapError::metadata(
                a,
                "Cannot create a many-to-many relation of a table with itself",
            ));
        }
        let mut tables = [a.to_string(), b.to_string()];
        tables.sort();
        Ok(Self {
            table_name: Self::table_name_for(a, b),
            tables,
            properties: BTreeMap::new(),
        })
    }

    /// `NM_` plus both table names, sorted and joined with `_`.
    pub fn table_name_for(a: &str, b: &str) -> String {
        let mut names = [a, b];
        names.sort();
        format!("NM_{}", names.join("_"))
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn tables(&self) -> &[String; 2] {
        &self.tables
    }

    pub fn id_column(table: &str) -> String {
        format!("{}_id", snake_case(table))
    }

    pub fn add_property(&mut self, table: &str, property: &str) {
        let properties = self.properties.entry(table.to_string()).or_default();
        if !properties.iter().any(|p| p == property) {
            properties.push(property.to_string());
        }
    }

    /// Properties of `table` stored in this join table.
    pub fn properties(&self, table: &str) -> &[String] {
        self.properties.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn other_table(&self, table: &str) -> Option<&str> {
        match &self.tables {
            [a, b] if a == table => Some(b),
            [a, b] if b == table => Some(a),
            _ => None,
        }
    }

    pub fn uses_flags(&self) -> bool {
        self.properties.values().any(|props| props.len() > 1)
    }

    pub fn flag_column(table: &str, property: &str) -> String {
        format!("{}_{}", snake_case(table), snake_case(property))
    }

    /// Flag restricting join rows to `property`, if flags are in use.
    pub fn flag_for(&self, table: &str, property: &str) -> Option<String> {
        self.uses_flags()
            .then(|| Self::flag_column(table, property))
    }

    pub fn all_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.tables.iter().map(|t| Self::id_column(t)).collect();
        if self.uses_flags() {
            for table in &self.tables {
                for property in self.properties(table) {
                    columns.push(Self::flag_column(table, property));
                }
            }
        }
        columns
    }

    pub fn dependencies(&self) -> Vec<String> {
        self.tables.to_vec()
    }

    pub fn create_queries(&self) -> Vec<Query> {
        let mut table = CreateTable::new(&self.table_name).only_if_not_exists();
        for name in &self.tables {
            table = table.add_int(&Self::id_column(name));
        }
        if self.uses_flags() {
            for name in &self.tables {
                for property in self.properties(name) {
                    table = table.add_column(Column::bool(Self::flag_column(name, property), false));
                }
            }
        }
        for name in &self.tables {
            table = table.foreign_key(&Self::id_column(name), name, "id", Some(OnDelete::Cascade));
        }
        vec![Query::CreateTable(table.unique(self.all_columns()))]
    }
}

impl Handler {
    /// Write join rows (or referencing members) for the many-valued
    /// properties of `record`, restricted to `properties` when given.
    pub fn insert_nm(
        &self,
        conn: &mut Connection,
        record: &mut Record,
        properties: Option<&[&str]>,
    ) -> RelmapResult<()> {
        let Some(owner_id) = record.id else {
            return Err(RelmapError::build(format!(
                "Cannot store relations of an unsaved '{}' entity",
                self.table()
            )));
        };

        for many in self.many_properties() {
            if properties.is_some_and(|props| !props.contains(&many.name.as_str())) {
                continue;
            }
            match &many.relation {
                ManyRelation::Nm { join_table, target } => {
                    let member_ids = member_ids(record, &many.name);
                    if member_ids.is_empty() {
                        continue;
                    }
                    let nm = conn.registry().nm_relation(join_table).cloned().ok_or_else(|| {
                        RelmapError::metadata(self.table(), format!("Unknown join table {}", join_table))
                    })?;
                    let this_column = NmRelation::id_column(self.table());
                    let other_column = NmRelation::id_column(&target.table());
                    let flag = nm.flag_for(self.table(), &many.name);

                    let mut columns = vec![this_column.clone(), other_column];
                    columns.extend(flag.iter().cloned());
                    let mut insert = Insert::new(nm.table_name(), columns).on_duplicate_key(
                        UpdateStrategy::new(nm.all_columns()).set(&this_column, owner_id),
                    );
                    for member_id in member_ids {
                        let mut row = vec![Value::Int(owner_id), Value::Int(member_id)];
                        if flag.is_some() {
                            row.push(Value::Bool(true));
                        }
                        insert = insert.add_row(row);
                    }
                    debug!(table = %nm.table_name(), owner = owner_id, "inserting join rows");
                    conn.execute(insert)?;
                }
                ManyRelation::Reference {
                    target,
                    this_property,
                    ..
                } => {
                    let Some(members) = record.many(&many.name).cloned() else {
                        continue;
                    };
                    let handler = conn.handler(target)?;
                    let mut stored = BTreeMap::new();
                    for (key, mut member) in members {
                        member.set_related(this_property, RelatedRecord::Id(owner_id));
                        match member.id {
                            Some(_) => handler.update(conn, &mut member, None)?,
                            None => handler.insert(conn, &mut member)?,
                        }
                        stored.insert(key, member);
                    }
                    record.set_many(&many.name, stored);
                }
            }
        }
        Ok(())
    }

    /// Replace stored memberships by the current member sets: stale rows are
    /// deleted, then [`Handler::insert_nm`] upserts the rest.
    pub fn update_nm(
        &self,
        conn: &mut Connection,
        record: &mut Record,
        properties: Option<&[&str]>,
    ) -> RelmapResult<()> {
        let Some(owner_id) = record.id else {
            return Err(RelmapError::build(format!(
                "Cannot store relations of an unsaved '{}' entity",
                self.table()
            )));
        };

        for many in self.many_properties() {
            if properties.is_some_and(|props| !props.contains(&many.name.as_str())) {
                continue;
            }
            let member_ids = member_ids(record, &many.name);

            let delete = match &many.relation {
                ManyRelation::Nm { join_table, target } => {
                    let nm = conn.registry().nm_relation(join_table).cloned().ok_or_else(|| {
                        RelmapError::metadata(self.table(), format!("Unknown join table {}", join_table))
                    })?;
                    let mut delete = Delete::new(nm.table_name())
                        .where_eq(&NmRelation::id_column(self.table()), owner_id);
                    if let Some(flag) = nm.flag_for(self.table(), &many.name) {
                        delete = delete.where_(Condition::flag(&flag));
                    }
                    if !member_ids.is_empty() {
                        delete = delete.where_(
                            Condition::is_in(&NmRelation::id_column(&target.table()), member_ids)
                                .not(),
                        );
                    }
                    delete
                }
                ManyRelation::Reference {
                    target,
                    this_property,
                    ..
                } => {
                    let column = format!("{}_id", snake_case(this_property));
                    let mut delete = Delete::new(&target.table()).where_eq(&column, owner_id);
                    if !member_ids.is_empty() {
                        delete = delete.where_(Condition::is_in("id", member_ids).not());
                    }
                    delete
                }
            };
            conn.execute(delete)?;
        }
        self.insert_nm(conn, record, properties)
    }
}

/// Ids of the saved members of `property`. Unsaved members have none.
fn member_ids(record: &Record, property: &str) -> Vec<i64> {
    record
        .many(property)
        .map(|members| members.values().filter_map(|m| m.id).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transpiler::{Dialect, ToSql};

    #[test]
    fn test_table_name_is_sorted() {
        assert_eq!(NmRelation::table_name_for("User", "Group"), "NM_Group_User");
        assert_eq!(NmRelation::table_name_for("Group", "User"), "NM_Group_User");
        assert!(NmRelation::new("User", "User").is_err());
    }

    #[test]
    fn test_columns_without_flags() {
        let mut nm = NmRelation::new("User", "Group").unwrap();
        nm.add_property("User", "groups");
        nm.add_property("Group", "users");
        assert!(!nm.uses_flags());
        assert_eq!(nm.other_table("User"), Some("Group"));
        assert_eq!(nm.all_columns(), vec!["group_id", "user_id"]);
        assert_eq!(
            nm.create_queries()[0].to_sql_with_dialect(Dialect::MySQL).unwrap(),
            "CREATE TABLE IF NOT EXISTS `NM_Group_User` (`group_id` INTEGER NOT NULL,`user_id` INTEGER NOT NULL,FOREIGN KEY (`group_id`) REFERENCES `Group` (`id`) ON DELETE CASCADE,FOREIGN KEY (`user_id`) REFERENCES `User` (`id`) ON DELETE CASCADE,UNIQUE (`group_id`,`user_id`))"
        );
    }

    #[test]
    fn test_flags_for_several_properties() {
        let mut nm = NmRelation::new("User", "Group").unwrap();
        nm.add_property("User", "groups");
        nm.add_property("User", "adminGroups");
        assert!(nm.uses_flags());
        assert_eq!(nm.flag_for("User", "adminGroups").unwrap(), "user_admin_groups");
        assert_eq!(
            nm.all_columns(),
            vec!["group_id", "user_id", "user_groups", "user_admin_groups"]
        );
    }
}
