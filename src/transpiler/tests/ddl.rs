//! Schema statement rendering.

use pretty_assertions::assert_eq;

use crate::query::{AlterTable, CreateTable, Drop, Truncate};
use crate::schema::{Column, Constraint, OnDelete};
use crate::transpiler::{Dialect, ToSql};

fn test_table() -> CreateTable {
    CreateTable::new("Test")
        .add_serial("id")
        .add_string("name", Some(32))
        .add_bool("active", true)
        .primary_key(["id"])
}

#[test]
fn test_create_table_mysql() {
    assert_eq!(
        test_table().to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "CREATE TABLE `Test` (`id` INTEGER AUTO_INCREMENT NOT NULL,`name` VARCHAR(32) NOT NULL,`active` BOOLEAN NOT NULL DEFAULT TRUE,PRIMARY KEY (`id`))"
    );
}

#[test]
fn test_create_table_postgres() {
    assert_eq!(
        test_table().to_sql_with_dialect(Dialect::Postgres).unwrap(),
        "CREATE TABLE \"Test\" (\"id\" SERIAL NOT NULL,\"name\" VARCHAR(32) NOT NULL,\"active\" BOOLEAN NOT NULL DEFAULT TRUE,PRIMARY KEY (\"id\"))"
    );
}

#[test]
fn test_column_defaults() {
    let table = CreateTable::new("Log")
        .only_if_not_exists()
        .add_column(Column::datetime("created").default_now())
        .add_column(Column::int("lifetime").default(90))
        .add_column(Column::text("note").nullable())
        .add_column(Column::json("data").nullable())
        .add_column(Column::json("meta").default("{}"))
        .add_column(Column::numeric("amount", 10, 2));
    assert_eq!(
        table.to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "CREATE TABLE IF NOT EXISTS `Log` (`created` DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,`lifetime` INTEGER NOT NULL DEFAULT 90,`note` TEXT DEFAULT NULL,`data` LONGTEXT DEFAULT NULL,`meta` LONGTEXT NOT NULL,`amount` NUMERIC(10,2) NOT NULL)"
    );
    assert_eq!(
        table.to_sql_with_dialect(Dialect::Postgres).unwrap(),
        "CREATE TABLE IF NOT EXISTS \"Log\" (\"created\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\"lifetime\" INTEGER NOT NULL DEFAULT 90,\"note\" TEXT DEFAULT NULL,\"data\" JSON DEFAULT NULL,\"meta\" JSON NOT NULL DEFAULT '{}',\"amount\" NUMERIC(10,2) NOT NULL)"
    );
}

#[test]
fn test_foreign_and_unique_constraints() {
    let table = CreateTable::new("User")
        .add_serial("id")
        .add_column(Column::int("group_id").nullable())
        .primary_key(["id"])
        .foreign_key("group_id", "Group", "id", Some(OnDelete::SetNull))
        .unique(["group_id", "id"]);
    assert_eq!(
        table.to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "CREATE TABLE `User` (`id` INTEGER AUTO_INCREMENT NOT NULL,`group_id` INTEGER DEFAULT NULL,PRIMARY KEY (`id`),FOREIGN KEY (`group_id`) REFERENCES `Group` (`id`) ON DELETE SET NULL,UNIQUE (`group_id`,`id`))"
    );
}

#[test]
fn test_enum_column_inline_vs_named_type() {
    let table = CreateTable::new("Task").add_column(Column::enumeration("status", ["open", "done"]));

    assert_eq!(
        table.to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "CREATE TABLE `Task` (`status` ENUM('open','done') NOT NULL)"
    );

    let stmt = table.compile(Dialect::Postgres).unwrap();
    assert_eq!(stmt.sql, "CREATE TABLE \"Task\" (\"status\" \"status_type\" NOT NULL)");
    assert_eq!(
        stmt.setup,
        vec![
            "DO $$ BEGIN CREATE TYPE \"status_type\" AS ENUM ('open','done'); EXCEPTION WHEN duplicate_object THEN null; END $$;"
                .to_string()
        ]
    );
}

#[test]
fn test_add_enum_value() {
    let alter = AlterTable::new("Task").add_to_enum(Column::enumeration("status", ["open", "done"]), "failed");
    assert_eq!(
        alter.to_sql_with_dialect(Dialect::Postgres).unwrap(),
        "ALTER TYPE \"status_type\" ADD VALUE 'failed'"
    );
    assert_eq!(
        alter.to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "ALTER TABLE `Task` MODIFY COLUMN `status` ENUM('open','done','failed') NOT NULL"
    );
}

#[test]
fn test_alter_table_actions() {
    assert_eq!(
        AlterTable::new("User")
            .add_column(Column::int("age").nullable())
            .to_sql_with_dialect(Dialect::MySQL)
            .unwrap(),
        "ALTER TABLE `User` ADD COLUMN `age` INTEGER DEFAULT NULL"
    );
    assert_eq!(
        AlterTable::new("User")
            .drop_column("age")
            .to_sql_with_dialect(Dialect::Postgres)
            .unwrap(),
        "ALTER TABLE \"User\" DROP COLUMN \"age\""
    );
    assert_eq!(
        AlterTable::new("User")
            .drop_constraint(Constraint::primary_key(["id"]))
            .to_sql_with_dialect(Dialect::MySQL)
            .unwrap(),
        "ALTER TABLE `User` DROP PRIMARY KEY"
    );
    assert_eq!(
        AlterTable::new("User")
            .add_constraint(Constraint::unique(["name"]).named("uq_user_name"))
            .to_sql_with_dialect(Dialect::MySQL)
            .unwrap(),
        "ALTER TABLE `User` ADD CONSTRAINT `uq_user_name` UNIQUE (`name`)"
    );
    assert_eq!(
        AlterTable::new("User")
            .reset_auto_increment()
            .to_sql_with_dialect(Dialect::MySQL)
            .unwrap(),
        "ALTER TABLE `User` AUTO_INCREMENT=1"
    );
}

#[test]
fn test_alter_table_errors() {
    let err = AlterTable::new("User").to_sql_with_dialect(Dialect::MySQL).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Build error: 'ALTER TABLE' requires at least a column or a constraint."
    );

    let err = AlterTable::new("User")
        .add_constraint(Constraint::unique(["name"]))
        .to_sql_with_dialect(Dialect::MySQL)
        .unwrap_err();
    assert_eq!(err.to_string(), "Build error: Cannot ADD CONSTRAINT without a constraint name.");

    let err = AlterTable::new("User")
        .drop_constraint(Constraint::unique(["name"]))
        .to_sql_with_dialect(Dialect::Postgres)
        .unwrap_err();
    assert_eq!(err.to_string(), "Build error: Cannot DROP CONSTRAINT without a constraint name.");

    assert!(AlterTable::new("User")
        .modify_constraint(Constraint::unique(["name"]).named("x"))
        .to_sql_with_dialect(Dialect::MySQL)
        .is_err());
}

#[test]
fn test_drop_and_truncate() {
    assert_eq!(Drop::new("User").to_sql_with_dialect(Dialect::MySQL).unwrap(), "DROP TABLE `User`");
    assert_eq!(
        Truncate::new("User").to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "TRUNCATE TABLE `User`"
    );
    assert_eq!(
        Truncate::new("User").to_sql_with_dialect(Dialect::Postgres).unwrap(),
        "TRUNCATE \"User\""
    );
}
