//! Join tables shared by several properties of the same entity.

mod common;

use std::collections::BTreeMap;

use common::mysql;
use pretty_assertions::assert_eq;
use relmap::ast::Value;
use relmap::driver::Row;
use relmap::entity::{Entity, EntitySchema, Record};
use relmap::error::RelmapResult;
use relmap::transpiler::{Dialect, ToSql};

/// Reader with favorite and blocked topics, both kept in `NM_Reader_Topic`.
#[derive(Debug, Clone, Default, PartialEq)]
struct Reader {
    id: Option<i64>,
    name: Option<String>,
    favorites: Vec<Topic>,
    blocked: Vec<Topic>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Topic {
    id: Option<i64>,
    label: Option<String>,
    readers: Vec<Reader>,
}

fn members<E: Entity>(entities: &[E]) -> BTreeMap<i64, Record> {
    entities
        .iter()
        .filter_map(|e| e.id().map(|id| (id, e.to_record())))
        .collect()
}

fn load<E: Entity>(record: &Record, property: &str) -> RelmapResult<Vec<E>> {
    match record.many(property) {
        Some(members) => members.values().map(E::from_record).collect(),
        None => Ok(Vec::new()),
    }
}

impl Entity for Reader {
    fn schema() -> EntitySchema {
        EntitySchema::new("Reader")
            .string("name", 32)
            .many::<Topic>("favorites")
            .many::<Topic>("blocked")
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        let mut record = Record::with_id(self.id);
        if let Some(name) = &self.name {
            record.set("name", name);
        }
        record.set_many("favorites", members(&self.favorites));
        record.set_many("blocked", members(&self.blocked));
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            name: record.get("name")?,
            favorites: load(record, "favorites")?,
            blocked: load(record, "blocked")?,
        })
    }
}

impl Entity for Topic {
    fn schema() -> EntitySchema {
        EntitySchema::new("Topic").string("label", 32).many::<Reader>("readers")
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        let mut record = Record::with_id(self.id);
        if let Some(label) = &self.label {
            record.set("label", label);
        }
        record.set_many("readers", members(&self.readers));
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            label: record.get("label")?,
            readers: load(record, "readers")?,
        })
    }
}

fn topic(id: i64) -> Topic {
    Topic {
        id: Some(id),
        label: Some(format!("topic{}", id)),
        readers: Vec::new(),
    }
}

#[test]
fn test_join_table_has_one_flag_per_property() {
    let (mut conn, _driver) = mysql();
    conn.register::<Reader>().unwrap();
    let nm = conn.registry().nm_relation("NM_Reader_Topic").unwrap();

    assert!(nm.uses_flags());
    assert_eq!(nm.flag_for("Reader", "blocked").as_deref(), Some("reader_blocked"));
    assert_eq!(nm.flag_for("Topic", "readers").as_deref(), Some("topic_readers"));
    assert_eq!(
        nm.all_columns(),
        vec!["reader_id", "topic_id", "reader_favorites", "reader_blocked", "topic_readers"]
    );
    assert_eq!(
        nm.create_queries()[0].to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "CREATE TABLE IF NOT EXISTS `NM_Reader_Topic` (`reader_id` INTEGER NOT NULL,`topic_id` INTEGER NOT NULL,`reader_favorites` BOOLEAN NOT NULL DEFAULT FALSE,`reader_blocked` BOOLEAN NOT NULL DEFAULT FALSE,`topic_readers` BOOLEAN NOT NULL DEFAULT FALSE,FOREIGN KEY (`reader_id`) REFERENCES `Reader` (`id`) ON DELETE CASCADE,FOREIGN KEY (`topic_id`) REFERENCES `Topic` (`id`) ON DELETE CASCADE,UNIQUE (`reader_id`,`topic_id`,`reader_favorites`,`reader_blocked`,`topic_readers`))"
    );
}

#[test]
fn test_insert_sets_the_property_flag() {
    let (mut conn, driver) = mysql();
    let mut reader = Reader {
        name: Some("ada".to_string()),
        favorites: vec![topic(7)],
        blocked: vec![topic(8)],
        ..Default::default()
    };
    reader.save(&mut conn).unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(
        statements[1].sql,
        "INSERT INTO `NM_Reader_Topic` (`reader_id`,`topic_id`,`reader_favorites`) VALUES (?,?,?) ON DUPLICATE KEY UPDATE `reader_id`=?"
    );
    assert_eq!(
        statements[1].params,
        vec![Value::Int(1), Value::Int(7), Value::Bool(true), Value::Int(1)]
    );
    assert_eq!(
        statements[2].sql,
        "INSERT INTO `NM_Reader_Topic` (`reader_id`,`topic_id`,`reader_blocked`) VALUES (?,?,?) ON DUPLICATE KEY UPDATE `reader_id`=?"
    );
    assert_eq!(
        statements[2].params,
        vec![Value::Int(1), Value::Int(8), Value::Bool(true), Value::Int(1)]
    );
}

#[test]
fn test_update_deletes_only_rows_of_the_same_flag() {
    let (mut conn, driver) = mysql();
    let mut reader = Reader {
        id: Some(4),
        name: Some("ada".to_string()),
        favorites: vec![topic(7)],
        blocked: Vec::new(),
    };
    reader.save(&mut conn).unwrap();

    let statements = driver.statements();
    assert_eq!(
        driver.sql()[1..].to_vec(),
        vec![
            "DELETE FROM `NM_Reader_Topic` WHERE `reader_id`=? AND `reader_favorites` AND NOT `topic_id` IN (?)".to_string(),
            "DELETE FROM `NM_Reader_Topic` WHERE `reader_id`=? AND `reader_blocked`".to_string(),
            "INSERT INTO `NM_Reader_Topic` (`reader_id`,`topic_id`,`reader_favorites`) VALUES (?,?,?) ON DUPLICATE KEY UPDATE `reader_id`=?".to_string(),
        ]
    );
    assert_eq!(statements[1].params, vec![Value::Int(4), Value::Int(7)]);
    assert_eq!(statements[2].params, vec![Value::Int(4)]);
}

#[test]
fn test_each_property_loads_its_own_rows() {
    let (mut conn, driver) = mysql();
    driver.push_rows(vec![Row::new().with("id", 1).with("name", "ada")]);
    driver.push_rows(vec![
        Row::new().with("id", 7).with("label", "topic7").with("nm_owner_id", 1),
    ]);
    driver.push_rows(vec![
        Row::new().with("id", 8).with("label", "topic8").with("nm_owner_id", 1),
    ]);

    let readers = Reader::find_all(&mut conn).unwrap();
    assert_eq!(
        readers,
        vec![Reader {
            id: Some(1),
            name: Some("ada".to_string()),
            favorites: vec![topic(7)],
            blocked: vec![topic(8)],
        }]
    );

    let sql = driver.sql();
    assert_eq!(
        sql[1],
        "SELECT `Topic`.`id`,`Topic`.`label`,`NM_Reader_Topic`.`reader_id` as nm_owner_id FROM `Topic` INNER JOIN `NM_Reader_Topic` ON (`NM_Reader_Topic`.`topic_id`=`Topic`.`id`) WHERE `NM_Reader_Topic`.`reader_id` IN (?) AND `NM_Reader_Topic`.`reader_favorites`"
    );
    assert_eq!(
        sql[2],
        "SELECT `Topic`.`id`,`Topic`.`label`,`NM_Reader_Topic`.`reader_id` as nm_owner_id FROM `Topic` INNER JOIN `NM_Reader_Topic` ON (`NM_Reader_Topic`.`topic_id`=`Topic`.`id`) WHERE `NM_Reader_Topic`.`reader_id` IN (?) AND `NM_Reader_Topic`.`reader_blocked`"
    );
}
