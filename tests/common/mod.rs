//! Shared fixtures: a recording driver and a small entity model.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use relmap::driver::{Connection, Driver, FetchType, QueryOutput, Row};
use relmap::entity::{Entity, EntitySchema, Record, Related};
use relmap::error::RelmapResult;
use relmap::transpiler::{Dialect, Statement};

#[derive(Debug, Default)]
pub struct DriverState {
    pub statements: Vec<Statement>,
    pub results: VecDeque<Vec<Row>>,
    pub next_id: i64,
    last_id: Option<i64>,
    connected: bool,
}

/// Records every statement and answers fetches from a script.
#[derive(Debug, Clone)]
pub struct RecordingDriver {
    dialect: Dialect,
    state: Arc<Mutex<DriverState>>,
}

impl RecordingDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(DriverState {
                next_id: 1,
                ..Default::default()
            })),
        }
    }

    /// Rows returned by the next fetch.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().results.push_back(rows);
    }

    pub fn sql(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().statements.clear();
    }
}

impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn connect(&mut self) -> RelmapResult<()> {
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> RelmapResult<()> {
        self.state.lock().unwrap().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn execute(&mut self, statement: &Statement, fetch: FetchType) -> RelmapResult<QueryOutput> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(statement.clone());
        if statement.returning.is_some() {
            let id = state.next_id;
            state.next_id += 1;
            state.last_id = Some(id);
        }
        Ok(match fetch {
            FetchType::None => QueryOutput::Done { affected: 1 },
            FetchType::One => QueryOutput::Row(state.results.pop_front().unwrap_or_default().into_iter().next()),
            FetchType::All | FetchType::Iterative => {
                QueryOutput::Rows(state.results.pop_front().unwrap_or_default())
            }
        })
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.state.lock().unwrap().last_id
    }

    fn status(&mut self) -> RelmapResult<String> {
        Ok(format!("recording {}", self.dialect))
    }
}

/// A MySQL connection over a fresh recording driver.
pub fn mysql() -> (Connection, RecordingDriver) {
    let driver = RecordingDriver::new(Dialect::MySQL);
    (Connection::with_driver(driver.clone()), driver)
}

pub fn postgres() -> (Connection, RecordingDriver) {
    let driver = RecordingDriver::new(Dialect::Postgres);
    (Connection::with_driver(driver.clone()), driver)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl Entity for Group {
    fn schema() -> EntitySchema {
        EntitySchema::new("Group").string("name", 32).unique()
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
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            name: record.get("name")?,
        })
    }

    fn predefined_values() -> Vec<Self> {
        vec![Group {
            id: Some(1),
            name: Some("admins".to_string()),
        }]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: Option<String>,
}

impl Entity for Tag {
    fn schema() -> EntitySchema {
        EntitySchema::new("Tag").string("label", 16)
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
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            label: record.get("label")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub group: Related<Group>,
    pub tags: Vec<Tag>,
}

impl User {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            active: true,
            ..Default::default()
        }
    }
}

impl Entity for User {
    fn schema() -> EntitySchema {
        EntitySchema::new("User")
            .string("name", 64)
            .string("email", 128)
            .nullable()
            .bool("active")
            .relation::<Group>("group")
            .nullable()
            .many::<Tag>("tags")
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
        match &self.email {
            Some(email) => record.set("email", email),
            None => record.set("email", relmap::ast::Value::Null),
        }
        record.set("active", self.active);
        if self.group.is_set() {
            record.set_related("group", self.group.to_record());
        }
        let tags: BTreeMap<i64, Record> = self
            .tags
            .iter()
            .filter_map(|t| t.id.map(|id| (id, t.to_record())))
            .collect();
        record.set_many("tags", tags);
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        let group = match record.related("group") {
            Some(related) => Related::from_record(related)?,
            None => Related::Unset,
        };
        let tags = match record.many("tags") {
            Some(members) => members.values().map(Tag::from_record).collect::<RelmapResult<_>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            id: record.id,
            name: record.get("name")?,
            email: record.get("email")?,
            active: record.get("active")?.unwrap_or(false),
            group,
            tags,
        })
    }
}

/// Member of an `Order`, stored with a back-reference to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderLine {
    pub id: Option<i64>,
    pub order: Related<Order>,
    pub quantity: i64,
}

impl Entity for OrderLine {
    fn schema() -> EntitySchema {
        EntitySchema::new("OrderLine").relation::<Order>("order").int("quantity")
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        let mut record = Record::with_id(self.id);
        if self.order.is_set() {
            record.set_related("order", self.order.to_record());
        }
        record.set("quantity", self.quantity);
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            order: match record.related("order") {
                Some(related) => Related::from_record(related)?,
                None => Related::Unset,
            },
            quantity: record.get("quantity")?.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub lines: Vec<OrderLine>,
}

impl Entity for Order {
    fn schema() -> EntitySchema {
        EntitySchema::new("Order").referenced_by::<OrderLine>("lines", "order", "id")
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        let mut record = Record::with_id(self.id);
        // Unsaved lines get placeholder keys that keep their order.
        let lines: BTreeMap<i64, Record> = self
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| (line.id.unwrap_or(i64::MIN + i as i64), line.to_record()))
            .collect();
        record.set_many("lines", lines);
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        let lines = match record.many("lines") {
            Some(members) => members
                .values()
                .map(OrderLine::from_record)
                .collect::<RelmapResult<_>>()?,
            None => Vec::new(),
        };
        Ok(Self { id: record.id, lines })
    }
}
