//! Eager loading and many-valued property synchronization.

mod common;

use std::collections::BTreeMap;

use common::{Group, Order, OrderLine, RecordingDriver, Tag, User, mysql, postgres};
use pretty_assertions::assert_eq;
use relmap::ast::Value;
use relmap::driver::Row;
use relmap::entity::{Entity, EntitySchema, Record, Related};
use relmap::error::RelmapResult;
use relmap::transpiler::{Dialect, ToSql};

fn tag(id: i64) -> Tag {
    Tag {
        id: Some(id),
        label: Some(format!("tag{}", id)),
    }
}

#[test]
fn test_insert_writes_join_rows() {
    let (mut conn, driver) = mysql();
    let mut user = User::named("alice");
    user.tags = vec![tag(7), tag(8)];
    user.save(&mut conn).unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1].sql,
        "INSERT INTO `NM_Tag_User` (`user_id`,`tag_id`) VALUES (?,?),(?,?) ON DUPLICATE KEY UPDATE `user_id`=?"
    );
    assert_eq!(
        statements[1].params,
        vec![Value::Int(1), Value::Int(7), Value::Int(1), Value::Int(8), Value::Int(1)]
    );
}

#[test]
fn test_save_without_memberships() {
    let (mut conn, driver) = mysql();
    let mut user = User::named("alice");
    user.tags = vec![tag(7)];
    user.save_with(&mut conn, None, false).unwrap();
    assert_eq!(driver.sql().len(), 1);
}

#[test]
fn test_update_removes_stale_join_rows() {
    let (mut conn, driver) = mysql();
    let mut user = User::named("bob");
    user.id = Some(4);
    user.tags = vec![tag(7), tag(8)];
    user.save(&mut conn).unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(
        statements[1].sql,
        "DELETE FROM `NM_Tag_User` WHERE `user_id`=? AND NOT `tag_id` IN (?,?)"
    );
    assert_eq!(statements[1].params, vec![Value::Int(4), Value::Int(7), Value::Int(8)]);
    assert_eq!(
        statements[2].sql,
        "INSERT INTO `NM_Tag_User` (`user_id`,`tag_id`) VALUES (?,?),(?,?) ON DUPLICATE KEY UPDATE `user_id`=?"
    );
}

#[test]
fn test_update_with_no_members_clears_join_rows() {
    let (mut conn, driver) = mysql();
    let mut user = User::named("bob");
    user.id = Some(4);
    user.save(&mut conn).unwrap();

    assert_eq!(
        driver.sql()[1..].to_vec(),
        vec!["DELETE FROM `NM_Tag_User` WHERE `user_id`=?".to_string()]
    );
}

#[test]
fn test_member_ids_come_from_the_members() {
    let (mut conn, driver) = mysql();
    let handler = conn.register::<User>().unwrap();
    let mut record = Record::with_id(Some(4));
    record.set_many("tags", BTreeMap::from([(99, tag(7).to_record())]));
    handler.update_nm(&mut conn, &mut record, None).unwrap();

    let statements = driver.statements();
    assert_eq!(
        statements[0].sql,
        "DELETE FROM `NM_Tag_User` WHERE `user_id`=? AND NOT `tag_id` IN (?)"
    );
    assert_eq!(statements[0].params, vec![Value::Int(4), Value::Int(7)]);
    assert_eq!(
        statements[1].params,
        vec![Value::Int(4), Value::Int(7), Value::Int(4)]
    );
}

#[test]
fn test_fetch_entities_joins_relations() {
    let (mut conn, driver) = mysql();
    driver.push_rows(vec![
        Row::new()
            .with("id", 1)
            .with("name", "alice")
            .with("email", Value::Null)
            .with("active", true)
            .with("group_id", 2)
            .with("group_name", "staff"),
        Row::new()
            .with("id", 2)
            .with("name", "bob")
            .with("email", "bob@example.com")
            .with("active", false)
            .with("group_id", Value::Null)
            .with("group_name", Value::Null),
    ]);
    driver.push_rows(vec![
        Row::new().with("id", 7).with("label", "tag7").with("nm_owner_id", 1),
        Row::new().with("id", 7).with("label", "tag7").with("nm_owner_id", 2),
        Row::new().with("id", 8).with("label", "tag8").with("nm_owner_id", 1),
    ]);

    let users = User::query().fetch_entities(false).all(&mut conn).unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(
        users[0].group,
        Related::loaded(Group {
            id: Some(2),
            name: Some("staff".to_string()),
        })
    );
    assert_eq!(users[0].tags, vec![tag(7), tag(8)]);
    assert_eq!(users[1].group, Related::Null);
    assert_eq!(users[1].email.as_deref(), Some("bob@example.com"));
    assert_eq!(users[1].tags, vec![tag(7)]);

    let sql = driver.sql();
    assert_eq!(
        sql[0],
        "SELECT `User`.`id`,`User`.`name`,`User`.`email`,`User`.`active`,`User`.`group_id`,`t1`.`name` as group_name FROM `User` LEFT JOIN `Group` t1 ON (`User`.`group_id`=`t1`.`id`)"
    );
    assert_eq!(
        sql[1],
        "SELECT `Tag`.`id`,`Tag`.`label`,`NM_Tag_User`.`user_id` as nm_owner_id FROM `Tag` INNER JOIN `NM_Tag_User` ON (`NM_Tag_User`.`tag_id`=`Tag`.`id`) WHERE `NM_Tag_User`.`user_id` IN (?,?)"
    );
}

#[test]
fn test_duplicate_rows_are_collapsed() {
    let (mut conn, driver) = mysql();
    let row = Row::new()
        .with("id", 1)
        .with("name", "alice")
        .with("email", Value::Null)
        .with("active", true)
        .with("group_id", Value::Null);
    driver.push_rows(vec![row.clone(), row]);

    assert_eq!(User::find_all(&mut conn).unwrap().len(), 1);
}

#[test]
fn test_referenced_members_are_inserted_with_owner_key() {
    let (mut conn, driver) = mysql();
    let mut order = Order {
        id: None,
        lines: vec![
            OrderLine {
                quantity: 2,
                ..Default::default()
            },
            OrderLine {
                quantity: 5,
                ..Default::default()
            },
        ],
    };
    order.save(&mut conn).unwrap();

    assert_eq!(order.id, Some(1));
    assert_eq!(
        driver.sql(),
        vec![
            "INSERT INTO `Order` () VALUES ()".to_string(),
            "INSERT INTO `OrderLine` (`order_id`,`quantity`) VALUES (?,?)".to_string(),
            "INSERT INTO `OrderLine` (`order_id`,`quantity`) VALUES (?,?)".to_string(),
        ]
    );
    let ids: Vec<Option<i64>> = order.lines.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![Some(2), Some(3)]);
    assert_eq!(order.lines[1].quantity, 5);
    assert_eq!(order.lines[1].order, Related::Id(1));
}

#[test]
fn test_referenced_members_are_synchronized_on_update() {
    let (mut conn, driver) = mysql();
    let mut order = Order {
        id: Some(1),
        lines: vec![OrderLine {
            id: Some(2),
            order: Related::Id(1),
            quantity: 3,
        }],
    };
    order.save(&mut conn).unwrap();

    assert_eq!(
        driver.sql(),
        vec![
            "DELETE FROM `OrderLine` WHERE `order_id`=? AND NOT `id` IN (?)".to_string(),
            "UPDATE `OrderLine` SET `order_id`=?,`quantity`=? WHERE `id`=?".to_string(),
        ]
    );
}

#[test]
fn test_referenced_members_are_loaded_with_owner() {
    let (mut conn, driver) = mysql();
    driver.push_rows(vec![Row::new().with("id", 1)]);
    driver.push_rows(vec![
        Row::new().with("id", 2).with("order_id", 1).with("quantity", 2),
        Row::new().with("id", 3).with("order_id", 1).with("quantity", 5),
    ]);

    let order = Order::find(&mut conn, 1).unwrap().unwrap();
    assert_eq!(order.lines.len(), 2);
    assert_eq!(order.lines[0].id, Some(2));
    assert_eq!(order.lines[1].quantity, 5);
    assert_eq!(
        order.lines[0].order,
        Related::loaded(Order {
            id: Some(1),
            lines: Vec::new(),
        })
    );
    assert_eq!(
        driver.sql()[1],
        "SELECT `OrderLine`.`id`,`OrderLine`.`order_id`,`OrderLine`.`quantity` FROM `OrderLine` WHERE `OrderLine`.`order_id` IN (?)"
    );
}

#[derive(Debug, Default)]
struct Employee {
    id: Option<i64>,
}

#[derive(Debug, Default)]
struct Department {
    id: Option<i64>,
}

macro_rules! bare_entity {
    ($ty:ident, $schema:expr) => {
        impl Entity for $ty {
            fn schema() -> EntitySchema {
                $schema
            }

            fn id(&self) -> Option<i64> {
                self.id
            }

            fn set_id(&mut self, id: Option<i64>) {
                self.id = id;
            }

            fn to_record(&self) -> Record {
                Record::with_id(self.id)
            }

            fn from_record(record: &Record) -> RelmapResult<Self> {
                Ok(Self { id: record.id })
            }
        }
    };
}

bare_entity!(
    Employee,
    EntitySchema::new("Employee")
        .string("name", 32)
        .relation::<Department>("department")
        .relation::<Employee>("mentor")
        .nullable()
);
bare_entity!(
    Department,
    EntitySchema::new("Department")
        .string("title", 32)
        .relation::<Employee>("head")
        .nullable()
);

#[test]
fn test_recursive_joins_visit_each_table_once() {
    let (mut conn, _driver) = mysql();
    let select = Employee::query().fetch_entities(true).to_select(&mut conn).unwrap();

    assert_eq!(select.joins.len(), 1);
    assert_eq!(
        select.to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "SELECT `Employee`.`id`,`Employee`.`name`,`Employee`.`department_id`,`Employee`.`mentor_id`,`t1`.`title` as department_title,`t1`.`head_id` as department_head_id FROM `Employee` INNER JOIN `Department` t1 ON (`Employee`.`department_id`=`t1`.`id`)"
    );
}

#[test]
fn test_non_recursive_joins_skip_nested_keys() {
    let (mut conn, _driver) = mysql();
    let select = Employee::query().fetch_entities(false).to_select(&mut conn).unwrap();

    assert_eq!(
        select.to_sql_with_dialect(Dialect::MySQL).unwrap(),
        "SELECT `Employee`.`id`,`Employee`.`name`,`Employee`.`department_id`,`Employee`.`mentor_id`,`t1`.`title` as department_title FROM `Employee` INNER JOIN `Department` t1 ON (`Employee`.`department_id`=`t1`.`id`)"
    );
}

/// Support ticket whose own `group_note` column shares the `group_` prefix
/// of its joined group.
#[derive(Debug, Clone, Default, PartialEq)]
struct Ticket {
    id: Option<i64>,
    group_note: Option<String>,
    group: Related<Group>,
}

impl Entity for Ticket {
    fn schema() -> EntitySchema {
        EntitySchema::new("Ticket")
            .string("groupNote", 64)
            .nullable()
            .relation::<Group>("group")
            .nullable()
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        let mut record = Record::with_id(self.id);
        if let Some(note) = &self.group_note {
            record.set("groupNote", note);
        }
        if self.group.is_set() {
            record.set_related("group", self.group.to_record());
        }
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            group_note: record.get("groupNote")?,
            group: match record.related("group") {
                Some(related) => Related::from_record(related)?,
                None => Related::Unset,
            },
        })
    }
}

#[test]
fn test_own_columns_do_not_leak_into_joined_slice() {
    let (mut conn, driver) = mysql();
    driver.push_rows(vec![
        Row::new()
            .with("id", 1)
            .with("group_note", "call back")
            .with("group_id", 2)
            .with("group_name", "staff"),
        Row::new()
            .with("id", 2)
            .with("group_note", "closed")
            .with("group_id", 3),
    ]);

    let tickets = Ticket::query().fetch_entities(false).all(&mut conn).unwrap();
    assert_eq!(tickets[0].group_note.as_deref(), Some("call back"));
    assert_eq!(
        tickets[0].group,
        Related::loaded(Group {
            id: Some(2),
            name: Some("staff".to_string()),
        })
    );
    assert_eq!(tickets[1].group_note.as_deref(), Some("closed"));
    assert_eq!(tickets[1].group, Related::Id(3));
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Post {
    id: Option<i64>,
    title: Option<String>,
    author: Related<User>,
}

impl Entity for Post {
    fn schema() -> EntitySchema {
        EntitySchema::new("Post").string("title", 128).relation::<User>("author")
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        let mut record = Record::with_id(self.id);
        if let Some(title) = &self.title {
            record.set("title", title);
        }
        if self.author.is_set() {
            record.set_related("author", self.author.to_record());
        }
        record
    }

    fn from_record(record: &Record) -> RelmapResult<Self> {
        Ok(Self {
            id: record.id,
            title: record.get("title")?,
            author: match record.related("author") {
                Some(related) => Related::from_record(related)?,
                None => Related::Unset,
            },
        })
    }
}

/// A post joined to its author and the author's group, with the author's
/// tags loaded by a second query.
fn load_post_graph(mut conn: relmap::driver::Connection, driver: &RecordingDriver) -> Post {
    driver.push_rows(vec![
        Row::new()
            .with("id", 1)
            .with("title", "hello")
            .with("author_id", 3)
            .with("author_name", "alice")
            .with("author_email", Value::Null)
            .with("author_active", true)
            .with("author_group_id", 2)
            .with("author_group_name", "staff"),
    ]);
    driver.push_rows(vec![
        Row::new().with("id", 7).with("label", "tag7").with("nm_owner_id", 3),
    ]);

    let posts = Post::query().fetch_entities(true).all(&mut conn).unwrap();
    assert_eq!(posts.len(), 1);
    posts.into_iter().next().unwrap()
}

fn expected_post() -> Post {
    Post {
        id: Some(1),
        title: Some("hello".to_string()),
        author: Related::loaded(User {
            id: Some(3),
            name: Some("alice".to_string()),
            email: None,
            active: true,
            group: Related::loaded(Group {
                id: Some(2),
                name: Some("staff".to_string()),
            }),
            tags: vec![tag(7)],
        }),
    }
}

#[test]
fn test_recursive_graph_mysql() {
    let (conn, driver) = mysql();
    assert_eq!(load_post_graph(conn, &driver), expected_post());

    let statements = driver.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0].sql,
        "SELECT `Post`.`id`,`Post`.`title`,`Post`.`author_id`,`t1`.`name` as author_name,`t1`.`email` as author_email,`t1`.`active` as author_active,`t1`.`group_id` as author_group_id,`t2`.`name` as author_group_name FROM `Post` INNER JOIN `User` t1 ON (`Post`.`author_id`=`t1`.`id`) LEFT JOIN `Group` t2 ON (`t1`.`group_id`=`t2`.`id`)"
    );
    assert_eq!(
        statements[1].sql,
        "SELECT `Tag`.`id`,`Tag`.`label`,`NM_Tag_User`.`user_id` as nm_owner_id FROM `Tag` INNER JOIN `NM_Tag_User` ON (`NM_Tag_User`.`tag_id`=`Tag`.`id`) WHERE `NM_Tag_User`.`user_id` IN (?)"
    );
    assert_eq!(statements[1].params, vec![Value::Int(3)]);
}

#[test]
fn test_recursive_graph_postgres() {
    let (conn, driver) = postgres();
    assert_eq!(load_post_graph(conn, &driver), expected_post());

    let statements = driver.statements();
    assert_eq!(
        statements[0].sql,
        "SELECT \"Post\".\"id\",\"Post\".\"title\",\"Post\".\"author_id\",\"t1\".\"name\" as \"author_name\",\"t1\".\"email\" as \"author_email\",\"t1\".\"active\" as \"author_active\",\"t1\".\"group_id\" as \"author_group_id\",\"t2\".\"name\" as \"author_group_name\" FROM \"Post\" INNER JOIN \"User\" t1 ON (\"Post\".\"author_id\"=\"t1\".\"id\") LEFT JOIN \"Group\" t2 ON (\"t1\".\"group_id\"=\"t2\".\"id\")"
    );
    assert_eq!(
        statements[1].sql,
        "SELECT \"Tag\".\"id\",\"Tag\".\"label\",\"NM_Tag_User\".\"user_id\" as \"nm_owner_id\" FROM \"Tag\" INNER JOIN \"NM_Tag_User\" ON (\"NM_Tag_User\".\"tag_id\"=\"Tag\".\"id\") WHERE \"NM_Tag_User\".\"user_id\" IN ($1)"
    );
}
