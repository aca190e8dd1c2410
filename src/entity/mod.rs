//! Entity mapping.
//!
//! An entity type describes its table with an [`EntitySchema`] and converts
//! itself to and from a [`Record`]. Everything else (CRUD, eager loading,
//! join-table synchronization, DDL) is done by the [`Handler`] the connection
//! builds from that schema.
//!
//! ```rust,ignore
//! impl Entity for User {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("User")
//!             .string("name", 64)
//!             .relation::<Group>("group")
//!             .nullable()
//!             .many::<Tag>("tags")
//!     }
//!     // id, set_id, to_record, from_record
//! }
//!
//! let mut user = User::new("alice");
//! user.save(&mut conn)?;
//! let users = User::query().fetch_entities(false).all(&mut conn)?;
//! ```

pub mod handler;
pub mod json;
pub mod nm;
pub mod query;
pub mod record;
pub mod registry;
pub mod schema;

pub use handler::{Handler, ManyProperty, ManyRelation, Property};
pub use nm::NmRelation;
pub use query::{EntityQuery, QueryContext, RecordQuery};
pub use record::{FieldValue, FromValue, Record, Related, RelatedRecord};
pub use registry::HandlerRegistry;
pub use schema::{
    Discriminator, EntityLogConfig, EntityRef, EntitySchema, FieldDef, FieldKind, snake_case,
};

use crate::ast::Condition;
use crate::driver::{Connection, Row};
use crate::error::RelmapResult;
use crate::query::Query;

/// A type persisted in its own table.
pub trait Entity: Sized + 'static {
    fn schema() -> EntitySchema;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: Option<i64>);

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> RelmapResult<Self>;

    /// Called with the prepared row before it is inserted or updated.
    fn pre_insert(&self, _row: &mut Row) {}

    fn post_fetch(&mut self) {}

    fn post_update(&mut self) {}

    fn post_delete(&mut self) {}

    /// Rows inserted right after the table is created.
    fn predefined_values() -> Vec<Self> {
        Vec::new()
    }

    fn entity_ref() -> EntityRef {
        EntityRef::of::<Self>()
    }

    /// Insert when unsaved, update otherwise. Memberships are synchronized.
    fn save(&mut self, conn: &mut Connection) -> RelmapResult<()> {
        self.save_with(conn, None, true)
    }

    /// Save, restricting an update to `properties` and optionally skipping
    /// membership synchronization.
    fn save_with(
        &mut self,
        conn: &mut Connection,
        properties: Option<&[&str]>,
        save_nm: bool,
    ) -> RelmapResult<()> {
        let result = if self.id().is_some() {
            update_entity(self, conn, properties, save_nm)
        } else {
            insert_entity(self, conn, save_nm)
        };
        conn.track(result)
    }

    /// Insert, keeping a preset id.
    fn insert(&mut self, conn: &mut Connection) -> RelmapResult<()> {
        let result = insert_entity(self, conn, true);
        conn.track(result)
    }

    /// Delete the row and clear the id.
    fn delete(&mut self, conn: &mut Connection) -> RelmapResult<()> {
        let result = delete_entity(self, conn);
        conn.track(result)?;
        self.set_id(None);
        self.post_delete();
        Ok(())
    }

    fn find(conn: &mut Connection, id: i64) -> RelmapResult<Option<Self>> {
        Self::find_with(conn, id, false, false)
    }

    fn find_with(
        conn: &mut Connection,
        id: i64,
        fetch_entities: bool,
        recursive: bool,
    ) -> RelmapResult<Option<Self>> {
        let table = Self::entity_ref().table();
        let mut query = Self::query().where_(Condition::eq(&format!("{}.id", table), id));
        if fetch_entities {
            query = query.fetch_entities(recursive);
        }
        query.one(conn)
    }

    fn exists(conn: &mut Connection, id: i64) -> RelmapResult<bool> {
        Ok(Self::count(conn, Some(Condition::eq("id", id)))? > 0)
    }

    fn find_all(conn: &mut Connection) -> RelmapResult<Vec<Self>> {
        Self::query().all(conn)
    }

    fn count(conn: &mut Connection, condition: Option<Condition>) -> RelmapResult<i64> {
        let handler = conn.handler(&Self::entity_ref())?;
        handler.count(conn, condition)
    }

    fn query() -> EntityQuery<Self> {
        EntityQuery::new()
    }

    /// JSON object of the set, non-hidden properties.
    fn to_json(&self, properties: Option<&[&str]>) -> serde_json::Value {
        json::record_to_json(&Self::schema(), &self.to_record(), properties)
    }

    /// DDL, seed rows and audit-log triggers for this entity's table.
    fn create_queries(conn: &mut Connection) -> RelmapResult<Vec<Query>> {
        let handler = conn.handler(&Self::entity_ref())?;
        handler.create_queries(conn.entity_log_lifetime())
    }
}

fn insert_entity<E: Entity>(entity: &mut E, conn: &mut Connection, save_nm: bool) -> RelmapResult<()> {
    let handler = conn.handler(&E::entity_ref())?;
    let mut record = entity.to_record();
    let mut row = handler.prepare_row(&record, None, true)?;
    entity.pre_insert(&mut row);
    handler.insert_row(conn, &mut record, row)?;
    entity.set_id(record.id);
    if save_nm {
        handler.insert_nm(conn, &mut record, None)?;
        sync_references(entity, &handler, &record)?;
    }
    Ok(())
}

fn delete_entity<E: Entity>(entity: &E, conn: &mut Connection) -> RelmapResult<()> {
    let handler = conn.handler(&E::entity_ref())?;
    let mut record = Record::with_id(entity.id());
    handler.delete(conn, &mut record)
}

fn update_entity<E: Entity>(
    entity: &mut E,
    conn: &mut Connection,
    properties: Option<&[&str]>,
    save_nm: bool,
) -> RelmapResult<()> {
    let handler = conn.handler(&E::entity_ref())?;
    let mut record = entity.to_record();
    let mut row = handler.prepare_row(&record, properties, false)?;
    entity.pre_insert(&mut row);
    handler.update_row(conn, &record, row)?;
    if save_nm {
        handler.update_nm(conn, &mut record, properties)?;
        sync_references(entity, &handler, &record)?;
    }
    entity.post_update();
    Ok(())
}

/// Members stored through a back-reference received ids; carry them over.
fn sync_references<E: Entity>(entity: &mut E, handler: &Handler, record: &Record) -> RelmapResult<()> {
    let has_references = handler
        .many_properties()
        .iter()
        .any(|p| matches!(p.relation, ManyRelation::Reference { .. }));
    if has_references {
        *entity = E::from_record(record)?;
    }
    Ok(())
}
