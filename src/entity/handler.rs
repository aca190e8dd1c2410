//! Per-entity mapping between records and table rows.

use std::collections::HashSet;

use tracing::{debug, error};

use super::nm::NmRelation;
use super::schema::{Discriminator, EntityLogConfig, EntityRef, FieldKind, snake_case};
use super::{Record, RelatedRecord};
use crate::ast::{Condition, Expr, Value};
use crate::bootstrap;
use crate::driver::{Connection, Row};
use crate::error::{RelmapError, RelmapResult};
use crate::query::{CreateTable, CreateTrigger, Delete, Insert, Query, Select, Update};
use crate::schema::{Column, ColumnDefault, ColumnKind, Constraint, ConstraintKind, OnDelete};

/// A property stored in a column of the entity's own table.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub column: Column,
    /// Target of a single-valued relation; the column holds its id
    pub relation: Option<EntityRef>,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManyRelation {
    Nm {
        join_table: String,
        target: EntityRef,
    },
    Reference {
        target: EntityRef,
        this_property: String,
        key_property: String,
    },
}

impl ManyRelation {
    pub fn target(&self) -> &EntityRef {
        match self {
            ManyRelation::Nm { target, .. } | ManyRelation::Reference { target, .. } => target,
        }
    }
}

/// A many-valued property, stored outside the entity's table.
#[derive(Debug, Clone, PartialEq)]
pub struct ManyProperty {
    pub name: String,
    pub relation: ManyRelation,
    pub hidden: bool,
}

/// Join-table property contributed by a handler, applied by the registry
/// once the handler is known to be valid.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NmBinding {
    pub join_table: String,
    pub this_table: String,
    pub other_table: String,
    pub property: String,
}

/// Mapping of one entity type onto its table.
#[derive(Debug, Clone)]
pub struct Handler {
    entity: EntityRef,
    table: String,
    properties: Vec<Property>,
    constraints: Vec<Constraint>,
    many: Vec<ManyProperty>,
    discriminator: Option<Discriminator>,
    entity_log: EntityLogConfig,
}

impl Handler {
    /// Build and validate the handler of `entity` from its schema.
    pub(crate) fn build(entity: EntityRef) -> RelmapResult<(Handler, Vec<NmBinding>)> {
        let schema = entity.schema();
        let table = schema.table.clone();
        let fail = |message: String| RelmapError::metadata(&table, message);

        if table.is_empty() {
            return Err(RelmapError::metadata(
                entity.type_name(),
                "Entity does not declare a table name",
            ));
        }

        let mut properties: Vec<Property> = Vec::new();
        let mut constraints = Vec::new();
        let mut many = Vec::new();
        let mut bindings = Vec::new();
        let mut seen_properties = HashSet::new();
        let mut seen_columns = HashSet::from(["id".to_string()]);

        for field in &schema.fields {
            if field.property == "id" {
                return Err(fail("Property name 'id' is reserved".to_string()));
            }
            if !seen_properties.insert(field.property.clone()) {
                return Err(fail(format!("Duplicate property '{}'", field.property)));
            }

            let column = match &field.kind {
                FieldKind::Column(kind) => {
                    if matches!(kind, ColumnKind::Enum { values } if values.is_empty()) {
                        return Err(fail(format!(
                            "Enumeration property '{}' has no values",
                            field.property
                        )));
                    }
                    let mut column =
                        Column::new(snake_case(&field.property), kind.clone()).set_nullable(field.nullable);
                    match &field.default {
                        Some(default) => column = column.default_expr(default.clone()),
                        None if *kind == ColumnKind::Bool => column = column.default(false),
                        None => {}
                    }
                    column
                }
                FieldKind::Relation(target) => {
                    let name = format!("{}_id", snake_case(&field.property));
                    let on_delete = if field.nullable {
                        OnDelete::SetNull
                    } else {
                        OnDelete::Cascade
                    };
                    let fk = Constraint::foreign_key(&name, target.table(), "id", Some(on_delete));
                    let fk = match fk.generated_name(&table) {
                        Some(fk_name) => fk.named(fk_name),
                        None => fk,
                    };
                    constraints.push(fk);
                    Column::int(name).set_nullable(field.nullable)
                }
                FieldKind::Many(target) => {
                    let other_table = target.table();
                    if other_table == table {
                        return Err(fail(
                            "Cannot create a many-to-many relation of a table with itself".to_string(),
                        ));
                    }
                    let join_table = NmRelation::table_name_for(&table, &other_table);
                    bindings.push(NmBinding {
                        join_table: join_table.clone(),
                        this_table: table.clone(),
                        other_table,
                        property: field.property.clone(),
                    });
                    many.push(ManyProperty {
                        name: field.property.clone(),
                        relation: ManyRelation::Nm {
                            join_table,
                            target: *target,
                        },
                        hidden: field.hidden,
                    });
                    continue;
                }
                FieldKind::ReferencedBy {
                    target,
                    this_property,
                    key_property,
                } => {
                    let target_schema = target.schema();
                    let back = target_schema.field(this_property);
                    if !matches!(back.map(|f| &f.kind), Some(FieldKind::Relation(owner)) if *owner == entity) {
                        return Err(fail(format!(
                            "Referenced property '{}' of '{}' does not point back to this entity",
                            this_property, target_schema.table
                        )));
                    }
                    if key_property != "id" && target_schema.field(key_property).is_none() {
                        return Err(fail(format!(
                            "Key property '{}' does not exist on '{}'",
                            key_property, target_schema.table
                        )));
                    }
                    many.push(ManyProperty {
                        name: field.property.clone(),
                        relation: ManyRelation::Reference {
                            target: *target,
                            this_property: this_property.clone(),
                            key_property: key_property.clone(),
                        },
                        hidden: field.hidden,
                    });
                    continue;
                }
            };

            if !seen_columns.insert(column.name.clone()) {
                return Err(fail(format!(
                    "Duplicate column '{}' for property '{}'",
                    column.name, field.property
                )));
            }
            if field.unique {
                constraints.push(Constraint::unique([column.name.clone()]));
            }
            properties.push(Property {
                name: field.property.clone(),
                column,
                relation: field.target().copied(),
                hidden: field.hidden,
            });
        }

        for key in &schema.unique_keys {
            let mut columns = Vec::with_capacity(key.len());
            for name in key {
                let property = properties
                    .iter()
                    .find(|p| &p.name == name)
                    .ok_or_else(|| fail(format!("Unique constraint over unknown property '{}'", name)))?;
                columns.push(property.column.name.clone());
            }
            constraints.push(Constraint::unique(columns));
        }

        if schema.discriminators.len() > 1 {
            return Err(fail("Cannot have more than one discriminator".to_string()));
        }
        let discriminator = schema.discriminators.first().cloned();
        if let Some(d) = &discriminator {
            let values = properties
                .iter()
                .find(|p| p.name == d.property)
                .and_then(|p| p.column.enum_values())
                .ok_or_else(|| {
                    fail(format!(
                        "Discriminator property '{}' must be an enumeration",
                        d.property
                    ))
                })?;
            let mut seen = HashSet::new();
            for (value, _) in &d.subtypes {
                if !values.contains(value) {
                    return Err(fail(format!(
                        "Discriminator value '{}' is not a value of '{}'",
                        value, d.property
                    )));
                }
                if !seen.insert(value) {
                    return Err(fail(format!("Duplicate discriminator value '{}'", value)));
                }
            }
        }

        debug!(table = %table, properties = properties.len(), many = many.len(), "built entity handler");
        let handler = Handler {
            entity,
            table,
            properties,
            constraints,
            many,
            discriminator,
            entity_log: schema.entity_log,
        };
        Ok((handler, bindings))
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn many_properties(&self) -> &[ManyProperty] {
        &self.many
    }

    pub fn many_property(&self, name: &str) -> Option<&ManyProperty> {
        self.many.iter().find(|p| p.name == name)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn entity_log(&self) -> EntityLogConfig {
        self.entity_log
    }

    /// `id` followed by every property column.
    pub fn column_names(&self) -> Vec<String> {
        std::iter::once("id".to_string())
            .chain(self.properties.iter().map(|p| p.column.name.clone()))
            .collect()
    }

    /// Tables this table references, excluding itself.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for constraint in &self.constraints {
            if let ConstraintKind::ForeignKey { ref_table, .. } = &constraint.kind
                && ref_table != &self.table
                && !deps.contains(ref_table)
            {
                deps.push(ref_table.clone());
            }
        }
        deps
    }

    /// Column values for `record`, restricted to `properties` when given.
    ///
    /// A missing value becomes NULL for nullable columns, then the column's
    /// default. Without either, an insert fails and an update skips the column.
    pub fn prepare_row(
        &self,
        record: &Record,
        properties: Option<&[&str]>,
        for_insert: bool,
    ) -> RelmapResult<Row> {
        let mut row = Row::new();
        if for_insert && let Some(id) = record.id {
            row.insert("id", Value::Int(id));
        }

        for property in &self.properties {
            if properties.is_some_and(|props| !props.contains(&property.name.as_str())) {
                continue;
            }
            let value = match (&property.relation, record.related(&property.name)) {
                (Some(_), Some(related)) => Some(related.id().map(Value::Int).unwrap_or(Value::Null)),
                _ => record.value(&property.name).cloned(),
            };

            match value {
                Some(value) if !value.is_null() => row.insert(&property.column.name, value),
                _ if property.column.nullable => row.insert(&property.column.name, Value::Null),
                _ => match &property.column.default {
                    Some(ColumnDefault::Value(default)) => {
                        row.insert(&property.column.name, default.clone())
                    }
                    Some(_) => {}
                    None if for_insert => {
                        let message = format!(
                            "Cannot insert entity: property '{}' was not initialized yet.",
                            property.name
                        );
                        error!(table = %self.table, property = %property.name, "{}", message);
                        return Err(RelmapError::Build(message));
                    }
                    None => {}
                },
            }
        }
        Ok(row)
    }

    /// Insert `record` and assign its generated id.
    pub fn insert(&self, conn: &mut Connection, record: &mut Record) -> RelmapResult<()> {
        let row = self.prepare_row(record, None, true)?;
        self.insert_row(conn, record, row)
    }

    /// Insert an already prepared row for `record`.
    pub fn insert_row(&self, conn: &mut Connection, record: &mut Record, row: Row) -> RelmapResult<()> {
        let (columns, values): (Vec<String>, Vec<Value>) = row
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .unzip();
        let mut insert = Insert::new(&self.table, columns).add_row(values);
        if record.id.is_none() {
            insert = insert.returning("id");
        }
        conn.execute(insert)?;

        if record.id.is_none() {
            let id = conn.last_insert_id().ok_or_else(|| {
                RelmapError::execution(format!("No id was generated for the new '{}' row", self.table))
            })?;
            record.id = Some(id);
        }
        debug!(table = %self.table, id = ?record.id, "inserted entity");
        Ok(())
    }

    /// Update the stored row of `record`, restricted to `properties` when given.
    pub fn update(
        &self,
        conn: &mut Connection,
        record: &mut Record,
        properties: Option<&[&str]>,
    ) -> RelmapResult<()> {
        let row = self.prepare_row(record, properties, false)?;
        self.update_row(conn, record, row)
    }

    pub fn update_row(&self, conn: &mut Connection, record: &Record, row: Row) -> RelmapResult<()> {
        let id = record.id.ok_or_else(|| {
            RelmapError::build(format!("Cannot update an unsaved '{}' entity", self.table))
        })?;
        if row.is_empty() {
            return Ok(());
        }
        let mut update = Update::new(&self.table);
        for (column, value) in row.iter() {
            update = update.set(column, value.clone());
        }
        conn.execute(update.where_eq("id", id))?;
        Ok(())
    }

    /// Delete the stored row of `record` and clear its id.
    pub fn delete(&self, conn: &mut Connection, record: &mut Record) -> RelmapResult<()> {
        let id = record.id.ok_or_else(|| {
            RelmapError::build(format!("Cannot delete an unsaved '{}' entity", self.table))
        })?;
        conn.execute(Delete::new(&self.table).where_eq(&format!("{}.id", self.table), id))?;
        record.id = None;
        Ok(())
    }

    pub fn fetch_one(&self, conn: &mut Connection, id: i64) -> RelmapResult<Option<Record>> {
        super::RecordQuery::new(self.entity)
            .where_(Condition::eq(&format!("{}.id", self.table), id))
            .one(conn)
    }

    pub fn fetch_multiple(
        &self,
        conn: &mut Connection,
        condition: Option<Condition>,
    ) -> RelmapResult<Vec<Record>> {
        let mut query = super::RecordQuery::new(self.entity);
        if let Some(condition) = condition {
            query = query.where_(condition);
        }
        query.all(conn)
    }

    pub fn count(&self, conn: &mut Connection, condition: Option<Condition>) -> RelmapResult<i64> {
        let mut select = Select::exprs([Expr::Count(None)]).from(&self.table);
        if let Some(condition) = condition {
            select = select.where_(condition);
        }
        Ok(conn
            .fetch_one(select)?
            .and_then(|row| row.get_i64("count"))
            .unwrap_or(0))
    }

    /// Turn an unprefixed row into a record.
    ///
    /// With `eager` set, a relation whose joined columns are present in the
    /// row is hydrated into a loaded record.
    pub fn hydrate(&self, conn: &mut Connection, row: &Row, eager: bool) -> RelmapResult<Record> {
        let mut record = Record::with_id(row.get_i64("id"));
        let own_columns = self.column_names();

        for property in &self.properties {
            let Some(value) = row.get(&property.column.name) else {
                continue;
            };
            match &property.relation {
                Some(target) => {
                    if value.is_null() {
                        record.set_related(&property.name, RelatedRecord::Null);
                        continue;
                    }
                    let fk = value.as_i64().ok_or_else(|| {
                        RelmapError::hydration(format!(
                            "Invalid key {:?} in column '{}' of '{}'",
                            value, property.column.name, self.table
                        ))
                    })?;
                    let mut related = RelatedRecord::Id(fk);
                    if eager {
                        // Joined columns are aliased `<property>_<column>`.
                        let slice = row
                            .without(&own_columns)
                            .with_prefix(&format!("{}_", snake_case(&property.name)));
                        let handler = conn.handler(target)?;
                        if handler.properties().iter().any(|p| slice.contains(&p.column.name)) {
                            let mut nested = handler.hydrate(conn, &slice, eager)?;
                            nested.id = Some(fk);
                            related = RelatedRecord::Loaded(Box::new(nested));
                        }
                    }
                    record.set_related(&property.name, related);
                }
                None => {
                    let value = coerce(&property.column.kind, value).ok_or_else(|| {
                        RelmapError::hydration(format!(
                            "Cannot read property '{}' of '{}' from {:?}",
                            property.name, self.table, value
                        ))
                    })?;
                    record.set(&property.name, value);
                }
            }
        }

        if let Some(d) = &self.discriminator
            && let Some(subtype) = record
                .value(&d.property)
                .and_then(Value::as_str)
                .and_then(|v| d.subtype_for(v))
        {
            let subtype = subtype.to_string();
            record.set_subtype(subtype);
        }
        for many in &self.many {
            record.set_many(&many.name, Default::default());
        }
        Ok(record)
    }

    /// CREATE TABLE, seed rows and audit-log triggers for this entity.
    pub fn create_queries(&self, default_lifetime: u32) -> RelmapResult<Vec<Query>> {
        let mut table = CreateTable::new(&self.table)
            .only_if_not_exists()
            .add_serial("id");
        for property in &self.properties {
            table = table.add_column(property.column.clone());
        }
        table = table.primary_key(["id"]);
        for constraint in &self.constraints {
            table = table.add_constraint(constraint.clone());
        }
        let mut queries = vec![Query::CreateTable(table)];

        let mut seeds: Option<Insert> = None;
        for record in self.entity.predefined_records() {
            let row = self.prepare_row(&record, None, true)?;
            let columns: Vec<String> = row.columns().map(str::to_string).collect();
            let values: Vec<Value> = row.iter().map(|(_, v)| v.clone()).collect();
            seeds = match seeds {
                Some(insert) if insert.columns == columns => Some(insert.add_row(values)),
                Some(insert) => {
                    queries.push(Query::Insert(insert));
                    Some(Insert::new(&self.table, columns).add_row(values))
                }
                None => Some(Insert::new(&self.table, columns).add_row(values)),
            };
        }
        queries.extend(seeds.map(Query::Insert));

        let log = self.entity_log;
        let lifetime = log.lifetime.unwrap_or(default_lifetime);
        let id = || Expr::CurrentColumn("id".to_string());
        if log.insert {
            queries.push(Query::CreateTrigger(
                CreateTrigger::new(&format!("{}_trg_insert", self.table))
                    .after()
                    .insert(&self.table)
                    .only_if_not_exists()
                    .exec(
                        bootstrap::insert_entity_log_procedure(),
                        [Expr::CurrentTable, id(), CreateTrigger::constant(lifetime)],
                    ),
            ));
        }
        if log.update {
            queries.push(Query::CreateTrigger(
                CreateTrigger::new(&format!("{}_trg_update", self.table))
                    .after()
                    .update(&self.table)
                    .only_if_not_exists()
                    .exec(bootstrap::update_entity_log_procedure(), [Expr::CurrentTable, id()]),
            ));
        }
        if log.delete {
            queries.push(Query::CreateTrigger(
                CreateTrigger::new(&format!("{}_trg_delete", self.table))
                    .after()
                    .delete(&self.table)
                    .only_if_not_exists()
                    .exec(bootstrap::delete_entity_log_procedure(), [Expr::CurrentTable, id()]),
            ));
        }
        Ok(queries)
    }
}

/// Coerce a driver value to the representation of a column kind.
fn coerce(kind: &ColumnKind, value: &Value) -> Option<Value> {
    use super::FromValue;

    if value.is_null() {
        return Some(Value::Null);
    }
    Some(match kind {
        ColumnKind::Bool => Value::Bool(value.as_bool()?),
        ColumnKind::Serial | ColumnKind::Int { .. } => Value::Int(value.as_i64()?),
        ColumnKind::Float | ColumnKind::Double | ColumnKind::Numeric { .. } => {
            Value::Float(f64::from_value(value)?)
        }
        ColumnKind::DateTime => Value::DateTime(chrono::NaiveDateTime::from_value(value)?),
        ColumnKind::Json => match value {
            Value::Json(j) => Value::Json(j.clone()),
            Value::String(s) => Value::Json(serde_json::from_str(s).ok()?),
            other => Value::Json(other.to_json()),
        },
        ColumnKind::String { .. } | ColumnKind::Enum { .. } => Value::String(String::from_value(value)?),
    })
}
