//! Entity selects with eager loading of related entities.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;

use tracing::{debug, error};

use super::handler::{Handler, ManyRelation};
use super::nm::NmRelation;
use super::schema::{EntityRef, snake_case};
use super::{Entity, Record, RelatedRecord};
use crate::ast::{Condition, Expr, JoinKind, col};
use crate::driver::Connection;
use crate::error::{RelmapError, RelmapResult};
use crate::query::{Join, Select};

/// Alias of the owner key selected from a join table.
const OWNER_COLUMN: &str = "nm_owner_id";

/// Records built while one query runs, by (table, id).
#[derive(Debug, Default)]
pub struct QueryContext {
    records: HashMap<(String, i64), Record>,
}

impl QueryContext {
    pub fn get(&self, table: &str, id: i64) -> Option<&Record> {
        self.records.get(&(table.to_string(), id))
    }

    pub fn insert(&mut self, table: &str, id: i64, record: Record) {
        self.records.insert((table.to_string(), id), record);
    }
}

/// Untyped entity select producing [`Record`]s.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    entity: EntityRef,
    select: Select,
    only: Option<Vec<String>>,
    custom_values: Vec<Expr>,
    fetch_entities: bool,
    recursive: bool,
}

impl RecordQuery {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            select: Select::default(),
            only: None,
            custom_values: Vec::new(),
            fetch_entities: false,
            recursive: false,
        }
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.select = self.select.where_(condition);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.select = self.select.order_by(column);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.select = self.select.ascending();
        self
    }

    pub fn descending(mut self) -> Self {
        self.select = self.select.descending();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.select = self.select.limit(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.select = self.select.offset(offset);
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.select = self.select.group_by(column);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.select = self.select.join(join);
        self
    }

    /// Select only these properties. The id is always selected.
    pub fn only<S: Into<String>>(mut self, properties: impl IntoIterator<Item = S>) -> Self {
        self.only = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Extra select value, exposed as a record extra under its output name.
    pub fn add_custom_value(mut self, value: Expr) -> Self {
        self.custom_values.push(value);
        self
    }

    /// Join single-valued relations and load them with the root. With
    /// `recursive`, relations of related entities are followed too.
    pub fn fetch_entities(mut self, recursive: bool) -> Self {
        self.fetch_entities = true;
        self.recursive = recursive;
        self
    }

    pub fn first(self) -> Self {
        self.limit(1)
    }

    fn selects(&self, property: &str) -> bool {
        self.only
            .as_ref()
            .is_none_or(|only| only.iter().any(|p| p == property))
    }

    pub fn to_select(&self, conn: &mut Connection) -> RelmapResult<Select> {
        let handler = conn.handler(&self.entity)?;
        let table = handler.table();

        let mut values = vec![col(format!("{}.id", table))];
        for property in handler.properties() {
            if self.selects(&property.name) {
                values.push(col(format!("{}.{}", table, property.column.name)));
            }
        }
        values.extend(self.custom_values.iter().cloned());

        let mut joins = Vec::new();
        if self.fetch_entities {
            let mut visited = vec![table.to_string()];
            let mut plan = JoinPlan {
                values: &mut values,
                joins: &mut joins,
                visited: &mut visited,
            };
            plan.add_relations(conn, &handler, table, "", self.recursive, self.only.as_deref())?;
        }

        let mut select = self.select.clone();
        select.values = values;
        select.tables = vec![table.to_string()];
        joins.append(&mut select.joins);
        select.joins = joins;
        Ok(select)
    }

    pub fn all(&self, conn: &mut Connection) -> RelmapResult<Vec<Record>> {
        let select = self.to_select(conn)?;
        let handler = conn.handler(&self.entity)?;
        let rows = conn.fetch_all(select)?;
        let custom_names: Vec<String> = self.custom_values.iter().filter_map(Expr::output_name).collect();

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = match handler.hydrate(conn, row, self.fetch_entities) {
                Ok(record) => record,
                Err(e) => {
                    error!(table = handler.table(), error = %e, "skipping row that could not be hydrated");
                    conn.record_error(&e);
                    continue;
                }
            };
            if let Some(id) = record.id
                && !seen.insert(id)
            {
                continue;
            }
            for name in &custom_names {
                if let Some(value) = row.get(name) {
                    record.set_extra(name, value.clone());
                }
            }
            records.push(record);
        }

        if self.fetch_entities || !handler.many_properties().is_empty() {
            let mut ctx = QueryContext::default();
            fetch_nm_relations(conn, &handler, &mut records, self.recursive, &mut ctx, self.only.as_deref())?;
            if self.recursive {
                fetch_loaded_relations(conn, &handler, &mut records, &mut ctx)?;
            }
        }
        Ok(records)
    }

    pub fn one(&self, conn: &mut Connection) -> RelmapResult<Option<Record>> {
        Ok(self.clone().first().all(conn)?.into_iter().next())
    }
}

/// Collects the joins and select values of eagerly loaded relations.
struct JoinPlan<'a> {
    values: &'a mut Vec<Expr>,
    joins: &'a mut Vec<Join>,
    visited: &'a mut Vec<String>,
}

impl JoinPlan<'_> {
    /// Join every relation of `handler` whose table was not visited yet,
    /// selecting `tN.col as <prefix><col>`.
    fn add_relations(
        &mut self,
        conn: &mut Connection,
        handler: &Handler,
        source: &str,
        prefix: &str,
        recursive: bool,
        only: Option<&[String]>,
    ) -> RelmapResult<()> {
        for property in handler.properties() {
            let Some(target) = &property.relation else {
                continue;
            };
            if only.is_some_and(|only| !only.contains(&property.name)) {
                continue;
            }
            let related = conn.handler(target)?;
            let related_table = related.table().to_string();
            if self.visited.contains(&related_table) {
                continue;
            }
            let alias = format!("t{}", self.visited.len());
            self.visited.push(related_table.clone());

            let kind = if property.column.nullable {
                JoinKind::Left
            } else {
                JoinKind::Inner
            };
            self.joins.push(
                Join::new(
                    kind,
                    &related_table,
                    &format!("{}.{}", source, property.column.name),
                    &format!("{}.id", alias),
                )
                .alias(alias.as_str()),
            );

            let nested_prefix = format!("{}{}_", prefix, snake_case(&property.name));
            for column in related.properties() {
                if column.relation.is_some() && !recursive {
                    continue;
                }
                self.values.push(col(format!(
                    "{}.{} as {}{}",
                    alias, column.column.name, nested_prefix, column.column.name
                )));
            }
            if recursive {
                self.add_relations(conn, &related, &alias, &nested_prefix, true, None)?;
            }
        }
        Ok(())
    }
}

/// Second pass: load the many-valued properties of `records`.
fn fetch_nm_relations(
    conn: &mut Connection,
    handler: &Handler,
    records: &mut [Record],
    recursive: bool,
    ctx: &mut QueryContext,
    only: Option<&[String]>,
) -> RelmapResult<()> {
    let ids: Vec<i64> = records.iter().filter_map(|r| r.id).collect();
    if ids.is_empty() {
        return Ok(());
    }

    for many in handler.many_properties() {
        if only.is_some_and(|only| !only.contains(&many.name)) {
            continue;
        }
        match &many.relation {
            ManyRelation::Nm { join_table, target } => {
                let nm = conn.registry().nm_relation(join_table).cloned().ok_or_else(|| {
                    RelmapError::metadata(handler.table(), format!("Unknown join table {}", join_table))
                })?;
                let other = conn.handler(target)?;
                let other_table = other.table().to_string();
                let this_column = format!("{}.{}", nm.table_name(), NmRelation::id_column(handler.table()));

                let mut values = member_values(&other);
                values.push(col(format!("{} as {}", this_column, OWNER_COLUMN)));
                let mut joins = vec![Join::inner(
                    nm.table_name(),
                    &format!("{}.{}", nm.table_name(), NmRelation::id_column(&other_table)),
                    &format!("{}.id", other_table),
                )];
                if recursive {
                    let mut visited = vec![other_table.clone()];
                    let mut plan = JoinPlan {
                        values: &mut values,
                        joins: &mut joins,
                        visited: &mut visited,
                    };
                    plan.add_relations(conn, &other, &other_table, "", false, None)?;
                }

                let mut select = Select::exprs(values)
                    .from(&other_table)
                    .where_(Condition::is_in(&this_column, ids.clone()));
                select.joins = joins;
                if let Some(flag) = nm.flag_for(handler.table(), &many.name) {
                    select = select.where_(Condition::flag(&format!("{}.{}", nm.table_name(), flag)));
                }

                let rows = conn.fetch_all(select)?;
                let mut related: BTreeMap<i64, Record> = BTreeMap::new();
                let mut links: Vec<(i64, i64)> = Vec::with_capacity(rows.len());
                for row in &rows {
                    let (Some(owner_id), Some(related_id)) = (row.get_i64(OWNER_COLUMN), row.get_i64("id")) else {
                        continue;
                    };
                    if !related.contains_key(&related_id) {
                        let record = match ctx.get(&other_table, related_id) {
                            Some(record) => record.clone(),
                            None => match other.hydrate(conn, row, recursive) {
                                Ok(record) => record,
                                Err(e) => {
                                    error!(table = %other_table, error = %e, "skipping related row that could not be hydrated");
                                    conn.record_error(&e);
                                    continue;
                                }
                            },
                        };
                        ctx.insert(&other_table, related_id, record.clone());
                        related.insert(related_id, record);
                    }
                    links.push((owner_id, related_id));
                }

                if recursive && !related.is_empty() {
                    let mut members: Vec<Record> = std::mem::take(&mut related).into_values().collect();
                    fetch_nm_relations(conn, &other, &mut members, false, ctx, None)?;
                    related = members
                        .into_iter()
                        .filter_map(|r| r.id.map(|id| (id, r)))
                        .collect();
                }

                let inverse = if nm.uses_flags() {
                    None
                } else {
                    nm.properties(&other_table).first().cloned()
                };
                debug!(
                    table = nm.table_name(),
                    property = %many.name,
                    members = related.len(),
                    "loaded many-to-many members"
                );
                for record in records.iter_mut() {
                    let Some(owner_id) = record.id else {
                        continue;
                    };
                    let owner = inverse.as_ref().map(|_| record.shallow());
                    let members = record.many_mut(&many.name);
                    for (_, related_id) in links.iter().filter(|(o, _)| *o == owner_id) {
                        let Some(member) = related.get(related_id) else {
                            continue;
                        };
                        let mut member = member.clone();
                        if let (Some(inverse), Some(owner)) = (&inverse, &owner) {
                            member.many_mut(inverse).insert(owner_id, owner.clone());
                        }
                        members.insert(*related_id, member);
                    }
                }
            }
            ManyRelation::Reference {
                target,
                this_property,
                key_property,
            } => {
                let other = conn.handler(target)?;
                let back = other.property(this_property).ok_or_else(|| {
                    RelmapError::metadata(
                        other.table(),
                        format!("Referenced property '{}' does not exist", this_property),
                    )
                })?;
                let select = Select::exprs(member_values(&other))
                    .from(other.table())
                    .where_(Condition::is_in(
                        &format!("{}.{}", other.table(), back.column.name),
                        ids.clone(),
                    ));
                let rows = conn.fetch_all(select)?;

                let mut by_owner: HashMap<i64, Vec<Record>> = HashMap::new();
                for row in &rows {
                    let member = match other.hydrate(conn, row, false) {
                        Ok(member) => member,
                        Err(e) => {
                            error!(table = other.table(), error = %e, "skipping member that could not be hydrated");
                            conn.record_error(&e);
                            continue;
                        }
                    };
                    if let Some(owner_id) = member.related(this_property).and_then(RelatedRecord::id) {
                        by_owner.entry(owner_id).or_default().push(member);
                    }
                }

                for record in records.iter_mut() {
                    let Some(owner_id) = record.id else {
                        continue;
                    };
                    let owner = record.shallow();
                    let mut members = BTreeMap::new();
                    for mut member in by_owner.remove(&owner_id).unwrap_or_default() {
                        let key = if key_property == "id" {
                            member.id
                        } else {
                            member.value(key_property).and_then(|v| v.as_i64())
                        };
                        let Some(key) = key else {
                            continue;
                        };
                        member.set_related(this_property, RelatedRecord::Loaded(Box::new(owner.clone())));
                        members.insert(key, member);
                    }
                    record.set_many(&many.name, members);
                }
            }
        }
    }
    Ok(())
}

/// Give single relations loaded in recursive mode their many-valued members.
fn fetch_loaded_relations(
    conn: &mut Connection,
    handler: &Handler,
    records: &mut [Record],
    ctx: &mut QueryContext,
) -> RelmapResult<()> {
    for property in handler.properties() {
        let Some(target) = &property.relation else {
            continue;
        };
        let related = conn.handler(target)?;
        if related.many_properties().is_empty() {
            continue;
        }
        let mut loaded: Vec<Record> = records
            .iter()
            .filter_map(|r| match r.related(&property.name) {
                Some(RelatedRecord::Loaded(record)) => Some((**record).clone()),
                _ => None,
            })
            .collect();
        if loaded.is_empty() {
            continue;
        }
        fetch_nm_relations(conn, &related, &mut loaded, false, ctx, None)?;
        let by_id: HashMap<i64, Record> = loaded
            .into_iter()
            .filter_map(|r| r.id.map(|id| (id, r)))
            .collect();
        for record in records.iter_mut() {
            let id = match record.related(&property.name) {
                Some(RelatedRecord::Loaded(loaded)) => loaded.id,
                _ => None,
            };
            if let Some(full) = id.and_then(|id| by_id.get(&id)) {
                record.set_related(&property.name, RelatedRecord::Loaded(Box::new(full.clone())));
            }
        }
    }
    Ok(())
}

/// `Other.id` plus every column of `handler`'s table.
fn member_values(handler: &Handler) -> Vec<Expr> {
    handler
        .column_names()
        .iter()
        .map(|name| col(format!("{}.{}", handler.table(), name)))
        .collect()
}

/// Typed entity select.
pub struct EntityQuery<E> {
    inner: RecordQuery,
    _entity: PhantomData<E>,
}

impl<E> Clone for EntityQuery<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for EntityQuery<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityQuery").field("inner", &self.inner).finish()
    }
}

impl<E: Entity> Default for EntityQuery<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityQuery<E> {
    pub fn new() -> Self {
        Self {
            inner: RecordQuery::new(EntityRef::of::<E>()),
            _entity: PhantomData,
        }
    }

    fn map(self, f: impl FnOnce(RecordQuery) -> RecordQuery) -> Self {
        Self {
            inner: f(self.inner),
            _entity: PhantomData,
        }
    }

    pub fn where_(self, condition: Condition) -> Self {
        self.map(|q| q.where_(condition))
    }

    pub fn order_by(self, column: &str) -> Self {
        self.map(|q| q.order_by(column))
    }

    pub fn ascending(self) -> Self {
        self.map(RecordQuery::ascending)
    }

    pub fn descending(self) -> Self {
        self.map(RecordQuery::descending)
    }

    pub fn limit(self, limit: u64) -> Self {
        self.map(|q| q.limit(limit))
    }

    pub fn offset(self, offset: u64) -> Self {
        self.map(|q| q.offset(offset))
    }

    pub fn group_by(self, column: &str) -> Self {
        self.map(|q| q.group_by(column))
    }

    pub fn join(self, join: Join) -> Self {
        self.map(|q| q.join(join))
    }

    pub fn only<S: Into<String>>(self, properties: impl IntoIterator<Item = S>) -> Self {
        self.map(|q| q.only(properties))
    }

    pub fn add_custom_value(self, value: Expr) -> Self {
        self.map(|q| q.add_custom_value(value))
    }

    pub fn fetch_entities(self, recursive: bool) -> Self {
        self.map(|q| q.fetch_entities(recursive))
    }

    pub fn first(self) -> Self {
        self.map(RecordQuery::first)
    }

    pub fn to_select(&self, conn: &mut Connection) -> RelmapResult<Select> {
        self.inner.to_select(conn)
    }

    /// Matching records, before conversion to `E`.
    pub fn records(&self, conn: &mut Connection) -> RelmapResult<Vec<Record>> {
        self.inner.all(conn)
    }

    pub fn all(&self, conn: &mut Connection) -> RelmapResult<Vec<E>> {
        let mut entities = Vec::new();
        for record in self.inner.all(conn)? {
            match E::from_record(&record) {
                Ok(mut entity) => {
                    entity.post_fetch();
                    entities.push(entity);
                }
                Err(e) => {
                    error!(entity = std::any::type_name::<E>(), error = %e, "skipping record that could not be converted");
                    conn.record_error(&e);
                }
            }
        }
        Ok(entities)
    }

    pub fn one(&self, conn: &mut Connection) -> RelmapResult<Option<E>> {
        Ok(self.clone().first().all(conn)?.into_iter().next())
    }
}
