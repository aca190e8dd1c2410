//! Per-connection cache of entity handlers and join tables.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::handler::Handler;
use super::nm::NmRelation;
use super::schema::EntityRef;
use crate::error::{RelmapError, RelmapResult};

#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, Arc<Handler>>,
    tables: HashMap<String, TypeId>,
    nm_relations: BTreeMap<String, NmRelation>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: &EntityRef) -> Option<Arc<Handler>> {
        self.handlers.get(&entity.type_id()).cloned()
    }

    pub fn by_table(&self, table: &str) -> Option<Arc<Handler>> {
        self.tables
            .get(table)
            .and_then(|type_id| self.handlers.get(type_id))
            .cloned()
    }

    /// Handler of `entity`, building it (and the handlers of every entity it
    /// relates to) on first use.
    ///
    /// Nothing is registered when the schema of `entity`, or of any entity
    /// it reaches, is invalid.
    pub fn resolve(&mut self, entity: &EntityRef) -> RelmapResult<Arc<Handler>> {
        if let Some(handler) = self.get(entity) {
            return Ok(handler);
        }
        let mut staged = self.clone();
        let handler = staged.register(entity)?;
        *self = staged;
        Ok(handler)
    }

    fn register(&mut self, entity: &EntityRef) -> RelmapResult<Arc<Handler>> {
        if let Some(handler) = self.get(entity) {
            return Ok(handler);
        }

        let (handler, bindings) = Handler::build(*entity)?;
        if self.tables.contains_key(handler.table()) {
            return Err(RelmapError::metadata(
                handler.table(),
                format!("Table name is already used by another entity than {}", entity.type_name()),
            ));
        }

        let mut created = BTreeMap::new();
        for binding in &bindings {
            if !self.nm_relations.contains_key(&binding.join_table)
                && !created.contains_key(&binding.join_table)
            {
                let nm = NmRelation::new(&binding.this_table, &binding.other_table)?;
                created.insert(binding.join_table.clone(), nm);
            }
        }
        self.nm_relations.extend(created);
        for binding in bindings {
            if let Some(nm) = self.nm_relations.get_mut(&binding.join_table) {
                nm.add_property(&binding.this_table, &binding.property);
            }
        }

        let handler = Arc::new(handler);
        self.tables
            .insert(handler.table().to_string(), entity.type_id());
        self.handlers.insert(entity.type_id(), Arc::clone(&handler));
        debug!(entity = entity.type_name(), table = handler.table(), "registered entity handler");

        // Related tables and both sides of a join table must be known before
        // the schema is created or queried.
        let targets: Vec<EntityRef> = handler
            .properties()
            .iter()
            .filter_map(|p| p.relation)
            .chain(handler.many_properties().iter().map(|m| *m.relation.target()))
            .filter(|target| target != entity)
            .collect();
        for target in targets {
            self.register(&target)?;
        }
        Ok(handler)
    }

    pub fn nm_relation(&self, join_table: &str) -> Option<&NmRelation> {
        self.nm_relations.get(join_table)
    }

    pub fn nm_relations(&self) -> impl Iterator<Item = &NmRelation> {
        self.nm_relations.values()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<Handler>> {
        self.handlers.values()
    }
}
