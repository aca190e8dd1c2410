//! Explicit entity descriptors.
//!
//! An [`EntitySchema`] lists every persisted property of an entity with its
//! semantic type. Handlers are built from it; nothing is discovered at runtime.

use std::any::TypeId;
use std::fmt;

use super::{Entity, Record};
use crate::ast::Value;
use crate::schema::{ColumnDefault, ColumnKind};

/// Type-erased handle naming an entity type.
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_id: TypeId,
    type_name: &'static str,
    schema: fn() -> EntitySchema,
    predefined: fn() -> Vec<Record>,
}

fn predefined_records<E: Entity>() -> Vec<Record> {
    E::predefined_values().iter().map(Entity::to_record).collect()
}

impl EntityRef {
    pub fn of<E: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            schema: E::schema,
            predefined: predefined_records::<E>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn schema(&self) -> EntitySchema {
        (self.schema)()
    }

    pub fn table(&self) -> String {
        self.schema().table
    }

    /// Seed rows declared by the entity.
    pub fn predefined_records(&self) -> Vec<Record> {
        (self.predefined)()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EntityRef {}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.type_name).finish()
    }
}

/// How a property is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Column(ColumnKind),
    /// Single-valued relation stored as `<prop>_id`
    Relation(EntityRef),
    /// Many-to-many relation through a join table
    Many(EntityRef),
    /// 1:n relation: members of `target` point back via `this_property`,
    /// keyed in the owner's map by `key_property`
    ReferencedBy {
        target: EntityRef,
        this_property: String,
        key_property: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub property: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub unique: bool,
    /// Excluded from JSON output
    pub hidden: bool,
}

impl FieldDef {
    pub fn new(property: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            property: property.into(),
            kind,
            nullable: false,
            default: None,
            unique: false,
            hidden: false,
        }
    }

    /// Target entity of relation fields.
    pub fn target(&self) -> Option<&EntityRef> {
        match &self.kind {
            FieldKind::Relation(target) | FieldKind::Many(target) => Some(target),
            FieldKind::ReferencedBy { target, .. } => Some(target),
            FieldKind::Column(_) => None,
        }
    }
}

/// Maps discriminator values to subtype labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    pub property: String,
    pub subtypes: Vec<(String, String)>,
}

impl Discriminator {
    pub fn subtype_for(&self, value: &str) -> Option<&str> {
        self.subtypes
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, subtype)| subtype.as_str())
    }
}

/// Which changes write an audit-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityLogConfig {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    /// Retention in days
    pub lifetime: Option<u32>,
}

impl EntityLogConfig {
    pub fn all() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
            lifetime: None,
        }
    }

    pub fn lifetime(mut self, days: u32) -> Self {
        self.lifetime = Some(days);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.insert || self.update || self.delete
    }
}

/// Descriptor of one entity type.
///
/// Field modifiers (`nullable`, `default`, `unique`, `hidden`) apply to the
/// most recently added field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySchema {
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub unique_keys: Vec<Vec<String>>,
    pub discriminators: Vec<Discriminator>,
    pub entity_log: EntityLogConfig,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn add_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    fn column(self, property: &str, kind: ColumnKind) -> Self {
        self.add_field(FieldDef::new(property, FieldKind::Column(kind)))
    }

    pub fn int(self, property: &str) -> Self {
        self.column(property, ColumnKind::Int { big: false, unsigned: false })
    }

    pub fn big_int(self, property: &str) -> Self {
        self.column(property, ColumnKind::Int { big: true, unsigned: false })
    }

    pub fn string(self, property: &str, max_size: u32) -> Self {
        self.column(property, ColumnKind::String { max_size: Some(max_size) })
    }

    pub fn text(self, property: &str) -> Self {
        self.column(property, ColumnKind::String { max_size: None })
    }

    pub fn bool(self, property: &str) -> Self {
        self.column(property, ColumnKind::Bool)
    }

    pub fn float(self, property: &str) -> Self {
        self.column(property, ColumnKind::Float)
    }

    pub fn double(self, property: &str) -> Self {
        self.column(property, ColumnKind::Double)
    }

    pub fn numeric(self, property: &str, digits: u32, decimal_digits: u32) -> Self {
        self.column(
            property,
            ColumnKind::Numeric {
                digits: Some(digits),
                decimal_digits: Some(decimal_digits),
            },
        )
    }

    pub fn datetime(self, property: &str) -> Self {
        self.column(property, ColumnKind::DateTime)
    }

    pub fn json(self, property: &str) -> Self {
        self.column(property, ColumnKind::Json)
    }

    pub fn enumeration<S: Into<String>>(self, property: &str, values: impl IntoIterator<Item = S>) -> Self {
        self.column(
            property,
            ColumnKind::Enum {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn relation<T: Entity>(self, property: &str) -> Self {
        self.add_field(FieldDef::new(property, FieldKind::Relation(EntityRef::of::<T>())))
    }

    pub fn many<T: Entity>(self, property: &str) -> Self {
        self.add_field(FieldDef::new(property, FieldKind::Many(EntityRef::of::<T>())))
    }

    pub fn referenced_by<T: Entity>(self, property: &str, this_property: &str, key_property: &str) -> Self {
        self.add_field(FieldDef::new(
            property,
            FieldKind::ReferencedBy {
                target: EntityRef::of::<T>(),
                this_property: this_property.to_string(),
                key_property: key_property.to_string(),
            },
        ))
    }

    fn modify_last(mut self, f: impl FnOnce(&mut FieldDef)) -> Self {
        if let Some(field) = self.fields.last_mut() {
            f(field);
        }
        self
    }

    pub fn nullable(self) -> Self {
        self.modify_last(|f| f.nullable = true)
    }

    pub fn default(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.modify_last(|f| f.default = Some(ColumnDefault::Value(value)))
    }

    pub fn default_now(self) -> Self {
        self.modify_last(|f| f.default = Some(ColumnDefault::CurrentTimestamp))
    }

    pub fn unique(self) -> Self {
        self.modify_last(|f| f.unique = true)
    }

    pub fn hidden(self) -> Self {
        self.modify_last(|f| f.hidden = true)
    }

    pub fn unsigned(self) -> Self {
        self.modify_last(|f| {
            if let FieldKind::Column(ColumnKind::Int { unsigned, .. }) = &mut f.kind {
                *unsigned = true;
            }
        })
    }

    /// Table-level unique constraint over several properties.
    pub fn unique_key<S: Into<String>>(mut self, properties: impl IntoIterator<Item = S>) -> Self {
        self.unique_keys
            .push(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Select the subtype from an enumeration property's value.
    pub fn discriminator<V: Into<String>, S: Into<String>>(
        mut self,
        property: &str,
        subtypes: impl IntoIterator<Item = (V, S)>,
    ) -> Self {
        self.discriminators.push(Discriminator {
            property: property.to_string(),
            subtypes: subtypes
                .into_iter()
                .map(|(v, s)| (v.into(), s.into()))
                .collect(),
        });
        self
    }

    pub fn entity_log(mut self, config: EntityLogConfig) -> Self {
        self.entity_log = config;
        self
    }

    pub fn field(&self, property: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.property == property)
    }
}

/// Column name for a property: `createdAt` becomes `created_at`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase();
        out.push(c.to_ascii_lowercase());
    }
    out
}
