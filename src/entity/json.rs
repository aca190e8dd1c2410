//! JSON rendering of entities.

use serde_json::{Map, Value as Json};

use super::schema::{EntitySchema, FieldKind};
use super::{Record, RelatedRecord};

/// Render `record` as a JSON object.
///
/// Hidden fields are left out, as are unset ones. Datetimes become Unix
/// timestamps and loaded relations are nested.
pub fn record_to_json(schema: &EntitySchema, record: &Record, properties: Option<&[&str]>) -> Json {
    let mut object = Map::new();
    object.insert("id".to_string(), record.id.map(Json::from).unwrap_or(Json::Null));

    for field in &schema.fields {
        if field.hidden || properties.is_some_and(|props| !props.contains(&field.property.as_str())) {
            continue;
        }
        let value = match &field.kind {
            FieldKind::Column(_) => match record.value(&field.property) {
                Some(value) => value.to_json(),
                None => continue,
            },
            FieldKind::Relation(target) => match record.related(&field.property) {
                Some(RelatedRecord::Null) => Json::Null,
                Some(RelatedRecord::Id(id)) => Json::from(*id),
                Some(RelatedRecord::Loaded(related)) => record_to_json(&target.schema(), related, None),
                None => continue,
            },
            FieldKind::Many(target) | FieldKind::ReferencedBy { target, .. } => {
                match record.many(&field.property) {
                    Some(members) => {
                        let schema = target.schema();
                        Json::Array(
                            members
                                .values()
                                .map(|member| record_to_json(&schema, member, None))
                                .collect(),
                        )
                    }
                    None => continue,
                }
            }
        };
        object.insert(field.property.clone(), value);
    }
    Json::Object(object)
}
