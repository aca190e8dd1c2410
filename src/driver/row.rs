use crate::ast::Value;

/// A result row: column names in select order, mapped to values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an existing one of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Columns starting with `prefix`, with the prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Row {
        let mut sliced = Row::new();
        for (name, value) in &self.columns {
            if let Some(rest) = name.strip_prefix(prefix) {
                sliced.insert(rest, value.clone());
            }
        }
        sliced
    }

    /// This row without the named columns.
    pub fn without(&self, names: &[String]) -> Row {
        self.columns
            .iter()
            .filter(|(n, _)| !names.contains(n))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect()
    }

    /// JSON object view, printed by `relmap log --format json`.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_prefix_strips_names() {
        let row = Row::new()
            .with("id", 1)
            .with("group_id", 4)
            .with("group_name", "admins");
        let group = row.with_prefix("group_");
        assert_eq!(group.get_i64("id"), Some(4));
        assert_eq!(group.get_str("name"), Some("admins"));
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_without_drops_named_columns() {
        let row = Row::new()
            .with("id", 1)
            .with("group_id", 4)
            .with("group_note", "own column")
            .with("group_name", "admins");
        let group = row.without(&["group_id".to_string(), "group_note".to_string()]).with_prefix("group_");
        assert_eq!(group, Row::new().with("name", "admins"));
    }

    #[test]
    fn test_to_json_maps_columns() {
        let row = Row::new()
            .with("table_name", "User")
            .with("entity_id", 3)
            .with("note", Value::Null);
        assert_eq!(
            row.to_json().to_string(),
            r#"{"entity_id":3,"note":null,"table_name":"User"}"#
        );
    }

    #[test]
    fn test_insert_replaces() {
        let mut row = Row::new().with("a", 1);
        row.insert("a", Value::Int(2));
        assert_eq!(row.len(), 1);
        assert_eq!(row.get_i64("a"), Some(2));
    }
}
