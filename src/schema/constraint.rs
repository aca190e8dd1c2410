/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
    SetDefault,
}

impl OnDelete {
    pub fn sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "ON DELETE CASCADE",
            OnDelete::SetNull => "ON DELETE SET NULL",
            OnDelete::SetDefault => "ON DELETE SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    ForeignKey {
        column: String,
        ref_table: String,
        ref_column: String,
        on_delete: Option<OnDelete>,
    },
}

/// Table constraint, optionally named.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: Option<String>,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn primary_key<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::PrimaryKey(columns.into_iter().map(Into::into).collect()),
        }
    }

    pub fn unique<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::Unique(columns.into_iter().map(Into::into).collect()),
        }
    }

    pub fn foreign_key(
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
        on_delete: Option<OnDelete>,
    ) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::ForeignKey {
                column: column.into(),
                ref_table: ref_table.into(),
                ref_column: ref_column.into(),
                on_delete,
            },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self.kind, ConstraintKind::PrimaryKey(_))
    }

    pub fn columns(&self) -> Vec<&str> {
        match &self.kind {
            ConstraintKind::PrimaryKey(cols) | ConstraintKind::Unique(cols) => {
                cols.iter().map(String::as_str).collect()
            }
            ConstraintKind::ForeignKey { column, .. } => vec![column.as_str()],
        }
    }

    /// Name used when a table is created: `pk_<table>` and `fk_<table>_<ref>_<col>`.
    pub fn generated_name(&self, table: &str) -> Option<String> {
        let name = match &self.kind {
            ConstraintKind::PrimaryKey(_) => format!("pk_{}", table),
            ConstraintKind::ForeignKey {
                column, ref_table, ..
            } => format!("fk_{}_{}_{}", table, ref_table, column),
            ConstraintKind::Unique(_) => return None,
        };
        Some(name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_names() {
        let fk = Constraint::foreign_key("group_id", "Group", "id", Some(OnDelete::Cascade));
        assert_eq!(fk.generated_name("User").unwrap(), "fk_user_group_group_id");
        let pk = Constraint::primary_key(["id"]);
        assert_eq!(pk.generated_name("User").unwrap(), "pk_user");
        assert!(Constraint::unique(["a", "b"]).generated_name("User").is_none());
    }
}
