use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelmapError;
use crate::transpiler::sql::mysql::MysqlGenerator;
use crate::transpiler::sql::postgres::PostgresGenerator;
use crate::transpiler::traits::SqlGenerator;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    #[serde(rename = "mysql")]
    MySQL,
}

impl Dialect {
    pub fn generator(&self) -> Box<dyn SqlGenerator> {
        match self {
            Dialect::Postgres => Box::new(PostgresGenerator),
            Dialect::MySQL => Box::new(MysqlGenerator),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySQL => "mysql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = RelmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySQL),
            other => Err(RelmapError::Config(format!("Unknown database type: {}", other))),
        }
    }
}
