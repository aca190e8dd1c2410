//! PostgreSQL driver built on sqlx.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::encode::IsNull;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgRow, PgTypeInfo, Postgres,
};
use sqlx::query::Query;
use sqlx::{Column as _, ConnectOptions, Connection as _, Executor, Row as _, TypeInfo, ValueRef};
use tokio::runtime::Runtime;
use tracing::info;

use super::{Driver, FetchType, QueryOutput, Row, RowCursor, blocking_runtime};
use crate::ast::Value;
use crate::config::ConnectionConfig;
use crate::error::{RelmapError, RelmapResult};
use crate::transpiler::{Dialect, Statement};

pub struct PostgresDriver {
    options: PgConnectOptions,
    host: String,
    port: u16,
    runtime: Runtime,
    conn: Option<PgConnection>,
    last_insert_id: Option<i64>,
}

impl PostgresDriver {
    pub fn new(config: &ConnectionConfig) -> RelmapResult<Self> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .username(&config.user)
            .database(&config.database)
            .disable_statement_logging();
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        Ok(Self {
            options,
            host: config.host.clone(),
            port: config.effective_port(),
            runtime: blocking_runtime()?,
            conn: None,
            last_insert_id: None,
        })
    }
}

impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn connect(&mut self) -> RelmapResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = self
            .runtime
            .block_on(PgConnection::connect_with(&self.options))
            .map_err(|e| RelmapError::Connection(e.to_string()))?;
        info!(host = %self.host, port = self.port, "connected to PostgreSQL");
        self.conn = Some(conn);
        Ok(())
    }

    fn disconnect(&mut self) -> RelmapResult<()> {
        if let Some(conn) = self.conn.take() {
            self.runtime.block_on(conn.close())?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn execute(&mut self, statement: &Statement, fetch: FetchType) -> RelmapResult<QueryOutput> {
        let Self { runtime, conn, .. } = self;
        let conn = conn
            .as_mut()
            .ok_or_else(|| RelmapError::Connection("Not connected to PostgreSQL".to_string()))?;

        // An insert reporting its key always fetches the RETURNING row.
        let effective = match (&statement.returning, fetch) {
            (Some(_), FetchType::None) => FetchType::One,
            _ => fetch,
        };

        let output = runtime.block_on(async {
            for setup in &statement.setup {
                (&mut *conn).execute(setup.as_str()).await?;
            }
            if statement.params.is_empty() {
                run(conn, statement.sql.as_str(), effective).await
            } else {
                let query = bind_params(sqlx::query(&statement.sql), &statement.params).persistent(false);
                run(conn, query, effective).await
            }
        })?;

        let Some(column) = &statement.returning else {
            return Ok(output);
        };
        match output {
            QueryOutput::Row(row) => {
                self.last_insert_id = row.as_ref().and_then(|r| r.get_i64(column));
                if fetch == FetchType::None {
                    Ok(QueryOutput::Done {
                        affected: u64::from(row.is_some()),
                    })
                } else {
                    Ok(QueryOutput::Row(row))
                }
            }
            other => Ok(other),
        }
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    fn status(&mut self) -> RelmapResult<String> {
        let statement = Statement {
            sql: "SHOW server_version".to_string(),
            ..Default::default()
        };
        let version = self
            .execute(&statement, FetchType::One)?
            .into_row()
            .and_then(|row| row.get_str("server_version").map(str::to_string))
            .unwrap_or_default();
        Ok(format!("PostgreSQL {} on {}:{}", version, self.host, self.port))
    }
}

/// Text parameter sent with OID 0 so the server infers its type from context.
/// Lets one string bind into text, enum and json columns alike.
struct Untyped(Option<String>);

impl sqlx::Type<Postgres> for Untyped {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl<'q> sqlx::Encode<'q, Postgres> for Untyped {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        match &self.0 {
            Some(text) => {
                buf.extend_from_slice(text.as_bytes());
                IsNull::No
            }
            None => IsNull::Yes,
        }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(Untyped(None)),
            Value::Bool(b) => query.bind(*b),
            Value::Int(n) => query.bind(*n),
            Value::Float(f) => query.bind(*f),
            Value::Date(d) => query.bind(*d),
            Value::Time(t) => query.bind(*t),
            Value::DateTime(dt) => query.bind(*dt),
            other => query.bind(Untyped(other.to_text())),
        };
    }
    query
}

async fn run<'q, E>(conn: &mut PgConnection, query: E, fetch: FetchType) -> RelmapResult<QueryOutput>
where
    E: sqlx::Execute<'q, Postgres> + 'q,
{
    Ok(match fetch {
        FetchType::None => QueryOutput::Done {
            affected: (&mut *conn).execute(query).await?.rows_affected(),
        },
        FetchType::One => {
            let row = (&mut *conn).fetch_optional(query).await?;
            QueryOutput::Row(row.as_ref().map(decode_row).transpose()?)
        }
        FetchType::All => {
            let rows = (&mut *conn).fetch_all(query).await?;
            QueryOutput::Rows(rows.iter().map(decode_row).collect::<RelmapResult<_>>()?)
        }
        FetchType::Iterative => {
            let rows = (&mut *conn).fetch_all(query).await?;
            let rows = rows.iter().map(decode_row).collect::<RelmapResult<Vec<_>>>()?;
            QueryOutput::Cursor(RowCursor::indexed(rows))
        }
    })
}

/// Convert a PostgreSQL row by reported column type. Enums and other
/// user-defined types come back as text.
fn decode_row(row: &PgRow) -> RelmapResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i)?.is_null() {
            out.insert(column.name(), Value::Null);
            continue;
        }
        let value = match column.type_info().name() {
            "BOOL" => Value::Bool(row.try_get_unchecked::<bool, _>(i)?),
            "INT2" => Value::Int(i64::from(row.try_get_unchecked::<i16, _>(i)?)),
            "INT4" => Value::Int(i64::from(row.try_get_unchecked::<i32, _>(i)?)),
            "INT8" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
            "FLOAT4" => Value::Float(f64::from(row.try_get_unchecked::<f32, _>(i)?)),
            "FLOAT8" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
            "NUMERIC" => {
                let d = row.try_get_unchecked::<Decimal, _>(i)?;
                d.to_f64().map(Value::Float).unwrap_or_else(|| Value::String(d.to_string()))
            }
            "DATE" => Value::Date(row.try_get_unchecked(i)?),
            "TIME" => Value::Time(row.try_get_unchecked(i)?),
            "TIMESTAMP" => Value::DateTime(row.try_get_unchecked(i)?),
            "TIMESTAMPTZ" => {
                Value::DateTime(row.try_get_unchecked::<DateTime<Utc>, _>(i)?.naive_utc())
            }
            "JSON" | "JSONB" => Value::Json(row.try_get_unchecked::<serde_json::Value, _>(i)?),
            "VOID" => Value::Null,
            _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
        };
        out.insert(column.name(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_starts_disconnected() {
        let config = ConnectionConfig::new(Dialect::Postgres, "test");
        let mut driver = PostgresDriver::new(&config).unwrap();
        assert!(!driver.is_connected());
        assert_eq!(driver.dialect(), Dialect::Postgres);
        assert!(driver.execute(&Statement::default(), FetchType::All).is_err());
    }
}
