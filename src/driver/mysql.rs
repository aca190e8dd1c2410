//! MySQL driver built on sqlx.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column as _, ConnectOptions, Connection as _, Executor, Row as _, TypeInfo, ValueRef};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{Driver, FetchType, QueryOutput, Row, RowCursor, blocking_runtime};
use crate::ast::Value;
use crate::config::ConnectionConfig;
use crate::error::{RelmapError, RelmapResult};
use crate::transpiler::{Dialect, Statement};

pub struct MysqlDriver {
    options: MySqlConnectOptions,
    host: String,
    port: u16,
    runtime: Runtime,
    conn: Option<MySqlConnection>,
    last_insert_id: Option<i64>,
    /// Keep fetched rows of iterative results so cursors can rewind
    cache_rows: bool,
}

impl MysqlDriver {
    pub fn new(config: &ConnectionConfig) -> RelmapResult<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .username(&config.user)
            .database(&config.database)
            .charset(&config.encoding)
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
            cache_rows: true,
        })
    }

    pub fn with_row_cache(mut self, enabled: bool) -> Self {
        self.cache_rows = enabled;
        self
    }
}

impl Driver for MysqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySQL
    }

    fn connect(&mut self) -> RelmapResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = self
            .runtime
            .block_on(MySqlConnection::connect_with(&self.options))
            .map_err(|e| RelmapError::Connection(e.to_string()))?;
        info!(host = %self.host, port = self.port, "connected to MySQL");
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
        let Self {
            runtime,
            conn,
            cache_rows,
            ..
        } = self;
        let conn = conn
            .as_mut()
            .ok_or_else(|| RelmapError::Connection("Not connected to MySQL".to_string()))?;

        let (output, insert_id) = runtime.block_on(async {
            for setup in &statement.setup {
                (&mut *conn).execute(setup.as_str()).await?;
            }
            if statement.params.is_empty() {
                run(conn, statement.sql.as_str(), fetch, *cache_rows).await
            } else {
                let types: String = statement.params.iter().map(Value::mysql_type_tag).collect();
                debug!(types = %types, "binding parameters");
                let query = bind_params(sqlx::query(&statement.sql), &statement.params);
                run(conn, query, fetch, *cache_rows).await
            }
        })?;

        if statement.returning.is_some() {
            self.last_insert_id = insert_id;
        }
        Ok(output)
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    fn status(&mut self) -> RelmapResult<String> {
        let statement = Statement {
            sql: "SELECT VERSION() AS version".to_string(),
            ..Default::default()
        };
        let version = self
            .execute(&statement, FetchType::One)?
            .into_row()
            .and_then(|row| row.get_str("version").map(str::to_string))
            .unwrap_or_default();
        Ok(format!(
            "MySQL {} on {}:{}",
            version, self.host, self.port
        ))
    }
}

/// Bind by MySQL type tag: `i` as integer, `d` as double, `s` as text.
fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match (value.mysql_type_tag(), value) {
            (_, Value::Null) => query.bind(None::<String>),
            ('i', v) => query.bind(v.as_i64()),
            ('d', Value::Float(f)) => query.bind(*f),
            (_, v) => query.bind(v.to_text()),
        };
    }
    query
}

async fn run<'q, E>(
    conn: &mut MySqlConnection,
    query: E,
    fetch: FetchType,
    cache_rows: bool,
) -> RelmapResult<(QueryOutput, Option<i64>)>
where
    E: sqlx::Execute<'q, MySql> + 'q,
{
    match fetch {
        FetchType::None => {
            let result = (&mut *conn).execute(query).await?;
            let id = i64::try_from(result.last_insert_id()).ok().filter(|id| *id > 0);
            Ok((
                QueryOutput::Done {
                    affected: result.rows_affected(),
                },
                id,
            ))
        }
        FetchType::One => {
            let row = (&mut *conn).fetch_optional(query).await?;
            let row = row.as_ref().map(decode_row).transpose()?;
            Ok((QueryOutput::Row(row), None))
        }
        FetchType::All => {
            let rows = (&mut *conn).fetch_all(query).await?;
            let rows = rows.iter().map(decode_row).collect::<RelmapResult<Vec<_>>>()?;
            Ok((QueryOutput::Rows(rows), None))
        }
        FetchType::Iterative => {
            let rows = (&mut *conn).fetch_all(query).await?;
            let rows = rows.iter().map(decode_row).collect::<RelmapResult<Vec<_>>>()?;
            Ok((QueryOutput::Cursor(RowCursor::forward(rows, cache_rows)), None))
        }
    }
}

/// Convert a MySQL row by reported column type.
fn decode_row(row: &MySqlRow) -> RelmapResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i)?.is_null() {
            out.insert(column.name(), Value::Null);
            continue;
        }
        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(i)?),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                Value::Int(row.try_get_unchecked::<i64, _>(i)?)
            }
            name if name.ends_with(" UNSIGNED") => {
                let n = row.try_get_unchecked::<u64, _>(i)?;
                i64::try_from(n).map(Value::Int).unwrap_or(Value::Float(n as f64))
            }
            "FLOAT" => Value::Float(f64::from(row.try_get_unchecked::<f32, _>(i)?)),
            "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
            "DECIMAL" => {
                let d = row.try_get_unchecked::<Decimal, _>(i)?;
                d.to_f64().map(Value::Float).unwrap_or_else(|| Value::String(d.to_string()))
            }
            "DATE" => Value::Date(row.try_get_unchecked(i)?),
            "TIME" => Value::Time(row.try_get_unchecked(i)?),
            "DATETIME" | "TIMESTAMP" => Value::DateTime(row.try_get_unchecked(i)?),
            "JSON" => Value::Json(row.try_get_unchecked::<serde_json::Value, _>(i)?),
            _ => match row.try_get_unchecked::<String, _>(i) {
                Ok(s) => Value::String(s),
                Err(_) => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
            },
        };
        out.insert(column.name(), value);
    }
    Ok(out)
}
