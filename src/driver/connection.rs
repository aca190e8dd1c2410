//! Database connection: query execution, transactions and entity handlers.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{Driver, FetchType, MysqlDriver, PostgresDriver, QueryOutput, Row, RowCursor};
use crate::ast::{Condition, Expr};
use crate::config::ConnectionConfig;
use crate::entity::{Entity, EntityRef, Handler, HandlerRegistry};
use crate::error::{RelmapError, RelmapResult};
use crate::query::{Query, Select};
use crate::transpiler::{Dialect, ToSql};

/// A connection to one database.
///
/// Every call blocks until the database answered. Entity handlers are built
/// on first use and cached for the lifetime of the connection.
pub struct Connection {
    driver: Box<dyn Driver>,
    registry: HandlerRegistry,
    log_queries: bool,
    last_error: Option<String>,
    last_insert_id: Option<i64>,
    schema: String,
    entity_log_lifetime: u32,
}

impl Connection {
    /// Connect with the driver named by `config.kind`.
    pub fn open(config: &ConnectionConfig) -> RelmapResult<Self> {
        let driver: Box<dyn Driver> = match config.kind {
            Dialect::MySQL => Box::new(MysqlDriver::new(config)?),
            Dialect::Postgres => Box::new(PostgresDriver::new(config)?),
        };
        let mut conn = Self::from_boxed(driver);
        conn.log_queries = config.log_queries;
        conn.schema = config.schema.clone();
        conn.entity_log_lifetime = config.entity_log_lifetime;
        conn.connect()?;
        Ok(conn)
    }

    /// Wrap an existing driver. The driver is not connected implicitly.
    pub fn with_driver(driver: impl Driver + 'static) -> Self {
        Self::from_boxed(Box::new(driver))
    }

    fn from_boxed(driver: Box<dyn Driver>) -> Self {
        Self {
            driver,
            registry: HandlerRegistry::new(),
            log_queries: false,
            last_error: None,
            last_insert_id: None,
            schema: "public".to_string(),
            entity_log_lifetime: 90,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub fn connect(&mut self) -> RelmapResult<()> {
        let result = self.driver.connect();
        self.track(result)
    }

    pub fn disconnect(&mut self) -> RelmapResult<()> {
        let result = self.driver.disconnect();
        self.track(result)
    }

    /// Disconnect and drop the connection.
    pub fn close(mut self) -> RelmapResult<()> {
        self.disconnect()?;
        info!(dialect = %self.dialect(), "connection closed");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    pub fn status(&mut self) -> RelmapResult<String> {
        let result = self.driver.status();
        self.track(result)
    }

    pub fn set_log_queries(&mut self, enabled: bool) {
        self.log_queries = enabled;
    }

    /// PostgreSQL schema searched by [`Connection::list_tables`].
    pub fn set_schema(&mut self, schema: impl Into<String>) {
        self.schema = schema.into();
    }

    /// Retention in days for audit-log triggers that do not set their own.
    pub fn entity_log_lifetime(&self) -> u32 {
        self.entity_log_lifetime
    }

    pub fn set_entity_log_lifetime(&mut self, days: u32) {
        self.entity_log_lifetime = days;
    }

    /// Render and run `query`, fetching per `fetch`.
    pub fn execute_query(&mut self, query: impl Into<Query>, fetch: FetchType) -> RelmapResult<QueryOutput> {
        let query = query.into();
        let dialect = self.dialect();
        let statement = match query.compile(dialect) {
            Ok(statement) => statement,
            Err(e) => {
                warn!(kind = query.kind(), error = %e, "failed to build query");
                return self.track(Err(e));
            }
        };

        if self.log_queries {
            debug!(sql = %statement.sql, params = ?statement.params, setup = ?statement.setup, "executing query");
        }

        let result = self.driver.execute(&statement, fetch);
        if let Err(e) = &result {
            warn!(kind = query.kind(), error = %e, "query failed");
        }
        let output = self.track(result)?;
        if statement.returning.is_some() {
            self.last_insert_id = self.driver.last_insert_id();
        }
        Ok(output)
    }

    /// Run a statement, returning the number of affected rows.
    pub fn execute(&mut self, query: impl Into<Query>) -> RelmapResult<u64> {
        Ok(self.execute_query(query, FetchType::None)?.affected())
    }

    pub fn fetch_one(&mut self, query: impl Into<Query>) -> RelmapResult<Option<Row>> {
        Ok(self.execute_query(query, FetchType::One)?.into_row())
    }

    pub fn fetch_all(&mut self, query: impl Into<Query>) -> RelmapResult<Vec<Row>> {
        Ok(self.execute_query(query, FetchType::All)?.into_rows())
    }

    pub fn fetch_iter(&mut self, query: impl Into<Query>) -> RelmapResult<RowCursor> {
        match self.execute_query(query, FetchType::Iterative)? {
            QueryOutput::Cursor(cursor) => Ok(cursor),
            other => Ok(RowCursor::indexed(other.into_rows())),
        }
    }

    /// Key generated by the most recent insert that asked for one.
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn start_transaction(&mut self) -> RelmapResult<()> {
        self.execute(Query::StartTransaction).map(drop)
    }

    pub fn commit(&mut self) -> RelmapResult<()> {
        self.execute(Query::Commit).map(drop)
    }

    pub fn rollback(&mut self) -> RelmapResult<()> {
        self.execute(Query::Rollback).map(drop)
    }

    pub fn table_exists(&mut self, table: &str) -> RelmapResult<bool> {
        let select = match self.dialect() {
            Dialect::MySQL => Select::exprs([Expr::Count(None)])
                .from("information_schema.TABLES")
                .where_(Condition::eq_expr("TABLE_SCHEMA", Expr::Keyword("DATABASE()".to_string())))
                .where_eq("TABLE_NAME", table),
            Dialect::Postgres => Select::exprs([Expr::Count(None)])
                .from("pg_tables")
                .where_eq("schemaname", self.schema.as_str())
                .where_eq("tablename", table),
        };
        let count = self
            .fetch_one(select)?
            .and_then(|row| row.get_i64("count"))
            .unwrap_or(0);
        Ok(count > 0)
    }

    /// Tables of the configured database (MySQL) or schema (PostgreSQL).
    pub fn list_tables(&mut self) -> RelmapResult<Vec<String>> {
        let (select, column) = match self.dialect() {
            Dialect::MySQL => (
                Select::new(["TABLE_NAME"])
                    .from("information_schema.TABLES")
                    .where_(Condition::eq_expr("TABLE_SCHEMA", Expr::Keyword("DATABASE()".to_string()))),
                "TABLE_NAME",
            ),
            Dialect::Postgres => (
                Select::new(["tablename"])
                    .from("pg_tables")
                    .where_eq("schemaname", self.schema.as_str()),
                "tablename",
            ),
        };
        Ok(self
            .fetch_all(select)?
            .into_iter()
            .filter_map(|row| row.get_str(column).map(str::to_string))
            .collect())
    }

    /// Build and cache the handler of `E`, surfacing metadata errors.
    pub fn register<E: Entity>(&mut self) -> RelmapResult<Arc<Handler>> {
        self.handler(&EntityRef::of::<E>())
    }

    pub fn handler(&mut self, entity: &EntityRef) -> RelmapResult<Arc<Handler>> {
        match self.registry.resolve(entity) {
            Ok(handler) => Ok(handler),
            Err(e) => {
                error!(entity = entity.type_name(), error = %e, "invalid entity metadata");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub(crate) fn record_error(&mut self, err: &RelmapError) {
        self.last_error = Some(err.to_string());
    }

    /// Mirror a failed result into [`Connection::last_error`].
    pub(crate) fn track<T>(&mut self, result: RelmapResult<T>) -> RelmapResult<T> {
        if let Err(e) = &result {
            self.record_error(e);
        }
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.driver.is_connected()
            && let Err(e) = self.driver.disconnect()
        {
            warn!(error = %e, "failed to disconnect");
        }
    }
}
