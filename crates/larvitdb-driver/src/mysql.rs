//! MySQL backend built on `mysql_async`.
//!
//! Option mapping:
//!
//! - `charset` and `timezone` become session `SET` statements run on every
//!   new connection
//! - `ssl` maps onto rustls options; `reject_unauthorized = false` accepts
//!   any certificate
//! - `connection_limit` bounds the pool
//!
//! Options `mysql_async` has no equivalent for (`stringify_objects`,
//! `type_cast`, `flags`, ...) are accepted and logged at debug level when
//! set away from their defaults.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use larvitdb_types::{Column, DriverError, QueryResult, Row, SqlValue, codes};
use mysql_async::prelude::Queryable as _;
use mysql_async::{Conn, Opts, OptsBuilder, PoolConstraints, PoolOpts, SslOpts};

use crate::config::{PoolConfig, TlsConfig};
use crate::driver::{Driver, DriverConnection, DriverPool, Queryable};
use crate::stream::{DEFAULT_STREAM_BUFFER, RowStream};

/// Driver for MySQL and MariaDB servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    /// Create the driver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A `mysql_async` pool.
#[derive(Debug, Clone)]
pub struct MySqlPool {
    pool: mysql_async::Pool,
}

/// A connection leased from a [`MySqlPool`].
#[derive(Debug)]
pub struct MySqlConnection {
    conn: Conn,
}

#[async_trait]
impl Driver for MySqlDriver {
    type Pool = MySqlPool;

    async fn probe(&self, config: &PoolConfig) -> Result<(), DriverError> {
        let opts = build_opts(config);

        let conn = tokio::time::timeout(config.connect_timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                DriverError::new(
                    codes::ETIMEDOUT,
                    format!("connect timed out after {:?}", config.connect_timeout),
                )
            })?
            .map_err(map_error)?;

        if let Err(e) = conn.disconnect().await {
            tracing::debug!(error = %e, "error closing probe connection");
        }
        Ok(())
    }

    async fn create_pool(&self, config: &PoolConfig) -> Result<MySqlPool, DriverError> {
        log_unsupported_options(config);

        Ok(MySqlPool {
            pool: mysql_async::Pool::new(build_opts(config)),
        })
    }
}

#[async_trait]
impl DriverPool for MySqlPool {
    type Connection = MySqlConnection;

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(map_error)?;
        run(&mut conn, sql, params).await
    }

    async fn lease(&self) -> Result<MySqlConnection, DriverError> {
        let conn = self.pool.get_conn().await.map_err(map_error)?;
        Ok(MySqlConnection { conn })
    }

    async fn stream(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream, DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(map_error)?;
        let (tx, stream) = RowStream::channel(DEFAULT_STREAM_BUFFER);
        let sql = sql.to_string();
        let params: Vec<mysql_async::Value> = params.iter().map(to_mysql_value).collect();

        tokio::spawn(async move {
            let mut result = match conn.exec_iter(sql.as_str(), params).await {
                Ok(result) => result,
                Err(e) => {
                    tx.send_error(map_error(e)).await;
                    return;
                }
            };

            let mut columns: Option<Arc<[Column]>> = None;
            loop {
                match result.next().await {
                    Ok(Some(row)) => {
                        let columns = columns.get_or_insert_with(|| column_list(&row));
                        if !tx.send_row(convert_row(Arc::clone(columns), row)).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tx.send_error(map_error(e)).await;
                        break;
                    }
                }
            }
        });

        Ok(stream)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.pool.clone().disconnect().await.map_err(map_error)
    }
}

#[async_trait]
impl Queryable for MySqlConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, DriverError> {
        run(&mut self.conn, sql, params).await
    }
}

#[async_trait]
impl DriverConnection for MySqlConnection {
    fn id(&self) -> u64 {
        u64::from(self.conn.id())
    }

    async fn begin_transaction(&mut self) -> Result<(), DriverError> {
        self.conn
            .query_drop("START TRANSACTION")
            .await
            .map_err(map_error)
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.conn.query_drop("COMMIT").await.map_err(map_error)
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.conn.query_drop("ROLLBACK").await.map_err(map_error)
    }

    async fn release(self) -> Result<(), DriverError> {
        // Dropping a pooled `Conn` hands it back to its pool.
        drop(self.conn);
        Ok(())
    }
}

async fn run(conn: &mut Conn, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError> {
    let rows: Vec<mysql_async::Row> = if params.is_empty() {
        conn.query(sql).await
    } else {
        let params: Vec<mysql_async::Value> = params.iter().map(to_mysql_value).collect();
        conn.exec(sql, params).await
    }
    .map_err(map_error)?;

    let affected_rows = conn.affected_rows();
    let last_insert_id = conn.last_insert_id().filter(|id| *id != 0);

    let mut result = match rows.first() {
        Some(first) => {
            let columns = column_list(first);
            let fields = columns.to_vec();
            QueryResult {
                rows: rows
                    .into_iter()
                    .map(|row| convert_row(Arc::clone(&columns), row))
                    .collect(),
                fields,
                ..QueryResult::default()
            }
        }
        None => QueryResult::default(),
    };
    result.affected_rows = affected_rows;
    result.last_insert_id = last_insert_id;
    Ok(result)
}

fn build_opts(config: &PoolConfig) -> Opts {
    let mut setup = Vec::new();
    if let Some(charset) = &config.charset {
        setup.push(format!("SET NAMES {charset}"));
    }
    if let Some(timezone) = &config.timezone {
        setup.push(format!("SET time_zone = '{}'", session_timezone(timezone)));
    }

    let max = usize::try_from(config.connection_limit.max(1)).unwrap_or(usize::MAX);
    let mut pool_opts = PoolOpts::default();
    if let Some(constraints) = PoolConstraints::new(0, max) {
        pool_opts = pool_opts.with_constraints(constraints);
    }

    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(config.user.clone())
        .pass(config.password.clone())
        .db_name(config.database.clone())
        .setup(setup)
        .pool_opts(Some(pool_opts));

    if let Some(path) = &config.socket_path {
        builder = builder.socket(Some(path.to_string_lossy().into_owned()));
    }

    if let Some(tls) = &config.ssl {
        builder = builder.ssl_opts(Some(ssl_opts(tls)));
    }

    Opts::from(builder)
}

fn ssl_opts(tls: &TlsConfig) -> SslOpts {
    let mut ssl = SslOpts::default()
        .with_danger_accept_invalid_certs(!tls.reject_unauthorized)
        .with_danger_skip_domain_validation(tls.skip_domain_validation);
    if let Some(path) = &tls.ca_path {
        ssl = ssl.with_root_certs(vec![path.clone().into()]);
    }
    ssl
}

/// `Z` and `local` are accepted as zone names; MySQL wants offsets.
fn session_timezone(timezone: &str) -> &str {
    match timezone {
        "Z" | "z" | "UTC" | "utc" => "+00:00",
        "local" => "SYSTEM",
        other => other,
    }
}

fn log_unsupported_options(config: &PoolConfig) {
    let defaults = PoolConfig::default();
    let ignored = [
        ("local_address", config.local_address.is_some()),
        ("stringify_objects", config.stringify_objects != defaults.stringify_objects),
        ("insecure_auth", config.insecure_auth != defaults.insecure_auth),
        ("type_cast", config.type_cast != defaults.type_cast),
        ("supports_big_numbers", config.supports_big_numbers != defaults.supports_big_numbers),
        ("big_number_strings", config.big_number_strings != defaults.big_number_strings),
        ("date_strings", config.date_strings != defaults.date_strings),
        ("debug", config.debug != defaults.debug),
        ("trace", config.trace != defaults.trace),
        ("multiple_statements", config.multiple_statements != defaults.multiple_statements),
        ("flags", !config.flags.is_empty()),
        ("wait_for_connections", config.wait_for_connections != defaults.wait_for_connections),
        ("queue_limit", config.queue_limit != defaults.queue_limit),
    ];

    for (option, _) in ignored.iter().filter(|(_, set)| *set) {
        tracing::debug!(option = *option, "option has no effect with the mysql backend");
    }
}

fn map_error(err: mysql_async::Error) -> DriverError {
    match err {
        mysql_async::Error::Server(e) => DriverError::server(e.code, e.state, e.message),
        mysql_async::Error::Io(e) => DriverError::connection_lost(e.to_string()),
        mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed) => {
            DriverError::connection_lost("connection closed")
        }
        mysql_async::Error::Driver(mysql_async::DriverError::PoolDisconnected) => {
            DriverError::pool_closed()
        }
        other => DriverError::new(codes::UNKNOWN, other.to_string()),
    }
}

fn to_mysql_value(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        SqlValue::Int(n) => mysql_async::Value::Int(*n),
        SqlValue::UInt(n) => mysql_async::Value::UInt(*n),
        SqlValue::Float(f) => mysql_async::Value::Double(*f),
        SqlValue::Text(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => mysql_async::Value::Bytes(b.clone()),
        SqlValue::DateTime(at) => {
            let naive = at.naive_utc();
            mysql_async::Value::Date(
                u16::try_from(naive.year()).unwrap_or(0),
                naive.month() as u8,
                naive.day() as u8,
                naive.hour() as u8,
                naive.minute() as u8,
                naive.second() as u8,
                naive.nanosecond() / 1000,
            )
        }
    }
}

fn from_mysql_value(value: mysql_async::Value) -> SqlValue {
    match value {
        mysql_async::Value::NULL => SqlValue::Null,
        mysql_async::Value::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => SqlValue::Text(s),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(n) => SqlValue::Int(n),
        mysql_async::Value::UInt(n) => SqlValue::UInt(n),
        mysql_async::Value::Float(f) => SqlValue::Float(f64::from(f)),
        mysql_async::Value::Double(d) => SqlValue::Float(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|d| {
                    d.and_hms_micro_opt(u32::from(hour), u32::from(min), u32::from(sec), micro)
                })
                .map_or(SqlValue::Null, |dt| SqlValue::DateTime(dt.and_utc()))
        }
        mysql_async::Value::Time(neg, days, hour, min, sec, _micro) => {
            let hours = u64::from(days) * 24 + u64::from(hour);
            let sign = if neg { "-" } else { "" };
            SqlValue::Text(format!("{sign}{hours:02}:{min:02}:{sec:02}"))
        }
    }
}

fn column_list(row: &mysql_async::Row) -> Arc<[Column]> {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(index, c)| Column {
            name: c.name_str().into_owned(),
            index,
            type_name: format!("{:?}", c.column_type()),
            nullable: !c
                .flags()
                .contains(mysql_async::consts::ColumnFlags::NOT_NULL_FLAG),
        })
        .collect::<Vec<_>>()
        .into()
}

fn convert_row(columns: Arc<[Column]>, row: mysql_async::Row) -> Row {
    let values = (0..row.len())
        .map(|i| {
            row.get::<mysql_async::Value, _>(i)
                .map_or(SqlValue::Null, from_mysql_value)
        })
        .collect();
    Row::new(columns, values)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    #[test]
    fn test_session_statements_survive_pool_reset() {
        let config = PoolConfig::new().charset("utf8mb4").timezone("Z");
        let opts = build_opts(&config);

        // setup statements rerun after every reset; init ones only on connect
        let setup = opts.setup();
        assert!(setup.iter().any(|s| *s == "SET NAMES utf8mb4"));
        assert!(setup.iter().any(|s| *s == "SET time_zone = '+00:00'"));
        assert!(opts.init().is_empty());
    }

    #[test]
    fn test_tls_forwards_ca_path() {
        let mut tls = TlsConfig::default();
        assert!(ssl_opts(&tls).root_certs().is_empty());

        tls.ca_path = Some(PathBuf::from("/etc/mysql/ca.pem"));
        tls.reject_unauthorized = false;
        let ssl = ssl_opts(&tls);
        assert_eq!(ssl.root_certs().len(), 1);
        assert!(ssl.accept_invalid_certs());

        let opts = build_opts(&PoolConfig::new().ssl(tls));
        assert_eq!(opts.ssl_opts().map(|s| s.root_certs().len()), Some(1));
    }

    #[test]
    fn test_connection_closed_mapping() {
        let err = map_error(mysql_async::Error::Driver(
            mysql_async::DriverError::ConnectionClosed,
        ));
        assert_eq!(err.code(), codes::PROTOCOL_CONNECTION_LOST);

        let err = map_error(mysql_async::Error::Driver(
            mysql_async::DriverError::PoolDisconnected,
        ));
        assert_eq!(err.code(), codes::POOL_CLOSED);
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(to_mysql_value(&SqlValue::Bool(true)), mysql_async::Value::Int(1));
        assert_eq!(
            to_mysql_value(&SqlValue::Text("abc".into())),
            mysql_async::Value::Bytes(b"abc".to_vec())
        );

        let at = Utc.with_ymd_and_hms(2024, 2, 29, 13, 14, 15).unwrap();
        assert_eq!(
            to_mysql_value(&SqlValue::DateTime(at)),
            mysql_async::Value::Date(2024, 2, 29, 13, 14, 15, 0)
        );
        assert_eq!(
            from_mysql_value(mysql_async::Value::Date(2024, 2, 29, 13, 14, 15, 0)),
            SqlValue::DateTime(at)
        );
    }

    #[test]
    fn test_binary_column_stays_bytes() {
        assert_eq!(
            from_mysql_value(mysql_async::Value::Bytes(vec![0xff, 0xfe])),
            SqlValue::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_time_value_as_text() {
        assert_eq!(
            from_mysql_value(mysql_async::Value::Time(true, 1, 2, 3, 4, 0)),
            SqlValue::Text("-26:03:04".into())
        );
    }

    #[test]
    fn test_session_timezone_names() {
        assert_eq!(session_timezone("Z"), "+00:00");
        assert_eq!(session_timezone("local"), "SYSTEM");
        assert_eq!(session_timezone("+02:00"), "+02:00");
    }
}
