//! Scripted in-memory driver.
//!
//! [`MockDriver`] implements the driver traits over a tiny table store that
//! understands the statements the resilience layer and its tests issue:
//!
//! - `CREATE TABLE name (... REFERENCES other ...)`
//! - `DROP TABLE name`, refused while referenced and foreign key checks are on
//! - `INSERT INTO name ...`, storing the bind parameters as the row
//! - `SELECT ... FROM name`, `SELECT COUNT(*) FROM name`, `SELECT 1`
//! - `DELETE FROM name`
//! - `SHOW TABLES`, `SET FOREIGN_KEY_CHECKS=0|1`
//!
//! Anything else succeeds without effect. Failures, panics, delays and
//! connection problems can be scripted per statement prefix, and every
//! dispatched statement is recorded for inspection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use larvitdb_driver::{
    Driver, DriverConnection, DriverPool, PoolConfig, Queryable, RowStream,
};
use larvitdb_types::{Column, DriverError, QueryResult, SqlValue, codes};
use parking_lot::Mutex;

/// A statement the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// Statement text.
    pub sql: String,
    /// Bind parameters as received.
    pub params: Vec<SqlValue>,
    /// Connection id for leased connections, `None` for pool statements.
    pub connection_id: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct MockTable {
    references: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

type Tables = BTreeMap<String, MockTable>;

#[derive(Debug)]
struct ScriptedFailure {
    prefix: String,
    code: String,
    remaining: u32,
}

#[derive(Debug)]
struct MockState {
    database: String,
    tables: Tables,
    foreign_key_checks: bool,
    probe_failures: u32,
    connect_panics: u32,
    pool_panics: u32,
    probes: u32,
    pools_created: u32,
    pools_closed: u32,
    liveness_rows: bool,
    failures: Vec<ScriptedFailure>,
    panics: Vec<String>,
    delays: Vec<(String, Duration)>,
    lease_failures: Vec<String>,
    statements: Vec<ExecutedStatement>,
    next_connection_id: u64,
    next_insert_id: u64,
    leases: u32,
    releases: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            database: "test".to_string(),
            tables: Tables::new(),
            foreign_key_checks: true,
            probe_failures: 0,
            connect_panics: 0,
            pool_panics: 0,
            probes: 0,
            pools_created: 0,
            pools_closed: 0,
            liveness_rows: true,
            failures: Vec::new(),
            panics: Vec::new(),
            delays: Vec::new(),
            lease_failures: Vec::new(),
            statements: Vec::new(),
            next_connection_id: 1,
            next_insert_id: 1,
            leases: 0,
            releases: 0,
        }
    }
}

/// An in-memory [`Driver`] with scriptable behavior.
///
/// Clones share state, so a test keeps one clone for scripting and
/// inspection and hands another to the database handle.
///
/// # Example
///
/// ```rust,ignore
/// let driver = MockDriver::new();
/// driver.fail_probes(2);
/// driver.fail_next("UPDATE", "ER_LOCK_DEADLOCK", 1);
///
/// let db = Db::builder(driver.clone()).build()?;
/// db.query("UPDATE t SET a = 1", ()).await?;
///
/// assert_eq!(driver.probes(), 3);
/// assert_eq!(driver.count("UPDATE"), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create an empty mock database named `test`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the database, which changes the `SHOW TABLES` column name.
    #[must_use]
    pub fn with_database(self, database: impl Into<String>) -> Self {
        self.state.lock().database = database.into();
        self
    }

    /// Make the next `n` probes fail with `ECONNREFUSED`.
    pub fn fail_probes(&self, n: u32) {
        self.state.lock().probe_failures = n;
    }

    /// Make the next `n` connection attempts panic inside the driver.
    pub fn panic_on_connect(&self, n: u32) {
        self.state.lock().connect_panics = n;
    }

    /// Make the next `n` pool creations panic inside the driver.
    pub fn panic_on_pool_creation(&self, n: u32) {
        self.state.lock().pool_panics = n;
    }

    /// Fail the next `times` statements starting with `prefix` with `code`.
    pub fn fail_next(&self, prefix: &str, code: &str, times: u32) {
        self.state.lock().failures.push(ScriptedFailure {
            prefix: prefix.to_string(),
            code: code.to_string(),
            remaining: times,
        });
    }

    /// Fail every statement starting with `prefix` with `code`.
    pub fn fail_always(&self, prefix: &str, code: &str) {
        self.fail_next(prefix, code, u32::MAX);
    }

    /// Make the liveness check `SELECT 1` return no rows.
    pub fn empty_liveness(&self) {
        self.state.lock().liveness_rows = false;
    }

    /// Panic while executing statements starting with `prefix`.
    pub fn panic_on(&self, prefix: &str) {
        self.state.lock().panics.push(prefix.to_string());
    }

    /// Take `delay` to answer statements starting with `prefix`.
    pub fn delay(&self, prefix: &str, delay: Duration) {
        self.state.lock().delays.push((prefix.to_string(), delay));
    }

    /// Make the next lease fail with `code`.
    pub fn fail_lease(&self, code: &str) {
        self.state.lock().lease_failures.push(code.to_string());
    }

    /// Create a table directly, without a statement.
    pub fn create_table(&self, name: &str, references: &[&str]) {
        self.state.lock().tables.insert(
            name.to_string(),
            MockTable {
                references: references.iter().map(ToString::to_string).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Names of existing tables, sorted.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.state.lock().tables.keys().cloned().collect()
    }

    /// Rows stored in `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Current foreign key check setting.
    #[must_use]
    pub fn foreign_key_checks(&self) -> bool {
        self.state.lock().foreign_key_checks
    }

    /// Number of probe connections attempted.
    #[must_use]
    pub fn probes(&self) -> u32 {
        self.state.lock().probes
    }

    /// Number of pools created.
    #[must_use]
    pub fn pools_created(&self) -> u32 {
        self.state.lock().pools_created
    }

    /// Number of pools closed.
    #[must_use]
    pub fn pools_closed(&self) -> u32 {
        self.state.lock().pools_closed
    }

    /// Number of successful leases.
    #[must_use]
    pub fn leases(&self) -> u32 {
        self.state.lock().leases
    }

    /// Number of released connections.
    #[must_use]
    pub fn releases(&self) -> u32 {
        self.state.lock().releases
    }

    /// Every statement received, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.state.lock().statements.clone()
    }

    /// Number of statements received that start with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .statements
            .iter()
            .filter(|s| has_prefix(&s.sql, prefix))
            .count()
    }

    #[allow(clippy::panic)]
    async fn dispatch(
        &self,
        sql: &str,
        params: &[SqlValue],
        connection_id: Option<u64>,
    ) -> Result<QueryResult, DriverError> {
        let (delay, failure, panics) = {
            let mut state = self.state.lock();
            state.statements.push(ExecutedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
                connection_id,
            });

            let delay = state
                .delays
                .iter()
                .find(|(prefix, _)| has_prefix(sql, prefix))
                .map(|(_, d)| *d);
            let panics = state.panics.iter().any(|prefix| has_prefix(sql, prefix));
            let failure = state
                .failures
                .iter_mut()
                .find(|f| f.remaining > 0 && has_prefix(sql, &f.prefix))
                .map(|f| {
                    f.remaining = f.remaining.saturating_sub(1);
                    DriverError::new(f.code.clone(), format!("scripted {} for {sql}", f.code))
                });
            (delay, failure, panics)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("mock driver panicked on {sql}");
        }
        if let Some(err) = failure {
            return Err(err);
        }

        apply(&mut self.state.lock(), sql, params)
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Pool = MockPool;

    #[allow(clippy::panic)]
    async fn probe(&self, _config: &PoolConfig) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.probes += 1;
        if state.connect_panics > 0 {
            state.connect_panics -= 1;
            drop(state);
            panic!("mock driver panicked while connecting");
        }
        if state.probe_failures > 0 {
            state.probe_failures -= 1;
            return Err(DriverError::new(codes::ECONNREFUSED, "connect ECONNREFUSED"));
        }
        Ok(())
    }

    #[allow(clippy::panic)]
    async fn create_pool(&self, _config: &PoolConfig) -> Result<MockPool, DriverError> {
        {
            let mut state = self.state.lock();
            if state.pool_panics > 0 {
                state.pool_panics -= 1;
                drop(state);
                panic!("mock driver panicked while creating a pool");
            }
            state.pools_created += 1;
        }
        Ok(MockPool {
            driver: self.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Pool handed out by [`MockDriver`].
#[derive(Debug, Clone)]
pub struct MockPool {
    driver: MockDriver,
    closed: Arc<AtomicBool>,
}

impl MockPool {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::pool_closed());
        }
        Ok(())
    }
}

#[async_trait]
impl DriverPool for MockPool {
    type Connection = MockConnection;

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError> {
        self.check_open()?;
        self.driver.dispatch(sql, params, None).await
    }

    async fn lease(&self) -> Result<MockConnection, DriverError> {
        self.check_open()?;
        let mut state = self.driver.state.lock();
        if !state.lease_failures.is_empty() {
            let code = state.lease_failures.remove(0);
            return Err(DriverError::new(code, "scripted lease failure"));
        }
        let id = state.next_connection_id;
        state.next_connection_id += 1;
        state.leases += 1;

        Ok(MockConnection {
            driver: self.driver.clone(),
            id,
            snapshot: None,
        })
    }

    async fn stream(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream, DriverError> {
        self.check_open()?;
        let result = self.driver.dispatch(sql, params, None).await?;

        let (tx, stream) = RowStream::channel(1);
        tokio::spawn(async move {
            for row in result.rows {
                if !tx.send_row(row).await {
                    break;
                }
            }
        });
        Ok(stream)
    }

    async fn close(&self) -> Result<(), DriverError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.driver.state.lock().pools_closed += 1;
        }
        Ok(())
    }
}

/// Connection leased from a [`MockPool`].
#[derive(Debug)]
pub struct MockConnection {
    driver: MockDriver,
    id: u64,
    snapshot: Option<Tables>,
}

#[async_trait]
impl Queryable for MockConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, DriverError> {
        self.driver.dispatch(sql, params, Some(self.id)).await
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn begin_transaction(&mut self) -> Result<(), DriverError> {
        self.driver.dispatch("START TRANSACTION", &[], Some(self.id)).await?;
        self.snapshot = Some(self.driver.state.lock().tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.driver.dispatch("COMMIT", &[], Some(self.id)).await?;
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.driver.dispatch("ROLLBACK", &[], Some(self.id)).await?;
        if let Some(snapshot) = self.snapshot.take() {
            self.driver.state.lock().tables = snapshot;
        }
        Ok(())
    }

    async fn release(self) -> Result<(), DriverError> {
        self.driver.state.lock().releases += 1;
        Ok(())
    }
}

fn has_prefix(sql: &str, prefix: &str) -> bool {
    let sql = sql.trim_start();
    sql.len() >= prefix.len()
        && sql.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// The identifier following `keyword`, without quoting.
fn identifier_after(sql: &str, keyword: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let start = upper.find(keyword)? + keyword.len();
    let name: String = sql[start..]
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, '(' | ';' | ','))
        .collect();
    let name = name.trim_matches('`').replace("``", "`");
    (!name.is_empty()).then_some(name)
}

fn references(sql: &str) -> Vec<String> {
    let upper = sql.to_ascii_uppercase();
    upper
        .match_indices("REFERENCES")
        .filter_map(|(i, _)| identifier_after(&sql[i..], "REFERENCES"))
        .collect()
}

fn no_such_table(state: &MockState, table: &str) -> DriverError {
    DriverError::new(
        codes::ER_NO_SUCH_TABLE,
        format!("Table '{}.{table}' doesn't exist", state.database),
    )
}

fn apply(
    state: &mut MockState,
    sql: &str,
    params: &[SqlValue],
) -> Result<QueryResult, DriverError> {
    let statement = sql.trim().trim_end_matches(';').trim();

    if has_prefix(statement, "SET FOREIGN_KEY_CHECKS") {
        let value = statement.rsplit('=').next().unwrap_or_default().trim();
        state.foreign_key_checks = value != "0";
        return Ok(QueryResult::default());
    }

    if statement.eq_ignore_ascii_case("SELECT 1") {
        let rows = if state.liveness_rows {
            vec![vec![SqlValue::Int(1)]]
        } else {
            Vec::new()
        };
        return Ok(QueryResult::from_rows(vec![Column::new("1", 0)], rows));
    }

    if has_prefix(statement, "SHOW TABLES") {
        let column = Column::new(format!("Tables_in_{}", state.database), 0);
        let rows = state
            .tables
            .keys()
            .map(|name| vec![SqlValue::Text(name.clone())])
            .collect();
        return Ok(QueryResult::from_rows(vec![column], rows));
    }

    if has_prefix(statement, "CREATE TABLE") {
        let name = identifier_after(statement, "TABLE").unwrap_or_default();
        if state.tables.contains_key(&name) {
            return Err(DriverError::new(
                codes::ER_TABLE_EXISTS_ERROR,
                format!("Table '{name}' already exists"),
            ));
        }
        let table = MockTable {
            references: references(statement),
            rows: Vec::new(),
        };
        state.tables.insert(name, table);
        return Ok(QueryResult::default());
    }

    if has_prefix(statement, "DROP TABLE") {
        let name = identifier_after(statement, "TABLE").unwrap_or_default();
        if !state.tables.contains_key(&name) {
            return Err(no_such_table(state, &name));
        }
        let referenced = state
            .tables
            .iter()
            .any(|(other, t)| other != &name && t.references.contains(&name));
        if referenced && state.foreign_key_checks {
            return Err(DriverError::new(
                codes::ER_ROW_IS_REFERENCED_2,
                format!("Cannot drop table '{name}' referenced by a foreign key constraint"),
            ));
        }
        state.tables.remove(&name);
        return Ok(QueryResult::default());
    }

    if has_prefix(statement, "INSERT INTO") {
        let name = identifier_after(statement, "INTO").unwrap_or_default();
        let id = state.next_insert_id;
        let Some(table) = state.tables.get_mut(&name) else {
            return Err(no_such_table(state, &name));
        };
        table.rows.push(params.to_vec());
        state.next_insert_id += 1;

        let mut result = QueryResult::affected(1);
        result.last_insert_id = Some(id);
        return Ok(result);
    }

    if has_prefix(statement, "DELETE FROM") {
        let name = identifier_after(statement, "FROM").unwrap_or_default();
        let Some(table) = state.tables.get_mut(&name) else {
            return Err(no_such_table(state, &name));
        };
        let removed = table.rows.len() as u64;
        table.rows.clear();
        return Ok(QueryResult::affected(removed));
    }

    if has_prefix(statement, "SELECT") {
        let Some(name) = identifier_after(statement, " FROM ") else {
            return Ok(QueryResult::default());
        };
        let Some(table) = state.tables.get(&name) else {
            return Err(no_such_table(state, &name));
        };

        if statement.to_ascii_uppercase().contains("COUNT(*)") {
            let count = i64::try_from(table.rows.len()).unwrap_or(i64::MAX);
            return Ok(QueryResult::from_rows(
                vec![Column::new("count", 0)],
                vec![vec![SqlValue::Int(count)]],
            ));
        }

        let width = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        let fields = (0..width).map(|i| Column::new(format!("c{i}"), i)).collect();
        return Ok(QueryResult::from_rows(fields, table.rows.clone()));
    }

    Ok(QueryResult::default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn run(state: &mut MockState, sql: &str) -> Result<QueryResult, DriverError> {
        apply(state, sql, &[])
    }

    #[test]
    fn test_identifier_after() {
        assert_eq!(identifier_after("DROP TABLE `foo`;", "TABLE").as_deref(), Some("foo"));
        assert_eq!(
            identifier_after("CREATE TABLE bar (id INT)", "TABLE").as_deref(),
            Some("bar")
        );
        assert_eq!(
            identifier_after("select * from users where a = 1", " FROM ").as_deref(),
            Some("users")
        );
        assert_eq!(identifier_after("SELECT 2", " FROM "), None);
    }

    #[test]
    fn test_references_parsed() {
        assert_eq!(
            references("CREATE TABLE bar (foo_id INT, FOREIGN KEY (foo_id) REFERENCES `foo` (id))"),
            vec!["foo".to_string()]
        );
    }

    #[test]
    fn test_drop_referenced_table_needs_checks_off() {
        let mut state = MockState::default();
        run(&mut state, "CREATE TABLE foo (id INT)").unwrap();
        run(&mut state, "CREATE TABLE bar (foo_id INT REFERENCES foo(id))").unwrap();

        let err = run(&mut state, "DROP TABLE `foo`;").unwrap_err();
        assert_eq!(err.code(), codes::ER_ROW_IS_REFERENCED_2);

        run(&mut state, "SET FOREIGN_KEY_CHECKS=0;").unwrap();
        run(&mut state, "DROP TABLE `foo`;").unwrap();
        assert!(!state.tables.contains_key("foo"));
    }

    #[test]
    fn test_insert_select_count() {
        let mut state = MockState::default();
        run(&mut state, "CREATE TABLE t (a INT)").unwrap();
        let result = apply(&mut state, "INSERT INTO t VALUES (?)", &[SqlValue::Int(5)]).unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.last_insert_id, Some(1));

        let result = run(&mut state, "SELECT * FROM t").unwrap();
        assert_eq!(result.rows[0].get(0), Some(&SqlValue::Int(5)));

        let result = run(&mut state, "SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(result.rows[0].get(0), Some(&SqlValue::Int(1)));
    }

    #[test]
    fn test_show_tables_column_named_after_database() {
        let mut state = MockState::default();
        run(&mut state, "CREATE TABLE t (a INT)").unwrap();
        let result = run(&mut state, "SHOW TABLES").unwrap();
        assert_eq!(result.fields[0].name, "Tables_in_test");
        assert_eq!(result.rows[0].get(0), Some(&SqlValue::Text("t".into())));
    }

    #[test]
    fn test_unknown_table() {
        let mut state = MockState::default();
        let err = run(&mut state, "SELECT * FROM missing").unwrap_err();
        assert_eq!(err.code(), codes::ER_NO_SUCH_TABLE);
    }
}
