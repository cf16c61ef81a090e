//! Dropping every table in the database.

use larvitdb_driver::Driver;
use larvitdb_types::{Row, SqlValue};

use crate::connection::Connection;
use crate::error::Result;

/// Drop all tables visible to `conn`, returning how many were dropped.
///
/// Stops at the first failing statement. The caller releases the connection.
pub(crate) async fn drop_all_tables<D: Driver>(conn: &mut Connection<D>) -> Result<usize> {
    conn.query("SET FOREIGN_KEY_CHECKS=0;", ()).await?;

    let tables: Vec<String> = conn
        .query("SHOW TABLES", ())
        .await?
        .rows
        .iter()
        .filter_map(table_name)
        .collect();

    for table in &tables {
        conn.query(&format!("DROP TABLE {};", quote_identifier(table)), ())
            .await?;
    }

    conn.query("SET FOREIGN_KEY_CHECKS=1;", ()).await?;
    Ok(tables.len())
}

/// `SHOW TABLES` returns one column, named after the database.
fn table_name(row: &Row) -> Option<String> {
    match row.get(0)? {
        SqlValue::Text(name) => Some(name.clone()),
        SqlValue::Bytes(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// Quote an identifier with backticks.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use larvitdb_types::Column;

    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_identifier("order"), "`order`");
    }

    #[test]
    fn test_table_name_from_first_column() {
        let columns: Arc<[Column]> = vec![Column::new("Tables_in_test", 0)].into();

        let row = Row::new(Arc::clone(&columns), vec![SqlValue::Text("foo".into())]);
        assert_eq!(table_name(&row).as_deref(), Some("foo"));

        let row = Row::new(Arc::clone(&columns), vec![SqlValue::Bytes(b"bar".to_vec())]);
        assert_eq!(table_name(&row).as_deref(), Some("bar"));

        let row = Row::new(columns, vec![SqlValue::Null]);
        assert_eq!(table_name(&row), None);
    }
}
