//! Row representation for query results.

use std::sync::Arc;

use crate::value::SqlValue;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column index.
    pub index: usize,
    /// Driver-reported type name.
    pub type_name: String,
    /// Whether the column is nullable.
    pub nullable: bool,
}

impl Column {
    /// Create column metadata with an unknown type.
    #[must_use]
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            type_name: String::new(),
            nullable: true,
        }
    }
}

/// A row from a query result.
///
/// Rows of one result share their column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a new row from columns and values.
    #[must_use]
    pub fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get a value by column name (ASCII case-insensitive).
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    /// Get the number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Borrow all values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Iterate over (column, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Column, &SqlValue)> {
        self.columns.iter().zip(self.values.iter())
    }
}

impl IntoIterator for Row {
    type Item = SqlValue;
    type IntoIter = std::vec::IntoIter<SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a SqlValue;
    type IntoIter = std::slice::Iter<'a, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Everything a statement produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Returned rows, empty for statements that return none.
    pub rows: Vec<Row>,
    /// Column metadata of the result set.
    pub fields: Vec<Column>,
    /// Rows changed by a data-modifying statement.
    pub affected_rows: u64,
    /// Auto-increment id generated by an `INSERT`, if any.
    pub last_insert_id: Option<u64>,
}

impl QueryResult {
    /// Build a result from a column list and row values.
    #[must_use]
    pub fn from_rows(fields: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns: Arc<[Column]> = fields.clone().into();
        Self {
            rows: rows
                .into_iter()
                .map(|values| Row::new(Arc::clone(&columns), values))
                .collect(),
            fields,
            affected_rows: 0,
            last_insert_id: None,
        }
    }

    /// A result carrying only an affected-row count.
    #[must_use]
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    /// First row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Number of returned rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::from_rows(
            vec![Column::new("id", 0), Column::new("Name", 1)],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("foo".into())],
                vec![SqlValue::Int(2), SqlValue::Text("bar".into())],
            ],
        )
    }

    #[test]
    fn test_get_by_name_case_insensitive() {
        let result = sample();
        let row = result.first().unwrap();
        assert_eq!(row.get_by_name("name"), Some(&SqlValue::Text("foo".into())));
        assert_eq!(row.get_by_name("ID"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_rows_share_columns() {
        let result = sample();
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[1].columns()[1].name, "Name");
        assert_eq!(result.rows[1].get(0), Some(&SqlValue::Int(2)));
    }

    #[test]
    fn test_affected_only() {
        let result = QueryResult::affected(3);
        assert!(result.is_empty());
        assert_eq!(result.affected_rows, 3);
    }
}
