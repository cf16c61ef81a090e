//! Textual statement classification.
//!
//! These are prefix checks on the statement text, not a parse. A statement
//! starting with a comment or an unusual keyword is classified by its literal
//! first characters only.

/// Case-insensitive check of the statement's first keyword, ignoring
/// leading whitespace.
fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let sql = sql.trim_start();
    sql.len() >= keyword.len()
        && sql.as_bytes()[..keyword.len()].eq_ignore_ascii_case(keyword.as_bytes())
}

/// Whether the statement is a `SELECT`.
#[must_use]
pub fn is_select(sql: &str) -> bool {
    starts_with_keyword(sql, "SELECT")
}

/// Whether the statement modifies data.
///
/// Everything except `SELECT` and `SHOW` counts as modifying, DDL included.
#[must_use]
pub fn is_modifying_data(sql: &str) -> bool {
    !(is_select(sql) || starts_with_keyword(sql, "SHOW"))
}

/// Extract the operation type from a SQL statement, for span attributes.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    const OPERATIONS: &[&str] = &[
        "SELECT", "INSERT", "UPDATE", "DELETE", "REPLACE", "SHOW", "SET", "START", "BEGIN",
        "COMMIT", "ROLLBACK", "CREATE", "ALTER", "DROP", "TRUNCATE", "CALL",
    ];

    OPERATIONS
        .iter()
        .find(|op| starts_with_keyword(sql, op))
        .copied()
        .unwrap_or("OTHER")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reads_are_not_modifying() {
        assert!(!is_modifying_data("SELECT * FROM t"));
        assert!(!is_modifying_data("  select 1"));
        assert!(!is_modifying_data("\n\tSeLeCt now()"));
        assert!(!is_modifying_data("SHOW TABLES"));
        assert!(!is_modifying_data("show databases"));
    }

    #[test]
    fn test_everything_else_is_modifying() {
        assert!(is_modifying_data("INSERT INTO t VALUES(1)"));
        assert!(is_modifying_data("UPDATE t SET a = 1"));
        assert!(is_modifying_data("DELETE FROM t"));
        assert!(is_modifying_data("DROP TABLE t"));
        assert!(is_modifying_data("SET FOREIGN_KEY_CHECKS=0;"));
        assert!(is_modifying_data("/* SELECT */ DELETE FROM t"));
        assert!(is_modifying_data(""));
        assert!(is_modifying_data("SEL"));
    }

    #[test]
    fn test_is_select() {
        assert!(is_select(" SELECT 1"));
        assert!(!is_select("SHOW TABLES"));
        assert!(!is_select("WITH x AS (SELECT 1) SELECT * FROM x"));
    }

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM users"), "SELECT");
        assert_eq!(extract_operation("  insert into users VALUES (1)"), "INSERT");
        assert_eq!(extract_operation("SET time_zone = '+00:00'"), "SET");
        assert_eq!(extract_operation("DROP TABLE `foo`"), "DROP");
        assert_eq!(extract_operation("unknown stuff"), "OTHER");
    }

    proptest! {
        #[test]
        fn prop_leading_whitespace_ignored(ws in "[ \t\r\n]{0,8}", rest in "[a-zA-Z0-9 ]{0,20}") {
            let sql = format!("{ws}SELECT {rest}");
            prop_assert!(!is_modifying_data(&sql));
            let sql = format!("{ws}update {rest}");
            prop_assert!(is_modifying_data(&sql));
        }
    }
}
