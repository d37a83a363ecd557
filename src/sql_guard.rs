// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - SQL Guard
 * Validates and normalizes a query before it may leave the process
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{Query as SqlQuery, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use tracing::debug;

use crate::errors::{QueryError, QueryResult};

/// Write/DDL keywords that disqualify a query outright. Matched on the raw
/// text with word boundaries, before parsing, so a keyword hidden inside a
/// string literal is also rejected. That is deliberately conservative: the
/// guard must never be the component that lets a mutation through.
static WRITE_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE|MERGE|REPLACE|GRANT|REVOKE)\b",
    )
    .expect("write keyword regex is valid")
});

/// Validates candidate queries and produces the normalized text sent to the
/// platform. Purely functional: the same input always yields the same verdict.
#[derive(Debug, Clone, Default)]
pub struct SqlGuard {
    /// Lowercased relation names a query may reference; `None` disables the check
    allowlist: Option<HashSet<String>>,
}

impl SqlGuard {
    pub fn new(allowlist: Option<Vec<String>>) -> Self {
        Self {
            allowlist: allowlist
                .map(|names| names.into_iter().map(|n| n.to_lowercase()).collect()),
        }
    }

    /// Approve a raw query string, returning its normalized form, or reject it
    /// with a reason specific enough for the caller to correct the query.
    pub fn check(&self, raw_sql: &str) -> QueryResult<String> {
        let trimmed = raw_sql.trim();
        if trimmed.is_empty() {
            return Err(QueryError::Validation("query is empty".to_string()));
        }

        if let Some(found) = WRITE_KEYWORD_RE.find(trimmed) {
            return Err(QueryError::Validation(format!(
                "write operation detected: {}",
                found.as_str().to_uppercase()
            )));
        }

        let statements = Parser::parse_sql(&GenericDialect {}, trimmed)
            .map_err(|err| QueryError::Validation(format!("SQL parse error: {}", err)))?;

        if statements.is_empty() {
            return Err(QueryError::Validation("query is empty".to_string()));
        }
        if statements.len() > 1 {
            return Err(QueryError::Validation(
                "multiple statements not permitted".to_string(),
            ));
        }

        let statement = &statements[0];
        let query = match statement {
            Statement::Query(query) => query,
            _ => {
                return Err(QueryError::Validation(
                    "only read-only SELECT statements are permitted".to_string(),
                ))
            }
        };

        if let Some(allowlist) = &self.allowlist {
            let mut cte_names = HashSet::new();
            let mut relations = Vec::new();
            collect_relations(query, &mut cte_names, &mut relations);

            for relation in &relations {
                let full = relation.to_lowercase();
                let leaf = full.rsplit('.').next().unwrap_or(&full).to_string();
                if cte_names.contains(&leaf) {
                    continue;
                }
                if !allowlist.contains(&full) && !allowlist.contains(&leaf) {
                    return Err(QueryError::Validation(format!(
                        "unknown relation referenced: {}",
                        relation
                    )));
                }
            }
        }

        let normalized = statement.to_string();
        debug!(normalized = %normalized, "Query approved by SQL guard");
        Ok(normalized)
    }
}

/// Collect base relation names referenced in FROM/JOIN clauses, including
/// nested subqueries and set operations. CTE aliases are recorded separately
/// so the allowlist does not have to name them.
fn collect_relations(query: &SqlQuery, ctes: &mut HashSet<String>, relations: &mut Vec<String>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            ctes.insert(cte.alias.name.value.to_lowercase());
            collect_relations(&cte.query, ctes, relations);
        }
    }
    collect_from_set_expr(&query.body, ctes, relations);
}

fn collect_from_set_expr(body: &SetExpr, ctes: &mut HashSet<String>, relations: &mut Vec<String>) {
    match body {
        SetExpr::Select(select) => {
            for table in &select.from {
                collect_from_table(table, ctes, relations);
            }
        }
        SetExpr::Query(query) => collect_relations(query, ctes, relations),
        SetExpr::SetOperation { left, right, .. } => {
            collect_from_set_expr(left, ctes, relations);
            collect_from_set_expr(right, ctes, relations);
        }
        _ => {}
    }
}

fn collect_from_table(
    table: &TableWithJoins,
    ctes: &mut HashSet<String>,
    relations: &mut Vec<String>,
) {
    collect_from_factor(&table.relation, ctes, relations);
    for join in &table.joins {
        collect_from_factor(&join.relation, ctes, relations);
    }
}

fn collect_from_factor(
    factor: &TableFactor,
    ctes: &mut HashSet<String>,
    relations: &mut Vec<String>,
) {
    match factor {
        TableFactor::Table { name, .. } => relations.push(name.to_string()),
        TableFactor::Derived { subquery, .. } => collect_relations(subquery, ctes, relations),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_from_table(table_with_joins, ctes, relations),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_guard() -> SqlGuard {
        SqlGuard::new(None)
    }

    #[test]
    fn test_approves_simple_select() {
        let guard = open_guard();
        let normalized = guard.check("SELECT * FROM alerts LIMIT 10").unwrap();
        assert_eq!(normalized, "SELECT * FROM alerts LIMIT 10");
    }

    #[test]
    fn test_rejects_write_keywords_any_case() {
        let guard = open_guard();
        for sql in [
            "DELETE FROM alerts",
            "delete from alerts",
            "  DeLeTe   FROM alerts  ",
            "INSERT INTO alerts VALUES (1)",
            "UPDATE alerts SET x = 1",
            "DROP TABLE alerts",
            "ALTER TABLE alerts ADD COLUMN x INT",
            "CREATE TABLE t (x INT)",
        ] {
            let err = guard.check(sql).unwrap_err();
            match err {
                QueryError::Validation(reason) => {
                    assert!(
                        reason.starts_with("write operation detected"),
                        "unexpected reason for {:?}: {}",
                        sql,
                        reason
                    );
                }
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejects_write_keyword_inside_literal() {
        // Conservative on purpose: literals can smuggle keywords past naive
        // filters downstream, so the guard refuses them up front.
        let guard = open_guard();
        let err = guard
            .check("SELECT * FROM logs WHERE action = 'DELETE'")
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_rejects_multiple_statements() {
        let guard = open_guard();
        let err = guard
            .check("SELECT 1; SELECT 2")
            .unwrap_err();
        match err {
            QueryError::Validation(reason) => {
                assert_eq!(reason, "multiple statements not permitted")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_and_garbage() {
        let guard = open_guard();
        assert!(guard.check("").is_err());
        assert!(guard.check("   \n  ").is_err());
        assert!(guard.check("not even sql").is_err());
    }

    #[test]
    fn test_normalization_round_trips() {
        let guard = open_guard();
        let normalized = guard
            .check("select  id , count(*) from  alerts  group by id")
            .unwrap();
        // Re-checking the normalized text yields the same statement shape
        let again = guard.check(&normalized).unwrap();
        assert_eq!(normalized, again);
    }

    #[test]
    fn test_allowlist_permits_named_relations() {
        let guard = SqlGuard::new(Some(vec!["alerts".to_string(), "panther.rules".to_string()]));
        assert!(guard.check("SELECT * FROM alerts").is_ok());
        assert!(guard.check("SELECT * FROM panther.rules").is_ok());
        // A schema-qualified query leaf may match a bare allowlist entry, but
        // a bare query name never matches a schema-qualified entry
        assert!(guard.check("SELECT * FROM panther.alerts").is_ok());
        assert!(guard.check("SELECT * FROM rules").is_err());
    }

    #[test]
    fn test_allowlist_rejects_unknown_relation() {
        let guard = SqlGuard::new(Some(vec!["alerts".to_string()]));
        let err = guard.check("SELECT * FROM secrets").unwrap_err();
        match err {
            QueryError::Validation(reason) => {
                assert!(reason.contains("unknown relation referenced: secrets"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_allowlist_checks_joins_and_subqueries() {
        let guard = SqlGuard::new(Some(vec!["alerts".to_string()]));
        assert!(guard
            .check("SELECT * FROM alerts a JOIN secrets s ON a.id = s.id")
            .is_err());
        assert!(guard
            .check("SELECT * FROM (SELECT id FROM secrets) sub")
            .is_err());
    }

    #[test]
    fn test_allowlist_exempts_cte_names() {
        let guard = SqlGuard::new(Some(vec!["alerts".to_string()]));
        let sql = "WITH recent AS (SELECT id FROM alerts) SELECT * FROM recent";
        assert!(guard.check(sql).is_ok());
    }

    #[test]
    fn test_deterministic_verdicts() {
        let guard = SqlGuard::new(Some(vec!["alerts".to_string()]));
        let first = guard.check("SELECT id FROM alerts").unwrap();
        let second = guard.check("SELECT id FROM alerts").unwrap();
        assert_eq!(first, second);
    }
}
