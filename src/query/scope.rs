//! Scope filter construction for priming queries

use crate::service::normalize_separators;
use std::fmt;

/// Fixed head of every priming query
pub const BASE_SELECT: &str = "SELECT System.ItemUrl FROM SystemIndex WHERE";

/// Unbounded query used to count everything in the index
pub const COUNT_ALL_SQL: &str = "SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE='file:'";

/// A fully formed query ready for execution. Never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryText(String);

impl QueryText {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Produce a new query with `clause` appended after a single space
    pub fn with_clause(&self, clause: &str) -> QueryText {
        QueryText(format!("{} {}", self.0, clause))
    }
}

impl fmt::Display for QueryText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueryText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Paths to include and exclude, in caller order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeList {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

impl ScopeList {
    pub fn new<I, E, S, T>(included: I, excluded: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            included: included.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }

    pub fn to_query(&self) -> QueryText {
        build_priming_sql(&self.included, &self.excluded)
    }
}

/// Build the scope-only priming query.
///
/// Included paths form one parenthesized OR group, excluded paths follow as
/// `SCOPE <> ...` terms joined by AND. Separators become `/`. Quotes inside
/// paths are not escaped.
pub fn build_priming_sql<S: AsRef<str>>(included: &[S], excluded: &[S]) -> QueryText {
    let mut sql = String::from(BASE_SELECT);

    if included.is_empty() && excluded.is_empty() {
        sql.push_str(" SCOPE='file:'");
        return QueryText(sql);
    }

    for (i, scope) in included.iter().enumerate() {
        if i == 0 {
            sql.push_str(" (");
        }
        sql.push_str(" SCOPE='file:");
        sql.push_str(&normalize_separators(scope.as_ref()));
        sql.push('\'');
        if i + 1 < included.len() {
            sql.push_str(" OR");
        } else {
            sql.push(')');
        }
    }

    for (i, scope) in excluded.iter().enumerate() {
        if i > 0 || !included.is_empty() {
            sql.push_str(" AND");
        }
        sql.push_str(" SCOPE <> 'file:");
        sql.push_str(&normalize_separators(scope.as_ref()));
        sql.push('\'');
    }

    QueryText(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    #[test]
    fn test_single_include() {
        let sql = build_priming_sql(&[r"C:\Users\a\Documents"], &NONE);
        assert_eq!(
            sql.as_str(),
            "SELECT System.ItemUrl FROM SystemIndex WHERE ( SCOPE='file:C:/Users/a/Documents')"
        );
    }

    #[test]
    fn test_two_includes() {
        let sql = build_priming_sql(&[r"C:\Users\a\Documents", r"C:\Users\a\Desktop"], &NONE);
        assert_eq!(
            sql.as_str(),
            "SELECT System.ItemUrl FROM SystemIndex WHERE ( SCOPE='file:C:/Users/a/Documents' OR SCOPE='file:C:/Users/a/Desktop')"
        );
    }

    #[test]
    fn test_or_count_matches_paths() {
        for n in 1..6 {
            let paths: Vec<String> = (0..n).map(|i| format!(r"D:\data\{}", i)).collect();
            let sql = build_priming_sql(&paths, &[]);
            let text = sql.as_str();

            assert_eq!(text.matches(" OR ").count(), n - 1);
            assert_eq!(text.matches("SCOPE='file:").count(), n);
            assert!(text.ends_with(')'));
            assert!(!text.contains('\\'));
        }
    }

    #[test]
    fn test_excludes_keep_order_and_are_normalized() {
        let sql = build_priming_sql(&[r"C:\docs"], &[r"C:\docs\tmp", r"C:\docs\old"]);
        assert_eq!(
            sql.as_str(),
            "SELECT System.ItemUrl FROM SystemIndex WHERE ( SCOPE='file:C:/docs') AND SCOPE <> 'file:C:/docs/tmp' AND SCOPE <> 'file:C:/docs/old'"
        );
    }

    #[test]
    fn test_excludes_without_includes_start_directly() {
        let sql = build_priming_sql(&NONE, &["/a", "/b"]);
        assert_eq!(
            sql.as_str(),
            "SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE <> 'file:/a' AND SCOPE <> 'file:/b'"
        );
    }

    #[test]
    fn test_empty_scopes_select_everything() {
        let sql = build_priming_sql(&NONE, &NONE);
        assert_eq!(sql.as_str(), COUNT_ALL_SQL);
        assert!(ScopeList::default().is_unbounded());
    }

    #[test]
    fn test_with_clause_is_new_value() {
        let base = QueryText::new("SELECT x FROM y WHERE SCOPE='file:'");
        let derived = base.with_clause("AND CONTAINS('z')");
        assert_eq!(base.as_str(), "SELECT x FROM y WHERE SCOPE='file:'");
        assert_eq!(derived.as_str(), "SELECT x FROM y WHERE SCOPE='file:' AND CONTAINS('z')");
    }

    #[test]
    fn test_scope_list_to_query() {
        let scopes = ScopeList::new(["/home/a"], Vec::<String>::new());
        assert_eq!(
            scopes.to_query().as_str(),
            "SELECT System.ItemUrl FROM SystemIndex WHERE ( SCOPE='file:/home/a')"
        );
    }
}
