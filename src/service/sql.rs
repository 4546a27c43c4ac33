//! Parser for the SQL subset spoken to the system index
//!
//! ```text
//! SELECT col[, col]* FROM catalog [WHERE expr]
//! expr    := and_expr (OR and_expr)*
//! and_expr:= primary (AND primary)*
//! primary := '(' expr ')'
//!          | SCOPE '=' 'string' | SCOPE '<>' 'string'
//!          | CONTAINS '(' 'string' ')'
//!          | REUSEWHERE '(' number ')'
//! ```
//!
//! String literals have no escape syntax.

use crate::error::{ServiceError, ServiceResult};

/// Parsed `SELECT` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    pub columns: Vec<String>,
    pub catalog: String,
    pub predicate: Option<Predicate>,
}

/// WHERE clause tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `SCOPE='url'` or `SCOPE <> 'url'`
    Scope { url: String, negated: bool },
    /// `CONTAINS('text')`
    Contains(String),
    /// `REUSEWHERE(id)`
    ReuseWhere(u32),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Reuse id that constrains the whole predicate, if any.
    /// Only a REUSEWHERE reachable through ANDs from the root counts.
    pub fn reuse_where(&self) -> Option<u32> {
        match self {
            Predicate::ReuseWhere(id) => Some(*id),
            Predicate::And(terms) => terms.iter().find_map(Predicate::reuse_where),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Number(u64),
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Star,
}

/// Parse a statement
pub fn parse_select(sql: &str) -> ServiceResult<SelectStatement> {
    let tokens = tokenize(sql)?;
    let mut parser = SqlParser {
        tokens,
        pos: 0,
        len: sql.len(),
    };
    parser.statement()
}

fn syntax(offset: usize, message: impl Into<String>) -> ServiceError {
    ServiceError::Syntax {
        offset,
        message: message.into(),
    }
}

fn tokenize(sql: &str) -> ServiceResult<Vec<(usize, Token)>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'(' => {
                tokens.push((pos, Token::LParen));
                pos += 1;
            }
            b')' => {
                tokens.push((pos, Token::RParen));
                pos += 1;
            }
            b',' => {
                tokens.push((pos, Token::Comma));
                pos += 1;
            }
            b'*' => {
                tokens.push((pos, Token::Star));
                pos += 1;
            }
            b'=' => {
                tokens.push((pos, Token::Eq));
                pos += 1;
            }
            b'<' if bytes.get(pos + 1) == Some(&b'>') => {
                tokens.push((pos, Token::NotEq));
                pos += 2;
            }
            b'\'' => {
                let start = pos + 1;
                let end = sql[start..]
                    .find('\'')
                    .map(|i| start + i)
                    .ok_or_else(|| syntax(pos, "unterminated string literal"))?;
                tokens.push((pos, Token::Str(sql[start..end].to_string())));
                pos = end + 1;
            }
            b'0'..=b'9' => {
                let start = pos;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                let n = sql[start..pos]
                    .parse()
                    .map_err(|_| syntax(start, "number out of range"))?;
                tokens.push((start, Token::Number(n)));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'.')
                {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(sql[start..pos].to_string())));
            }
            _ => return Err(syntax(pos, format!("unexpected character '{}'", sql[pos..].chars().next().unwrap_or('?')))),
        }
    }

    Ok(tokens)
}

struct SqlParser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl SqlParser {
    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.len)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> ServiceResult<()> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(self.offset(), format!("expected {}", keyword)))
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> ServiceResult<()> {
        let offset = self.offset();
        match self.bump() {
            Some(t) if t == expected => Ok(()),
            _ => Err(syntax(offset, format!("expected {}", what))),
        }
    }

    fn string(&mut self) -> ServiceResult<String> {
        let offset = self.offset();
        match self.bump() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(syntax(offset, "expected string literal")),
        }
    }

    fn statement(&mut self) -> ServiceResult<SelectStatement> {
        self.keyword("SELECT")?;

        let mut columns = Vec::new();
        loop {
            let offset = self.offset();
            match self.bump() {
                Some(Token::Ident(name)) => columns.push(name),
                Some(Token::Star) => columns.push("*".to_string()),
                _ => return Err(syntax(offset, "expected column name")),
            }
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }

        self.keyword("FROM")?;
        let offset = self.offset();
        let catalog = match self.bump() {
            Some(Token::Ident(name)) => name,
            _ => return Err(syntax(offset, "expected catalog name")),
        };

        let predicate = if self.peek_keyword("WHERE") {
            self.pos += 1;
            Some(self.or_expr()?)
        } else {
            None
        };

        if self.peek().is_some() {
            return Err(syntax(self.offset(), "unexpected trailing input"));
        }

        Ok(SelectStatement {
            columns,
            catalog,
            predicate,
        })
    }

    fn or_expr(&mut self) -> ServiceResult<Predicate> {
        let mut terms = vec![self.and_expr()?];
        while self.peek_keyword("OR") {
            self.pos += 1;
            terms.push(self.and_expr()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::Or(terms)
        })
    }

    fn and_expr(&mut self) -> ServiceResult<Predicate> {
        let mut terms = vec![self.primary()?];
        while self.peek_keyword("AND") {
            self.pos += 1;
            terms.push(self.primary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::And(terms)
        })
    }

    fn primary(&mut self) -> ServiceResult<Predicate> {
        let offset = self.offset();
        match self.bump() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("SCOPE") => {
                let offset = self.offset();
                let negated = match self.bump() {
                    Some(Token::Eq) => false,
                    Some(Token::NotEq) => true,
                    _ => return Err(syntax(offset, "expected '=' or '<>' after SCOPE")),
                };
                let url = self.string()?;
                Ok(Predicate::Scope { url, negated })
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("CONTAINS") => {
                self.expect(Token::LParen, "'('")?;
                let text = self.string()?;
                self.expect(Token::RParen, "')'")?;
                Ok(Predicate::Contains(text))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("REUSEWHERE") => {
                self.expect(Token::LParen, "'('")?;
                let offset = self.offset();
                let id = match self.bump() {
                    Some(Token::Number(n)) => {
                        u32::try_from(n).map_err(|_| syntax(offset, "reuse id out of range"))?
                    }
                    _ => return Err(syntax(offset, "expected reuse id")),
                };
                self.expect(Token::RParen, "')'")?;
                Ok(Predicate::ReuseWhere(id))
            }
            _ => Err(syntax(offset, "expected predicate")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priming_statement() {
        let stmt = parse_select(
            "SELECT System.ItemUrl FROM SystemIndex WHERE ( SCOPE='file:C:/a' OR SCOPE='file:C:/b') AND SCOPE <> 'file:C:/a/tmp'",
        )
        .unwrap();

        assert_eq!(stmt.columns, vec!["System.ItemUrl"]);
        assert_eq!(stmt.catalog, "SystemIndex");
        assert_eq!(
            stmt.predicate,
            Some(Predicate::And(vec![
                Predicate::Or(vec![
                    Predicate::Scope { url: "file:C:/a".into(), negated: false },
                    Predicate::Scope { url: "file:C:/b".into(), negated: false },
                ]),
                Predicate::Scope { url: "file:C:/a/tmp".into(), negated: true },
            ]))
        );
    }

    #[test]
    fn test_derived_statement_reuse_id() {
        let stmt = parse_select(
            "SELECT System.ItemUrl FROM SystemIndex WHERE ( SCOPE='file:/x') AND CONTAINS('report') AND REUSEWHERE(7)",
        )
        .unwrap();
        let predicate = stmt.predicate.unwrap();

        assert_eq!(predicate.reuse_where(), Some(7));
        match predicate {
            Predicate::And(terms) => {
                assert_eq!(terms.len(), 3);
                assert_eq!(terms[1], Predicate::Contains("report".into()));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_reuse_under_or_does_not_constrain() {
        let stmt = parse_select("SELECT a FROM b WHERE SCOPE='file:' OR REUSEWHERE(3)").unwrap();
        assert_eq!(stmt.predicate.unwrap().reuse_where(), None);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let stmt = parse_select("select a, b from SystemIndex where scope='file:'").unwrap();
        assert_eq!(stmt.columns, vec!["a", "b"]);
        assert!(stmt.predicate.is_some());
    }

    #[test]
    fn test_quote_in_path_is_syntax_error() {
        let err = parse_select("SELECT a FROM b WHERE SCOPE='file:C:/it's'").unwrap_err();
        assert!(matches!(err, ServiceError::Syntax { .. }));
    }

    #[test]
    fn test_dangling_where() {
        assert!(parse_select("SELECT a FROM b WHERE").is_err());
        assert!(parse_select("SELECT a FROM b WHERE AND CONTAINS('x')").is_err());
    }

    #[test]
    fn test_no_where() {
        let stmt = parse_select("SELECT * FROM SystemIndex").unwrap();
        assert_eq!(stmt.columns, vec!["*"]);
        assert_eq!(stmt.predicate, None);
    }

    #[test]
    fn test_garbage_does_not_panic() {
        for input in ["", "'", "SELECT", "SELECT a FROM", "SELECT a FROM b WHERE (", "€", "REUSEWHERE(99999999999)"] {
            let _ = parse_select(input);
        }
    }
}
