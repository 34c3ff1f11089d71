//! Parser for the expression subset the traversal engine produces.
//!
//! ```text
//! expr    := '*' expr | postfix
//! postfix := primary ( '.' ident | '->' ident | '[' '-'? int ']' )*
//! primary := ident | '(' expr ')'
//! ```

use crate::error::{OracleError, OracleResult};

/// Parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr
{
    Symbol(String),
    Deref(Box<Expr>),
    Member(Box<Expr>, String),
    Arrow(Box<Expr>, String),
    Index(Box<Expr>, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token
{
    Ident(String),
    Int(i64),
    Star,
    Dot,
    Arrow,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn tokenize(source: &str) -> OracleResult<Vec<Token>>
{
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '-' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::Arrow);
                } else {
                    tokens.push(Token::Minus);
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                let value = digits
                    .parse()
                    .map_err(|_| OracleError::resolution(source, format!("integer `{digits}` out of range")))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_alphanumeric() || **d == '_' || **d == ':') {
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(OracleError::resolution(source, format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a>
{
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl Parser<'_>
{
    fn peek(&self) -> Option<&Token>
    {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token>
    {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn error(&self, reason: &str) -> OracleError
    {
        OracleError::resolution(self.source, reason)
    }

    fn expect(&mut self, expected: &Token) -> OracleResult<()>
    {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            _ => Err(self.error(&format!("expected {expected:?}"))),
        }
    }

    fn expr(&mut self) -> OracleResult<Expr>
    {
        if self.peek() == Some(&Token::Star) {
            self.position += 1;
            return Ok(Expr::Deref(Box::new(self.expr()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> OracleResult<Expr>
    {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.position += 1;
                    expr = Expr::Member(Box::new(expr), self.ident()?);
                }
                Some(Token::Arrow) => {
                    self.position += 1;
                    expr = Expr::Arrow(Box::new(expr), self.ident()?);
                }
                Some(Token::LBracket) => {
                    self.position += 1;
                    let negative = self.peek() == Some(&Token::Minus);
                    if negative {
                        self.position += 1;
                    }
                    let index = match self.next() {
                        Some(Token::Int(value)) if negative => -value,
                        Some(Token::Int(value)) => value,
                        _ => return Err(self.error("expected an integer index")),
                    };
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), index);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> OracleResult<Expr>
    {
        match self.next() {
            Some(Token::Ident(name)) => Ok(Expr::Symbol(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            _ => Err(self.error("expected a name or `(`")),
        }
    }

    fn ident(&mut self) -> OracleResult<String>
    {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(self.error("expected a field name")),
        }
    }
}

/// Parse `source` into an [`Expr`].
///
/// ## Errors
///
/// - `Resolution`: the text is not in the supported subset
pub fn parse(source: &str) -> OracleResult<Expr>
{
    let mut parser = Parser {
        source,
        tokens: tokenize(source)?,
        position: 0,
    };
    let expr = parser.expr()?;
    if parser.position < parser.tokens.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn symbol(name: &str) -> Box<Expr>
    {
        Box::new(Expr::Symbol(name.to_string()))
    }

    #[test]
    fn test_parse_generated_names()
    {
        assert_eq!(parse("p").unwrap(), Expr::Symbol("p".to_string()));
        assert_eq!(parse("(*p)").unwrap(), Expr::Deref(symbol("p")));
        assert_eq!(
            parse("(*p).next").unwrap(),
            Expr::Member(Box::new(Expr::Deref(symbol("p"))), "next".to_string())
        );
        assert_eq!(parse("q->next").unwrap(), Expr::Arrow(symbol("q"), "next".to_string()));
        assert_eq!(
            parse("grid[1][-2]").unwrap(),
            Expr::Index(Box::new(Expr::Index(symbol("grid"), 1)), -2)
        );
        assert_eq!(
            parse("(*(*p).next)").unwrap(),
            Expr::Deref(Box::new(Expr::Member(Box::new(Expr::Deref(symbol("p"))), "next".to_string())))
        );
    }

    #[test]
    fn test_parse_rejects_garbage()
    {
        assert!(parse("p +").is_err());
        assert!(parse("(p").is_err());
        assert!(parse("a[b]").is_err());
        assert!(parse("").is_err());
    }
}
