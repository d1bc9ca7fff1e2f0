//! Hand-rolled reader for the tree-description grammar. Restricted to
//! what a behaviour-tree description needs — parentheses, keywords, and
//! literals — not a general Lisp reader (quoting, macros, arithmetic are
//! out of scope).

use crate::compiler::ast::{Atom, SExpr};
use crate::error::{CompileError, CompileErrorKind};

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

#[derive(Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    Atom(String),
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.char_indices().peekable(), src }
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let &(_, c) = self.chars.peek()?;
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            if c == ';' {
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.chars.next();
                }
                continue;
            }
            break;
        }

        let &(start, c) = self.chars.peek()?;
        if c == '(' {
            self.chars.next();
            return Some(Token::LParen);
        }
        if c == ')' {
            self.chars.next();
            return Some(Token::RParen);
        }
        if c == '"' {
            self.chars.next();
            let str_start = start;
            loop {
                match self.chars.next() {
                    Some((end, '"')) => return Some(Token::Atom(self.src[str_start..=end].to_string())),
                    Some(_) => continue,
                    None => return Some(Token::Atom(self.src[str_start..].to_string())),
                }
            }
        }
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            end = idx + c.len_utf8();
            self.chars.next();
        }
        Some(Token::Atom(self.src[start..end].to_string()))
    }
}

fn parse_atom(text: &str) -> Result<Atom, CompileError> {
    if text.starts_with('"') {
        let inner = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')).ok_or_else(|| {
            CompileError::new(CompileErrorKind::Syntax, format!("unterminated string literal: {text}"))
        })?;
        return Ok(Atom::Text(inner.to_string()));
    }
    if let Some(rest) = text.strip_prefix(':') {
        return Ok(Atom::Keyword(rest.to_string()));
    }
    match text {
        "nil" => return Ok(Atom::Nil),
        "true" => return Ok(Atom::Bool(true)),
        "false" => return Ok(Atom::Bool(false)),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Atom::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Ok(Atom::Float(f));
    }
    Ok(Atom::Symbol(text.to_string()))
}

/// Parses exactly one top-level tree description.
pub fn parse(src: &str) -> Result<SExpr, CompileError> {
    let mut tok = Tokenizer::new(src);
    let expr = parse_expr(&mut tok, "root")?;
    if tok.next_token().is_some() {
        return Err(CompileError::new(CompileErrorKind::Syntax, "trailing content after top-level expression"));
    }
    Ok(expr)
}

fn parse_expr(tok: &mut Tokenizer, path: &str) -> Result<SExpr, CompileError> {
    match tok.next_token() {
        Some(Token::LParen) => {
            let mut items = Vec::new();
            loop {
                match tok.chars.peek() {
                    None => return Err(CompileError::at(CompileErrorKind::Syntax, path, "unbalanced parentheses")),
                    _ => {}
                }
                // Peek for an immediate close paren without consuming via parse_expr.
                let saved = tok.chars.clone();
                if let Some(Token::RParen) = tok.next_token() {
                    break;
                }
                tok.chars = saved;
                let child_path = format!("{path}[{}]", items.len());
                items.push(parse_expr(tok, &child_path)?);
            }
            if items.is_empty() {
                return Err(CompileError::at(CompileErrorKind::Syntax, path, "empty list"));
            }
            Ok(SExpr::List(items, path.to_string()))
        }
        Some(Token::RParen) => Err(CompileError::at(CompileErrorKind::Syntax, path, "unexpected ')'")),
        Some(Token::Atom(text)) => Ok(SExpr::Atom(parse_atom(&text)?)),
        None => Err(CompileError::at(CompileErrorKind::Syntax, path, "unexpected end of input")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_leaf() {
        let ast = parse("(cond always-true)").unwrap();
        match ast {
            SExpr::List(items, _) => assert_eq!(items.len(), 2),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse("(seq (cond a)").is_err());
    }

    #[test]
    fn parses_keyed_args() {
        let ast = parse(r#"(plan-action :model_service "toy-1d" :work_max 100)"#).unwrap();
        match ast {
            SExpr::List(items, _) => assert_eq!(items.len(), 5),
            _ => panic!("expected list"),
        }
    }
}
