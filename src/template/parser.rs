//! Expression parser and template assembly.
//!
//! A template is a sequence of nodes: literal text, actions (pipelines),
//! and `if` blocks whose branches are themselves node sequences. Actions
//! are lexed (`lexer.rs`) and parsed here into a small AST:
//!
//! ```text
//! pipeline := command ('|' command)*
//! command  := term+
//! term     := literal | path | ident | '(' pipeline ')'
//! ```
//!
//! A command whose head is an identifier is a registry function call; a
//! command whose head is a path with arguments is a method call on the
//! value the path prefix resolves to. Function names are resolved against
//! the merged function map at parse time, so a typo surfaces as a
//! compile-deferred error on the rule rather than a per-render failure.

use std::sync::Arc;

use thiserror::Error;

use super::lexer::{Token, lex};
use crate::funcs::FuncMap;

/// Template compile errors; retained on the owning rule.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("unclosed action: missing {0:?}")]
    UnclosedAction(String),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("bad number literal {0:?}")]
    BadNumber(String),

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("unexpected token: {0}")]
    Unexpected(String),

    #[error("function {0:?} not defined")]
    UnknownFunction(String),

    #[error("empty command in action")]
    EmptyCommand,

    #[error("unexpected {0:?} outside an if block")]
    StrayBranch(&'static str),

    #[error("unclosed if block")]
    UnclosedIf,
}

#[derive(Debug, Clone)]
pub(crate) enum Term {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Path(Vec<String>),
    Ident(String),
    Paren(Pipeline),
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    pub cmds: Vec<Command>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If { cond: Pipeline, then_branch: Vec<Node>, else_branch: Vec<Node> },
}

/// A compiled template: the node tree plus the function map it was
/// compiled against.
pub(crate) struct Template {
    pub(super) nodes: Vec<Node>,
    pub(super) funcs: Arc<FuncMap>,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template").field("nodes", &self.nodes).finish_non_exhaustive()
    }
}

impl Template {
    /// Compile `text` with the given delimiters and function map.
    pub(crate) fn parse(
        text: &str,
        delim_left: &str,
        delim_right: &str,
        funcs: Arc<FuncMap>,
    ) -> Result<Template, ParseError> {
        let nodes = parse_nodes(text, delim_left, delim_right, &funcs)?;
        Ok(Template { nodes, funcs })
    }
}

fn parse_nodes(text: &str, dl: &str, dr: &str, funcs: &FuncMap) -> Result<Vec<Node>, ParseError> {
    // An open if block being assembled.
    struct Frame {
        cond: Pipeline,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
        in_else: bool,
    }

    let mut stack: Vec<Frame> = Vec::new();
    let mut out: Vec<Node> = Vec::new();

    fn push(out: &mut Vec<Node>, stack: &mut [Frame], node: Node) {
        match stack.last_mut() {
            Some(frame) if frame.in_else => frame.else_branch.push(node),
            Some(frame) => frame.then_branch.push(node),
            None => out.push(node),
        }
    }

    let mut rest = text;
    loop {
        let (chunk, action) = match rest.find(dl) {
            None => (rest, None),
            Some(idx) => {
                let after = &rest[idx + dl.len()..];
                let end = after.find(dr).ok_or_else(|| ParseError::UnclosedAction(dr.to_string()))?;
                let action = &after[..end];
                let chunk = &rest[..idx];
                rest = &after[end + dr.len()..];
                (chunk, Some(action))
            }
        };

        if !chunk.is_empty() {
            push(&mut out, &mut stack, Node::Text(chunk.to_string()));
        }

        let Some(action) = action else { break };
        let action = action.trim();

        if let Some(cond) = action.strip_prefix("if").filter(|r| r.starts_with(char::is_whitespace)) {
            let cond = parse_pipeline_str(cond, funcs)?;
            stack.push(Frame { cond, then_branch: Vec::new(), else_branch: Vec::new(), in_else: false });
        } else if action == "else" {
            match stack.last_mut() {
                Some(frame) if !frame.in_else => frame.in_else = true,
                _ => return Err(ParseError::StrayBranch("else")),
            }
        } else if action == "end" {
            let frame = stack.pop().ok_or(ParseError::StrayBranch("end"))?;
            push(
                &mut out,
                &mut stack,
                Node::If { cond: frame.cond, then_branch: frame.then_branch, else_branch: frame.else_branch },
            );
        } else {
            let pipeline = parse_pipeline_str(action, funcs)?;
            push(&mut out, &mut stack, Node::Action(pipeline));
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::UnclosedIf);
    }
    Ok(out)
}

fn parse_pipeline_str(src: &str, funcs: &FuncMap) -> Result<Pipeline, ParseError> {
    let toks = lex(src)?;
    let mut cursor = Cursor { toks, pos: 0 };
    let pipeline = parse_pipeline(&mut cursor, funcs)?;
    if let Some(tok) = cursor.peek() {
        return Err(ParseError::Unexpected(format!("{tok:?}")));
    }
    Ok(pipeline)
}

struct Cursor {
    toks: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }
}

fn parse_pipeline(c: &mut Cursor, funcs: &FuncMap) -> Result<Pipeline, ParseError> {
    let mut cmds = vec![parse_command(c, funcs)?];
    while matches!(c.peek(), Some(Token::Pipe)) {
        c.next();
        cmds.push(parse_command(c, funcs)?);
    }
    Ok(Pipeline { cmds })
}

fn parse_command(c: &mut Cursor, funcs: &FuncMap) -> Result<Command, ParseError> {
    let mut terms = Vec::new();

    loop {
        match c.peek() {
            None | Some(Token::Pipe) | Some(Token::RParen) => break,
            Some(Token::LParen) => {
                c.next();
                let inner = parse_pipeline(c, funcs)?;
                match c.next() {
                    Some(Token::RParen) => terms.push(Term::Paren(inner)),
                    _ => return Err(ParseError::Unexpected("missing )".to_string())),
                }
            }
            Some(_) => {
                let term = match c.next() {
                    Some(Token::Int(n)) => Term::Int(n),
                    Some(Token::Float(f)) => Term::Float(f),
                    Some(Token::Str(s)) => Term::Str(s),
                    Some(Token::Bool(b)) => Term::Bool(b),
                    Some(Token::Path(p)) => Term::Path(p),
                    Some(Token::Ident(name)) => {
                        if terms.is_empty() {
                            // Head position: must be a known function.
                            if !funcs.contains_key(&name) {
                                return Err(ParseError::UnknownFunction(name));
                            }
                            Term::Ident(name)
                        } else {
                            return Err(ParseError::Unexpected(format!("identifier {name:?} in argument position")));
                        }
                    }
                    _ => unreachable!("peeked token vanished"),
                };
                terms.push(term);
            }
        }
    }

    if terms.is_empty() {
        return Err(ParseError::EmptyCommand);
    }
    Ok(Command { terms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::default_funcs;

    fn funcs() -> Arc<FuncMap> {
        Arc::new(default_funcs().clone())
    }

    fn parse(text: &str) -> Result<Template, ParseError> {
        Template::parse(text, "<r>", "</r>", funcs())
    }

    #[test]
    fn parses_piped_predicates() {
        let t = parse("<r>le .V 5 | and (gt .E 6) (in .A 15 30) | eq .P `SSE`</r>").unwrap();
        assert_eq!(t.nodes.len(), 1);
        match &t.nodes[0] {
            Node::Action(p) => assert_eq!(p.cmds.len(), 3),
            other => panic!("want action, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_blocks() {
        let t = parse("<r>if eq .A 1</r>true<r>else</r>false<r>end</r>").unwrap();
        match &t.nodes[0] {
            Node::If { then_branch, else_branch, .. } => {
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.len(), 1);
            }
            other => panic!("want if, got {other:?}"),
        }
    }

    #[test]
    fn unknown_function_is_a_parse_error() {
        assert_eq!(parse("<r>frobnicate .A</r>").unwrap_err(), ParseError::UnknownFunction("frobnicate".into()));
    }

    #[test]
    fn unclosed_action_is_a_parse_error() {
        assert!(matches!(parse("<r>eq 1 1"), Err(ParseError::UnclosedAction(_))));
    }

    #[test]
    fn stray_end_is_a_parse_error() {
        assert_eq!(parse("<r>end</r>").unwrap_err(), ParseError::StrayBranch("end"));
        assert_eq!(parse("<r>if eq 1 1</r>x").unwrap_err(), ParseError::UnclosedIf);
    }
}
