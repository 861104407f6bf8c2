//! Template rendering.
//!
//! Renders a compiled node tree against a data dictionary. All the dynamic
//! behavior of a rule happens here: path resolution, method dispatch on
//! bound values (field mutation, result-sink emission, scratch access), and
//! registry function calls with pipe threading.
//!
//! Errors never abort a batch; the caller (the ruleset executor) treats a
//! render error as "skip this rule".

use crate::error::EvalError;
use crate::value::{Dict, Value};

use super::parser::{Command, Node, Pipeline, Template, Term};

impl Template {
    /// Render the template against `root`, appending output to `buf`.
    pub(crate) fn render(&self, root: &Dict, buf: &mut String) -> Result<(), EvalError> {
        self.render_nodes(&self.nodes, root, buf)
    }

    fn render_nodes(&self, nodes: &[Node], root: &Dict, buf: &mut String) -> Result<(), EvalError> {
        for node in nodes {
            match node {
                Node::Text(text) => buf.push_str(text),
                Node::Action(pipeline) => {
                    let val = self.eval_pipeline(pipeline, root)?;
                    val.write_to(buf);
                }
                Node::If { cond, then_branch, else_branch } => {
                    let branch = if self.eval_pipeline(cond, root)?.is_true() { then_branch } else { else_branch };
                    self.render_nodes(branch, root, buf)?;
                }
            }
        }
        Ok(())
    }

    fn eval_pipeline(&self, pipeline: &Pipeline, root: &Dict) -> Result<Value, EvalError> {
        let mut piped: Option<Value> = None;
        for cmd in &pipeline.cmds {
            piped = Some(self.eval_command(cmd, root, piped)?);
        }
        // A pipeline has at least one command by construction.
        piped.ok_or_else(|| EvalError::msg("empty pipeline"))
    }

    fn eval_command(&self, cmd: &Command, root: &Dict, piped: Option<Value>) -> Result<Value, EvalError> {
        let (head, arg_terms) = match cmd.terms.split_first() {
            Some(split) => split,
            None => return Err(EvalError::Message("empty command".to_string())),
        };

        match head {
            Term::Ident(name) => {
                let func = self
                    .funcs
                    .get(name)
                    .ok_or_else(|| EvalError::NoSuchMethod { type_name: "registry".to_string(), method: name.clone() })?;
                let mut args = self.eval_args(arg_terms, root)?;
                if let Some(prev) = piped {
                    args.push(prev);
                }
                func(&args)
            }
            Term::Path(segs) => {
                if arg_terms.is_empty() && piped.is_none() {
                    return self.resolve_path(root, segs);
                }
                let mut args = self.eval_args(arg_terms, root)?;
                if let Some(prev) = piped {
                    args.push(prev);
                }
                self.call_method(root, segs, args)
            }
            literal => {
                if !arg_terms.is_empty() || piped.is_some() {
                    return Err(EvalError::Message("literal is not callable".to_string()));
                }
                self.eval_term(literal, root)
            }
        }
    }

    fn eval_args(&self, terms: &[Term], root: &Dict) -> Result<Vec<Value>, EvalError> {
        terms.iter().map(|t| self.eval_term(t, root)).collect()
    }

    fn eval_term(&self, term: &Term, root: &Dict) -> Result<Value, EvalError> {
        match term {
            Term::Int(n) => Ok(Value::Int(*n)),
            Term::Float(f) => Ok(Value::Float(*f)),
            Term::Str(s) => Ok(Value::Str(s.clone())),
            Term::Bool(b) => Ok(Value::Bool(*b)),
            Term::Path(segs) => self.resolve_path(root, segs),
            Term::Paren(pipeline) => self.eval_pipeline(pipeline, root),
            Term::Ident(name) => {
                Err(EvalError::Message(format!("function {name:?} used as a value")))
            }
        }
    }

    /// Resolve a dotted path to a value: dictionary lookups, struct fields
    /// (falling back to zero-argument methods), scratch reads.
    fn resolve_path(&self, root: &Dict, segs: &[String]) -> Result<Value, EvalError> {
        let not_found = |walked: &[String]| EvalError::NoSuchField { path: format!(".{}", walked.join(".")) };

        let Some((first, rest)) = segs.split_first() else {
            // Bare `.`: the whole data dictionary.
            return Ok(Value::Map(root.clone()));
        };

        let mut cur = root.get(first).cloned().ok_or_else(|| not_found(&segs[..1]))?;
        for (idx, seg) in rest.iter().enumerate() {
            let walked = &segs[..idx + 2];
            cur = match &cur {
                Value::Map(m) => m.get(seg).cloned().ok_or_else(|| not_found(walked))?,
                Value::Struct(s) => match s.get(seg) {
                    Some(v) => v,
                    // No such field: a zero-argument method also satisfies
                    // plain path access.
                    None => match s.call(seg, &[]) {
                        Ok(v) => v,
                        Err(EvalError::NoSuchMethod { .. }) => return Err(not_found(walked)),
                        Err(other) => return Err(other),
                    },
                },
                Value::Scratch(sc) => sc.get(seg).ok_or_else(|| not_found(walked))?,
                _ => return Err(not_found(walked)),
            };
        }
        Ok(cur)
    }

    /// Dispatch `.prefix.Method args…`: the path prefix names the receiver,
    /// the final segment the method.
    fn call_method(&self, root: &Dict, segs: &[String], args: Vec<Value>) -> Result<Value, EvalError> {
        let Some((method, prefix)) = segs.split_last() else {
            return Err(EvalError::Message("cannot call the data root".to_string()));
        };
        if prefix.is_empty() {
            return Err(EvalError::NoSuchMethod { type_name: "root".to_string(), method: method.clone() });
        }

        let receiver = self.resolve_path(root, prefix)?;
        match &receiver {
            Value::Struct(s) => s.call(method, &args),
            Value::Sink(sink) => match method.as_str() {
                "Put" => {
                    let Some(val) = args.first() else {
                        return Err(EvalError::WrongArgCount {
                            name: "Put".to_string(),
                            want: "1 or 2".to_string(),
                            got: 0,
                        });
                    };
                    let prev = args.get(1).map(Value::is_true);
                    Ok(Value::Bool(sink.put(val.clone(), prev)))
                }
                _ => Err(EvalError::NoSuchMethod { type_name: "result".to_string(), method: method.clone() }),
            },
            Value::Scratch(sc) => match method.as_str() {
                "Get" => {
                    let key = args
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| EvalError::BadArgument {
                            name: "Get".to_string(),
                            detail: "want a string key".to_string(),
                        })?;
                    sc.get(key).ok_or_else(|| EvalError::NoSuchField { path: format!(".R.{key}") })
                }
                "Set" => {
                    let key = args
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| EvalError::BadArgument {
                            name: "Set".to_string(),
                            detail: "want a string key".to_string(),
                        })?;
                    let Some(val) = args.get(1) else {
                        return Err(EvalError::WrongArgCount {
                            name: "Set".to_string(),
                            want: "2 or 3".to_string(),
                            got: args.len(),
                        });
                    };
                    if matches!(args.get(2), Some(prev) if !prev.is_true()) {
                        return Ok(Value::Bool(false));
                    }
                    sc.set(key.to_string(), val.clone());
                    Ok(Value::Bool(true))
                }
                _ => Err(EvalError::NoSuchMethod { type_name: "scratch".to_string(), method: method.clone() }),
            },
            other => {
                Err(EvalError::NoSuchMethod { type_name: other.kind_name().to_string(), method: method.clone() })
            }
        }
    }
}
