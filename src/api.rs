use std::sync::Arc;

use crate::engine::Parser;
use crate::error::Error;
use crate::funcs::FuncMap;
use crate::sink::{CallbackSink, QueueSink, ResultSink};
use crate::value::Value;

// default delimiters
const DELIM_LEFT: &str = "<r>";
const DELIM_RIGHT: &str = "</r>";

/// Parser configuration.
///
/// Everything is optional; [`Options::default`] gives the stock engine:
/// `<r>`/`</r>` delimiters, no user functions, no workflow filtering, no
/// result sink, info-level logging to stdout, four queue workers.
#[derive(Clone)]
pub struct Options {
    /// Left template delimiter.
    pub delim_left: String,
    /// Right template delimiter.
    pub delim_right: String,
    /// Caller-supplied functions, validated at construction; names
    /// override built-ins.
    pub user_funcs: FuncMap,
    /// Label matched against each ruleset's `workflow` attribute.
    pub workflow_pattern: String,
    /// Treat `workflow_pattern` matching as `?`/`*` wildcard matching
    /// instead of regex matching.
    pub wildcard_workflow_pattern: bool,
    /// Destination for values emitted via the result key.
    pub result: Option<Arc<dyn ResultSink>>,
    /// `info|debug|warn|error|fatal`.
    pub log_level: String,
    /// `stdout` or a file path.
    pub log_path: String,
    /// Worker pool size for the queue executor; when every worker is busy
    /// the input channel blocks.
    pub queue_workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            delim_left: DELIM_LEFT.to_string(),
            delim_right: DELIM_RIGHT.to_string(),
            user_funcs: FuncMap::new(),
            workflow_pattern: String::new(),
            wildcard_workflow_pattern: false,
            result: None,
            log_level: "info".to_string(),
            log_path: "stdout".to_string(),
            queue_workers: 4,
        }
    }
}

impl Parser {
    /// Parser with default options and an optional workflow pattern.
    ///
    /// # Example
    /// ```
    /// use rondel::Parser;
    ///
    /// let rules = r#"<rondel>
    ///   <ruleset name="r" filterTypes="int" dataKey="D">
    ///     <rule name="pass"><r>eq .D.int0 4</r></rule>
    ///   </ruleset>
    /// </rondel>"#;
    ///
    /// let parser = Parser::simple(rules.as_bytes(), "").unwrap();
    /// parser.execute(&[4i64.into()]);
    /// ```
    pub fn simple(data: &[u8], workflow_pattern: &str) -> Result<Parser, Error> {
        Parser::from_bytes(
            data,
            Options { workflow_pattern: workflow_pattern.to_string(), ..Options::default() },
        )
    }

    /// Parser whose result sink invokes `callback` synchronously.
    pub fn with_callback(
        data: &[u8],
        callback: impl Fn(Value) + Send + Sync + 'static,
        workflow_pattern: &str,
    ) -> Result<Parser, Error> {
        Parser::from_bytes(
            data,
            Options {
                workflow_pattern: workflow_pattern.to_string(),
                result: Some(CallbackSink::new(callback)),
                ..Options::default()
            },
        )
    }

    /// Parser whose result sink is a queue, for use with
    /// [`QueueExecutor`](crate::QueueExecutor).
    pub fn with_queue(data: &[u8], workflow_pattern: &str) -> Result<Parser, Error> {
        Parser::from_bytes(
            data,
            Options {
                workflow_pattern: workflow_pattern.to_string(),
                result: Some(QueueSink::new()),
                ..Options::default()
            },
        )
    }
}
