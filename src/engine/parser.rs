//! Top-level parser: config ownership, compilation, execution.
//!
//! `Parser::from_bytes` unmarshals the rules document, validates the
//! attribute contracts, compiles every rule (deferring template parse
//! errors to execution-time skips), precomputes each ruleset's workflow
//! match, and sorts rules by priority. After construction the rulesets are
//! immutable; `replace` swaps in a freshly compiled set atomically.
//!
//! `execute` walks rulesets in document order under a coarse execution
//! lock: rule expressions mutate the bound values in place, and
//! serializing ruleset execution keeps the observable
//! single-rule-at-a-time semantics even when the queue executor runs
//! several worker threads.

use std::sync::{Arc, Mutex, PoisonError};

use regex::Regex;

use super::rule::Rule;
use super::ruleset::{Limit, Ruleset};
use crate::api::Options;
use crate::config::XmlConfig;
use crate::error::Error;
use crate::funcs::{FuncMap, default_funcs, extra_funcs, validate_funcs};
use crate::pool::Pool;
use crate::sink::ResultSink;
use crate::value::{Dict, Scratch, Value};
use crate::{logging, wildcard};

/// Scratch pools shared by all ruleset executions.
pub(crate) struct Pools {
    pub(crate) bufs: Pool<String>,
    pub(crate) dicts: Pool<Dict>,
}

impl Pools {
    fn new() -> Self {
        Pools { bufs: Pool::new(), dicts: Pool::new() }
    }
}

/// Owns the compiled rulesets and drives their execution.
pub struct Parser {
    rulesets: Vec<Ruleset>,
    options: Options,
    /// Merged function map: defaults ∪ extras ∪ user funcs.
    funcs: Arc<FuncMap>,
    pools: Pools,
    scratch: Arc<Scratch>,
    exec_lock: Mutex<()>,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser").finish_non_exhaustive()
    }
}

impl Parser {
    /// Build a parser from a rules document.
    pub fn from_bytes(data: &[u8], options: Options) -> Result<Parser, Error> {
        validate_funcs(&options.user_funcs)?;
        logging::init(&options.log_level, &options.log_path)?;

        let mut funcs = FuncMap::new();
        funcs.extend(default_funcs().clone());
        funcs.extend(extra_funcs().clone());
        // User functions override built-ins.
        funcs.extend(options.user_funcs.clone());
        let funcs = Arc::new(funcs);

        let cfg = XmlConfig::from_bytes(data)?;
        let rulesets = compile(cfg, &options, &funcs)?;

        Ok(Parser {
            rulesets,
            options,
            funcs,
            pools: Pools::new(),
            scratch: Arc::new(Scratch::new()),
            exec_lock: Mutex::new(()),
        })
    }

    pub fn from_str(text: &str, options: Options) -> Result<Parser, Error> {
        Self::from_bytes(text.as_bytes(), options)
    }

    /// Evaluate every ruleset, in document order, against `vals`.
    ///
    /// There is no error path: every per-rule and per-ruleset failure is
    /// absorbed with a warn log so one malformed rule cannot poison a
    /// batch. Side effects reach the caller through the values themselves
    /// and through the result sink.
    pub fn execute(&self, vals: &[Value]) {
        let _guard = self.exec_lock.lock().unwrap_or_else(PoisonError::into_inner);
        for ruleset in &self.rulesets {
            ruleset.execute(vals, &self.pools, &self.scratch);
        }
    }

    /// The configured result sink, if any.
    pub fn result(&self) -> Option<Arc<dyn ResultSink>> {
        self.options.result.clone()
    }

    /// Atomically replace the rules with a freshly compiled document.
    ///
    /// The new rulesets are fully built (and validated) before the old
    /// ones are dropped; on error the parser keeps its current rules.
    pub fn replace(&mut self, data: &[u8]) -> Result<(), Error> {
        let cfg = XmlConfig::from_bytes(data)?;
        let rulesets = compile(cfg, &self.options, &self.funcs)?;
        self.rulesets = rulesets;
        Ok(())
    }

    pub(crate) fn queue_workers(&self) -> usize {
        self.options.queue_workers
    }

    #[cfg(test)]
    pub(crate) fn rulesets(&self) -> &[Ruleset] {
        &self.rulesets
    }
}

fn compile(cfg: XmlConfig, options: &Options, funcs: &Arc<FuncMap>) -> Result<Vec<Ruleset>, Error> {
    let mut rulesets = Vec::with_capacity(cfg.rulesets.len());

    for rs in cfg.rulesets {
        if rs.filter_types.is_empty() {
            return Err(Error::MissingAttribute { ruleset: rs.name, attr: "filterTypes" });
        }
        if !rs.filter_types.chars().next().is_some_and(char::is_alphabetic) {
            return Err(Error::FilterTypesFirstChar { ruleset: rs.name });
        }
        if rs.data_key.is_empty() {
            return Err(Error::MissingAttribute { ruleset: rs.name, attr: "dataKey" });
        }

        let result_key = if rs.result_key.is_empty() { "result".to_string() } else { rs.result_key };

        let limit = match rs.priorities_count.trim() {
            "" | "all" => Limit::All,
            count => match count.parse::<usize>() {
                Ok(n) => Limit::Count(n),
                Err(_) => {
                    return Err(Error::BadPrioritiesCount {
                        ruleset: rs.name,
                        value: rs.priorities_count.clone(),
                    });
                }
            },
        };

        // Split filter types: spaces are stripped, `*` is an escaped space.
        let mut filter_types_arr: Vec<String> =
            rs.filter_types.replace(' ', "").replace('*', " ").split(',').map(str::to_string).collect();
        filter_types_arr.sort();

        let workflow_match = workflow_match(&rs.workflow, options, &rs.name)?;

        let mut rules: Vec<Rule> = rs.rules.into_iter().map(|r| Rule::new(r.name, r.priority, r.expr)).collect();
        for rule in &mut rules {
            rule.compile(
                &filter_types_arr,
                &result_key,
                options.result.is_some(),
                &options.delim_left,
                &options.delim_right,
                funcs.clone(),
            );
        }
        // Ascending priority; stable for equal priorities.
        rules.sort_by_key(|r| r.priority);

        rulesets.push(Ruleset {
            name: rs.name,
            filter_types_arr,
            filter_strict: rs.filter_strict,
            data_key: rs.data_key,
            result_key,
            limit,
            workflow: rs.workflow,
            workflow_match,
            rules,
            result: options.result.clone(),
        });
    }

    Ok(rulesets)
}

/// Precompute whether a ruleset participates under the parser's workflow
/// pattern. An empty pattern or an unlabelled ruleset always participates;
/// a wildcard pattern goes through the glob matcher, anything else treats
/// the ruleset label as a regex tested against the pattern.
fn workflow_match(workflow: &str, options: &Options, ruleset: &str) -> Result<bool, Error> {
    let pattern = &options.workflow_pattern;
    if pattern.is_empty() || workflow.is_empty() {
        return Ok(true);
    }
    if options.wildcard_workflow_pattern {
        return Ok(wildcard::matches(workflow, pattern));
    }
    let re = Regex::new(workflow).map_err(|source| Error::BadWorkflowRegex { ruleset: ruleset.to_string(), source })?;
    Ok(re.is_match(pattern))
}
