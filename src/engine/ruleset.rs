//! Ruleset execution.
//!
//! A ruleset is a named, ordered bundle of rules sharing a type filter and a
//! workflow label. Execution is gated twice before any rule renders:
//!
//! 1. the precomputed workflow match (see `parser.rs`), and
//! 2. the observed-types check against `filterTypes`: strict rulesets
//!    require every observed type to be a filter member, lax rulesets
//!    require at least one.
//!
//! Rules then evaluate strictly in ascending priority. A rule is skipped
//! (warn-logged, never fatal) when it references an absent result sink,
//! fails its own expected-types gate, failed to compile, fails to render,
//! or renders something that is not a boolean. Truthy rules count toward
//! the ruleset's `limit`; reaching it stops the loop: "at most `limit`
//! truthy rules fire per execution".

use std::sync::Arc;

use tracing::warn;

use super::binder;
use super::parser::Pools;
use super::rule::Rule;
use crate::sink::ResultSink;
use crate::value::{Scratch, Value};

/// Resolved `prioritiesCount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Limit {
    /// Evaluate every rule (`prioritiesCount="all"` or absent).
    All,
    /// Stop after this many truthy rules.
    Count(usize),
}

pub(crate) struct Ruleset {
    pub(crate) name: String,
    /// Sorted filter type names (spaces removed, `*` unescaped to space).
    pub(crate) filter_types_arr: Vec<String>,
    pub(crate) filter_strict: bool,
    pub(crate) data_key: String,
    pub(crate) result_key: String,
    pub(crate) limit: Limit,
    pub(crate) workflow: String,
    pub(crate) workflow_match: bool,
    pub(crate) rules: Vec<Rule>,
    pub(crate) result: Option<Arc<dyn ResultSink>>,
}

impl Ruleset {
    fn has_type(&self, type_name: &str) -> bool {
        self.filter_types_arr.binary_search_by(|t| t.as_str().cmp(type_name)).is_ok()
    }

    /// Observed-types precondition for the whole ruleset.
    pub(crate) fn is_valid(&self, vals: &[Value]) -> bool {
        if vals.is_empty() || self.filter_types_arr.is_empty() {
            return false;
        }

        if self.filter_strict {
            vals.len() >= self.filter_types_arr.len() && vals.iter().all(|v| self.has_type(v.observed_type()))
        } else {
            vals.iter().any(|v| self.has_type(v.observed_type()))
        }
    }

    /// Evaluate the ruleset against `vals`. Failures skip silently apart
    /// from a warn log; there is no error path out of execution.
    pub(crate) fn execute(&self, vals: &[Value], pools: &Pools, scratch: &Arc<Scratch>) {
        if !self.workflow_match {
            warn!(ruleset = %self.name, workflow = %self.workflow, "workflow does not match, skipping ruleset");
            return;
        }

        if !self.is_valid(vals) {
            warn!(
                ruleset = %self.name,
                observed = ?binder::observed_types(vals),
                "invalid types, skipping ruleset"
            );
            return;
        }

        // A zero limit admits no truthy rules; nothing to evaluate.
        if self.limit == Limit::Count(0) {
            return;
        }

        let mut data = pools.dicts.get();
        binder::bind(vals, &self.data_key, &self.result_key, self.result.as_ref(), scratch, &mut data);

        let mut success_count = 0usize;

        for rule in &self.rules {
            if rule.no_result_func {
                warn!(rule = %rule.name, "rule references the result key but no result sink is set");
                continue;
            }

            if !rule.is_valid(vals) {
                warn!(rule = %rule.name, expected = ?rule.expected_types, "expected types not observed, skipping rule");
                continue;
            }

            if let Some(err) = &rule.template_err {
                warn!(rule = %rule.name, error = %err, "invalid rule template");
                continue;
            }
            let Some(template) = &rule.template else {
                continue;
            };

            let mut buf = pools.bufs.get();
            if let Err(err) = template.render(&data, &mut buf) {
                warn!(rule = %rule.name, error = %err, "render error, skipping rule");
                continue;
            }

            let result = match buf.trim().to_ascii_lowercase().parse::<bool>() {
                Ok(b) => b,
                Err(_) => {
                    warn!(rule = %rule.name, output = %buf.trim(), "rule output is not a boolean");
                    continue;
                }
            };

            if result {
                success_count += 1;
                if self.limit == Limit::Count(success_count) {
                    break;
                }
            }
        }
    }
}
