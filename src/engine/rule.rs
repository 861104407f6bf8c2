//! Single-rule compilation and gating.
//!
//! A rule is one prioritized templated predicate. Compilation happens once,
//! when the parser unmarshals the config; after that a rule is immutable.
//!
//! Compilation derives everything execution needs to skip cheaply:
//!
//! - `expected_types`: the subset of the ruleset's filter types whose names
//!   appear (as substrings) in the expression. Execution checks these
//!   against the observed value types so a rule touching `.D.hr.Person`
//!   never renders against values that carry no `Person`.
//! - `no_result_func`: the expression references the result key but the
//!   ruleset has no sink attached; such a rule can never do anything useful
//!   and is skipped outright.
//! - `template` / `template_err`: the parsed template, or the retained
//!   parse error (compile-deferred: the containing ruleset still evaluates
//!   its other rules).

use std::sync::Arc;

use crate::funcs::FuncMap;
use crate::template::{ParseError, Template};
use crate::value::Value;

pub(crate) struct Rule {
    pub(crate) name: String,
    pub(crate) priority: i32,
    pub(crate) expr: String,
    pub(crate) template: Option<Template>,
    pub(crate) template_err: Option<ParseError>,
    pub(crate) expected_types: Vec<String>,
    pub(crate) no_result_func: bool,
}

impl Rule {
    pub(crate) fn new(name: String, priority: i32, expr: String) -> Self {
        Rule {
            name,
            priority,
            expr,
            template: None,
            template_err: None,
            expected_types: Vec::new(),
            no_result_func: false,
        }
    }

    /// Compile the rule against its ruleset's context.
    ///
    /// `filter_types` is the ruleset's (sorted) filter list, `has_result`
    /// whether a sink is attached, and `funcs` the merged function map
    /// (defaults ∪ extras ∪ user funcs).
    pub(crate) fn compile(
        &mut self,
        filter_types: &[String],
        result_key: &str,
        has_result: bool,
        delim_left: &str,
        delim_right: &str,
        funcs: Arc<FuncMap>,
    ) {
        self.expr = self.expr.replace('\n', "");

        self.expected_types = filter_types.iter().filter(|t| self.expr.contains(t.as_str())).cloned().collect();
        self.expected_types.sort();

        self.no_result_func = self.expr.contains(result_key) && !has_result;

        match Template::parse(&self.expr, delim_left, delim_right, funcs) {
            Ok(template) => {
                self.template = Some(template);
                self.template_err = None;
            }
            Err(err) => {
                self.template = None;
                self.template_err = Some(err);
            }
        }
    }

    fn has_type(&self, type_name: &str) -> bool {
        self.expected_types.binary_search_by(|t| t.as_str().cmp(type_name)).is_ok()
    }

    /// Per-rule type gate: every expected type must be found among the
    /// observed value types (for a single value, its type must be
    /// expected). Rules that reference no filter type carry no constraint.
    pub(crate) fn is_valid(&self, vals: &[Value]) -> bool {
        if self.expected_types.is_empty() {
            return true;
        }

        match vals {
            [] => false,
            // A lone dictionary override can satisfy any expression.
            [Value::Map(_)] => true,
            [single] => self.has_type(single.observed_type()),
            many => {
                if many.len() < self.expected_types.len() {
                    return false;
                }
                self.expected_types.iter().all(|t| many.iter().any(|v| v.observed_type() == t.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reflect;
    use crate::funcs::default_funcs;
    use crate::value::Shared;

    struct T2;

    impl Reflect for T2 {
        fn package_path(&self) -> &'static str {
            "demo"
        }

        fn type_name(&self) -> &'static str {
            "T2"
        }
    }

    struct T9;

    impl Reflect for T9 {
        fn package_path(&self) -> &'static str {
            "demo"
        }

        fn type_name(&self) -> &'static str {
            "T9"
        }
    }

    fn compiled(expr: &str, filter_types: &[&str]) -> Rule {
        let mut filters: Vec<String> = filter_types.iter().map(|s| s.to_string()).collect();
        filters.sort();
        let mut rule = Rule::new("r".into(), 1, expr.into());
        rule.compile(&filters, "result", true, "<r>", "</r>", Arc::new(default_funcs().clone()));
        rule
    }

    #[test]
    fn derives_expected_types_from_expression() {
        let rule = compiled("<r>and (eq .D.demo.T2.A 1) (eq .D.demo.T9.B 2)</r>", &["T2", "T9", "T5"]);
        assert_eq!(rule.expected_types, vec!["T2".to_string(), "T9".to_string()]);
    }

    #[test]
    fn strips_newlines_before_compiling() {
        let rule = compiled("<r>eq\n.D.demo.T2.A\n1</r>", &["T2"]);
        assert!(rule.template_err.is_none());
        assert!(!rule.expr.contains('\n'));
    }

    #[test]
    fn retains_parse_errors() {
        let rule = compiled("<r>nosuchfunc .D.demo.T2.A</r>", &["T2"]);
        assert!(rule.template.is_none());
        assert!(matches!(rule.template_err, Some(ParseError::UnknownFunction(_))));
    }

    #[test]
    fn flags_result_reference_without_sink() {
        let mut rule = Rule::new("r".into(), 1, "<r>.D.result.Put .D.demo.T2</r>".into());
        rule.compile(&["T2".to_string()], "result", false, "<r>", "</r>", Arc::new(default_funcs().clone()));
        assert!(rule.no_result_func);

        let rule = compiled("<r>.D.result.Put .D.demo.T2</r>", &["T2"]);
        assert!(!rule.no_result_func);
    }

    #[test]
    fn type_gate() {
        let rule = compiled("<r>eq .D.demo.T2.A 1</r>", &["T2", "T9"]);
        let t2 = Shared::new(T2).value();
        let t9 = Shared::new(T9).value();

        assert!(rule.is_valid(std::slice::from_ref(&t2)));
        assert!(!rule.is_valid(std::slice::from_ref(&t9)));
        assert!(rule.is_valid(&[t9.clone(), t2.clone()]));
        assert!(!rule.is_valid(&[]));

        // No referenced types means no constraint.
        let open = compiled("<r>eq 1 1</r>", &["T2"]);
        assert!(open.is_valid(&[t9]));
    }
}
