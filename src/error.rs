//! Error taxonomy.
//!
//! Errors fall into two families with very different propagation rules:
//!
//! - [`Error`]: *config-fatal*. Raised while constructing a
//!   [`Parser`](crate::Parser): XML unmarshal failure, a missing required
//!   ruleset attribute, a bad `filterTypes` value, an invalid user function
//!   name, a bad workflow regex. These abort construction.
//! - [`EvalError`]: template runtime errors: bad comparisons, unknown
//!   fields or methods, arity mismatches, errors raised by user functions
//!   or value methods. These never escape `execute`: the offending rule is
//!   skipped with a warn log and evaluation continues.
//!
//! Template *parse* errors are a third, deferred kind: they are retained on
//! the compiled rule (see `engine/rule.rs`) so that the containing ruleset
//! can still evaluate its other rules.

use thiserror::Error;

/// Construction-time (config-fatal) errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The rules document could not be read.
    #[error("rules config: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The rules document is structurally wrong (stray or unclosed
    /// elements, a bad priority).
    #[error("rules config: {0}")]
    Malformed(String),

    /// A required ruleset attribute was empty or absent.
    #[error("ruleset {ruleset:?}: missing required attribute {attr}")]
    MissingAttribute { ruleset: String, attr: &'static str },

    /// `filterTypes` must start with a letter.
    #[error("ruleset {ruleset:?}: first character of filterTypes is not a letter")]
    FilterTypesFirstChar { ruleset: String },

    /// `prioritiesCount` was neither `all`, empty, nor an integer.
    #[error("ruleset {ruleset:?}: prioritiesCount {value:?} is not \"all\" or an integer")]
    BadPrioritiesCount { ruleset: String, value: String },

    /// A user function name is not a valid identifier.
    #[error("function name {0:?} is not a valid identifier")]
    BadFuncName(String),

    /// A ruleset workflow label did not compile as a regular expression.
    #[error("ruleset {ruleset:?}: workflow is not a valid regex: {source}")]
    BadWorkflowRegex {
        ruleset: String,
        #[source]
        source: regex::Error,
    },

    /// Unsupported log level or unwritable log path.
    #[error("logging: {0}")]
    Log(String),
}

/// Template runtime errors.
///
/// The three comparison variants mirror the contract of the built-in
/// comparison functions: kinds must agree (modulo signed/unsigned integer
/// mixes) and `bool` is unordered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// Incompatible kinds for comparison (e.g. string vs int).
    #[error("incompatible types for comparison")]
    BadComparison,

    /// The kind does not support ordering (e.g. `lt true true`).
    #[error("invalid type for comparison")]
    BadComparisonType,

    /// A comparison was invoked without a right-hand side.
    #[error("missing argument for comparison")]
    NoComparison,

    /// A path segment did not resolve.
    #[error("no such field or key {path:?}")]
    NoSuchField { path: String },

    /// A method call did not resolve on the receiver.
    #[error("{type_name} has no method {method:?}")]
    NoSuchMethod { type_name: String, method: String },

    /// A function or method was called with the wrong number of arguments.
    #[error("{name}: want {want} arg(s), got {got}")]
    WrongArgCount { name: String, want: String, got: usize },

    /// A function received an argument of an unusable kind.
    #[error("{name}: bad argument: {detail}")]
    BadArgument { name: String, detail: String },

    /// Free-form error raised by a user function or a value method.
    #[error("{0}")]
    Message(String),
}

impl EvalError {
    /// Build a free-form error, for user functions and value methods.
    pub fn msg(s: impl Into<String>) -> Self {
        EvalError::Message(s.into())
    }
}
