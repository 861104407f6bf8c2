//! Function registry.
//!
//! Every function callable from a rule expression (built-in predicate,
//! arithmetic helper, or user-supplied) shares one shape: it receives a
//! slice of evaluated arguments and produces a value or an evaluation
//! error. Pipes append the previous stage's value as the final argument,
//! which is why every predicate tolerates (and honors) an optional trailing
//! previous-result argument: when that argument is falsy the predicate
//! short-circuits to false without evaluating its primary arguments. Rule
//! authors rely on this to chain `p1 | p2 | p3` with AND semantics.
//!
//! ## Comparison semantics
//!
//! Values are classified into `bool | int | uint | float | string` kinds.
//! Different kinds are incompatible ([`EvalError::BadComparison`]) with one
//! exception: signed/unsigned integer mixes compare via unsigned magnitude
//! with a sign check. Ordering (`lt le gt ge`) on `bool` fails with
//! [`EvalError::BadComparisonType`]. `eq` is variadic: `eq a b c` is true
//! iff `a` equals any of `b, c`.
//!
//! ## Registries
//!
//! - [`default_funcs`]: the comparison/logic/math vocabulary.
//! - [`extra_funcs`]: sprig-like conveniences (arithmetic, strings).
//! - user functions are merged on top by the rule compiler; user names
//!   override built-ins.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{Error, EvalError};
use crate::value::Value;

/// A template-callable function.
pub type Func = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Named function table, merged per rule at compile time.
pub type FuncMap = HashMap<String, Func>;

/// Return shapes accepted from user closures: a bare value, a bare bool, or
/// either fallible variant. This carries the "one result, or two where the
/// second is an error" contract in the type system.
pub trait FuncReturn {
    fn into_result(self) -> Result<Value, EvalError>;
}

impl FuncReturn for Value {
    fn into_result(self) -> Result<Value, EvalError> {
        Ok(self)
    }
}

impl FuncReturn for bool {
    fn into_result(self) -> Result<Value, EvalError> {
        Ok(Value::Bool(self))
    }
}

impl FuncReturn for Result<Value, EvalError> {
    fn into_result(self) -> Result<Value, EvalError> {
        self
    }
}

impl FuncReturn for Result<bool, EvalError> {
    fn into_result(self) -> Result<Value, EvalError> {
        self.map(Value::Bool)
    }
}

/// Wrap a closure as a registry [`Func`].
pub fn func<R, F>(f: F) -> Func
where
    R: FuncReturn,
    F: Fn(&[Value]) -> R + Send + Sync + 'static,
{
    Arc::new(move |args| f(args).into_result())
}

/// Whether `name` is a valid function identifier: non-empty, first rune a
/// letter or `_`, remaining runes alphanumeric or `_`.
fn good_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    for (i, r) in name.chars().enumerate() {
        if r == '_' {
            continue;
        }
        if i == 0 && !r.is_alphabetic() {
            return false;
        }
        if !r.is_alphabetic() && !r.is_numeric() {
            return false;
        }
    }
    true
}

/// Validate user functions before they are merged into rule function maps.
pub fn validate_funcs(funcs: &FuncMap) -> Result<(), Error> {
    for name in funcs.keys() {
        if !good_name(name) {
            return Err(Error::BadFuncName(name.clone()));
        }
    }
    Ok(())
}

// --- Comparison kinds --------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Uint,
    Float,
    Str,
}

fn basic_kind(v: &Value) -> Result<Kind, EvalError> {
    match v {
        Value::Bool(_) => Ok(Kind::Bool),
        Value::Int(_) => Ok(Kind::Int),
        Value::Uint(_) => Ok(Kind::Uint),
        Value::Float(_) => Ok(Kind::Float),
        Value::Str(_) => Ok(Kind::Str),
        _ => Err(EvalError::BadComparisonType),
    }
}

fn arity(name: &str, want: &str, got: usize) -> EvalError {
    EvalError::WrongArgCount { name: name.to_string(), want: want.to_string(), got }
}

/// Equality between two basic values of pre-checked kinds.
fn eq_vals(a: &Value, b: &Value, k1: Kind, k2: Kind) -> Result<bool, EvalError> {
    if k1 != k2 {
        // Integer values compare regardless of the type's sign.
        return match (a, b) {
            (Value::Int(x), Value::Uint(y)) => Ok(*x >= 0 && *x as u64 == *y),
            (Value::Uint(x), Value::Int(y)) => Ok(*y >= 0 && *x == *y as u64),
            _ => Err(EvalError::BadComparison),
        };
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Uint(x), Value::Uint(y)) => Ok(x == y),
        (Value::Float(x), Value::Float(y)) => Ok(x == y),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        _ => Err(EvalError::BadComparison),
    }
}

/// Strict ordering between two basic values; `bool` is unordered.
fn lt_vals(a: &Value, b: &Value) -> Result<bool, EvalError> {
    let k1 = basic_kind(a)?;
    let k2 = basic_kind(b)?;
    if k1 != k2 {
        return match (a, b) {
            (Value::Int(x), Value::Uint(y)) => Ok(*x < 0 || (*x as u64) < *y),
            (Value::Uint(x), Value::Int(y)) => Ok(*y >= 0 && *x < *y as u64),
            _ => Err(EvalError::BadComparison),
        };
    }
    match (a, b) {
        (Value::Bool(_), Value::Bool(_)) => Err(EvalError::BadComparisonType),
        (Value::Int(x), Value::Int(y)) => Ok(x < y),
        (Value::Uint(x), Value::Uint(y)) => Ok(x < y),
        (Value::Float(x), Value::Float(y)) => Ok(x < y),
        (Value::Str(x), Value::Str(y)) => Ok(x < y),
        _ => Err(EvalError::BadComparison),
    }
}

fn le_vals(a: &Value, b: &Value) -> Result<bool, EvalError> {
    if lt_vals(a, b)? {
        return Ok(true);
    }
    eq_vals(a, b, basic_kind(a)?, basic_kind(b)?)
}

// --- Predicates --------------------------------------------------------------

/// `eq a b c…`: true iff `a` equals any of the rest. Any falsy trailing
/// argument (including a piped previous result) short-circuits to false.
fn eq(args: &[Value]) -> Result<Value, EvalError> {
    let (first, rest) = args.split_first().ok_or_else(|| arity("eq", "at least 2", args.len()))?;
    if rest.is_empty() {
        return Err(EvalError::NoComparison);
    }
    for v in rest {
        if !v.is_true() {
            return Ok(Value::Bool(false));
        }
    }
    let k1 = basic_kind(first)?;
    for v in rest {
        let k2 = basic_kind(v)?;
        if eq_vals(first, v, k1, k2)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// Previous-result guard for the fixed-arity predicates: argument at `idx`
/// (when present) must be truthy.
fn prev_arg_ok(args: &[Value], idx: usize) -> bool {
    args.get(idx).is_none_or(Value::is_true)
}

fn ne(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("ne", "at least 2", args.len()));
    }
    if !prev_arg_ok(args, 2) {
        return Ok(Value::Bool(false));
    }
    let equal = eq_vals(&args[0], &args[1], basic_kind(&args[0])?, basic_kind(&args[1])?)?;
    Ok(Value::Bool(!equal))
}

fn lt(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("lt", "at least 2", args.len()));
    }
    if !prev_arg_ok(args, 2) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(lt_vals(&args[0], &args[1])?))
}

fn le(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("le", "at least 2", args.len()));
    }
    if !prev_arg_ok(args, 2) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(le_vals(&args[0], &args[1])?))
}

fn gt(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("gt", "at least 2", args.len()));
    }
    if !prev_arg_ok(args, 2) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(!le_vals(&args[0], &args[1])?))
}

fn ge(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("ge", "at least 2", args.len()));
    }
    if !prev_arg_ok(args, 2) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(!lt_vals(&args[0], &args[1])?))
}

/// `in a min max`: the range check `min <= a <= max`.
fn in_range(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 3 {
        return Err(arity("in", "at least 3", args.len()));
    }
    if !prev_arg_ok(args, 3) {
        return Ok(Value::Bool(false));
    }
    let ge_min = !lt_vals(&args[0], &args[1])?;
    let le_max = le_vals(&args[0], &args[2])?;
    Ok(Value::Bool(ge_min && le_max))
}

fn and(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(arity("and", "at least 1", 0));
    }
    Ok(Value::Bool(args.iter().all(Value::is_true)))
}

fn or(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("or", "at least 2", args.len()));
    }
    for prev in &args[2..] {
        if !prev.is_true() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(args[0].is_true() || args[1].is_true()))
}

fn not(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(arity("not", "at least 1", 0));
    }
    if !prev_arg_ok(args, 1) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(!args[0].is_true()))
}

/// `tern cond a b`: `a` when `cond` is truthy, else `b`.
fn tern(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 3 {
        return Err(arity("tern", "3", args.len()));
    }
    Ok(if args[0].is_true() { args[1].clone() } else { args[2].clone() })
}

// --- Numeric helpers ---------------------------------------------------------

/// Best-effort float coercion: numeric kinds convert, strings parse (0 on
/// failure), bools map to 0/1, everything else is 0.
fn to_float(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Uint(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Str(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Best-effort integer coercion, the truncating sibling of [`to_float`].
fn to_int(v: &Value) -> i64 {
    match v {
        Value::Int(n) => *n,
        Value::Uint(n) => *n as i64,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => *b as i64,
        Value::Str(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn floor(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(arity("floor", "1", 0));
    }
    Ok(Value::Float(to_float(&args[0]).floor()))
}

fn ceil(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(arity("ceil", "1", 0));
    }
    Ok(Value::Float(to_float(&args[0]).ceil()))
}

/// `round a places [roundOn]`: round `a` at `places` decimal digits,
/// rounding half up (or at the custom `roundOn` fraction).
fn round(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(arity("round", "at least 2", args.len()));
    }
    let round_on = args.get(2).map_or(0.5, to_float);
    let val = to_float(&args[0]);
    let places = to_float(&args[1]);

    let pow = 10f64.powf(places);
    let digit = pow * val;
    let rounded = if digit.fract() >= round_on { digit.ceil() } else { digit.floor() };
    Ok(Value::Float(rounded / pow))
}

// --- String coercion for the extras ------------------------------------------

fn to_str(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => {
            let mut buf = String::new();
            other.write_to(&mut buf);
            buf
        }
    }
}

/// The built-in predicate/operator vocabulary.
pub(crate) fn default_funcs() -> &'static FuncMap {
    static FUNCS: Lazy<FuncMap> = Lazy::new(|| {
        let mut m = FuncMap::new();
        m.insert("in".into(), func(in_range));
        // Comparisons
        m.insert("eq".into(), func(eq));
        m.insert("ne".into(), func(ne));
        m.insert("lt".into(), func(lt));
        m.insert("le".into(), func(le));
        m.insert("gt".into(), func(gt));
        m.insert("ge".into(), func(ge));
        m.insert("not".into(), func(not));
        m.insert("and".into(), func(and));
        m.insert("or".into(), func(or));
        m.insert("tern".into(), func(tern));
        m.insert("ceil".into(), func(ceil));
        m.insert("floor".into(), func(floor));
        m.insert("round".into(), func(round));
        m
    });
    &FUNCS
}

/// Sprig-like conveniences merged below user functions.
pub(crate) fn extra_funcs() -> &'static FuncMap {
    static FUNCS: Lazy<FuncMap> = Lazy::new(|| {
        let mut m = FuncMap::new();
        m.insert(
            "add".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("add", "at least 1", 0));
                }
                Ok(Value::Int(args.iter().map(to_int).sum()))
            }),
        );
        m.insert(
            "sub".into(),
            func(|args: &[Value]| {
                if args.len() < 2 {
                    return Err(arity("sub", "2", args.len()));
                }
                Ok(Value::Int(to_int(&args[0]) - to_int(&args[1])))
            }),
        );
        m.insert(
            "mul".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("mul", "at least 1", 0));
                }
                Ok(Value::Int(args.iter().map(to_int).product()))
            }),
        );
        m.insert(
            "div".into(),
            func(|args: &[Value]| {
                if args.len() < 2 {
                    return Err(arity("div", "2", args.len()));
                }
                let d = to_int(&args[1]);
                if d == 0 {
                    return Err(EvalError::msg("div: division by zero"));
                }
                Ok(Value::Int(to_int(&args[0]) / d))
            }),
        );
        m.insert(
            "mod".into(),
            func(|args: &[Value]| {
                if args.len() < 2 {
                    return Err(arity("mod", "2", args.len()));
                }
                let d = to_int(&args[1]);
                if d == 0 {
                    return Err(EvalError::msg("mod: division by zero"));
                }
                Ok(Value::Int(to_int(&args[0]) % d))
            }),
        );
        m.insert(
            "abs".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("abs", "1", 0));
                }
                Ok(Value::Int(to_int(&args[0]).abs()))
            }),
        );
        m.insert(
            "min".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("min", "at least 1", 0));
                }
                Ok(Value::Int(args.iter().map(to_int).min().unwrap_or(0)))
            }),
        );
        m.insert(
            "max".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("max", "at least 1", 0));
                }
                Ok(Value::Int(args.iter().map(to_int).max().unwrap_or(0)))
            }),
        );
        m.insert(
            "upper".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("upper", "1", 0));
                }
                Ok(Value::Str(to_str(&args[0]).to_uppercase()))
            }),
        );
        m.insert(
            "lower".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("lower", "1", 0));
                }
                Ok(Value::Str(to_str(&args[0]).to_lowercase()))
            }),
        );
        m.insert(
            "trim".into(),
            func(|args: &[Value]| {
                if args.is_empty() {
                    return Err(arity("trim", "1", 0));
                }
                Ok(Value::Str(to_str(&args[0]).trim().to_string()))
            }),
        );
        m.insert(
            "contains".into(),
            func(|args: &[Value]| {
                if args.len() < 2 {
                    return Err(arity("contains", "2", args.len()));
                }
                Ok(Value::Bool(to_str(&args[1]).contains(&to_str(&args[0]))))
            }),
        );
        m.insert(
            "default".into(),
            func(|args: &[Value]| {
                if args.len() < 2 {
                    return Err(arity("default", "2", args.len()));
                }
                Ok(if args[1].is_true() { args[1].clone() } else { args[0].clone() })
            }),
        );
        m
    });
    &FUNCS
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn eq_is_variadic() {
        assert_eq!(eq(&[v(3), v(4), v(5), v(6), v(3)]).unwrap(), Value::Bool(true));
        assert_eq!(eq(&[v(3), v(4), v(5), v(6), v(7)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn eq_requires_comparison() {
        assert_eq!(eq(&[v(3)]).unwrap_err(), EvalError::NoComparison);
    }

    #[test]
    fn eq_falsy_argument_short_circuits() {
        // Any falsy trailing argument acts as a failed previous result.
        assert_eq!(eq(&[v(1), v(0)]).unwrap(), Value::Bool(false));
        assert_eq!(eq(&[v(1), v(1), Value::Bool(false)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn unordered_kinds_error() {
        assert_eq!(lt(&[Value::Bool(true), Value::Bool(true)]).unwrap_err(), EvalError::BadComparisonType);
        assert_eq!(eq(&[Value::Str("xy".into()), v(1)]).unwrap_err(), EvalError::BadComparison);
        assert_eq!(eq(&[v(2), Value::Float(2.0)]).unwrap_err(), EvalError::BadComparison);
    }

    #[test]
    fn signed_unsigned_mixes() {
        assert_eq!(lt(&[v(-1), Value::Uint(3)]).unwrap(), Value::Bool(true));
        assert_eq!(gt(&[Value::Uint(3), v(-1)]).unwrap(), Value::Bool(true));
        assert_eq!(eq(&[Value::Uint(3), v(3)]).unwrap(), Value::Bool(true));
        assert_eq!(eq(&[v(-1), Value::Uint(3)]).unwrap(), Value::Bool(false));
        assert_eq!(le(&[Value::Uint(3), v(3)]).unwrap(), Value::Bool(true));
        assert_eq!(ge(&[v(3), Value::Uint(3)]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn ordering_on_strings() {
        let s = |x: &str| Value::Str(x.to_string());
        assert_eq!(lt(&[s("xy"), s("xyz")]).unwrap(), Value::Bool(true));
        assert_eq!(ge(&[s("xyz"), s("xy")]).unwrap(), Value::Bool(true));
        assert_eq!(gt(&[s("xy"), s("xy")]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn prev_guard_on_predicates() {
        assert_eq!(lt(&[v(1), v(2), Value::Bool(false)]).unwrap(), Value::Bool(false));
        assert_eq!(lt(&[v(1), v(2), Value::Bool(true)]).unwrap(), Value::Bool(true));
        assert_eq!(in_range(&[v(2), v(1), v(3), Value::Bool(false)]).unwrap(), Value::Bool(false));
        assert_eq!(in_range(&[v(2), v(1), v(3)]).unwrap(), Value::Bool(true));
        assert_eq!(not(&[Value::Bool(false), Value::Bool(false)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn logic() {
        assert_eq!(and(&[v(1), v(2)]).unwrap(), Value::Bool(true));
        assert_eq!(and(&[v(1), v(0)]).unwrap(), Value::Bool(false));
        assert_eq!(or(&[v(0), v(2)]).unwrap(), Value::Bool(true));
        assert_eq!(or(&[v(0), v(0)]).unwrap(), Value::Bool(false));
        // or's trailing previous result
        assert_eq!(or(&[v(1), v(1), Value::Bool(false)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn rounding() {
        assert_eq!(round(&[Value::Float(1.5), v(0)]).unwrap(), Value::Float(2.0));
        assert_eq!(round(&[Value::Float(1.4), v(0)]).unwrap(), Value::Float(1.0));
        assert_eq!(round(&[Value::Float(123.456), v(2)]).unwrap(), Value::Float(123.46));
        // A custom roundOn raises the bar for rounding up.
        assert_eq!(round(&[Value::Float(3.7), v(0), Value::Float(0.9)]).unwrap(), Value::Float(3.0));
        assert_eq!(floor(&[Value::Float(1.9)]).unwrap(), Value::Float(1.0));
        assert_eq!(ceil(&[Value::Float(1.1)]).unwrap(), Value::Float(2.0));
        assert_eq!(round(&[Value::Str("1.5".into()), v(0)]).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn name_validation() {
        let valid = |name: &str| {
            let mut m = FuncMap::new();
            m.insert(name.to_string(), func(|_: &[Value]| true));
            validate_funcs(&m)
        };
        assert!(valid("test1").is_ok());
        assert!(valid("_private").is_ok());
        assert!(valid("").is_err());
        assert!(valid("_%f").is_err());
        assert!(valid("_f%f").is_err());
        assert!(valid("9lives").is_err());
    }

    #[test]
    fn extras() {
        let ex = extra_funcs();
        let call = |name: &str, args: &[Value]| ex[name](args).unwrap();
        assert_eq!(call("add", &[v(1), v(2), v(3)]), Value::Int(6));
        assert_eq!(call("sub", &[v(5), v(2)]), Value::Int(3));
        assert_eq!(call("mod", &[v(5), v(3)]), Value::Int(2));
        assert_eq!(call("abs", &[v(-4)]), Value::Int(4));
        assert_eq!(call("abs", &[v(4)]), Value::Int(4));
        assert_eq!(call("max", &[v(5), v(9), v(3)]), Value::Int(9));
        assert_eq!(call("upper", &[Value::from("abc")]), Value::from("ABC"));
        assert_eq!(call("contains", &[Value::from("SE"), Value::from("SSE")]), Value::Bool(true));
        assert_eq!(call("default", &[v(7), Value::from("")]), Value::Int(7));
        assert!(ex["div"](&[v(1), v(0)]).is_err());
    }
}
