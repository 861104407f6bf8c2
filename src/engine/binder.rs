//! Value binding.
//!
//! Projects the caller's runtime values into the template data dictionary a
//! rule renders against. Keys are derived from the values' runtime shapes:
//!
//! ```text
//! vals[i]                      key in vals_data
//! ───────────────────────────  ─────────────────────────────
//! slice of primitives          <elemKind>slice<i>   intslice0
//! homogeneous primitive map    <valKind>map<i>      intmap1
//! heterogeneous map            (becomes vals_data itself)
//! scalar primitive             <kind><i>            bool3
//! struct                       <pkg> → <TypeName>   demo → T2
//! ```
//!
//! Multiple structs of the same type get suffixed names: the first keeps
//! the bare `TypeName`, the 2nd through 7th use the pre-cached `0`…`5`
//! suffixes (`T2`, `T20`, `T21`, …), further duplicates compute their
//! suffix on demand.
//!
//! Finally two well-known keys are injected: the result sink under the
//! ruleset's `resultKey` and the scratch dictionary under `"R"`. The outer
//! dictionary wraps everything under the ruleset's `dataKey`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::sink::ResultSink;
use crate::value::{Dict, Scratch, Value};

/// Pre-cached suffixes for repeated type names.
const SAME_TYPE_SUFFIXES: [&str; 6] = ["0", "1", "2", "3", "4", "5"];

/// Whether a map value is a dictionary override (the `map[string]any`
/// analog): any non-primitive or mixed-kind member disqualifies it from
/// plain keyed binding and makes it the effective `vals_data`.
pub(crate) fn is_override_map(map: &Dict) -> bool {
    let mut kinds = map.values().map(|v| match v {
        Value::Bool(_) | Value::Int(_) | Value::Uint(_) | Value::Float(_) | Value::Str(_) => Some(v.kind_name()),
        _ => None,
    });
    let Some(first) = kinds.next() else {
        return false;
    };
    let Some(first) = first else {
        return true;
    };
    kinds.any(|k| k != Some(first))
}

/// Build the template data dictionary for one ruleset execution.
pub(crate) fn bind(
    vals: &[Value],
    data_key: &str,
    result_key: &str,
    result: Option<&Arc<dyn ResultSink>>,
    scratch: &Arc<Scratch>,
    out: &mut Dict,
) {
    let mut vals_data = Dict::new();
    // Occurrences per struct type name, for duplicate suffixing.
    let mut type_counts: HashMap<&'static str, usize> = HashMap::new();

    for (i, val) in vals.iter().enumerate() {
        match val {
            Value::Slice(elems) => {
                let elem_kind = elems.first().map_or("", |v| v.kind_name());
                vals_data.insert(format!("{elem_kind}slice{i}"), val.clone());
            }
            Value::Map(map) => {
                if is_override_map(map) {
                    // The dictionary becomes the effective vals_data,
                    // overriding prior bindings.
                    vals_data = map.clone();
                } else {
                    let val_kind = map.values().next().map_or("", |v| v.kind_name());
                    vals_data.insert(format!("{val_kind}map{i}"), val.clone());
                }
            }
            Value::Bool(_) | Value::Int(_) | Value::Uint(_) | Value::Float(_) | Value::Str(_) => {
                vals_data.insert(format!("{}{i}", val.kind_name()), val.clone());
            }
            Value::Struct(s) => {
                let occurrence = type_counts.entry(s.type_name()).or_insert(0);
                let key = if *occurrence == 0 {
                    s.type_name().to_string()
                } else {
                    match SAME_TYPE_SUFFIXES.get(*occurrence - 1) {
                        Some(suffix) => format!("{}{suffix}", s.type_name()),
                        None => format!("{}{}", s.type_name(), *occurrence - 1),
                    }
                };
                *occurrence += 1;

                let entry = vals_data
                    .entry(s.package_path().to_string())
                    .or_insert_with(|| Value::Map(Dict::new()));
                if let Value::Map(nested) = entry {
                    nested.insert(key, val.clone());
                } else {
                    let mut nested = Dict::new();
                    nested.insert(key, val.clone());
                    *entry = Value::Map(nested);
                }
            }
            // Engine-injected handles never arrive as caller values.
            Value::Sink(_) | Value::Scratch(_) => {}
        }
    }

    if let Some(sink) = result {
        vals_data.insert(result_key.to_string(), Value::Sink(sink.clone()));
    }
    vals_data.insert("R".to_string(), Value::Scratch(scratch.clone()));

    out.insert(data_key.to_string(), Value::Map(vals_data));
}

/// Sorted list of observed simple type names for the given values.
pub(crate) fn observed_types(vals: &[Value]) -> Vec<String> {
    let mut types: Vec<String> = vals.iter().map(|v| v.observed_type().to_string()).collect();
    types.sort();
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Shared;
    use crate::Reflect;
    use pretty_assertions::assert_eq;

    struct T2 {
        a: i64,
    }

    impl Reflect for T2 {
        fn package_path(&self) -> &'static str {
            "demo"
        }

        fn type_name(&self) -> &'static str {
            "T2"
        }

        fn get(&self, field: &str) -> Option<Value> {
            (field == "A").then(|| Value::Int(self.a))
        }
    }

    fn bound(vals: &[Value]) -> Dict {
        let mut out = Dict::new();
        bind(vals, "D", "result", None, &Arc::new(Scratch::new()), &mut out);
        match out.remove("D") {
            Some(Value::Map(m)) => m,
            other => panic!("want map under data key, got {other:?}"),
        }
    }

    #[test]
    fn primitive_keys_carry_kind_and_position() {
        let vals =
            vec![Value::from("hello"), Value::Bool(false), Value::Int(4), Value::Float(1.23), Value::from(vec![7i64])];
        let data = bound(&vals);

        assert_eq!(data["string0"], Value::from("hello"));
        assert_eq!(data["bool1"], Value::Bool(false));
        assert_eq!(data["int2"], Value::Int(4));
        assert_eq!(data["float3"], Value::Float(1.23));
        assert_eq!(data["intslice4"], Value::from(vec![7i64]));
    }

    #[test]
    fn structs_nest_under_package_then_type() {
        let t2 = Shared::new(T2 { a: 1 });
        let data = bound(&[t2.value()]);

        let Some(Value::Map(demo)) = data.get("demo") else {
            panic!("missing package map");
        };
        assert!(demo.contains_key("T2"));
    }

    #[test]
    fn duplicate_types_get_suffixes() {
        let vals: Vec<Value> = (0..8).map(|i| Shared::new(T2 { a: i }).value()).collect();
        let data = bound(&vals);

        let Some(Value::Map(demo)) = data.get("demo") else {
            panic!("missing package map");
        };
        let keys: Vec<&str> = demo.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["T2", "T20", "T21", "T22", "T23", "T24", "T25", "T26"]);

        // First entry is the first value, not a later duplicate.
        let Some(Value::Struct(first)) = demo.get("T2") else {
            panic!("missing bare entry");
        };
        assert_eq!(first.get("A"), Some(Value::Int(0)));
    }

    #[test]
    fn override_map_replaces_prior_bindings() {
        let mut hetero = Dict::new();
        hetero.insert("x".to_string(), Value::Int(1));
        hetero.insert("y".to_string(), Value::from("mixed"));

        let data = bound(&[Value::Int(9), Value::Map(hetero)]);
        assert!(!data.contains_key("int0"));
        assert_eq!(data["x"], Value::Int(1));

        // Homogeneous primitive maps stay keyed bindings.
        let mut homo = Dict::new();
        homo.insert("x".to_string(), Value::Int(1));
        homo.insert("y".to_string(), Value::Int(2));
        let data = bound(&[Value::Map(homo.clone())]);
        assert_eq!(data["intmap0"], Value::Map(homo));
    }

    #[test]
    fn injects_result_and_scratch_keys() {
        let mut out = Dict::new();
        let sink: Arc<dyn ResultSink> = crate::sink::QueueSink::new();
        bind(&[Value::Int(1)], "D", "res", Some(&sink), &Arc::new(Scratch::new()), &mut out);

        let Some(Value::Map(data)) = out.get("D") else {
            panic!("missing data key");
        };
        assert!(matches!(data.get("res"), Some(Value::Sink(_))));
        assert!(matches!(data.get("R"), Some(Value::Scratch(_))));
    }

    #[test]
    fn observed_types_are_sorted_simple_names() {
        let t2 = Shared::new(T2 { a: 1 });
        let types = observed_types(&[Value::Int(1), t2.value(), Value::from("s")]);
        assert_eq!(types, vec!["T2".to_string(), "int".to_string(), "string".to_string()]);
    }
}
