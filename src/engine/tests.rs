//! End-to-end engine scenarios.
//!
//! These drive the public surface the way a caller would: rules documents
//! in, side effects out (mutated values, callback invocations, queue
//! emissions).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, unbounded};
use pretty_assertions::assert_eq;

use crate::engine::ruleset::Limit;
use crate::value::{Shared, Value, prev_ok};
use crate::{Options, Parser, QueueExecutor, SimpleExecutor};

// --- Test types --------------------------------------------------------------

#[derive(Clone)]
struct T2 {
    a: i64,
    b: i64,
}

impl T2 {
    fn set_a(&mut self, args: &[Value]) -> Value {
        if !prev_ok(args) {
            return Value::Bool(false);
        }
        if let Some(v) = args.first().and_then(Value::as_int) {
            self.a = v;
        }
        Value::Bool(true)
    }
}

reflect! {
    T2 in "demo" {
        fields { A => a, B => b }
        methods { SetA => set_a }
    }
}

#[derive(Clone)]
struct Person {
    id: i64,
    age: i64,
    experience: i64,
    vacations: i64,
    position: String,
    salary: i64,
}

impl Person {
    fn new(id: i64, vacations: i64) -> Self {
        Person { id, age: 20, experience: 7, vacations, position: "SSE".to_string(), salary: 0 }
    }

    fn set_age(&mut self, args: &[Value]) -> Value {
        if !prev_ok(args) {
            return Value::Bool(false);
        }
        if let Some(v) = args.first().and_then(Value::as_int) {
            self.age = v;
        }
        Value::Bool(true)
    }

    fn set_salary(&mut self, args: &[Value]) -> Value {
        if !prev_ok(args) {
            return Value::Bool(false);
        }
        if let Some(v) = args.first().and_then(Value::as_int) {
            self.salary = v;
        }
        Value::Bool(true)
    }
}

reflect! {
    Person in "hr" {
        fields {
            ID => id,
            Age => age,
            Experience => experience,
            Vacations => vacations,
            Position => position,
            Salary => salary,
        }
        methods { SetAge => set_age, SetSalary => set_salary }
    }
}

struct Company {
    name: String,
}

reflect! {
    Company in "hr" {
        fields { Name => name }
    }
}

// --- Scenarios ---------------------------------------------------------------

#[test]
fn single_struct_mutation() {
    let rules = br#"<rondel>
      <ruleset name="set" filterTypes="T2" dataKey="D">
        <rule name="setA" priority="1">
          <r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r>
        </rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[t2.value()]);

    assert_eq!(t2.with(|v| v.a), 5);
    assert_eq!(t2.with(|v| v.b), 2);
}

#[test]
fn duplicate_types_bind_with_suffixes() {
    let rules = br#"<rondel>
      <ruleset name="set" filterTypes="T2" dataKey="D">
        <rule name="setFirst" priority="1">
          <r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r>
        </rule>
      </ruleset>
    </rondel>"#;

    let first = Shared::new(T2 { a: 1, b: 2 });
    let second = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[first.value(), second.value()]);

    // The first value binds as T2, the duplicate as T20.
    assert_eq!(first.with(|v| v.a), 5);
    assert_eq!(second.with(|v| v.a), 1);
}

#[test]
fn wildcard_workflow_gates_rulesets() {
    let rules = br#"<rondel>
      <ruleset name="ipl" filterTypes="T2" dataKey="D" workflow="ipl2020">
        <rule name="set10"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 10</r></rule>
      </ruleset>
      <ruleset name="summer" filterTypes="T2" dataKey="D" workflow="summer2021">
        <rule name="set99"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 99</r></rule>
      </ruleset>
      <ruleset name="unlabelled" filterTypes="T9" dataKey="D">
        <rule name="neverTyped"><r>eq .D.demo.T9.A 1 | .D.demo.T9.SetA 99</r></rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::from_bytes(
        rules,
        Options {
            workflow_pattern: "ipl*".to_string(),
            wildcard_workflow_pattern: true,
            ..Options::default()
        },
    )
    .unwrap();
    parser.execute(&[t2.value()]);

    assert_eq!(t2.with(|v| v.a), 10);

    let rulesets = parser.rulesets();
    assert!(rulesets[0].workflow_match);
    assert!(!rulesets[1].workflow_match);
    assert!(rulesets[2].workflow_match);
}

#[test]
fn regex_workflow_matches_pattern_against_label() {
    let rules = br#"<rondel>
      <ruleset name="demotions" filterTypes="Person" dataKey="D" workflow="demo.*">
        <rule name="cut"><r>gt .D.hr.Person.Age 18 | .D.hr.Person.SetSalary 30000</r></rule>
      </ruleset>
    </rondel>"#;

    let p = Shared::new(Person::new(1, 4));
    let parser = Parser::simple(rules, "demotion2022").unwrap();
    parser.execute(&[p.value()]);
    assert_eq!(p.with(|v| v.salary), 30000);

    let p2 = Shared::new(Person::new(2, 4));
    let parser = Parser::simple(rules, "promotion2022").unwrap();
    parser.execute(&[p2.value()]);
    assert_eq!(p2.with(|v| v.salary), 0);
}

#[test]
fn callback_fires_in_input_order() {
    let rules = br#"<rondel>
      <ruleset name="emit" filterTypes="Person" dataKey="D">
        <rule name="put" priority="1">
          <r>le .D.hr.Person.Vacations 5 | eq .D.hr.Person.Position `SSE` | .D.result.Put .D.hr.Person.ID</r>
        </rule>
      </ruleset>
    </rondel>"#;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let parser =
        Arc::new(Parser::with_callback(rules, move |v| seen2.lock().unwrap().push(v), "").unwrap());
    let executor = SimpleExecutor::new(parser);

    // Vacations 1..=10: exactly the first five satisfy `le 5`.
    let people: Vec<Shared<Person>> = (1..=10).map(|i| Shared::new(Person::new(i, i))).collect();
    for p in &people {
        executor.execute(&[p.value()]);
    }

    let got: Vec<i64> = seen.lock().unwrap().iter().filter_map(Value::as_int).collect();
    assert_eq!(got, vec![1, 2, 3, 4, 5]);
}

#[test]
fn queue_executor_relays_and_closes_out() {
    let rules = br#"<rondel>
      <ruleset name="emit" filterTypes="Person" dataKey="D">
        <rule name="put" priority="1">
          <r>le .D.hr.Person.Vacations 5 | .D.result.Put .D.hr.Person.ID</r>
        </rule>
      </ruleset>
    </rondel>"#;

    let parser = Arc::new(Parser::with_queue(rules, "").unwrap());
    let executor = QueueExecutor::new(parser);

    let (in_tx, in_rx) = unbounded();
    let (out_tx, out_rx) = unbounded();
    executor.execute(in_rx, out_tx);

    let people: Vec<Shared<Person>> = (1..=3).map(|i| Shared::new(Person::new(i, i))).collect();
    for p in &people {
        in_tx.send(vec![p.value()]).unwrap();
    }
    drop(in_tx);

    let mut got = Vec::new();
    loop {
        match out_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(v) => got.extend(v.as_int()),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("queue executor did not close out"),
        }
    }

    got.sort_unstable();
    assert_eq!(got, vec![1, 2, 3]);
}

#[test]
fn priorities_count_stops_after_n_truthy_rules() {
    let rules = br#"<rondel>
      <ruleset name="first-wins" filterTypes="T2" dataKey="D" prioritiesCount="1">
        <rule name="p3" priority="3"><r>gt .D.demo.T2.B 0 | .D.demo.T2.SetA 13</r></rule>
        <rule name="p1" priority="1"><r>gt .D.demo.T2.B 0 | .D.demo.T2.SetA 11</r></rule>
        <rule name="p2" priority="2"><r>gt .D.demo.T2.B 0 | .D.demo.T2.SetA 12</r></rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 0, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[t2.value()]);

    // Only the priority-1 rule fired.
    assert_eq!(t2.with(|v| v.a), 11);
    assert_eq!(parser.rulesets()[0].limit, Limit::Count(1));
}

#[test]
fn priorities_count_zero_evaluates_nothing() {
    let rules = br#"<rondel>
      <ruleset name="none-win" filterTypes="T2" dataKey="D" prioritiesCount="0">
        <rule name="p1" priority="1"><r>gt .D.demo.T2.B 0 | .D.demo.T2.SetA 11</r></rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 0, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[t2.value()]);

    assert_eq!(t2.with(|v| v.a), 0);
    assert_eq!(parser.rulesets()[0].limit, Limit::Count(0));
}

#[test]
fn rules_evaluate_in_ascending_priority_order() {
    let rules = br#"<rondel>
      <ruleset name="ordered" filterTypes="T2" dataKey="D">
        <rule name="c" priority="30"><r>.D.result.Put (add .D.demo.T2.A 3)</r></rule>
        <rule name="a" priority="10"><r>.D.result.Put (add .D.demo.T2.A 1)</r></rule>
        <rule name="b" priority="20"><r>.D.result.Put (add .D.demo.T2.A 2)</r></rule>
      </ruleset>
    </rondel>"#;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let parser = Parser::with_callback(rules, move |v| seen2.lock().unwrap().push(v), "").unwrap();

    let t2 = Shared::new(T2 { a: 0, b: 0 });
    parser.execute(&[t2.value()]);

    let got: Vec<i64> = seen.lock().unwrap().iter().filter_map(Value::as_int).collect();
    assert_eq!(got, vec![1, 2, 3]);
}

#[test]
fn strict_type_filter_blocks_side_effects() {
    let rules = br#"<rondel>
      <ruleset name="strict" filterTypes="T2,Person" filterStrict="true" dataKey="D">
        <rule name="setA"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r></rule>
      </ruleset>
    </rondel>"#;

    let parser = Parser::simple(rules, "").unwrap();

    // Observed Company is not a filter member: strict gate fails.
    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let company = Shared::new(Company { name: "acme".to_string() });
    parser.execute(&[t2.value(), company.value()]);
    assert_eq!(t2.with(|v| v.a), 1);

    // Matching types pass.
    let person = Shared::new(Person::new(1, 4));
    parser.execute(&[t2.value(), person.value()]);
    assert_eq!(t2.with(|v| v.a), 5);
}

#[test]
fn lax_filter_needs_only_one_matching_type() {
    let rules = br#"<rondel>
      <ruleset name="lax" filterTypes="T2,string" dataKey="D">
        <rule name="open"><r>eq .D.string1 `go`</r></rule>
      </ruleset>
    </rondel>"#;

    let parser = Parser::simple(rules, "").unwrap();
    // int is not a filter member but string is; the ruleset runs.
    parser.execute(&[Value::Int(1), Value::from("go")]);
}

#[test]
fn rule_expecting_absent_type_is_skipped() {
    let rules = br#"<rondel>
      <ruleset name="mixed" filterTypes="T2,Person" dataKey="D">
        <rule name="needsPerson" priority="1">
          <r>gt .D.hr.Person.Age 0 | .D.hr.Person.SetAge 99</r>
        </rule>
        <rule name="needsT2" priority="2">
          <r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r>
        </rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    // Only a T2 is supplied: the Person rule skips, the T2 rule fires.
    parser.execute(&[t2.value()]);
    assert_eq!(t2.with(|v| v.a), 5);
}

#[test]
fn broken_rule_does_not_poison_the_ruleset() {
    let rules = br#"<rondel>
      <ruleset name="resilient" filterTypes="T2" dataKey="D">
        <rule name="badFunc" priority="1"><r>nosuchfunc .D.demo.T2.A</r></rule>
        <rule name="badPath" priority="2"><r>eq .D.demo.T2.Nope 1</r></rule>
        <rule name="notBool" priority="3"><r>add 1 2</r></rule>
        <rule name="good" priority="4"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r></rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[t2.value()]);

    assert_eq!(t2.with(|v| v.a), 5);
    let rules = &parser.rulesets()[0].rules;
    assert!(rules[0].template_err.is_some());
    assert!(rules[1].template_err.is_none());
}

#[test]
fn result_reference_without_sink_skips_rule() {
    let rules = br#"<rondel>
      <ruleset name="no-sink" filterTypes="T2" dataKey="D">
        <rule name="put" priority="1"><r>.D.result.Put .D.demo.T2.A</r></rule>
        <rule name="set" priority="2"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r></rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[t2.value()]);

    assert!(parser.rulesets()[0].rules[0].no_result_func);
    assert_eq!(t2.with(|v| v.a), 5);
}

#[test]
fn user_functions_override_and_extend() {
    let rules = br#"<rondel>
      <ruleset name="custom" filterTypes="T2" dataKey="D">
        <rule name="useCustom"><r>isAnswer .D.demo.T2.A | .D.demo.T2.SetA 1</r></rule>
      </ruleset>
    </rondel>"#;

    let user_funcs = funcmap! {
        "isAnswer" => |args: &[Value]| {
            if !prev_ok(args) {
                return false;
            }
            args.first().and_then(Value::as_int) == Some(42)
        },
    };

    let t2 = Shared::new(T2 { a: 42, b: 0 });
    let parser = Parser::from_bytes(rules, Options { user_funcs, ..Options::default() }).unwrap();
    parser.execute(&[t2.value()]);
    assert_eq!(t2.with(|v| v.a), 1);
}

#[test]
fn scratch_state_crosses_rules() {
    let rules = br#"<rondel>
      <ruleset name="stateful" filterTypes="T2" dataKey="D">
        <rule name="mark" priority="1"><r>.D.R.Set `flag` 7</r></rule>
        <rule name="read" priority="2"><r>eq (.D.R.Get `flag`) 7 | .D.demo.T2.SetA 5</r></rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::simple(rules, "").unwrap();
    parser.execute(&[t2.value()]);
    assert_eq!(t2.with(|v| v.a), 5);
}

#[test]
fn custom_delimiters() {
    let rules = br#"<rondel>
      <ruleset name="bracketed" filterTypes="T2" dataKey="D">
        <rule name="set">[[eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5]]</rule>
      </ruleset>
    </rondel>"#;

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    let parser = Parser::from_bytes(
        rules,
        Options { delim_left: "[[".to_string(), delim_right: "]]".to_string(), ..Options::default() },
    )
    .unwrap();
    parser.execute(&[t2.value()]);
    assert_eq!(t2.with(|v| v.a), 5);
}

#[test]
fn if_blocks_as_rule_bodies() {
    let rules = br#"<rondel>
      <ruleset name="conditional" filterTypes="T2" dataKey="D">
        <rule name="branchy"><r>if in .D.demo.T2.A 1 3</r>true<r>else</r>false<r>end</r></rule>
      </ruleset>
    </rondel>"#;

    let parser = Parser::simple(rules, "").unwrap();
    let t2 = Shared::new(T2 { a: 2, b: 0 });
    parser.execute(&[t2.value()]);
    // No observable side effect; the point is that the document compiles
    // and renders a boolean.
    assert!(parser.rulesets()[0].rules[0].template_err.is_none());
}

#[test]
fn compile_is_idempotent() {
    let rules = br#"<rondel>
      <ruleset name="set" filterTypes="T2,Person" dataKey="D" workflow="ipl2020">
        <rule name="b" priority="2"><r>eq .D.demo.T2.B 2</r></rule>
        <rule name="a" priority="1"><r>eq .D.demo.T2.A 1</r></rule>
      </ruleset>
    </rondel>"#;

    let opts = || Options {
        workflow_pattern: "ipl*".to_string(),
        wildcard_workflow_pattern: true,
        ..Options::default()
    };
    let one = Parser::from_bytes(rules, opts()).unwrap();
    let two = Parser::from_bytes(rules, opts()).unwrap();

    for (a, b) in one.rulesets().iter().zip(two.rulesets()) {
        assert_eq!(a.workflow_match, b.workflow_match);
        assert_eq!(a.filter_types_arr, b.filter_types_arr);
        let names_a: Vec<&str> = a.rules.iter().map(|r| r.name.as_str()).collect();
        let names_b: Vec<&str> = b.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names_a, names_b);
        assert_eq!(names_a, vec!["a", "b"]);
        for (ra, rb) in a.rules.iter().zip(&b.rules) {
            assert_eq!(ra.expected_types, rb.expected_types);
        }
    }
}

#[test]
fn replace_swaps_rules_atomically() {
    let before = br#"<rondel>
      <ruleset name="set" filterTypes="T2" dataKey="D">
        <rule name="five"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 5</r></rule>
      </ruleset>
    </rondel>"#;
    let after = br#"<rondel>
      <ruleset name="set" filterTypes="T2" dataKey="D">
        <rule name="seven"><r>eq .D.demo.T2.A 1 | .D.demo.T2.SetA 7</r></rule>
      </ruleset>
    </rondel>"#;

    let mut parser = Parser::simple(before, "").unwrap();
    parser.replace(after).unwrap();

    let t2 = Shared::new(T2 { a: 1, b: 2 });
    parser.execute(&[t2.value()]);
    assert_eq!(t2.with(|v| v.a), 7);

    // A bad document leaves the current rules in place.
    assert!(parser.replace(b"<rondel><ruleset dataKey=\"D\"></ruleset></rondel>").is_err());
    let t3 = Shared::new(T2 { a: 1, b: 2 });
    parser.execute(&[t3.value()]);
    assert_eq!(t3.with(|v| v.a), 7);
}

#[test]
fn missing_required_attributes_are_fatal() {
    let no_filter = br#"<rondel><ruleset name="x" dataKey="D"></ruleset></rondel>"#;
    assert!(Parser::simple(no_filter, "").is_err());

    let no_data_key = br#"<rondel><ruleset name="x" filterTypes="T2"></ruleset></rondel>"#;
    assert!(Parser::simple(no_data_key, "").is_err());

    let bad_first_char = br#"<rondel><ruleset name="x" filterTypes="9T" dataKey="D"></ruleset></rondel>"#;
    assert!(Parser::simple(bad_first_char, "").is_err());

    let bad_count =
        br#"<rondel><ruleset name="x" filterTypes="T2" dataKey="D" prioritiesCount="many"></ruleset></rondel>"#;
    assert!(Parser::simple(bad_count, "").is_err());
}
