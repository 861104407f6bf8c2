//! Rule compilation and execution engine.
//!
//! This module is the *public entry point* for the rules engine. It is split
//! into focused submodules under `src/engine/` while keeping public paths
//! stable (for example `crate::engine::Parser`).
//!
//! ## How the parts work together
//!
//! At a high level, one call to `Parser::execute` is a pipeline:
//!
//! ```text
//! rules xml ──┐
//!             │  Parser::from_bytes            (parser.rs)
//!             └── unmarshal ─ compile rules ─ sort by priority
//!                                │
//! values ── Parser::execute ─────┼─ per ruleset, in document order:
//!                                │
//!                                v
//!                  workflow gate + type gate    (ruleset.rs)
//!                                │
//!                                v
//!                  bind values into template dict (binder.rs)
//!                                │
//!                                v
//!                  evaluate rules in priority order
//!                    - render template → "true"/"false"
//!                    - side effects: method dispatch + result sink
//!                    - stop after `limit` truthy rules
//! ```
//!
//! ## Responsibilities by module
//!
//! - `rule.rs`: compiles one templated expression; derives expected types;
//!   retains deferred parse errors; per-rule type gating.
//! - `ruleset.rs`: ordered rule collection; workflow + type gates; the
//!   priority loop with early termination.
//! - `binder.rs`: projects runtime values into the template dictionary
//!   keyed by package/type.
//! - `parser.rs`: owns the rulesets, pools and config; orchestrates compile
//!   and execute; atomic replace.
//! - `executor.rs`: the synchronous fan-out executor and the queue executor
//!   with its bounded worker pool.
//!
//! ## Public surface
//!
//! Most code interacts with the engine via:
//!
//! - [`Parser`]
//! - [`SimpleExecutor`] / [`QueueExecutor`]

#[path = "engine/binder.rs"]
mod binder;
#[path = "engine/executor.rs"]
mod executor;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/rule.rs"]
mod rule;
#[path = "engine/ruleset.rs"]
mod ruleset;

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;

pub use executor::{QueueExecutor, SimpleExecutor};
pub use parser::Parser;
