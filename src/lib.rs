extern crate self as rondel;

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod funcs;
pub mod logging;
mod pool;
mod sink;
mod template;
mod value;
mod wildcard;

pub use api::Options;
pub use engine::{Parser, QueueExecutor, SimpleExecutor};
pub use error::{Error, EvalError};
pub use funcs::{Func, FuncMap, FuncReturn, func, validate_funcs};
pub use sink::{CallbackSink, QueueItem, QueueSink, ResultSink};
pub use template::ParseError;
pub use value::{Dict, Reflect, Scratch, Shared, StructRef, Value, prev_ok};
