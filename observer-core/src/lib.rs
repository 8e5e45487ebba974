//! Observer Core
//!
//! This crate provides a transparent reactivity runtime. Plain data is
//! wrapped in observable views, and functions registered as reactions are
//! re-run automatically when the data they read changes.
//!
//! - Observable views over records, arrays and keyed collections
//! - Automatic dependency tracking, rebuilt on every run
//! - Batched, deferred re-execution with failure isolation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic data model that views decorate
//! - `observable`: tracked views and collection facades
//! - `graph`: the `(object, key) → reactions` dependency registry
//! - `reactive`: reactions, the runtime and deferred execution
//!
//! # Example
//!
//! ```rust,ignore
//! use observer_core::{Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let counter = runtime.observable(serde_json::json!({ "num": 0 }))?;
//! let counter = counter.as_view().unwrap().clone();
//!
//! let reader = counter.clone();
//! runtime.observe(move || println!("num: {:?}", reader.get("num")))?;
//! // prints "num: Number(0.0)"
//!
//! counter.set("num", 1);
//! runtime.run_microtasks();
//! // prints "num: Number(1.0)"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod observable;
pub mod reactive;
pub mod value;

pub use config::{CascadePolicy, RuntimeConfig};
pub use error::{BoxError, Error, Result};
pub use observable::{MapView, Observable, SetView, WeakMapView, WeakSetView, RAW_KEY};
pub use reactive::{
    Executor, MicrotaskQueue, NextTick, Reaction, ReactionId, Runtime, RuntimeBuilder,
    TokioExecutor,
};
pub use value::{Func, Key, Object, Symbol, Value};
