//! # Blueprint Macro Expansion
//!
//! Edit-time macro nodes for Pulsar blueprint graphs and the compile step that
//! lowers them to primitives.
//!
//! - [`graph`]: the graph document, pin type system and connection schema
//! - [`nodes`]: primitive node kinds plus the `ForEach`, `MapForEach` and
//!   `BindEvents` macro nodes
//! - [`compiler`]: the expansion pipeline and the helpers expansions share
//! - [`library`]: function signatures, class dispatchers and builtins
//! - [`vm`]: a reference interpreter for expanded graphs
//!
//! ```no_run
//! use blueprint_expansion::{compiler, config::ExpansionConfig, graph::BlueprintGraph, library::FunctionLibrary};
//!
//! let graph = BlueprintGraph::new("Door");
//! let library = FunctionLibrary::with_builtins();
//! let compiled = compiler::expand_graph(&graph, &library, &ExpansionConfig::default())?;
//! assert!(!compiled.has_errors());
//! # Ok::<(), compiler::CompileError>(())
//! ```

/// Check an internal contract. On failure, logs an error and trips a debug
/// assertion; release builds carry on. Evaluates to the condition.
macro_rules! ensure_always {
    ($cond:expr, $($arg:tt)+) => {{
        let ok: bool = $cond;
        if !ok {
            tracing::error!($($arg)+);
            debug_assert!(ok, $($arg)+);
        }
        ok
    }};
}
pub(crate) use ensure_always;

pub mod compiler;
pub mod config;
pub mod graph;
pub mod library;
pub mod logging;
pub mod nodes;
pub mod vm;

pub use compiler::{expand_graph, CompileError, CompiledGraph};
pub use config::ExpansionConfig;
pub use graph::{BlueprintGraph, GraphError, NodeId, PinId, PinType};
pub use library::FunctionLibrary;
pub use vm::{Value, Vm, VmError};
