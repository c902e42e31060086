//! # Blueprint Macro Expansion Pipeline
//!
//! Turns an authored graph into one the backend can consume: every macro
//! node is validated and replaced by primitive intermediate nodes.
//!
//! ## Pipeline
//!
//! 1. **Clone**: the authored graph is never touched
//! 2. **Expand**: every pending macro node is expanded, in node order
//! 3. **Repeat**: expansions may spawn further macro nodes (a map loop spawns
//!    an array loop), so passes repeat until none are pending
//!
//! Validation failures are not compile failures. They end up in the
//! [`MessageLog`] and the offending node is dissolved without replacement.

use std::collections::HashMap;

use itertools::Itertools;
use thiserror::Error;

use crate::config::ExpansionConfig;
use crate::graph::{BlueprintGraph, GraphError, PinId};
use crate::library::FunctionLibrary;
use crate::nodes::{self, ExpansionOutcome};

pub mod context;
pub mod utils;


pub use context::{CompilerContext, Diagnostic, MessageLog, Severity};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("macro nodes still pending after {0} expansion passes")]
    PassLimitExceeded(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilationStats {
    pub passes: usize,
    pub expanded: usize,
    pub rejected: usize,
    pub spawned_nodes: usize,
}

/// Result of [`expand_graph`].
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub graph: BlueprintGraph,
    pub message_log: MessageLog,
    pub stats: CompilationStats,
    /// Intermediate pin -> authored pin whose links it took over
    pub pin_aliases: HashMap<PinId, PinId>,
}

impl CompiledGraph {
    pub fn has_errors(&self) -> bool {
        self.message_log.has_errors()
    }
}

/// Expand every macro node of `graph` into primitives.
pub fn expand_graph(
    graph: &BlueprintGraph,
    library: &FunctionLibrary,
    config: &ExpansionConfig,
) -> Result<CompiledGraph, CompileError> {
    tracing::info!("[COMPILER] Expanding graph '{}' ({} nodes)", graph.name, graph.node_count());

    let mut expanded = graph.clone();
    let mut ctx = CompilerContext::new(library);
    let mut stats = CompilationStats::default();

    loop {
        let pending: Vec<_> = expanded
            .nodes()
            .filter(|n| n.kind.is_pending_expansion())
            .map(|n| n.id)
            .collect();
        if pending.is_empty() {
            break;
        }
        if stats.passes >= config.max_expansion_passes {
            tracing::error!(
                "[COMPILER] {} macro node(s) still pending after {} passes",
                pending.len(),
                stats.passes
            );
            return Err(CompileError::PassLimitExceeded(config.max_expansion_passes));
        }

        stats.passes += 1;
        tracing::debug!("[COMPILER] Pass {}: expanding {}", stats.passes, pending.iter().join(", "));

        for node in pending {
            match nodes::expand_node(&mut expanded, &mut ctx, node)? {
                Some(ExpansionOutcome::Expanded { spawned }) => {
                    stats.expanded += 1;
                    stats.spawned_nodes += spawned;
                }
                Some(ExpansionOutcome::Rejected) => stats.rejected += 1,
                None => {}
            }
        }
    }

    let (message_log, pin_aliases) = ctx.into_parts();
    tracing::info!(
        "[COMPILER] Done: {} expanded, {} rejected, {} intermediate nodes, {} error(s)",
        stats.expanded,
        stats.rejected,
        stats.spawned_nodes,
        message_log.error_count()
    );

    Ok(CompiledGraph {
        graph: expanded,
        message_log,
        stats,
        pin_aliases,
    })
}
