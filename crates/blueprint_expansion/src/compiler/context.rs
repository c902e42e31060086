//! # Compiler Context
//!
//! State shared by every expansion in one compilation: the function library,
//! the message log, the intermediate nodes spawned so far, and the aliases
//! from intermediate pins back to the user-authored pins they replaced.

use std::collections::HashMap;

use crate::graph::{BlueprintGraph, GraphError, NodeId, PinId};
use crate::library::FunctionLibrary;
use crate::nodes::{self, CallFunctionNode, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub node: Option<NodeId>,
}

/// Diagnostics produced while compiling a graph.
///
/// Messages may contain `@@`, which is replaced by a reference to the node
/// the message is about.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    diagnostics: Vec<Diagnostic>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, graph: &BlueprintGraph, severity: Severity, template: &str, node: NodeId) {
        let reference = match graph.node(node) {
            Some(n) => format!("'{}' ({})", n.title, node),
            None => node.to_string(),
        };
        let message = template.replace("@@", &reference);

        match severity {
            Severity::Error => tracing::error!("[COMPILER] {}", message),
            Severity::Warning => tracing::warn!("[COMPILER] {}", message),
            Severity::Note => tracing::info!("[COMPILER] {}", message),
        }

        self.diagnostics.push(Diagnostic {
            severity,
            message,
            node: Some(node),
        });
    }

    pub fn error(&mut self, graph: &BlueprintGraph, template: &str, node: NodeId) {
        self.push(graph, Severity::Error, template, node);
    }

    pub fn warning(&mut self, graph: &BlueprintGraph, template: &str, node: NodeId) {
        self.push(graph, Severity::Warning, template, node);
    }

    pub fn note(&mut self, graph: &BlueprintGraph, template: &str, node: NodeId) {
        self.push(graph, Severity::Note, template, node);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

pub struct CompilerContext<'a> {
    library: &'a FunctionLibrary,
    pub message_log: MessageLog,
    spawned: Vec<NodeId>,
    /// Intermediate pin -> user pin whose links it took over
    pin_aliases: HashMap<PinId, PinId>,
}

impl<'a> CompilerContext<'a> {
    pub fn new(library: &'a FunctionLibrary) -> Self {
        Self {
            library,
            message_log: MessageLog::new(),
            spawned: Vec::new(),
            pin_aliases: HashMap::new(),
        }
    }

    pub fn library(&self) -> &'a FunctionLibrary {
        self.library
    }

    /// Place an intermediate node for the expansion of `source` and give it
    /// its default pins.
    pub fn spawn_intermediate_node(
        &mut self,
        graph: &mut BlueprintGraph,
        source: NodeId,
        kind: NodeKind,
    ) -> Result<NodeId, GraphError> {
        let node = graph.add_intermediate_node(kind, source);
        nodes::allocate_default_pins(graph, node)?;
        self.spawned.push(node);
        tracing::trace!(
            "[EXPAND] {} spawned {} '{}'",
            source,
            node,
            graph.node(node).map(|n| n.title.as_str()).unwrap_or_default()
        );
        Ok(node)
    }

    /// Spawn a call to a library function by name.
    pub fn spawn_call_function(
        &mut self,
        graph: &mut BlueprintGraph,
        source: NodeId,
        function: &str,
    ) -> Result<NodeId, GraphError> {
        let signature = self.library.signature(function)?.clone();
        self.spawn_intermediate_node(graph, source, NodeKind::CallFunction(CallFunctionNode::new(signature)))
    }

    /// Move every link of `source` onto `intermediate`, leaving `source`
    /// unlinked.
    pub fn move_pin_links_to_intermediate(
        &mut self,
        graph: &mut BlueprintGraph,
        source: PinId,
        intermediate: PinId,
    ) -> Result<(), GraphError> {
        graph.pin_checked(intermediate)?;
        for peer in graph.break_all_pin_links(source) {
            graph.make_link(intermediate, peer)?;
        }
        self.pin_aliases.insert(intermediate, source);
        Ok(())
    }

    /// Link `intermediate` to every peer of `source`; `source` keeps its links.
    pub fn copy_pin_links_to_intermediate(
        &mut self,
        graph: &mut BlueprintGraph,
        source: PinId,
        intermediate: PinId,
    ) -> Result<(), GraphError> {
        graph.pin_checked(intermediate)?;
        for peer in graph.linked_to(source) {
            graph.make_link(intermediate, peer)?;
        }
        self.pin_aliases.insert(intermediate, source);
        Ok(())
    }

    /// The user pin an intermediate pin stands in for.
    pub fn source_pin_for(&self, intermediate: PinId) -> Option<PinId> {
        self.pin_aliases.get(&intermediate).copied()
    }

    pub fn pin_aliases(&self) -> &HashMap<PinId, PinId> {
        &self.pin_aliases
    }

    pub fn spawned_nodes(&self) -> &[NodeId] {
        &self.spawned
    }

    /// Suffix that makes generated names unique to one node.
    pub fn unique_name_suffix(&self, graph: &BlueprintGraph, node: NodeId) -> String {
        match graph.node(node) {
            Some(n) => n.guid.simple().to_string(),
            None => format!("{}", node.0),
        }
    }

    pub(crate) fn into_parts(self) -> (MessageLog, HashMap<PinId, PinId>) {
        (self.message_log, self.pin_aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PinDirection, PinType, Position};
    use crate::nodes::EventNode;

    #[test]
    fn test_message_log_substitutes_node() {
        let mut graph = BlueprintGraph::new("log");
        let node = graph.add_node(NodeKind::Event(EventNode::new("Tick")), Position::default());

        let mut log = MessageLog::new();
        log.error(&graph, "Node @@ is broken.", node);
        log.warning(&graph, "Node @@ looks odd.", node);

        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.diagnostics()[0].message, format!("Node 'Event Tick' ({}) is broken.", node));
    }

    #[test]
    fn test_move_and_copy_links() {
        let library = FunctionLibrary::new();
        let mut ctx = CompilerContext::new(&library);
        let mut graph = BlueprintGraph::new("transfer");
        let a = graph.add_node(NodeKind::Event(EventNode::new("A")), Position::default());
        let b = graph.add_node(NodeKind::Event(EventNode::new("B")), Position::default());
        let source_out = graph.create_pin(a, PinDirection::Output, PinType::int(), "out").unwrap();
        let user_in = graph.create_pin(b, PinDirection::Input, PinType::int(), "in").unwrap();
        let copy_in = graph.create_pin(b, PinDirection::Input, PinType::int(), "copy").unwrap();
        let moved_in = graph.create_pin(b, PinDirection::Input, PinType::int(), "moved").unwrap();
        graph.make_link(source_out, user_in).unwrap();

        ctx.copy_pin_links_to_intermediate(&mut graph, user_in, copy_in).unwrap();
        assert_eq!(graph.linked_to(user_in), vec![source_out]);
        assert_eq!(graph.linked_to(copy_in), vec![source_out]);

        ctx.move_pin_links_to_intermediate(&mut graph, user_in, moved_in).unwrap();
        assert!(graph.linked_to(user_in).is_empty());
        assert_eq!(graph.linked_to(moved_in), vec![source_out]);
        assert_eq!(ctx.source_pin_for(moved_in), Some(user_in));
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        let library = FunctionLibrary::new();
        let mut ctx = CompilerContext::new(&library);
        let mut graph = BlueprintGraph::new("missing");
        let node = graph.add_node(NodeKind::Event(EventNode::new("A")), Position::default());

        let err = ctx.spawn_call_function(&mut graph, node, "Array_Length").unwrap_err();
        assert_eq!(err, GraphError::UnknownFunction("Array_Length".into()));
        assert!(ctx.spawned_nodes().is_empty());
    }
}
