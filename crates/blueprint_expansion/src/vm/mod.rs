//! # Reference Interpreter
//!
//! Walks an expanded graph the way the compiler backend would schedule it:
//! exec links are followed depth first, data pins are evaluated lazily by
//! pulling from their source. Pure function calls are re-evaluated on every
//! read, so loop conditions observe the latest value of their counters.
//!
//! The VM only understands primitive node kinds. Running a graph that still
//! contains macro nodes is an error.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::ExpansionConfig;
use crate::graph::{pin_names, schema, BlueprintGraph, GraphError, NodeId, PinDirection, PinId};
use crate::library::FunctionLibrary;
use crate::nodes::NodeKind;

mod value;
pub use value::Value;

pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("missing argument #{0}")]
    MissingArgument(usize),

    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("expected a {expected} value, found {found}")]
    TypeMismatch { expected: &'static str, found: String },

    #[error("literal '{literal}' is not a valid {pin_type}")]
    InvalidLiteral { literal: String, pin_type: String },

    #[error("no event named '{0}' in the graph")]
    UnknownEvent(String),

    #[error("function '{0}' has no native implementation")]
    MissingImplementation(String),

    #[error("{0} is a macro node that was never expanded")]
    UnexpandedMacro(NodeId),

    #[error("execution exceeded {0} steps")]
    StepLimitExceeded(usize),

    #[error("output {0} was read before its node executed")]
    UnsetOutput(PinId),

    #[error("nothing is bound to '{dispatcher}' on '{object}'")]
    UnboundDispatcher { object: String, dispatcher: String },

    #[error("assignment {0} is not connected to a variable")]
    UnboundVariable(NodeId),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Side effects observable from outside the graph.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    /// Values passed to `LogValue`, in call order.
    pub logged: Vec<Value>,
    /// Every node entered through an exec link, in order.
    pub executed: Vec<NodeId>,
}

enum Frame {
    /// Fire an output exec pin: enter every linked node in link order.
    Follow(PinId),
    Enter(NodeId),
}

pub struct Vm<'g> {
    graph: &'g BlueprintGraph,
    library: &'g FunctionLibrary,
    max_steps: usize,
    variables: HashMap<NodeId, Value>,
    outputs: HashMap<PinId, Value>,
    /// (object, dispatcher) -> custom events to fire on broadcast
    bindings: HashMap<(String, String), Vec<NodeId>>,
    trace: ExecutionTrace,
    steps: usize,
}

impl<'g> Vm<'g> {
    pub fn new(graph: &'g BlueprintGraph, library: &'g FunctionLibrary) -> Self {
        Self {
            graph,
            library,
            max_steps: DEFAULT_MAX_STEPS,
            variables: HashMap::new(),
            outputs: HashMap::new(),
            bindings: HashMap::new(),
            trace: ExecutionTrace::default(),
            steps: 0,
        }
    }

    pub fn from_config(graph: &'g BlueprintGraph, library: &'g FunctionLibrary, config: &ExpansionConfig) -> Self {
        Self::new(graph, library).with_max_steps(config.vm_max_steps)
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    pub fn into_trace(self) -> ExecutionTrace {
        self.trace
    }

    /// Current value of a temporary variable node.
    pub fn variable(&self, node: NodeId) -> Option<&Value> {
        self.variables.get(&node)
    }

    /// Fire the event node named `name` with the given parameter values.
    pub fn run_event(&mut self, name: &str, args: &[(&str, Value)]) -> Result<(), VmError> {
        let graph = self.graph;
        let event = graph
            .nodes()
            .find(|n| matches!(&n.kind, NodeKind::Event(e) if e.name == name))
            .map(|n| n.id)
            .ok_or_else(|| VmError::UnknownEvent(name.to_string()))?;

        tracing::debug!("[VM] Running event '{}' ({})", name, event);
        for (param, value) in args {
            let pin = graph.find_pin(event, param, Some(PinDirection::Output)).ok_or_else(|| {
                GraphError::PinNotFound {
                    node: event,
                    name: param.to_string(),
                }
            })?;
            self.outputs.insert(pin, value.clone());
        }

        let then = graph.find_pin_checked(event, pin_names::THEN)?;
        self.run(then)
    }

    /// Broadcast a dispatcher of `object`, firing every custom event bound to
    /// it in bind order. `args` follow the dispatcher signature.
    pub fn broadcast(&mut self, object: &str, dispatcher: &str, args: &[Value]) -> Result<(), VmError> {
        let key = (object.to_string(), dispatcher.to_string());
        let events = self
            .bindings
            .get(&key)
            .cloned()
            .ok_or_else(|| VmError::UnboundDispatcher {
                object: object.to_string(),
                dispatcher: dispatcher.to_string(),
            })?;

        let graph = self.graph;
        for event in events {
            tracing::debug!("[VM] Broadcasting {}.{} to {}", object, dispatcher, event);
            if let NodeKind::CustomEvent(custom) = &graph.node_checked(event)?.kind {
                for (index, param) in custom.user_pins.iter().enumerate() {
                    let value = args.get(index).cloned().ok_or(VmError::MissingArgument(index))?;
                    if let Some(pin) = graph.find_pin(event, &param.name, Some(PinDirection::Output)) {
                        self.outputs.insert(pin, value);
                    }
                }
            }
            let then = graph.find_pin_checked(event, pin_names::THEN)?;
            self.run(then)?;
        }
        Ok(())
    }

    /// Steps are counted per call, not over the VM lifetime.
    fn run(&mut self, start: PinId) -> Result<(), VmError> {
        self.steps = 0;
        let mut stack = vec![Frame::Follow(start)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Follow(pin) => {
                    let targets = self.graph.linked_to(pin);
                    for target in targets.into_iter().rev() {
                        let owner = self.graph.owner_of(target).ok_or(GraphError::UnknownPin(target))?;
                        stack.push(Frame::Enter(owner));
                    }
                }
                Frame::Enter(node) => {
                    self.steps += 1;
                    if self.steps > self.max_steps {
                        tracing::error!("[VM] Step limit of {} exceeded at {}", self.max_steps, node);
                        return Err(VmError::StepLimitExceeded(self.max_steps));
                    }
                    self.trace.executed.push(node);

                    let next = self.execute_node(node)?;
                    for pin in next.into_iter().rev() {
                        stack.push(Frame::Follow(pin));
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one node and return the exec outputs to fire, in order.
    fn execute_node(&mut self, node: NodeId) -> Result<Vec<PinId>, VmError> {
        let graph = self.graph;
        let n = graph.node_checked(node)?;
        tracing::trace!("[VM] Enter {} '{}'", node, n.title);

        match &n.kind {
            NodeKind::Assignment => {
                let variable_pin = graph.find_pin_checked(node, pin_names::VARIABLE)?;
                let variable = schema::get_input_pin_link(graph, variable_pin)
                    .and_then(|source| graph.owner_of(source))
                    .filter(|owner| {
                        graph
                            .node(*owner)
                            .is_some_and(|o| matches!(o.kind, NodeKind::TemporaryVariable(_)))
                    })
                    .ok_or(VmError::UnboundVariable(node))?;

                let value_pin = graph.find_pin_checked(node, pin_names::VALUE)?;
                let value = self.eval_input(value_pin)?;
                self.variables.insert(variable, value);
                Ok(vec![graph.find_pin_checked(node, pin_names::THEN)?])
            }
            NodeKind::IfThenElse => {
                let condition = graph.find_pin_checked(node, pin_names::CONDITION)?;
                let branch = if self.eval_input(condition)?.as_bool()? {
                    pin_names::THEN
                } else {
                    pin_names::ELSE
                };
                Ok(vec![graph.find_pin_checked(node, branch)?])
            }
            NodeKind::ExecutionSequence { .. } => Ok(self.exec_outputs(node)),
            NodeKind::CallFunction(call) if !call.signature.is_pure => {
                let results = self.call_function(node)?;
                for (pin, value) in results {
                    self.outputs.insert(pin, value);
                }
                Ok(vec![graph.find_pin_checked(node, pin_names::THEN)?])
            }
            NodeKind::AddDelegate(add) => {
                let self_pin = graph.find_pin_checked(node, pin_names::SELF)?;
                let object = self.eval_input(self_pin)?;
                let delegate_pin = graph.find_pin_checked(node, pin_names::DELEGATE)?;
                let event = schema::get_input_pin_link(graph, delegate_pin).and_then(|source| graph.owner_of(source));

                match (object.as_object()?, event) {
                    (Some(object), Some(event)) => {
                        tracing::debug!("[VM] Bound {}.{} to {}", object, add.dispatcher, event);
                        self.bindings
                            .entry((object.to_string(), add.dispatcher.clone()))
                            .or_default()
                            .push(event);
                    }
                    _ => tracing::warn!("[VM] {} has no object or delegate to bind", node),
                }
                Ok(vec![graph.find_pin_checked(node, pin_names::THEN)?])
            }
            kind if kind.is_macro() => Err(VmError::UnexpandedMacro(node)),
            // Pure nodes, variables and events do nothing when entered
            _ => Ok(self.exec_outputs(node)),
        }
    }

    fn exec_outputs(&self, node: NodeId) -> Vec<PinId> {
        self.graph
            .pins_of(node)
            .iter()
            .copied()
            .filter(|pin| {
                self.graph
                    .pin(*pin)
                    .is_some_and(|p| p.is_exec() && p.direction == PinDirection::Output)
            })
            .collect()
    }

    fn eval_input(&mut self, pin: PinId) -> Result<Value, VmError> {
        if let Some(source) = schema::get_input_pin_link(self.graph, pin) {
            return self.eval_output(source);
        }
        let p = self.graph.pin_checked(pin)?;
        Value::from_literal(&p.pin_type, &p.default_value, p.default_object.as_deref())
    }

    fn eval_output(&mut self, pin: PinId) -> Result<Value, VmError> {
        let graph = self.graph;
        let owner = graph.owner_of(pin).ok_or(GraphError::UnknownPin(pin))?;

        match &graph.node_checked(owner)?.kind {
            NodeKind::TemporaryVariable(var) => Ok(self
                .variables
                .get(&owner)
                .cloned()
                .unwrap_or_else(|| Value::default_for(&var.variable_type))),
            NodeKind::CallFunction(call) if call.signature.is_pure => {
                let results = self.call_function(owner)?;
                results
                    .into_iter()
                    .find(|(output, _)| *output == pin)
                    .map(|(_, value)| value)
                    .ok_or(VmError::UnsetOutput(pin))
            }
            _ => self.outputs.get(&pin).cloned().ok_or(VmError::UnsetOutput(pin)),
        }
    }

    /// Evaluate the inputs of a call node, run the native and pair each
    /// result with its output pin.
    fn call_function(&mut self, node: NodeId) -> Result<Vec<(PinId, Value)>, VmError> {
        let graph = self.graph;
        let NodeKind::CallFunction(call) = &graph.node_checked(node)?.kind else {
            return Ok(Vec::new());
        };
        let signature = &call.signature;
        let native = self
            .library
            .native(&signature.name)
            .ok_or_else(|| VmError::MissingImplementation(signature.name.clone()))?;

        let mut args = Vec::new();
        for param in signature.input_params() {
            let pin = graph
                .find_pin(node, &param.name, Some(PinDirection::Input))
                .ok_or_else(|| GraphError::PinNotFound {
                    node,
                    name: param.name.clone(),
                })?;
            args.push(self.eval_input(pin)?);
        }

        let results = native(&args, &mut self.trace)?;
        Ok(signature
            .output_params()
            .zip(results)
            .filter_map(|(param, value)| {
                graph
                    .find_pin(node, &param.name, Some(PinDirection::Output))
                    .map(|pin| (pin, value))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PinType, Position};
    use crate::nodes::{spawn_node, CallFunctionNode, EventNode, TemporaryVariableNode};

    fn call(graph: &mut BlueprintGraph, library: &FunctionLibrary, name: &str) -> NodeId {
        let signature = library.signature(name).unwrap().clone();
        spawn_node(graph, NodeKind::CallFunction(CallFunctionNode::new(signature)), Position::default()).unwrap()
    }

    fn pin(graph: &BlueprintGraph, node: NodeId, name: &str) -> PinId {
        graph.find_pin_checked(node, name).unwrap()
    }

    #[test]
    fn test_branch_and_log() {
        let library = FunctionLibrary::with_builtins();
        let mut graph = BlueprintGraph::new("vm");
        let event = spawn_node(
            &mut graph,
            NodeKind::Event(EventNode::new("BeginPlay").with_param("Flag", PinType::boolean())),
            Position::default(),
        )
        .unwrap();
        let branch = spawn_node(&mut graph, NodeKind::IfThenElse, Position::default()).unwrap();
        let log_true = call(&mut graph, &library, "LogValue");
        let log_false = call(&mut graph, &library, "LogValue");
        graph.set_default_value(pin(&graph, log_true, "Value"), "\"yes\"").unwrap();
        graph.set_default_value(pin(&graph, log_false, "Value"), "\"no\"").unwrap();

        graph.make_link(pin(&graph, event, "then"), pin(&graph, branch, "execute")).unwrap();
        graph.make_link(pin(&graph, event, "Flag"), pin(&graph, branch, "Condition")).unwrap();
        graph.make_link(pin(&graph, branch, "then"), pin(&graph, log_true, "execute")).unwrap();
        graph.make_link(pin(&graph, branch, "else"), pin(&graph, log_false, "execute")).unwrap();

        let mut vm = Vm::new(&graph, &library);
        vm.run_event("BeginPlay", &[("Flag", Value::Bool(false))]).unwrap();
        vm.run_event("BeginPlay", &[("Flag", Value::Bool(true))]).unwrap();
        assert_eq!(
            vm.trace().logged,
            vec![Value::String("no".to_string()), Value::String("yes".to_string())]
        );
    }

    #[test]
    fn test_assignment_updates_variable() {
        let library = FunctionLibrary::with_builtins();
        let mut graph = BlueprintGraph::new("vm");
        let event = spawn_node(&mut graph, NodeKind::Event(EventNode::new("Tick")), Position::default()).unwrap();
        let counter = spawn_node(
            &mut graph,
            NodeKind::TemporaryVariable(TemporaryVariableNode::new(PinType::int())),
            Position::default(),
        )
        .unwrap();
        let assign = spawn_node(&mut graph, NodeKind::Assignment, Position::default()).unwrap();
        let add = call(&mut graph, &library, "Add_IntInt");

        graph.make_link(pin(&graph, event, "then"), pin(&graph, assign, "execute")).unwrap();
        let (assign_var, counter_var) = (pin(&graph, assign, "Variable"), pin(&graph, counter, "Variable"));
        schema::try_create_connection(&mut graph, assign_var, counter_var);
        graph.make_link(pin(&graph, counter, "Variable"), pin(&graph, add, "A")).unwrap();
        graph.set_default_value(pin(&graph, add, "B"), "5").unwrap();
        graph.make_link(pin(&graph, add, "ReturnValue"), pin(&graph, assign, "Value")).unwrap();

        let mut vm = Vm::new(&graph, &library);
        vm.run_event("Tick", &[]).unwrap();
        vm.run_event("Tick", &[]).unwrap();
        assert_eq!(vm.variable(counter), Some(&Value::Int(10)));
    }

    #[test]
    fn test_sequence_fires_outputs_in_order() {
        let library = FunctionLibrary::with_builtins();
        let mut graph = BlueprintGraph::new("vm");
        let event = spawn_node(&mut graph, NodeKind::Event(EventNode::new("Go")), Position::default()).unwrap();
        let sequence = spawn_node(&mut graph, NodeKind::ExecutionSequence { outputs: 2 }, Position::default()).unwrap();
        let first = call(&mut graph, &library, "LogValue");
        let second = call(&mut graph, &library, "LogValue");
        graph.set_default_value(pin(&graph, first, "Value"), "1").unwrap();
        graph.set_default_value(pin(&graph, second, "Value"), "2").unwrap();

        graph.make_link(pin(&graph, event, "then"), pin(&graph, sequence, "execute")).unwrap();
        graph.make_link(pin(&graph, sequence, "then_1"), pin(&graph, second, "execute")).unwrap();
        graph.make_link(pin(&graph, sequence, "then_0"), pin(&graph, first, "execute")).unwrap();

        let mut vm = Vm::new(&graph, &library);
        vm.run_event("Go", &[]).unwrap();
        assert_eq!(vm.trace().logged, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_step_limit_stops_infinite_loops() {
        let library = FunctionLibrary::with_builtins();
        let mut graph = BlueprintGraph::new("vm");
        let event = spawn_node(&mut graph, NodeKind::Event(EventNode::new("Spin")), Position::default()).unwrap();
        let branch = spawn_node(&mut graph, NodeKind::IfThenElse, Position::default()).unwrap();
        graph.make_link(pin(&graph, event, "then"), pin(&graph, branch, "execute")).unwrap();
        graph.make_link(pin(&graph, branch, "then"), pin(&graph, branch, "execute")).unwrap();

        let mut vm = Vm::new(&graph, &library).with_max_steps(50);
        assert_eq!(vm.run_event("Spin", &[]), Err(VmError::StepLimitExceeded(50)));
    }

    #[test]
    fn test_unknown_event_and_unbound_dispatcher() {
        let library = FunctionLibrary::with_builtins();
        let graph = BlueprintGraph::new("empty");
        let mut vm = Vm::new(&graph, &library);
        assert_eq!(vm.run_event("Nope", &[]), Err(VmError::UnknownEvent("Nope".to_string())));
        assert!(matches!(vm.broadcast("Door", "OnOpened", &[]), Err(VmError::UnboundDispatcher { .. })));
    }
}
