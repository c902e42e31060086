//! # Function Library
//!
//! Signatures of the functions and event dispatchers that nodes can be built
//! from, plus the native implementations the reference VM calls.
//!
//! Signatures follow the usual blueprint conventions: every formal parameter
//! is flagged as a parameter, outputs carry `is_output`, and pass-by-reference
//! outputs (`is_output && is_reference`) are in/out parameters that show up as
//! inputs on a node. A return value is an output parameter named
//! `ReturnValue`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::{pin_names, GraphError, PinType};
use crate::vm::{ExecutionTrace, Value, VmError};

mod builtins;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamFlags {
    pub is_parameter: bool,
    pub is_output: bool,
    pub is_reference: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    /// Native type name, converted with [`PinType::parse`].
    pub native_type: String,
    pub flags: ParamFlags,
    pub tooltip: Option<String>,
}

impl FunctionParam {
    pub fn input(name: &str, native_type: &str) -> Self {
        Self {
            name: name.to_string(),
            native_type: native_type.to_string(),
            flags: ParamFlags {
                is_parameter: true,
                ..Default::default()
            },
            tooltip: None,
        }
    }

    pub fn output(name: &str, native_type: &str) -> Self {
        Self {
            flags: ParamFlags {
                is_parameter: true,
                is_output: true,
                is_reference: false,
            },
            ..Self::input(name, native_type)
        }
    }

    /// In/out parameter passed by reference.
    pub fn by_ref(name: &str, native_type: &str) -> Self {
        Self {
            flags: ParamFlags {
                is_parameter: true,
                is_output: true,
                is_reference: true,
            },
            ..Self::input(name, native_type)
        }
    }

    pub fn return_value(native_type: &str) -> Self {
        Self::output(pin_names::RETURN_VALUE, native_type)
    }

    pub fn with_tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = Some(tooltip.to_string());
        self
    }

    pub fn pin_type(&self) -> PinType {
        PinType::parse(&self.native_type)
    }

    /// Output-only parameter passed by value.
    pub fn is_value_output(&self) -> bool {
        self.flags.is_output && !self.flags.is_reference
    }

    /// Parameters that a node exposes as input (or pass-through) pins.
    pub fn is_input_pin(&self) -> bool {
        self.flags.is_parameter && !self.is_value_output()
    }

    pub fn is_output_pin(&self) -> bool {
        self.flags.is_parameter && self.is_value_output()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<FunctionParam>,
    pub is_pure: bool,
    pub tooltip: String,
}

impl FunctionSignature {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            is_pure: false,
            tooltip: String::new(),
        }
    }

    pub fn pure(mut self) -> Self {
        self.is_pure = true;
        self
    }

    pub fn param(mut self, param: FunctionParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(self, native_type: &str) -> Self {
        self.param(FunctionParam::return_value(native_type))
    }

    pub fn with_tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = tooltip.to_string();
        self
    }

    pub fn find_param(&self, name: &str) -> Option<&FunctionParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn input_params(&self) -> impl Iterator<Item = &FunctionParam> {
        self.params.iter().filter(|p| p.is_input_pin())
    }

    pub fn output_params(&self) -> impl Iterator<Item = &FunctionParam> {
        self.params.iter().filter(|p| p.is_output_pin())
    }
}

/// A multicast event dispatcher exposed by a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherDescription {
    pub name: String,
    pub signature: Option<FunctionSignature>,
    pub tooltip: String,
}

impl DispatcherDescription {
    pub fn new(name: &str, signature: Option<FunctionSignature>) -> Self {
        Self {
            name: name.to_string(),
            signature,
            tooltip: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescription {
    pub name: String,
    pub dispatchers: Vec<DispatcherDescription>,
}

impl ClassDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dispatchers: Vec::new(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherDescription) -> Self {
        self.dispatchers.push(dispatcher);
        self
    }

    pub fn find_dispatcher(&self, name: &str) -> Option<&DispatcherDescription> {
        self.dispatchers.iter().find(|d| d.name == name)
    }
}

/// Native implementation of a library function.
///
/// Receives the values of the input pins in signature order and returns the
/// values of the output pins in signature order.
pub type NativeFunction = fn(&[Value], &mut ExecutionTrace) -> Result<Vec<Value>, VmError>;

#[derive(Debug, Clone)]
pub struct LibraryFunction {
    pub signature: FunctionSignature,
    pub native: Option<NativeFunction>,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionLibrary {
    functions: HashMap<String, LibraryFunction>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library preloaded with the math, array and map functions the loop
    /// expansions are built from.
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        builtins::register_all(&mut library);
        tracing::debug!("[LIBRARY] Registered {} builtin functions", library.len());
        library
    }

    pub fn register(&mut self, signature: FunctionSignature, native: Option<NativeFunction>) {
        if self.functions.contains_key(&signature.name) {
            tracing::warn!("[LIBRARY] Replacing existing function '{}'", signature.name);
        }
        self.functions
            .insert(signature.name.clone(), LibraryFunction { signature, native });
    }

    pub fn signature(&self, name: &str) -> Result<&FunctionSignature, GraphError> {
        self.functions
            .get(name)
            .map(|f| &f.signature)
            .ok_or_else(|| GraphError::UnknownFunction(name.to_string()))
    }

    pub fn native(&self, name: &str) -> Option<NativeFunction> {
        self.functions.get(name).and_then(|f| f.native)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
