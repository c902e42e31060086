use super::{FunctionLibrary, FunctionParam, FunctionSignature};
use crate::vm::{ExecutionTrace, Value, VmError};

pub(super) fn register_all(library: &mut FunctionLibrary) {
    // Math
    library.register(
        FunctionSignature::new("Less_IntInt")
            .pure()
            .param(FunctionParam::input("A", "i32"))
            .param(FunctionParam::input("B", "i32"))
            .returns("bool")
            .with_tooltip("Returns true if A is less than B (A < B)"),
        Some(less_int_int),
    );
    library.register(
        FunctionSignature::new("Add_IntInt")
            .pure()
            .param(FunctionParam::input("A", "i32"))
            .param(FunctionParam::input("B", "i32"))
            .returns("i32")
            .with_tooltip("Addition (A + B)"),
        Some(add_int_int),
    );
    library.register(
        FunctionSignature::new("Subtract_IntInt")
            .pure()
            .param(FunctionParam::input("A", "i32"))
            .param(FunctionParam::input("B", "i32"))
            .returns("i32")
            .with_tooltip("Subtraction (A - B)"),
        Some(subtract_int_int),
    );
    library.register(
        FunctionSignature::new("EqualEqual_IntInt")
            .pure()
            .param(FunctionParam::input("A", "i32"))
            .param(FunctionParam::input("B", "i32"))
            .returns("bool")
            .with_tooltip("Returns true if A is equal to B (A == B)"),
        Some(equal_int_int),
    );

    // Arrays
    library.register(
        FunctionSignature::new("Array_Length")
            .pure()
            .param(FunctionParam::input("TargetArray", "&Vec<?>"))
            .returns("i32")
            .with_tooltip("Get the number of items in an array"),
        Some(array_length),
    );
    library.register(
        FunctionSignature::new("Array_Get")
            .pure()
            .param(FunctionParam::input("TargetArray", "&Vec<?>"))
            .param(FunctionParam::input("Index", "i32"))
            .param(FunctionParam::output("Item", "?"))
            .with_tooltip("Given an array and an index, returns a copy of the item found at that index"),
        Some(array_get),
    );
    library.register(
        FunctionSignature::new("Array_LastIndex")
            .pure()
            .param(FunctionParam::input("TargetArray", "&Vec<?>"))
            .returns("i32")
            .with_tooltip("Get the index of the last element in the array"),
        Some(array_last_index),
    );

    // Maps
    library.register(
        FunctionSignature::new("Map_Keys")
            .param(FunctionParam::input("TargetMap", "&HashMap<?, ?>"))
            .param(FunctionParam::output("Keys", "Vec<?>"))
            .with_tooltip("Outputs an array of all keys present in the map"),
        Some(map_keys),
    );
    library.register(
        FunctionSignature::new("Map_Find")
            .pure()
            .param(FunctionParam::input("TargetMap", "&HashMap<?, ?>"))
            .param(FunctionParam::input("Key", "?"))
            .param(FunctionParam::output("Value", "?"))
            .returns("bool")
            .with_tooltip("Finds the value associated with the provided key"),
        Some(map_find),
    );

    // Diagnostics
    library.register(
        FunctionSignature::new("LogValue")
            .param(FunctionParam::input("Value", "?"))
            .with_tooltip("Records a value in the execution trace"),
        Some(log_value),
    );
}

fn arg(args: &[Value], index: usize) -> Result<&Value, VmError> {
    args.get(index).ok_or(VmError::MissingArgument(index))
}

fn int_pair(args: &[Value]) -> Result<(i64, i64), VmError> {
    Ok((arg(args, 0)?.as_int()?, arg(args, 1)?.as_int()?))
}

fn less_int_int(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let (a, b) = int_pair(args)?;
    Ok(vec![Value::Bool(a < b)])
}

fn add_int_int(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let (a, b) = int_pair(args)?;
    Ok(vec![Value::Int(a.wrapping_add(b))])
}

fn subtract_int_int(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let (a, b) = int_pair(args)?;
    Ok(vec![Value::Int(a.wrapping_sub(b))])
}

fn equal_int_int(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let (a, b) = int_pair(args)?;
    Ok(vec![Value::Bool(a == b)])
}

fn array_length(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let items = arg(args, 0)?.as_array()?;
    Ok(vec![Value::Int(items.len() as i64)])
}

fn array_get(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let items = arg(args, 0)?.as_array()?;
    let index = arg(args, 1)?.as_int()?;
    let item = usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .ok_or(VmError::IndexOutOfBounds {
            index,
            len: items.len(),
        })?;
    Ok(vec![item.clone()])
}

fn array_last_index(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let items = arg(args, 0)?.as_array()?;
    Ok(vec![Value::Int(items.len() as i64 - 1)])
}

fn map_keys(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let entries = arg(args, 0)?.as_map()?;
    let keys = entries.iter().map(|(key, _)| key.clone()).collect();
    Ok(vec![Value::Array(keys)])
}

fn map_find(args: &[Value], _trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let entries = arg(args, 0)?.as_map()?;
    let key = arg(args, 1)?;
    Ok(match entries.iter().find(|(k, _)| k == key) {
        Some((_, value)) => vec![value.clone(), Value::Bool(true)],
        None => vec![Value::None, Value::Bool(false)],
    })
}

fn log_value(args: &[Value], trace: &mut ExecutionTrace) -> Result<Vec<Value>, VmError> {
    let value = arg(args, 0)?.clone();
    tracing::debug!("[VM] LogValue: {}", value);
    trace.logged.push(value);
    Ok(Vec::new())
}
