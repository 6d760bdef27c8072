//! Built-in function return types
//!
//! A closed table mapping standard-library function names to the type their
//! call expression is known to produce. Functions whose return type depends
//! on their inputs (`abs`, `max`, `json_decode`, ...) report `dynamic` so
//! the inferencer never over-promises. Unknown names fall through to
//! user-defined function lookup.
//!
//! The table is read-only static data, safe to share across parallel module
//! compilations.

use crate::types::{ConcreteType, InferredType};
use std::collections::HashMap;
use std::sync::LazyLock;

static BUILTIN_RETURN_TYPES: LazyLock<HashMap<&'static str, InferredType>> = LazyLock::new(|| {
    use ConcreteType::*;
    let int = InferredType::Concrete(Int);
    let float = InferredType::Concrete(Float);
    let boolean = InferredType::Concrete(Bool);
    let string = InferredType::Concrete(String);
    let array = InferredType::Concrete(Array);
    let dynamic = InferredType::Dynamic;

    let mut table = HashMap::new();

    // String functions
    table.insert("strlen", int.clone());
    table.insert("substr", string.clone());
    table.insert("str_replace", string.clone());
    table.insert("strtolower", string.clone());
    table.insert("strtoupper", string.clone());
    table.insert("trim", string.clone());
    table.insert("ltrim", string.clone());
    table.insert("rtrim", string.clone());
    table.insert("sprintf", string.clone());
    table.insert("implode", string.clone());
    table.insert("join", string.clone());

    // Array functions
    table.insert("count", int.clone());
    table.insert("sizeof", int.clone());
    table.insert("array_keys", array.clone());
    table.insert("array_values", array.clone());
    table.insert("array_merge", array.clone());
    table.insert("array_map", array.clone());
    table.insert("array_filter", array.clone());
    table.insert("array_slice", array.clone());
    table.insert("array_reverse", array.clone());
    table.insert("array_unique", array.clone());
    table.insert("explode", array.clone());
    table.insert("range", array.clone());
    table.insert("in_array", boolean.clone());
    table.insert("array_key_exists", boolean.clone());

    // Math functions
    table.insert("ceil", float.clone());
    table.insert("floor", float.clone());
    table.insert("round", float.clone());
    table.insert("sqrt", float.clone());
    table.insert("rand", int.clone());
    table.insert("mt_rand", int.clone());

    // Type checks and conversions
    table.insert("gettype", string.clone());
    table.insert("is_int", boolean.clone());
    table.insert("is_integer", boolean.clone());
    table.insert("is_float", boolean.clone());
    table.insert("is_double", boolean.clone());
    table.insert("is_string", boolean.clone());
    table.insert("is_bool", boolean.clone());
    table.insert("is_array", boolean.clone());
    table.insert("is_object", boolean.clone());
    table.insert("is_null", boolean.clone());
    table.insert("is_numeric", boolean.clone());
    table.insert("is_callable", boolean.clone());
    table.insert("isset", boolean.clone());
    table.insert("empty", boolean.clone());
    table.insert("intval", int.clone());
    table.insert("floatval", float.clone());
    table.insert("strval", string.clone());
    table.insert("boolval", boolean.clone());
    table.insert("json_encode", string.clone());

    // Time and filesystem
    table.insert("time", int.clone());
    table.insert("date", string.clone());
    table.insert("file_exists", boolean.clone());
    table.insert("is_file", boolean.clone());
    table.insert("is_dir", boolean.clone());
    table.insert("file_get_contents", string.clone());

    // Output (`print` evaluates to 1)
    table.insert("print", int.clone());
    table.insert("printf", int.clone());

    // Input-dependent return types
    table.insert("abs", dynamic.clone());
    table.insert("max", dynamic.clone());
    table.insert("min", dynamic.clone());
    table.insert("pow", dynamic.clone());
    table.insert("array_search", dynamic.clone());
    table.insert("strtotime", dynamic.clone());
    table.insert("json_decode", dynamic.clone());
    table.insert("file_put_contents", dynamic);

    table
});

/// Return type for a built-in function call, or `None` when the name is not
/// in the table (the caller then consults user-defined functions).
pub fn builtin_return_type(name: &str) -> Option<InferredType> {
    BUILTIN_RETURN_TYPES.get(name).cloned()
}

/// Whether a name belongs to the closed built-in table.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_RETURN_TYPES.contains_key(name)
}
