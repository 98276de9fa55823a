//! JSON <-> JavaScript value conversions.
//!
//! Dispatch arguments arrive as JSON and are handed to handlers as
//! JavaScript values; handler results travel back the other way.
//!
//! | JSON | JavaScript |
//! |------|------------|
//! | null | null (`undefined` also maps to null) |
//! | boolean | Boolean |
//! | number | Number (integral values stay integers) |
//! | string | String |
//! | array | Array |
//! | object | Object (symbol keys skipped) |
//!
//! Functions and symbols become `null`. Cyclic structures and nesting
//! deeper than [`MAX_DEPTH`] are errors.

use boa_engine::{
    js_string,
    object::{builtins::JsArray, JsObject},
    property::PropertyKey,
    value::JsValue,
    Context,
};
use hostweb_common::{HostwebError, Result};
use serde_json::Value as JsonValue;

/// Largest integer a JavaScript number represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Deepest nesting of arrays and objects converted back to JSON.
pub const MAX_DEPTH: usize = 256;

pub fn json_to_js_value(json: JsonValue, ctx: &mut Context) -> Result<JsValue> {
    match json {
        JsonValue::Null => Ok(JsValue::null()),
        JsonValue::Bool(b) => Ok(JsValue::new(b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                return Ok(JsValue::new(i));
            }
            n.as_f64()
                .map(JsValue::new)
                .ok_or_else(|| HostwebError::JavaScriptExecution("Number out of range".into()))
        }
        JsonValue::String(s) => Ok(JsValue::new(js_string!(s))),
        JsonValue::Array(arr) => {
            let js_array = JsArray::new(ctx);
            for (i, v) in arr.into_iter().enumerate() {
                let js_value = json_to_js_value(v, ctx)?;
                js_array.push(js_value, ctx).map_err(|e| {
                    HostwebError::JavaScriptExecution(format!(
                        "Failed to push array element {}: {}",
                        i, e
                    ))
                })?;
            }
            Ok(js_array.into())
        }
        JsonValue::Object(obj) => {
            let js_obj = JsObject::with_object_proto(ctx.intrinsics());
            for (key, value) in obj {
                let js_value = json_to_js_value(value, ctx)?;
                js_obj
                    .create_data_property_or_throw(js_string!(key.clone()), js_value, ctx)
                    .map_err(|e| {
                        HostwebError::JavaScriptExecution(format!(
                            "Failed to set property '{}': {}",
                            key, e
                        ))
                    })?;
            }
            Ok(js_obj.into())
        }
    }
}

pub fn js_value_to_json(value: JsValue, ctx: &mut Context) -> Result<JsonValue> {
    to_json(value, &mut Vec::new(), ctx)
}

/// `ancestors` holds the objects currently being converted, outermost first.
fn to_json(value: JsValue, ancestors: &mut Vec<JsObject>, ctx: &mut Context) -> Result<JsonValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(JsonValue::Null);
    }

    if let Some(b) = value.as_boolean() {
        return Ok(JsonValue::Bool(b));
    }

    if let Some(i) = value.as_i32() {
        return Ok(JsonValue::Number(i.into()));
    }

    if let Some(n) = value.as_number() {
        if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
            return Ok(JsonValue::Number((n as i64).into()));
        }
        // NaN and the infinities have no JSON form; JSON.stringify uses null.
        return Ok(serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null));
    }

    if let Some(s) = value.as_string() {
        return Ok(JsonValue::String(s.to_std_string_escaped()));
    }

    let Some(obj) = value.as_object().map(|obj| obj.clone()) else {
        return Ok(JsonValue::Null);
    };

    if obj.is_callable() {
        return Ok(JsonValue::Null);
    }

    if ancestors.iter().any(|seen| JsObject::equals(seen, &obj)) {
        return Err(HostwebError::JavaScriptExecution(
            "Cannot convert a cyclic object value".into(),
        ));
    }
    if ancestors.len() >= MAX_DEPTH {
        return Err(HostwebError::JavaScriptExecution(format!(
            "Value nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    ancestors.push(obj.clone());
    let converted = container_to_json(&obj, ancestors, ctx);
    ancestors.pop();
    converted
}

fn container_to_json(
    obj: &JsObject,
    ancestors: &mut Vec<JsObject>,
    ctx: &mut Context,
) -> Result<JsonValue> {
    if obj.is_array() {
        let array = JsArray::from_object(obj.clone()).map_err(|e| {
            HostwebError::JavaScriptExecution(format!("Object is not a valid array: {}", e))
        })?;

        let length = array
            .length(ctx)
            .map_err(|e| {
                HostwebError::JavaScriptExecution(format!("Failed to get array length: {}", e))
            })?
            .try_into()
            .map_err(|_| HostwebError::JavaScriptExecution("Array length overflow".into()))?;

        let mut result = Vec::with_capacity(length);
        for i in 0..length {
            let elem = array.get(i, ctx).map_err(|e| {
                HostwebError::JavaScriptExecution(format!(
                    "Failed to get array element {}: {}",
                    i, e
                ))
            })?;
            result.push(to_json(elem, ancestors, ctx)?);
        }
        return Ok(JsonValue::Array(result));
    }

    let keys = obj.own_property_keys(ctx).map_err(|e| {
        HostwebError::JavaScriptExecution(format!("Failed to get object keys: {}", e))
    })?;

    let mut result = serde_json::Map::new();
    for key in keys {
        let key_str = match &key {
            PropertyKey::String(s) => s.to_std_string_escaped(),
            PropertyKey::Index(i) => i.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let prop_value = obj.get(key.clone(), ctx).map_err(|e| {
            HostwebError::JavaScriptExecution(format!(
                "Failed to get property '{}': {}",
                key_str, e
            ))
        })?;
        result.insert(key_str, to_json(prop_value, ancestors, ctx)?);
    }

    Ok(JsonValue::Object(result))
}
