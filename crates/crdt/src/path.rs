// SPDX-License-Identifier: MIT

//! Path segments, the stable `pathKey` encoding, and the JSON tree
//! mutations the apply algorithm needs (§4.6 "Path write rules").

use serde_json::{Map, Value};

use crate::error::CrdtError;

/// Validate that every segment is a non-negative integer or a string, the
/// only two shapes `set`/`del` accept.
pub fn validate(path: &[Value]) -> Result<(), CrdtError> {
    for segment in path {
        match segment {
            Value::Number(n) if n.as_u64().is_some() => {}
            Value::String(_) => {}
            other => return Err(CrdtError::InvalidPath(other.to_string())),
        }
    }
    Ok(())
}

/// Stable encoding distinguishing numeric from string segments so `"1"` and
/// `1` never collide as LWW/tombstone keys.
pub fn path_key(path: &[Value]) -> String {
    path.iter()
        .map(|segment| match segment {
            Value::Number(n) => format!("#{}", n.as_u64().unwrap_or_default()),
            Value::String(s) => format!(".{s}"),
            _ => String::new(),
        })
        .collect::<Vec<_>>()
        .join("\u{0}")
}

/// `pathKey` of every non-empty prefix of `path`, shortest first — used for
/// parent-tombstone detection.
pub fn prefixes(path: &[Value]) -> Vec<String> {
    (1..path.len()).map(|end| path_key(&path[..end])).collect()
}

/// Write `value` at `path`, padding arrays with `null` and creating objects
/// as needed (§4.6 "Path write rules"). `path = []` replaces the root.
pub fn write_at(root: &mut Value, path: &[Value], value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }

    let mut current = root;
    for segment in &path[..path.len() - 1] {
        current = step_into(current, segment);
    }
    assign(current, &path[path.len() - 1], value);
}

/// Set the document to `null` (`path = []`) or null-out/remove the subtree
/// at `path`, tolerating a path that doesn't exist yet (nothing to do).
pub fn remove_subtree(root: &mut Value, path: &[Value]) {
    if path.is_empty() {
        *root = Value::Null;
        return;
    }

    let mut current = root;
    for segment in &path[..path.len() - 1] {
        current = match peek_into(current, segment) {
            Some(next) => next,
            None => return,
        };
    }

    match &path[path.len() - 1] {
        Value::Number(n) => {
            let idx = n.as_u64().unwrap_or_default() as usize;
            if let Some(arr) = current.as_array_mut() {
                if idx < arr.len() {
                    arr[idx] = Value::Null;
                }
            }
        }
        Value::String(key) => {
            if let Some(obj) = current.as_object_mut() {
                obj.remove(key);
            }
        }
        _ => {}
    }
}

fn step_into<'a>(current: &'a mut Value, segment: &Value) -> &'a mut Value {
    match segment {
        Value::Number(n) => {
            let idx = n.as_u64().unwrap_or_default() as usize;
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            let arr = current.as_array_mut().expect("just coerced to array");
            if arr.len() <= idx {
                arr.resize(idx + 1, Value::Null);
            }
            &mut arr[idx]
        }
        Value::String(key) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current.as_object_mut().expect("just coerced to object").entry(key.clone()).or_insert(Value::Null)
        }
        _ => current,
    }
}

fn peek_into<'a>(current: &'a mut Value, segment: &Value) -> Option<&'a mut Value> {
    match segment {
        Value::Number(n) => {
            let idx = n.as_u64().unwrap_or_default() as usize;
            current.as_array_mut().and_then(|arr| arr.get_mut(idx))
        }
        Value::String(key) => current.as_object_mut().and_then(|obj| obj.get_mut(key)),
        _ => None,
    }
}

fn assign(current: &mut Value, segment: &Value, value: Value) {
    match segment {
        Value::Number(n) => {
            let idx = n.as_u64().unwrap_or_default() as usize;
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            let arr = current.as_array_mut().expect("just coerced to array");
            if arr.len() <= idx {
                arr.resize(idx + 1, Value::Null);
            }
            arr[idx] = value;
        }
        Value::String(key) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current.as_object_mut().expect("just coerced to object").insert(key.clone(), value);
        }
        _ => {}
    }
}
