//! Merge semantics for overlay updates and legacy structural overlays.

use crate::error::{OverlayError, Result};
use serde_json::{Map, Value};

/// HTTP methods recognized as operations under a path item.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Recursively merge `overlay` into `base`.
///
/// Mappings merge key by key, sequences concatenate (overlay items after base items), and any
/// other combination is won by the overlay value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(base_arr), Value::Array(overlay_arr)) => base_arr.extend(overlay_arr),
        (base, overlay) => *base = overlay,
    }
}

/// Apply an action's `update` value to one matched node.
///
/// - sequence node: the update is appended as one new element
/// - mapping node + mapping update: [`deep_merge`]
/// - scalar node: replaced by the update
///
/// # Errors
///
/// Returns [`OverlayError::Action`] when a mapping node receives a non-mapping update.
pub fn apply_update(node: &mut Value, update: &Value) -> Result<()> {
    match node {
        Value::Array(arr) => arr.push(update.clone()),
        Value::Object(_) => {
            if !update.is_object() {
                return Err(OverlayError::Action(format!(
                    "cannot merge {} into an object",
                    kind_name(update)
                )));
            }
            deep_merge(node, update.clone());
        }
        _ => *node = update.clone(),
    }
    Ok(())
}

pub(crate) fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Merge a legacy (version-less) overlay into `base`.
///
/// Only `info`, `paths`, `components`, `tags` and `servers` are considered; everything else in
/// the overlay is ignored and everything the overlay does not mention is left untouched.
pub fn legacy_merge(base: &mut Value, overlay: &Value) {
    let Some(overlay) = overlay.as_object() else {
        return;
    };
    let Some(base) = base.as_object_mut() else {
        return;
    };

    if let Some(Value::Object(info)) = overlay.get("info") {
        if let Value::Object(base_info) = object_slot(base, "info") {
            shallow_merge(base_info, info);
        }
    }

    if let Some(Value::Object(paths)) = overlay.get("paths")
        && let Value::Object(base_paths) = object_slot(base, "paths")
    {
        for (path, item) in paths {
            if let Value::Object(item) = item
                && let Value::Object(base_item) = object_slot(base_paths, path)
            {
                merge_path_item(base_item, item);
            }
        }
    }

    if let Some(Value::Object(components)) = overlay.get("components")
        && let Value::Object(base_components) = object_slot(base, "components")
    {
        for (category, entries) in components {
            match entries {
                Value::Object(entries) => {
                    if let Value::Object(base_entries) = object_slot(base_components, category) {
                        shallow_merge(base_entries, entries);
                    }
                }
                other => {
                    base_components.insert(category.clone(), other.clone());
                }
            }
        }
    }

    if let Some(Value::Array(tags)) = overlay.get("tags")
        && let Value::Array(base_tags) = array_slot(base, "tags")
    {
        for tag in tags {
            upsert_by(base_tags, tag, |a, b| {
                a.get("name").is_some() && a.get("name") == b.get("name")
            });
        }
    }

    if let Some(servers) = overlay.get("servers") {
        base.insert("servers".to_string(), servers.clone());
    }
}

fn merge_path_item(base_item: &mut Map<String, Value>, item: &Map<String, Value>) {
    for (key, value) in item {
        if HTTP_METHODS.contains(&key.as_str()) {
            let Value::Object(op) = value else {
                base_item.insert(key.clone(), value.clone());
                continue;
            };
            if let Value::Object(base_op) = object_slot(base_item, key) {
                merge_operation(base_op, op);
            }
        } else if key == "parameters" {
            merge_parameters(base_item, value);
        } else {
            base_item.insert(key.clone(), value.clone());
        }
    }
}

fn merge_operation(base_op: &mut Map<String, Value>, op: &Map<String, Value>) {
    for (key, value) in op {
        if key == "parameters" {
            merge_parameters(base_op, value);
        } else {
            base_op.insert(key.clone(), value.clone());
        }
    }
}

/// Merge a `parameters` list by `(name, in)` identity: matches are merged, the rest appended.
fn merge_parameters(container: &mut Map<String, Value>, overlay_params: &Value) {
    let Value::Array(overlay_params) = overlay_params else {
        container.insert("parameters".to_string(), overlay_params.clone());
        return;
    };
    if let Value::Array(base_params) = array_slot(container, "parameters") {
        for param in overlay_params {
            upsert_by(base_params, param, same_parameter);
        }
    }
}

fn same_parameter(a: &Value, b: &Value) -> bool {
    let key = |p: &Value| {
        (
            p.get("name").and_then(Value::as_str).map(str::to_string),
            p.get("in").and_then(Value::as_str).map(str::to_string),
        )
    };
    let (name, location) = key(a);
    name.is_some() && location.is_some() && (name, location) == key(b)
}

/// Shallow-merge `item` into the first element of `list` matching it, or append it.
fn upsert_by(list: &mut Vec<Value>, item: &Value, same: impl Fn(&Value, &Value) -> bool) {
    if let Some(existing) = list.iter_mut().find(|e| same(e, item))
        && let (Some(existing), Some(item)) = (existing.as_object_mut(), item.as_object())
    {
        shallow_merge(existing, item);
        return;
    }
    list.push(item.clone());
}

fn shallow_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (k, v) in overlay {
        base.insert(k.clone(), v.clone());
    }
}

/// `map[key]`, created (or replacing a non-mapping value) as an empty mapping if needed.
fn object_slot<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Value {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot
}

/// `map[key]`, created (or replacing a non-sequence value) as an empty sequence if needed.
fn array_slot<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Value {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    slot
}
