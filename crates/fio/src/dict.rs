//! Dictionary overlay and nested lookup on `serde_json::Value`.

use serde_json::{Map, Value};

/// Overlay `overrides` onto `base` and return the result.
///
/// Mappings present on both sides are merged key by key; every other value
/// (scalars and lists included) is replaced by the override.
pub fn update(overrides: &Value, base: Value) -> Value {
    match (overrides, base) {
        (Value::Object(src), Value::Object(mut dst)) => {
            for (key, value) in src {
                let merged = match dst.remove(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        update(value, existing)
                    }
                    _ => value.clone(),
                };
                dst.insert(key.clone(), merged);
            }
            Value::Object(dst)
        }
        (overrides, _) => overrides.clone(),
    }
}

/// Look up a nested key such as `training/data_dict`.
pub fn get<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(data, |node, segment| node.as_object()?.get(segment))
}

pub fn get_mut<'a>(data: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(data, |node, segment| node.as_object_mut()?.get_mut(segment))
}

/// Nested lookup with a fallback value.
pub fn get_or(data: &Value, path: &str, default: Value) -> Value {
    get(data, path).cloned().unwrap_or(default)
}

/// Return the mapping at `path`, creating empty mappings along the way.
///
/// Returns `None` when a non-mapping value already sits on the path.
pub fn ensure_object<'a>(data: &'a mut Value, path: &str) -> Option<&'a mut Map<String, Value>> {
    let mut node = data;
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        node = node
            .as_object_mut()?
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    node.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_merges_nested_mappings() {
        let base = json!({"dscp": {"sel": [60, 60], "rcut": 6.0}, "fitn": {"neuron": [128]}});
        let overrides = json!({"dscp": {"rcut": 7.0}, "dpin": {"type_map": ["O"]}});

        let merged = update(&overrides, base);
        assert_eq!(merged["dscp"]["rcut"], json!(7.0));
        assert_eq!(merged["dscp"]["sel"], json!([60, 60]));
        assert_eq!(merged["fitn"]["neuron"], json!([128]));
        assert_eq!(merged["dpin"]["type_map"], json!(["O"]));
    }

    #[test]
    fn update_replaces_lists_wholesale() {
        let base = json!({"neuron": [8, 16, 32]});
        let merged = update(&json!({"neuron": [4]}), base);
        assert_eq!(merged["neuron"], json!([4]));
    }

    #[test]
    fn nested_get_and_fallback() {
        let data = json!({"training": {"data_dict": {"water": {"batch_size": 1}}}});
        assert_eq!(
            get(&data, "training/data_dict/water/batch_size"),
            Some(&json!(1))
        );
        assert!(get(&data, "training/missing").is_none());
        assert_eq!(get_or(&data, "model/type_map", json!([])), json!([]));
    }

    #[test]
    fn ensure_object_creates_missing_levels() {
        let mut data = json!({"training": {}});
        ensure_object(&mut data, "training/data_dict")
            .expect("mapping")
            .insert("water".into(), json!({}));
        assert!(get(&data, "training/data_dict/water").is_some());

        let mut blocked = json!({"training": 3});
        assert!(ensure_object(&mut blocked, "training/data_dict").is_none());
    }
}
