//! Recursive, right-biased JSON merge.

use serde_json::Value;

/// Key-wise union of two JSON values. For each key in `overlay`, if both
/// sides hold objects the merge recurses; otherwise the overlay value
/// replaces the base wholesale. Arrays are never element-merged, so a
/// regenerated model list always displaces whatever the subprocess left
/// behind.
pub fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut out = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.get(key) {
                    Some(base_value)
                        if base_value.is_object() && overlay_value.is_object() =>
                    {
                        merge_values(base_value, overlay_value)
                    }
                    _ => overlay_value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        _ => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_wins_scalar_conflicts() {
        let merged = merge_values(&json!({"a": 1, "b": 2}), &json!({"b": 3}));
        assert_eq!(merged, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let merged = merge_values(
            &json!({"outer": {"keep": true, "swap": "old"}}),
            &json!({"outer": {"swap": "new"}}),
        );
        assert_eq!(merged, json!({"outer": {"keep": true, "swap": "new"}}));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let merged = merge_values(
            &json!({"models": [{"id": "a"}, {"id": "b"}]}),
            &json!({"models": [{"id": "c"}]}),
        );
        assert_eq!(merged, json!({"models": [{"id": "c"}]}));
    }

    #[test]
    fn merge_is_idempotent() {
        let base = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        let overlay = json!({"a": {"c": [3]}, "d": "y", "e": null});
        let once = merge_values(&base, &overlay);
        let twice = merge_values(&once, &overlay);
        assert_eq!(once, twice);
    }

    #[test]
    fn object_replaces_scalar_and_vice_versa() {
        let merged = merge_values(&json!({"a": 1}), &json!({"a": {"b": 2}}));
        assert_eq!(merged, json!({"a": {"b": 2}}));

        let merged = merge_values(&json!({"a": {"b": 2}}), &json!({"a": 1}));
        assert_eq!(merged, json!({"a": 1}));
    }
}
