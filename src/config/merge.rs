//! Settings merge logic
//!
//! Tables merge key by key; anything else in a later layer replaces the
//! earlier value. A null never replaces anything, so an override layer can
//! leave a key unset.

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let base = json!({"termination_grace_seconds": 10});
        let overlay = json!({"termination_grace_seconds": 2});
        let result = deep_merge(base, overlay);
        assert_eq!(result["termination_grace_seconds"], 2);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({
            "binaries": {
                "yarn": "yarn",
                "kinit": "kinit"
            }
        });
        let overlay = json!({
            "binaries": {
                "yarn": "/opt/hadoop/bin/yarn"
            }
        });
        let result = deep_merge(base, overlay);

        assert_eq!(result["binaries"]["yarn"], "/opt/hadoop/bin/yarn");
        assert_eq!(result["binaries"]["kinit"], "kinit");
    }

    #[test]
    fn test_array_replace() {
        let base = json!({"flags": ["-f", "-a", "-k"]});
        let overlay = json!({"flags": ["-k"]});
        let result = deep_merge(base, overlay);

        assert_eq!(result["flags"], json!(["-k"]));
    }

    #[test]
    fn test_null_keeps_base() {
        let base = json!({"kerberos": {"principal": "spark/_HOST@EXAMPLE.COM"}});
        let overlay = json!({"kerberos": {"principal": null, "ccache": null}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["kerberos"]["principal"], "spark/_HOST@EXAMPLE.COM");
        assert!(result["kerberos"].get("ccache").is_none());
    }

    #[test]
    fn test_merge_layers() {
        let builtin = json!({
            "termination_grace_seconds": 10,
            "status": {"curl_max_time_seconds": 30, "max_missed_reports": 10}
        });
        let file = json!({
            "status": {"max_missed_reports": 3}
        });
        let cli = json!({
            "termination_grace_seconds": 1
        });

        let result = merge_layers(vec![builtin, file, cli]);

        assert_eq!(result["termination_grace_seconds"], 1);
        assert_eq!(result["status"]["max_missed_reports"], 3);
        assert_eq!(result["status"]["curl_max_time_seconds"], 30);
    }
}
