//! Safe navigation into loosely structured JSON
//!
//! Paths are dotted: `cf_9103.0.name`. A numeric segment indexes an array,
//! any other segment indexes an object. A missing segment or a null value
//! anywhere along the way yields nothing.

use serde_json::Value;

/// Value at `path`, or `None` if any segment is absent or the value is null
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

/// Value at `path`, or `default`
pub fn get_path_or<'a>(value: &'a Value, path: &str, default: &'a Value) -> &'a Value {
    get_path(value, path).unwrap_or(default)
}

/// Scalar at `path` rendered as a trimmed, non-empty string
pub fn get_str(value: &Value, path: &str) -> Option<String> {
    let text = match get_path(value, path)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "cf_9103": [{ "id": 4, "name": " Согаз " }],
            "contacts": [],
            "nested": { "deep": { "value": 42 } },
            "empty": "",
            "gone": null
        })
    }

    #[test]
    fn test_object_and_array_segments() {
        let r = record();
        assert_eq!(get_path(&r, "cf_9103.0.id"), Some(&json!(4)));
        assert_eq!(get_path(&r, "nested.deep.value"), Some(&json!(42)));
    }

    #[test]
    fn test_missing_segments_yield_default() {
        let r = record();
        let default = json!("n/a");
        assert_eq!(get_path_or(&r, "contacts.0.name", &default), &default);
        assert_eq!(get_path_or(&r, "cf_9103.1.name", &default), &default);
        assert_eq!(get_path_or(&r, "cf_9103.x.name", &default), &default);
        assert_eq!(get_path_or(&r, "nested.deep.value.more", &default), &default);
        assert_eq!(get_path_or(&r, "gone", &default), &default);
        assert_eq!(get_path_or(&r, "gone.child", &default), &default);
    }

    #[test]
    fn test_get_str() {
        let r = record();
        assert_eq!(get_str(&r, "cf_9103.0.name").as_deref(), Some("Согаз"));
        assert_eq!(get_str(&r, "nested.deep.value").as_deref(), Some("42"));
        assert_eq!(get_str(&r, "empty"), None);
        assert_eq!(get_str(&r, "cf_9103"), None);
    }
}
