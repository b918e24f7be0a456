//! Deterministic cache keys for choice lists and derived enums

use crate::ChoiceFilters;

/// Build the cache key for `group_name` under `namespace`.
///
/// Without filters the key is `"<namespace>:<group_name>"`. With filters a
/// compact JSON array of `[lowercased field, rendered value]` pairs, sorted,
/// is appended after another `:`. The group name keeps its casing.
pub fn generate_cache_key(namespace: &str, group_name: &str, filters: &ChoiceFilters) -> String {
    if filters.is_empty() {
        return format!("{}:{}", namespace, group_name);
    }

    let mut pairs: Vec<(String, String)> = filters
        .iter()
        .map(|(field, value)| (field.to_lowercase(), value.to_string()))
        .collect();
    pairs.sort();

    format!("{}:{}:{}", namespace, group_name, encode_pairs(&pairs))
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    let array: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(k, v)| serde_json::json!([k, v]))
        .collect();
    serde_json::Value::Array(array).to_string()
}
