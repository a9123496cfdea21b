//! Layering of simulator configuration
//!
//! The built-in defaults, the TOML file and the command-line overrides are
//! each turned into a JSON tree and laid over one another in that order.
//! Tables merge key by key, so a file that only sets `tick.period_ms` keeps
//! every other tick setting. Anything else in a later layer replaces the
//! earlier value outright: a `charging_stations` list is never appended to,
//! and an explicit `null` (e.g. `errors.seed`) clears it.

use serde_json::Value;

/// Lay `layer` over `target` in place.
pub fn overlay(target: &mut Value, layer: Value) {
    match (target, layer) {
        (Value::Object(table), Value::Object(entries)) => {
            for (key, value) in entries {
                match table.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Combine `layers`, lowest precedence first.
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Null;
    for layer in layers {
        overlay(&mut merged, layer);
    }
    merged
}
