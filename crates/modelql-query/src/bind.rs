//! Bound-parameter processing before a statement reaches the connection.

use modelql_core::{BindParams, BindTypes, Value};
use std::collections::HashSet;

/// Expand the values of array placeholders into one parameter per element.
///
/// A bound array `ids = [1, 2]` feeding the array placeholder `ids` becomes
/// `ids0 = 1, ids1 = 2`, matching the `:ids0, :ids1` text a dialect renders
/// for it. The array's bind type, if any, is copied to every element. Arrays
/// bound to any other placeholder reach the driver unchanged.
pub fn process_binds(
    binds: &BindParams,
    types: &BindTypes,
    array_placeholders: &HashSet<String>,
) -> (BindParams, BindTypes) {
    let mut processed = BindParams::with_capacity(binds.len());
    let mut processed_types = BindTypes::with_capacity(types.len());

    for (name, value) in binds {
        match value {
            Value::Array(items) if array_placeholders.contains(name) => {
                let bind_type = types.get(name).copied();
                for (position, item) in items.iter().enumerate() {
                    let expanded = format!("{}{}", name, position);
                    if let Some(bind_type) = bind_type {
                        processed_types.insert(expanded.clone(), bind_type);
                    }
                    processed.insert(expanded, item.clone());
                }
            }
            other => {
                if let Some(bind_type) = types.get(name) {
                    processed_types.insert(name.clone(), *bind_type);
                }
                processed.insert(name.clone(), other.clone());
            }
        }
    }

    // Types declared for names that were never bound still reach the driver.
    for (name, bind_type) in types {
        if !binds.contains_key(name) {
            processed_types.insert(name.clone(), *bind_type);
        }
    }

    (processed, processed_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelql_core::BindType;

    #[test]
    fn arrays_expand_with_their_type() {
        let mut binds = BindParams::new();
        binds.insert("ids".to_string(), Value::from(vec![4_i64, 5]));
        binds.insert("name".to_string(), Value::from("Astro"));
        let mut types = BindTypes::new();
        types.insert("ids".to_string(), BindType::Int);

        let arrays = HashSet::from(["ids".to_string()]);
        let (processed, processed_types) = process_binds(&binds, &types, &arrays);
        let names: Vec<_> = processed.keys().cloned().collect();
        assert_eq!(names, vec!["ids0", "ids1", "name"]);
        assert_eq!(processed["ids1"], Value::Int(5));
        assert_eq!(processed_types.get("ids0"), Some(&BindType::Int));
        assert_eq!(processed_types.get("name"), None);
    }

    #[test]
    fn arrays_of_plain_placeholders_are_sent_whole() {
        let mut binds = BindParams::new();
        binds.insert("tags".to_string(), Value::from(vec![1_i64, 2]));
        binds.insert("ids".to_string(), Value::from(vec![4_i64]));

        let arrays = HashSet::from(["ids".to_string()]);
        let (processed, _) = process_binds(&binds, &BindTypes::new(), &arrays);
        let names: Vec<_> = processed.keys().cloned().collect();
        assert_eq!(names, vec!["tags", "ids0"]);
        assert_eq!(processed["tags"], Value::from(vec![1_i64, 2]));
    }
}
