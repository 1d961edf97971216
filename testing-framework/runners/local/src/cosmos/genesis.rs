use interchain_testing_core::chain::GenesisKv;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error("genesis key {key}: segment `{segment}` is missing")]
    MissingSegment { key: String, segment: String },
    #[error("genesis key {key}: index {index} is out of bounds")]
    IndexOutOfBounds { key: String, index: usize },
    #[error("genesis key {key}: cannot descend into a {kind}")]
    NotAContainer { key: String, kind: &'static str },
    #[error("genesis key is empty")]
    EmptyKey,
}

/// Applies every override in order; later overrides win.
pub fn apply_overrides(genesis: &mut Value, overrides: &[GenesisKv]) -> Result<(), GenesisError> {
    for kv in overrides {
        set_path(genesis, &kv.key, kv.value.clone())?;
    }
    Ok(())
}

/// Sets a dotted key path such as `app_state.gov.params.min_deposit.0.denom`.
/// Numeric segments index into arrays; every intermediate segment must exist.
pub fn set_path(root: &mut Value, key: &str, value: Value) -> Result<(), GenesisError> {
    let segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(GenesisError::EmptyKey);
    };

    let mut current = root;
    for segment in parents {
        current = descend(current, key, segment)?;
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(key, last)?;
            let slot = items
                .get_mut(index)
                .ok_or_else(|| GenesisError::IndexOutOfBounds {
                    key: key.to_owned(),
                    index,
                })?;
            *slot = value;
            Ok(())
        }
        other => Err(GenesisError::NotAContainer {
            key: key.to_owned(),
            kind: kind(other),
        }),
    }
}

fn descend<'a>(current: &'a mut Value, key: &str, segment: &str) -> Result<&'a mut Value, GenesisError> {
    match current {
        Value::Object(map) => map
            .get_mut(segment)
            .ok_or_else(|| GenesisError::MissingSegment {
                key: key.to_owned(),
                segment: segment.to_owned(),
            }),
        Value::Array(items) => {
            let index = parse_index(key, segment)?;
            items
                .get_mut(index)
                .ok_or_else(|| GenesisError::IndexOutOfBounds {
                    key: key.to_owned(),
                    index,
                })
        }
        other => Err(GenesisError::NotAContainer {
            key: key.to_owned(),
            kind: kind(other),
        }),
    }
}

fn parse_index(key: &str, segment: &str) -> Result<usize, GenesisError> {
    segment
        .parse()
        .map_err(|_| GenesisError::MissingSegment {
            key: key.to_owned(),
            segment: segment.to_owned(),
        })
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
