//! Namespace-scoped storage keys.
//!
//! Keys are composite: a leading separator, the object type, then each
//! attribute, every component followed by the separator. Components may
//! not contain the separator or the maximum code point, which keeps the
//! encoding injective.

use crate::error::{NetworkError, NetworkResult};

const COMPOSITE_KEY_NAMESPACE: char = '\u{0}';
const MIN_UNICODE_RUNE: char = '\u{0}';
const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

pub const TOKEN_KEY_PREFIX: &str = "ztoken";
pub const TRANSFER_ACTION_METADATA_PREFIX: &str = "tam";

/// Key under which the token program records transfer metadata for `key`.
pub fn transfer_action_metadata_key(key: &str) -> NetworkResult<String> {
    if key.is_empty() {
        return Err(NetworkError::InvalidKey("empty transfer metadata key".into()));
    }
    create_composite_key(TOKEN_KEY_PREFIX, &[TRANSFER_ACTION_METADATA_PREFIX, key])
}

fn create_composite_key(object_type: &str, attributes: &[&str]) -> NetworkResult<String> {
    validate_component(object_type)?;
    let mut key = String::with_capacity(
        2 + object_type.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>(),
    );
    key.push(COMPOSITE_KEY_NAMESPACE);
    key.push_str(object_type);
    key.push(COMPOSITE_KEY_NAMESPACE);
    for attribute in attributes {
        validate_component(attribute)?;
        key.push_str(attribute);
        key.push(COMPOSITE_KEY_NAMESPACE);
    }
    Ok(key)
}

fn validate_component(component: &str) -> NetworkResult<()> {
    if let Some(c) = component
        .chars()
        .find(|&c| c == MIN_UNICODE_RUNE || c == MAX_UNICODE_RUNE)
    {
        return Err(NetworkError::InvalidKey(format!(
            "component [{}] contains reserved character U+{:04X}",
            component.escape_debug(),
            c as u32
        )));
    }
    Ok(())
}
