//! Key layout for nested containers inside one LMDB database.
//!
//! LMDB databases are flat, so nesting is encoded into keys. Relative to a
//! container prefix `P`:
//!
//! | item                         | encoded key                               |
//! |------------------------------|-------------------------------------------|
//! | leaf `k`                     | `P ++ 0x00 ++ k`                          |
//! | nested container marker `c`  | `P ++ 0x01 ++ c`                          |
//! | anything inside container `c`| `P ++ 0x02 ++ u16be(len c) ++ c ++ ...`   |
//!
//! A top-level container has the empty prefix. Direct leaves of a container
//! are contiguous and sorted by their raw key bytes, and the presence of any
//! nested container is a single prefix probe on `P ++ 0x01`.

use strongbox_core::{KeyPath, StorageError, StrongboxResult};

pub const LEAF_TAG: u8 = 0x00;
pub const CONTAINER_TAG: u8 = 0x01;
pub const NESTED_TAG: u8 = 0x02;

/// What an encoded key points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Leaf,
    Container,
}

impl KeyKind {
    pub fn describe(self) -> &'static str {
        match self {
            KeyKind::Leaf => "value",
            KeyKind::Container => "container",
        }
    }
}

/// A fully decoded key: the component path from the top-level container and
/// the kind of item stored there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub path: KeyPath,
    pub kind: KeyKind,
}

/// Reject keys the layout cannot represent.
pub fn validate_key(key: &[u8]) -> StrongboxResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            reason: "key must not be empty".to_string(),
        }
        .into());
    }
    Ok(())
}

pub fn leaf_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    tagged(prefix, LEAF_TAG, key)
}

pub fn container_key(prefix: &[u8], name: &[u8]) -> Vec<u8> {
    tagged(prefix, CONTAINER_TAG, name)
}

/// Prefix shared by every leaf directly inside the container at `prefix`.
pub fn leaf_range(prefix: &[u8]) -> Vec<u8> {
    tagged(prefix, LEAF_TAG, &[])
}

/// Prefix shared by every nested-container marker directly inside `prefix`.
pub fn container_range(prefix: &[u8]) -> Vec<u8> {
    tagged(prefix, CONTAINER_TAG, &[])
}

/// Prefix of the nested container `name` inside the container at `prefix`.
pub fn nested_prefix(prefix: &[u8], name: &[u8]) -> StrongboxResult<Vec<u8>> {
    validate_key(name)?;
    let len = u16::try_from(name.len()).map_err(|_| StorageError::InvalidKey {
        reason: format!("container name of {} bytes exceeds {}", name.len(), u16::MAX),
    })?;
    let mut out = Vec::with_capacity(prefix.len() + 3 + name.len());
    out.extend_from_slice(prefix);
    out.push(NESTED_TAG);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(name);
    Ok(out)
}

fn tagged(prefix: &[u8], tag: u8, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + 1 + key.len());
    out.extend_from_slice(prefix);
    out.push(tag);
    out.extend_from_slice(key);
    out
}

/// Decode a raw database key back into its path and kind.
pub fn decode_key(raw: &[u8]) -> StrongboxResult<DecodedKey> {
    let mut path = KeyPath::root();
    let mut rest = raw;

    loop {
        let (&tag, tail) = rest.split_first().ok_or_else(|| malformed(raw, "truncated key"))?;
        match tag {
            LEAF_TAG | CONTAINER_TAG => {
                if tail.is_empty() {
                    return Err(malformed(raw, "empty terminal component"));
                }
                path.push(tail);
                let kind = if tag == LEAF_TAG {
                    KeyKind::Leaf
                } else {
                    KeyKind::Container
                };
                return Ok(DecodedKey { path, kind });
            }
            NESTED_TAG => {
                if tail.len() < 2 {
                    return Err(malformed(raw, "truncated container length"));
                }
                let len = u16::from_be_bytes([tail[0], tail[1]]) as usize;
                let tail = &tail[2..];
                if len == 0 || tail.len() < len {
                    return Err(malformed(raw, "container name out of bounds"));
                }
                path.push(&tail[..len]);
                rest = &tail[len..];
            }
            other => {
                return Err(malformed(raw, &format!("unknown tag 0x{other:02x}")));
            }
        }
    }
}

/// Decode a key relative to a container prefix it is known to start with.
pub(crate) fn decode_relative(prefix: &[u8], raw: &[u8]) -> StrongboxResult<DecodedKey> {
    match raw.strip_prefix(prefix) {
        Some(rest) => decode_key(rest),
        None => Err(malformed(raw, "key outside its container")),
    }
}

fn malformed(raw: &[u8], reason: &str) -> strongbox_core::StrongboxError {
    StorageError::InvalidKey {
        reason: format!("malformed stored key {raw:02x?}: {reason}"),
    }
    .into()
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn component() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 1..24)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Any encodable path decodes back to itself with the right kind.
        #[test]
        fn prop_encoded_paths_decode(
            containers in proptest::collection::vec(component(), 0..4),
            leaf in component(),
            is_leaf in any::<bool>(),
        ) {
            let mut prefix = Vec::new();
            for name in &containers {
                prefix = nested_prefix(&prefix, name).unwrap();
            }
            let raw = if is_leaf {
                leaf_key(&prefix, &leaf)
            } else {
                container_key(&prefix, &leaf)
            };

            let decoded = decode_key(&raw).unwrap();
            let mut expected = KeyPath::from_keys(&containers);
            expected.push(&leaf);
            prop_assert_eq!(decoded.path, expected);
            let kind = if is_leaf { KeyKind::Leaf } else { KeyKind::Container };
            prop_assert_eq!(decoded.kind, kind);
        }

        /// Arbitrary bytes never panic the decoder.
        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_key(&raw);
        }
    }
}
