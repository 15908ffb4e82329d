//! Key paths addressing entries in nested containers.

use std::fmt;

/// Ordered sequence of byte-string keys.
///
/// Every component except the last names a nested container; the last names
/// the leaf. An empty path addresses the container itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<Vec<u8>>);

impl KeyPath {
    /// The empty path (the container the crud is bound to).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from any sequence of byte-like keys.
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        Self(keys.into_iter().map(|k| k.as_ref().to_vec()).collect())
    }

    pub fn push(&mut self, key: impl AsRef<[u8]>) {
        self.0.push(key.as_ref().to_vec());
    }

    /// Return a new path with `key` appended.
    pub fn child(&self, key: impl AsRef<[u8]>) -> Self {
        let mut path = self.clone();
        path.push(key);
        path
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last component, naming the leaf.
    pub fn leaf(&self) -> Option<&[u8]> {
        self.0.last().map(Vec::as_slice)
    }

    /// All components but the last, naming the containers.
    pub fn containers(&self) -> &[Vec<u8>] {
        match self.0.split_last() {
            Some((_, init)) => init,
            None => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.0.iter().map(Vec::as_slice)
    }

    pub fn as_slice(&self) -> &[Vec<u8>] {
        &self.0
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&String::from_utf8_lossy(key))?;
        }
        Ok(())
    }
}

impl From<Vec<Vec<u8>>> for KeyPath {
    fn from(keys: Vec<Vec<u8>>) -> Self {
        Self(keys)
    }
}

impl From<&str> for KeyPath {
    fn from(key: &str) -> Self {
        Self(vec![key.as_bytes().to_vec()])
    }
}

impl From<&[u8]> for KeyPath {
    fn from(key: &[u8]) -> Self {
        Self(vec![key.to_vec()])
    }
}

impl From<Vec<u8>> for KeyPath {
    fn from(key: Vec<u8>) -> Self {
        Self(vec![key])
    }
}

/// A decoded record together with its key path relative to the listing prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    pub key: KeyPath,
    pub value: T,
}
