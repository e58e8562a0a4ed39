//! Keys and Paths
//!
//! A [`Path`] is the ordered list of [`Key`]s that leads from some tracked
//! node to the slot that changed. Every change notification carries one,
//! always expressed relative to the node the listener is registered on.
//!
//! Keys come in two shapes: named fields (objects) and positional indices
//! (arrays). Containers coerce keys into their own shape, so `Key::Index(0)`
//! on an object means the field `"0"` and `Key::Field("2")` on an array means
//! index 2.

use std::fmt;

use smallvec::SmallVec;

/// Name of the pseudo field every array exposes.
pub(crate) const LENGTH: &str = "length";

/// A single step in a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A named property of an object (or `"length"` on an array).
    Field(String),

    /// A position in an array.
    Index(usize),
}

impl Key {
    /// The field name, if this is a field key.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Key::Field(name) => Some(name),
            Key::Index(_) => None,
        }
    }

    /// The array position this key denotes, parsing numeric field names.
    ///
    /// Only canonical decimal names count: `"+1"` and `"01"` are plain
    /// field names, not positions.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Field(name) if is_canonical_index(name) => name.parse().ok(),
            Key::Field(_) => None,
        }
    }

    /// Whether this key names the array `length` pseudo field.
    pub fn is_length(&self) -> bool {
        matches!(self, Key::Field(name) if name == LENGTH)
    }

    /// The key as an object field name.
    pub(crate) fn into_field(self) -> String {
        match self {
            Key::Field(name) => name,
            Key::Index(index) => index.to_string(),
        }
    }
}

fn is_canonical_index(name: &str) -> bool {
    match name.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        digits => digits.iter().all(u8::is_ascii_digit),
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Field(name.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key {
    /// Negative numbers are not positions; they become field names.
    fn from(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(index) => Key::Index(index),
            Err(_) => Key::Field(index.to_string()),
        }
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// An ordered sequence of keys. The empty path denotes the node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(SmallVec<[Key; 4]>);

impl Path {
    /// The empty path.
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Number of keys in the path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The keys, outermost first.
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    /// Iterate over the keys, outermost first.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.0.iter()
    }

    /// Append a key at the end.
    pub fn push(&mut self, key: impl Into<Key>) {
        self.0.push(key.into());
    }

    /// A new path with `key` in front of this one.
    ///
    /// Used while walking from a mutated node up to its ancestors: each hop
    /// prepends the key under which the child sits in the parent.
    pub fn prepend(&self, key: Key) -> Path {
        let mut keys = SmallVec::with_capacity(self.0.len() + 1);
        keys.push(key);
        keys.extend(self.0.iter().cloned());
        Path(keys)
    }
}

impl fmt::Display for Path {
    /// Dotted form, e.g. `user.posts.0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<Vec<Key>> for Path {
    fn from(keys: Vec<Key>) -> Self {
        Path(keys.into())
    }
}

impl From<Key> for Path {
    fn from(key: Key) -> Self {
        let mut path = Path::new();
        path.push(key);
        path
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a [`Path`] from a list of anything convertible into a [`Key`].
///
/// ```rust
/// use morphium_core::{path, Key};
///
/// let p = path!["posts", 0, "title"];
/// assert_eq!(p.keys()[1], Key::Index(0));
/// assert_eq!(p.to_string(), "posts.0.title");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::new()
    };
    ($($key:expr),+ $(,)?) => {
        <$crate::Path as ::core::iter::FromIterator<$crate::Key>>::from_iter([
            $($crate::Key::from($key)),+
        ])
    };
}
