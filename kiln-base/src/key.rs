use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Identifies a resource in the cache. This is a path-like string that is normalized on
/// construction so that equality, hashing and ordering don't depend on separator style or on
/// redundant `.`/`..` segments. Cloning is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn new(path: &str) -> Self {
        ResourceKey(Arc::from(normalize(path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        root_len(&self.0) > 0 && self.0[..root_len(&self.0)].ends_with('/')
    }

    /// The last segment of the key, "textures/logo.png" -> "logo.png"
    pub fn leaf(&self) -> &str {
        let root = root_len(&self.0);
        let rest = &self.0[root..];
        match rest.rfind('/') {
            Some(pos) => &rest[pos + 1..],
            None => rest,
        }
    }

    /// Everything before the leaf, "textures/logo.png" -> "textures"
    pub fn branch(&self) -> ResourceKey {
        let root = root_len(&self.0);
        match self.0[root..].rfind('/') {
            Some(pos) => ResourceKey(Arc::from(&self.0[..root + pos])),
            None => ResourceKey(Arc::from(&self.0[..root])),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        let leaf = self.leaf();
        match leaf.rfind('.') {
            Some(pos) if pos + 1 < leaf.len() => Some(&leaf[pos + 1..]),
            _ => None,
        }
    }

    /// ASCII case-insensitive extension test, `ext` is given without the leading dot
    pub fn has_extension(
        &self,
        ext: &str,
    ) -> bool {
        self.extension()
            .map(|e| e.eq_ignore_ascii_case(ext.trim_start_matches('.')))
            .unwrap_or(false)
    }

    pub fn join(
        &self,
        other: &str,
    ) -> ResourceKey {
        let other = ResourceKey::new(other);
        if other.is_absolute() || self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self.clone();
        }
        ResourceKey::new(&format!("{}/{}", self.0, other.0))
    }
}

// Length of the root prefix, for example "/" or "C:/" or "C:"
fn root_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    let mut len = 0;
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        len = 2;
    }
    if bytes.len() > len && bytes[len] == b'/' {
        len += 1;
    }
    len
}

fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let root = root_len(&unified);
    let (prefix, rest) = unified.split_at(root);
    let absolute = prefix.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // Can't go above the root of an absolute path
                _ if absolute => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(unified.len());
    normalized.push_str(prefix);
    normalized.push_str(&segments.join("/"));
    normalized
}

impl fmt::Debug for ResourceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("ResourceKey").field(&&*self.0).finish()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(path: &str) -> Self {
        ResourceKey::new(path)
    }
}

impl From<String> for ResourceKey {
    fn from(path: String) -> Self {
        ResourceKey::new(&path)
    }
}

impl From<&String> for ResourceKey {
    fn from(path: &String) -> Self {
        ResourceKey::new(path)
    }
}

impl From<&ResourceKey> for ResourceKey {
    fn from(key: &ResourceKey) -> Self {
        key.clone()
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

struct ResourceKeyVisitor;

impl<'de> de::Visitor<'de> for ResourceKeyVisitor {
    type Value = ResourceKey;

    fn expecting(
        &self,
        fmt: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(fmt, "a resource path string")
    }

    fn visit_str<E: de::Error>(
        self,
        v: &str,
    ) -> Result<Self::Value, E> {
        Ok(ResourceKey::new(v))
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(ResourceKeyVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn separators_are_unified() {
        assert_eq!(ResourceKey::new("a\\b\\c.png"), ResourceKey::new("a/b/c.png"));
        assert_eq!(ResourceKey::new("a//b///c.png").as_str(), "a/b/c.png");
        assert_eq!(ResourceKey::new("a/b/").as_str(), "a/b");
    }

    #[test]
    fn dot_segments_are_resolved() {
        assert_eq!(ResourceKey::new("./a/./b.png").as_str(), "a/b.png");
        assert_eq!(ResourceKey::new("a\\b/../c.png").as_str(), "a/c.png");
        assert_eq!(ResourceKey::new("../../a/b.png").as_str(), "../../a/b.png");
        assert_eq!(ResourceKey::new("a/../../b.png").as_str(), "../b.png");
        assert_eq!(ResourceKey::new("/../a.png").as_str(), "/a.png");
    }

    #[test]
    fn roots_are_kept() {
        assert_eq!(ResourceKey::new("/").as_str(), "/");
        assert_eq!(ResourceKey::new("C:\\data\\a.png").as_str(), "C:/data/a.png");
        assert!(ResourceKey::new("/a/b").is_absolute());
        assert!(!ResourceKey::new("a/b").is_absolute());
    }

    #[test]
    fn ordering_ignores_separator_style() {
        let mut keys = vec![
            ResourceKey::new("b\\x.png"),
            ResourceKey::new("a/y.png"),
            ResourceKey::new("b/./a.png"),
        ];
        keys.sort();
        let keys: Vec<_> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a/y.png", "b/a.png", "b/x.png"]);
    }

    #[test]
    fn leaf_branch_and_extension() {
        let key = ResourceKey::new("textures/ui/Logo.PNG");
        assert_eq!(key.leaf(), "Logo.PNG");
        assert_eq!(key.branch().as_str(), "textures/ui");
        assert_eq!(key.extension(), Some("PNG"));
        assert!(key.has_extension("png"));
        assert!(key.has_extension(".png"));
        assert!(!key.has_extension("jpg"));
        assert_eq!(ResourceKey::new("readme").extension(), None);
        assert_eq!(ResourceKey::new("logo.png").branch().as_str(), "");
    }

    #[test]
    fn join_keys() {
        let base = ResourceKey::new("models/ship");
        assert_eq!(base.join("../tex/hull.png").as_str(), "models/tex/hull.png");
        assert_eq!(base.join("/abs.png").as_str(), "/abs.png");
        assert_eq!(ResourceKey::new("").join("a.png").as_str(), "a.png");
    }

    #[test]
    fn serde_round_trips_as_string() {
        let key: ResourceKey = serde_json::from_str("\"a\\\\b/../c.png\"").unwrap();
        assert_eq!(key.as_str(), "a/c.png");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"a/c.png\"");
    }
}
