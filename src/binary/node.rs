use std::fmt;

/// A collection of node attributes stored as key-value pairs.
/// Uses a Vec internally for better cache locality with small attribute
/// counts (typically 3-6). Keys are unique; `insert` replaces in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attrs(pub Vec<(String, String)>);

impl Attrs {
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Get the value for a key, or None if not found.
    /// Linear search, which is efficient for small attribute counts.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Insert a key-value pair. If the key already exists, update the value.
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(pos) = self.0.iter().position(|(k, _)| k == &key) {
            self.0[pos].1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Push a key-value pair without checking for duplicates.
    /// Use this when building from a known-unique source (e.g. decoding).
    #[inline]
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl IntoIterator for Attrs {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, String)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One element of the protocol tree: tag, attributes, optional raw payload
/// and child nodes. An empty tag is the sentinel for "no node" / stream end.
///
/// Children are kept in insertion order. [`Node::get_child`] returns the most
/// recently added child carrying the tag, while [`Node::children`] still
/// yields every child; both access patterns are used by the dispatch logic
/// and the distinction is load-bearing, so neither may be collapsed into the
/// other.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub payload: Option<Vec<u8>>,
    pub children: Vec<Node>,
    size: usize,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(tag: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: tag.into(),
            payload: Some(payload.into()),
            ..Default::default()
        }
    }

    /// The "no node" sentinel, also written as a wire-level no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when this node is the empty-tag sentinel (stream end / no node).
    #[inline]
    pub fn is_empty_tag(&self) -> bool {
        self.tag.is_empty()
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// The most recently added child with this tag, if any.
    pub fn get_child(&self, tag: &str) -> Option<&Node> {
        self.children.iter().rev().find(|c| c.tag == tag)
    }

    /// Every child with this tag, in insertion order.
    pub fn children_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key)
    }

    /// Attribute value, or the empty string when absent. Matches the wire
    /// convention where a missing attribute and an empty one are equivalent.
    pub fn attr_or_empty(&self, key: &str) -> &str {
        self.attrs.get(key).unwrap_or("")
    }

    pub fn attr_parser(&self) -> super::attrs::AttrParser<'_> {
        super::attrs::AttrParser::new(self)
    }

    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }

    /// Payload decoded as lossy UTF-8.
    pub fn payload_string(&self) -> String {
        String::from_utf8_lossy(self.payload_bytes()).into_owned()
    }

    /// Serialized byte length, assigned by the wire codec after
    /// encode/decode. Used purely for traffic accounting.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        write!(f, "{pad}<{}", self.tag)?;
        for (k, v) in self.attrs.iter() {
            write!(f, " {k}=\"{v}\"")?;
        }
        writeln!(f, ">")?;

        if let Some(data) = &self.payload {
            let inner = "    ".repeat(depth + 1);
            // Secret-bearing and binary payloads must never be rendered raw.
            match self.tag.as_str() {
                "challenge" | "response" | "success" | "auth" => {
                    writeln!(f, "{inner}data: {} length: {}", hex::encode(data), data.len())?;
                }
                "picture" | "media" => {
                    writeln!(f, "{inner}data: content length: {}", data.len())?;
                }
                _ => {
                    writeln!(f, "{inner}data: {}", String::from_utf8_lossy(data))?;
                }
            }
        }

        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        writeln!(f, "{pad}</{}>", self.tag)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrs_insert_replaces_existing_key() {
        let mut attrs = Attrs::new();
        attrs.insert("type", "get");
        attrs.insert("type", "set");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("type"), Some("set"));
    }

    #[test]
    fn repeated_child_tags_are_all_kept() {
        let mut node = Node::new("sync");
        for i in 0..3 {
            let mut user = Node::new("user");
            user.attrs.insert("jid", format!("{i}@s.whatsapp.net"));
            node.add_child(user);
        }
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children_by_tag("user").count(), 3);
    }

    #[test]
    fn single_lookup_returns_most_recently_added() {
        let mut node = Node::new("iq");
        node.add_child(Node::with_payload("query", b"first".to_vec()));
        node.add_child(Node::with_payload("query", b"second".to_vec()));
        let found = node.get_child("query").unwrap();
        assert_eq!(found.payload_bytes(), b"second");
    }

    #[test]
    fn display_redacts_auth_payloads() {
        let node = Node::with_payload("challenge", vec![0xde, 0xad]);
        let rendered = node.to_string();
        assert!(rendered.contains("dead"));
        assert!(rendered.contains("length: 2"));

        let node = Node::with_payload("picture", vec![0u8; 64]);
        let rendered = node.to_string();
        assert!(rendered.contains("content length: 64"));
        assert!(!rendered.contains('\0'));
    }

    #[test]
    fn empty_tag_is_stream_end_sentinel() {
        assert!(Node::empty().is_empty_tag());
        assert!(!Node::new("message").is_empty_tag());
    }
}
