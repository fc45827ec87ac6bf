use crate::binary::error::{BinaryError, Result};
use crate::binary::node::Node;

/// Error-collecting attribute accessor. Individual lookups return options;
/// parse failures accumulate and can be checked in one place with
/// [`AttrParser::ok`] or [`AttrParser::finish`].
pub struct AttrParser<'a> {
    node: &'a Node,
    pub errors: Vec<BinaryError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self {
            node,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&self) -> Result<()> {
        if self.ok() {
            Ok(())
        } else {
            Err(BinaryError::AttrList(self.errors.clone()))
        }
    }

    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.node.attrs.get(key)
    }

    /// Get a required string attribute, recording an error if missing.
    pub fn string(&mut self, key: &str) -> &'a str {
        match self.node.attrs.get(key) {
            Some(v) => v,
            None => {
                self.errors.push(BinaryError::MissingAttr(key.to_string()));
                ""
            }
        }
    }

    pub fn required_string(&mut self, key: &str) -> Result<&'a str> {
        self.node
            .attrs
            .get(key)
            .ok_or_else(|| BinaryError::MissingAttr(key.to_string()))
    }

    pub fn optional_u64(&mut self, key: &str) -> Option<u64> {
        self.parse_with(key, |s| s.parse::<u64>().map_err(|e| e.to_string()))
    }

    pub fn optional_i64(&mut self, key: &str) -> Option<i64> {
        self.parse_with(key, |s| s.parse::<i64>().map_err(|e| e.to_string()))
    }

    pub fn optional_f64(&mut self, key: &str) -> Option<f64> {
        self.parse_with(key, |s| s.parse::<f64>().map_err(|e| e.to_string()))
    }

    /// True when the attribute is present and non-empty. The wire encodes
    /// flags like `offline` by mere presence rather than a boolean literal.
    pub fn flag(&mut self, key: &str) -> bool {
        self.node.attrs.get(key).is_some_and(|v| !v.is_empty())
    }

    fn parse_with<T>(
        &mut self,
        key: &str,
        parse: impl FnOnce(&str) -> std::result::Result<T, String>,
    ) -> Option<T> {
        let raw = self.node.attrs.get(key)?;
        match parse(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(BinaryError::AttrParse(format!(
                    "failed to parse '{raw}' for key '{key}': {e}"
                )));
                None
            }
        }
    }
}
