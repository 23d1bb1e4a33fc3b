//! Per-image metadata message.
//!
//! ```text
//! metadata__QWE__imagename__QWE__<name>[__QWE__<key>__QWE__<value>]*__QWE__endmetadata
//! ```
//!
//! JVM peers send only the image name. C++ peers may append further
//! key/value pairs, which are kept in order.

use crate::wire::{WireError, METADATA_SEP};

const OPEN: &str = "metadata";
const CLOSE: &str = "endmetadata";
const IMAGE_NAME: &str = "imagename";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Display name of the image.
    pub name: String,
    /// Additional pairs, in wire order.
    pub extra: Vec<(String, String)>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        if key == IMAGE_NAME {
            return Some(&self.name);
        }
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> Result<String, WireError> {
        let mut terms = vec![OPEN, IMAGE_NAME, self.name.as_str()];
        for (k, v) in &self.extra {
            terms.push(k);
            terms.push(v);
        }
        if let Some(bad) = terms.iter().skip(1).find(|t| t.contains(METADATA_SEP)) {
            return Err(WireError::CorruptedMetadata(format!(
                "term '{bad}' contains the separator"
            )));
        }
        terms.push(CLOSE);
        Ok(terms.join(METADATA_SEP))
    }

    pub fn decode(data: &str) -> Result<Self, WireError> {
        let terms: Vec<&str> = data.split(METADATA_SEP).collect();

        if terms.first() != Some(&OPEN) {
            return Err(WireError::CorruptedMetadata(
                "expected metadata part from the peer".into(),
            ));
        }
        if terms.last() != Some(&CLOSE) || terms.len() < 2 {
            return Err(WireError::CorruptedMetadata("missing terminator".into()));
        }

        let pairs = &terms[1..terms.len() - 1];
        if pairs.len() % 2 != 0 {
            return Err(WireError::CorruptedMetadata("dangling key".into()));
        }

        let mut metadata = Metadata::default();
        for pair in pairs.chunks_exact(2) {
            if pair[0] == IMAGE_NAME {
                metadata.name = pair[1].to_string();
            } else {
                metadata.extra.push((pair[0].to_string(), pair[1].to_string()));
            }
        }
        Ok(metadata)
    }
}
