//! Cache key encoding
//!
//! Cache keys are plain strings of the shape
//! `containerId/schemaId/<generated-query-text>`, so that every entry of a
//! container (or of a container/schema pair) can be removed by prefix.

use qube_core::{ContainerId, SchemaId};

/// Separator between key segments
pub const SEPARATOR: char = '/';

/// Key builder for member-set cache entries
#[derive(Debug)]
pub struct KeyBuilder {
    buffer: String,
}

impl KeyBuilder {
    /// Create a new key builder with estimated capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: String::with_capacity(capacity),
        }
    }

    /// Key for the member set computed by a query within a container and schema
    pub fn member_set(container: &ContainerId, schema: &SchemaId, query: &str) -> String {
        let mut builder =
            Self::new(container.as_str().len() + schema.as_str().len() + query.len() + 2);
        builder.push_segment(container.as_str());
        builder.push_segment(schema.as_str());
        builder.push_str(query);
        builder.finish()
    }

    /// Prefix shared by every key of a container
    pub fn container_prefix(container: &ContainerId) -> String {
        let mut builder = Self::new(container.as_str().len() + 1);
        builder.push_segment(container.as_str());
        builder.finish()
    }

    /// Prefix shared by every key of a container and schema
    pub fn schema_prefix(container: &ContainerId, schema: &SchemaId) -> String {
        let mut builder = Self::new(container.as_str().len() + schema.as_str().len() + 2);
        builder.push_segment(container.as_str());
        builder.push_segment(schema.as_str());
        builder.finish()
    }

    /// Push a segment followed by the separator
    pub fn push_segment(&mut self, segment: &str) {
        self.buffer.push_str(segment);
        self.buffer.push(SEPARATOR);
    }

    /// Push raw text
    pub fn push_str(&mut self, s: &str) {
        self.buffer.push_str(s);
    }

    /// Finish building and return the key
    pub fn finish(self) -> String {
        self.buffer
    }
}

/// Split a key back into `(container, schema, query)`
pub fn parse_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.splitn(3, SEPARATOR);
    let container = parts.next()?;
    let schema = parts.next()?;
    let query = parts.next()?;
    Some((container, schema, query))
}
