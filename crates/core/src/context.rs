//! Explicit execution context carried by a unit of work.

use crate::metadata::Metadata;

/// A function that derives a new context from an existing one.
pub type ContextHolder = Box<dyn Fn(ExecutionContext) -> ExecutionContext + Send + Sync>;

/// Context value passed alongside a unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    metadata: Metadata,
}

impl ExecutionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context around existing metadata.
    pub fn with_base(metadata: Metadata) -> Self {
        Self { metadata }
    }

    /// Derive a context with `entries` layered over the current metadata.
    pub fn with_metadata<I, K, V>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metadata: self.metadata.layer(entries),
        }
    }

    /// Apply each holder in order.
    pub fn attach<'a, I>(self, holders: I) -> Self
    where
        I: IntoIterator<Item = &'a ContextHolder>,
    {
        holders.into_iter().fold(self, |ctx, holder| holder(ctx))
    }

    /// Metadata visible in this context.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
