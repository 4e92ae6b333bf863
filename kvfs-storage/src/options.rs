use serde::{Deserialize, Serialize};

/// Configuration for an [`ObjectStoreAdapter`](crate::ObjectStoreAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Prefix prepended to every key, joined with `/`. Empty means none.
    pub directory: String,
    /// Create the bucket on first use when it does not exist.
    pub create: bool,
    /// Region the client is scoped to and the bucket is created in.
    pub region: String,
    /// Canned ACL applied to writes unless per-key metadata overrides it.
    pub acl: String,
    /// Upper bound on metadata table entries. `None` keeps every entry.
    pub metadata_capacity: Option<usize>,
}

impl AdapterOptions {
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = acl.into();
        self
    }

    pub fn with_metadata_capacity(mut self, capacity: usize) -> Self {
        self.metadata_capacity = Some(capacity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AdapterOptions::default();
        assert_eq!(options.directory, "");
        assert!(!options.create);
        assert_eq!(options.region, "");
        assert_eq!(options.acl, "");
        assert_eq!(options.metadata_capacity, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: AdapterOptions =
            serde_json::from_str(r#"{"directory": "uploads", "create": true}"#).unwrap();
        assert_eq!(options.directory, "uploads");
        assert!(options.create);
        assert_eq!(options.acl, "");
    }
}
