/// OData protocol version the writer enforces. Versions order naturally:
/// 4.01 relaxes several 4.0 restrictions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V4,
    V4_01,
}

/// Calling mode, fixed at construction. A writer built for one mode refuses
/// entry points of the other family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

/// Immutable writer configuration. Cheap to clone and shareable across any
/// number of writers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub version: Version,
    /// Request payloads forbid deferred links, counts, next links and delta
    /// links, and are the only place entity reference links may appear.
    pub is_request: bool,
    /// Upper bound on the number of simultaneously open resource scopes.
    pub max_nesting_depth: usize,
    /// Service root used by format back-ends for context URLs; when absent,
    /// no context is emitted.
    pub service_root: Option<url::Url>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: Version::V4,
            is_request: false,
            max_nesting_depth: 100,
            service_root: None,
        }
    }
}

impl Settings {
    pub fn request(mut self) -> Self {
        self.is_request = true;
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn service_root(mut self, root: url::Url) -> Self {
        self.service_root = Some(root);
        self
    }
}
