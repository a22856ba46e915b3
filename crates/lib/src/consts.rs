/// Application name, used for cache and config directory names.
pub const APP_NAME: &str = "mkfetch";

/// Registry used when an OCI reference names no registry.
pub const DEFAULT_REGISTRY: &str = "ghcr.io";

/// Tag used when an OCI reference names neither a tag nor a digest.
pub const DEFAULT_TAG: &str = "latest";

/// Ref name under which HTTP artifacts are stored.
pub const HTTP_REF: &str = "latest";

/// Top-level cache directory that holds every HTTP scope.
pub const HTTP_SCOPE_DIR: &str = "http";

/// Directory holding immutable content inside a scope.
pub const BLOBS_DIR: &str = "blobs";

/// Directory holding tag/digest pointers inside a scope.
pub const REFS_DIR: &str = "refs";

/// Suffix of in-flight blob writes.
pub const TMP_SUFFIX: &str = ".tmp";

/// Number of hex characters of the reference hash used for generated file names.
pub const GENERATED_NAME_LEN: usize = 16;

/// Default timeout for HTTP fetches, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
