pub mod csrf {

    /// Tokens die an hour after issue regardless of use.
    pub const TOKEN_TTL_MINUTES: i64 = 60;

    /// Raw token entropy before hex encoding (256 bits).
    pub const TOKEN_BYTES: usize = 32;

    /// Map size that triggers an opportunistic sweep of expired tokens.
    pub const SWEEP_THRESHOLD: usize = 1024;
}

pub mod uploads {

    /// Public URL prefix the upload tree is served under.
    pub const PUBLIC_PREFIX: &str = "/uploads";

    /// Gallery photos live here, separate from the per-kind content roots.
    pub const GALLERY_DIR: &str = "gallery";
}

pub mod limits {

    pub const DEFAULT_PAGE_SIZE: u64 = 20;

    pub const MAX_PAGE_SIZE: u64 = 100;

    pub const DEFAULT_AUDIT_LIMIT: u64 = 50;

    pub const MAX_AUDIT_LIMIT: u64 = 500;
}
