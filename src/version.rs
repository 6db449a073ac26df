//! Build identification reported in logs and on `/health`.

/// Crate version.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Branch the binary was built from; `unknown` outside a git checkout.
pub const GIT_BRANCH: &str = or_unknown(option_env!("VERGEN_GIT_BRANCH"));

/// Commit the binary was built from; `unknown` outside a git checkout.
pub const GIT_SHA: &str = or_unknown(option_env!("VERGEN_GIT_SHA"));

const SHORT_SHA_LEN: usize = 7;

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) => value,
        None => "unknown",
    }
}

/// Whether uncommitted changes were present at build time.
pub fn git_dirty() -> bool {
    matches!(option_env!("VERGEN_GIT_DIRTY"), Some("true"))
}

/// Abbreviated commit hash.
pub fn short_sha() -> &'static str {
    GIT_SHA.get(..SHORT_SHA_LEN).unwrap_or(GIT_SHA)
}

/// `{version}+{branch}.{sha}`, plus `.dirty` for a modified tree.
pub fn version_string() -> String {
    let mut version = format!("{PKG_VERSION}+{GIT_BRANCH}.{}", short_sha());
    if git_dirty() {
        version.push_str(".dirty");
    }
    version
}
