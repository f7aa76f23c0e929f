/// gengc crate version such as 0.4.0
pub const GENGC_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the crate, used as the prefix of the startup banner.
pub const GENGC_PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Comma separated features enabled for this build
pub const GENGC_FEATURES: &str = {
    // Keep this list in sync with the `[features]` table.
    if cfg!(all(feature = "builtin_env_logger", feature = "extreme_assertions")) {
        "builtin_env_logger,extreme_assertions"
    } else if cfg!(feature = "builtin_env_logger") {
        "builtin_env_logger"
    } else if cfg!(feature = "extreme_assertions") {
        "extreme_assertions"
    } else {
        ""
    }
};

lazy_static! {
    /// The version banner printed when the GC is initialized, such as `gengc 0.4.0 (builtin_env_logger)`.
    pub static ref GENGC_FULL_BUILD_INFO: String = if GENGC_FEATURES.is_empty() {
        format!("{} {}", GENGC_PKG_NAME, GENGC_PKG_VERSION)
    } else {
        format!("{} {} ({})", GENGC_PKG_NAME, GENGC_PKG_VERSION, GENGC_FEATURES)
    };
}
