use std::sync::LazyLock;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}-{}{}",
        env!("UNITLET_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        if option_env!("VERGEN_GIT_DIRTY") == Some("true") {
            "-dirty"
        } else {
            ""
        }
    )
});
