use std::sync::LazyLock;

/// Defines the application version.
///
/// `IMAGE_VERSION` comes from the `VERSION` build env; the git sha and dirty
/// flag are only present when the crate is built from a git checkout.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let dirty = matches!(option_env!("VERGEN_GIT_DIRTY"), Some("true"));
    format!(
        "{}-{}{}",
        env!("IMAGE_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        if dirty { "-dirty" } else { "" }
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_starts_with_image_version() {
        assert!(VERSION.starts_with(env!("IMAGE_VERSION")));
        assert!(VERSION.len() > env!("IMAGE_VERSION").len());
    }
}
