//! Environment hardening ahead of lockdown.

use std::env;

/// Variable the engine consults for its user data directory.
pub const USER_DIR_VAR: &str = "QALCULATE_USER_DIR";

/// Pinned value. Always exists, resolves without a home-directory lookup,
/// and holds no definitions worth loading.
pub const USER_DIR_PIN: &str = "/";

/// Pin the engine's user data directory to [`USER_DIR_PIN`].
///
/// Resolving the default location goes through home-directory lookups that
/// need `openat` and `getcwd`, both kill-on-sight once the filter is live.
/// Pre-seeding the variable makes expressions that would touch local
/// definitions fail softly instead of tripping the filter.
pub fn pin_user_dir() {
    env::set_var(USER_DIR_VAR, USER_DIR_PIN);
    log::debug!("{USER_DIR_VAR} pinned to {USER_DIR_PIN}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_overrides_whatever_was_set() {
        env::set_var(USER_DIR_VAR, "/home/someone/.config/qalculate");
        pin_user_dir();
        assert_eq!(env::var(USER_DIR_VAR).as_deref(), Ok(USER_DIR_PIN));
    }
}
