use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Well-known locations
// ---------------------------------------------------------------------------

pub const DEFAULT_STATE_DIR: &str = "/var/lib/nixcd";
pub const DEFAULT_MACHINE_ID_FILE: &str = "/etc/machine-id";
pub const DEFAULT_SYSTEM_PROFILE: &str = "/nix/var/nix/profiles/system";
pub const DEFAULT_AGENT_UNIT: &str = "nixcd.service";
pub const DEFAULT_IDENTITY_OPTION: &str = "services.nixcd.machineId";

pub const GCROOTS_DIR: &str = "gcroots";
pub const GCROOT_PREFIX: &str = "switch-to-configuration-";

/// Build attribute realised and activated for every host.
pub const TOPLEVEL_ATTRIBUTE: &str = "system.build.toplevel";

/// Flags prepended to every `nix` invocation.
pub const NIX_FEATURE_FLAGS: [&str; 4] = [
    "--extra-experimental-features",
    "nix-command",
    "--extra-experimental-features",
    "flakes",
];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn gcroots_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(GCROOTS_DIR)
}

pub fn gcroot_path(state_dir: &Path, hostname: &str) -> PathBuf {
    gcroots_dir(state_dir).join(format!("{GCROOT_PREFIX}{hostname}"))
}

/// Activation entry point inside a system closure.
pub fn switch_to_configuration(output_path: &Path) -> PathBuf {
    output_path.join("bin").join("switch-to-configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcroot_is_named_after_host() {
        assert_eq!(
            gcroot_path(Path::new("/var/lib/nixcd"), "web1"),
            PathBuf::from("/var/lib/nixcd/gcroots/switch-to-configuration-web1")
        );
    }

    #[test]
    fn activation_entry_point_lives_in_bin() {
        assert_eq!(
            switch_to_configuration(Path::new("/nix/store/abc-web1")),
            PathBuf::from("/nix/store/abc-web1/bin/switch-to-configuration")
        );
    }
}
