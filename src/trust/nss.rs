//! Browser NSS databases (Chromium `~/.pki/nssdb`, Firefox profiles).
//!
//! Installing removes every entry already stored under the CA nickname and
//! then adds the certificate once, so repeated installs leave exactly one
//! entry. A missing browser is reported as skipped, not as an error.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};

use super::command::CommandSpec;
use super::{Platform, TargetState, TrustInstaller};
use crate::error::{io_at, CaError, Result};

const CERTUTIL: &str = "certutil";
/// NSS trust flags: valid CA for issuing server certificates.
const CA_TRUST_FLAGS: &str = "C,,";
/// Upper bound on stale entries removed from one database.
const MAX_STALE_ENTRIES: usize = 16;

const CHROMIUM_CONFIG_DIRS: &[&str] = &[
    ".config/google-chrome",
    ".config/chromium",
    ".config/BraveSoftware",
    ".config/microsoft-edge",
];

fn nss_uri(db: &Path) -> String {
    format!("sql:{}", db.display())
}

fn certutil_instructions(platform: Platform) -> String {
    match platform {
        Platform::MacOs => "Install NSS tools with: brew install nss".to_string(),
        _ => "Install NSS tools with one of:\n\
              - Debian/Ubuntu: sudo apt install libnss3-tools\n\
              - Fedora/RHEL:   sudo dnf install nss-tools\n\
              - Arch Linux:    sudo pacman -S nss"
            .to_string(),
    }
}

fn tool_missing(installer: &TrustInstaller<'_>) -> TargetState {
    TargetState::Failed(CaError::ToolMissing {
        tool: CERTUTIL.to_string(),
        instructions: certutil_instructions(installer.ctx.platform),
    })
}

pub(super) fn install_chromium(installer: &TrustInstaller<'_>) -> TargetState {
    match installer.ctx.platform {
        Platform::Linux => {}
        Platform::MacOs => return TargetState::Skipped("Chromium uses the macOS keychain".to_string()),
        Platform::Windows => {
            return TargetState::Skipped("Chromium uses the Windows certificate store".to_string())
        }
    }
    let Some(home) = installer.ctx.home.as_deref() else {
        return TargetState::Skipped("home directory unknown".to_string());
    };

    let pki_dir = home.join(".pki");
    let db = pki_dir.join("nssdb");
    let db_exists = db.is_dir();
    if !db_exists && !CHROMIUM_CONFIG_DIRS.iter().any(|dir| home.join(dir).is_dir()) {
        return TargetState::Skipped("no Chromium-family browser profile found".to_string());
    }
    if !installer.runner.tool_exists(CERTUTIL) {
        return tool_missing(installer);
    }

    let result = (|| -> Result<()> {
        if !db_exists {
            create_database(installer, &db)?;
        }
        install_into(installer, &db)
    })();
    restore_ownership(installer, &pki_dir);

    match result {
        Ok(()) => TargetState::Installed(format!("added to {}", db.display())),
        Err(e) => TargetState::Failed(e),
    }
}

pub(super) fn install_firefox(installer: &TrustInstaller<'_>) -> TargetState {
    let Some(home) = installer.ctx.home.as_deref() else {
        return TargetState::Skipped("home directory unknown".to_string());
    };
    let profiles_root = match installer.ctx.platform {
        Platform::Linux => home.join(".mozilla").join("firefox"),
        Platform::MacOs => home
            .join("Library")
            .join("Application Support")
            .join("Firefox")
            .join("Profiles"),
        Platform::Windows => {
            return TargetState::Skipped("Firefox profiles are not managed on Windows".to_string())
        }
    };

    let profiles = firefox_profiles(&profiles_root);
    if profiles.is_empty() {
        return TargetState::Skipped("no Firefox profile found".to_string());
    }
    if !installer.runner.tool_exists(CERTUTIL) {
        return tool_missing(installer);
    }

    let mut installed = 0;
    let mut first_error = None;
    for profile in &profiles {
        match install_into(installer, profile) {
            Ok(()) => installed += 1,
            Err(e) => {
                warn!(profile = %profile.display(), error = %e, "firefox profile install failed");
                first_error.get_or_insert(e);
            }
        }
        restore_ownership(installer, profile);
    }

    match first_error {
        Some(e) if installed == 0 => TargetState::Failed(e),
        _ => TargetState::Installed(format!("added to {} of {} profile(s)", installed, profiles.len())),
    }
}

/// Profile directories matching `<root>/*.default*`, sorted.
pub(super) fn firefox_profiles(profiles_root: &Path) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/*.default*",
        Pattern::escape(&profiles_root.to_string_lossy())
    );
    let Ok(paths) = glob::glob(&pattern) else {
        return Vec::new();
    };
    let mut profiles: Vec<PathBuf> = paths.filter_map(|p| p.ok()).filter(|p| p.is_dir()).collect();
    profiles.sort();
    profiles
}

fn create_database(installer: &TrustInstaller<'_>, db: &Path) -> Result<()> {
    fs::create_dir_all(db).map_err(io_at(db))?;
    let init = CommandSpec::new(CERTUTIL)
        .args(["-N", "-d"])
        .arg(nss_uri(db))
        .arg("--empty-password");
    installer.run_step(&init, &init.to_string())?;
    debug!(db = %db.display(), "created NSS database");
    Ok(())
}

fn install_into(installer: &TrustInstaller<'_>, db: &Path) -> Result<()> {
    let uri = nss_uri(db);
    let nickname = installer.ctx.nss_nickname.as_str();

    // Deleting fails once no entry with the nickname is left
    for _ in 0..MAX_STALE_ENTRIES {
        let delete = CommandSpec::new(CERTUTIL).args(["-D", "-d", uri.as_str(), "-n", nickname]);
        match installer.runner.run(&delete) {
            Ok(output) if output.success => debug!(db = %uri, "removed previous CA entry"),
            _ => break,
        }
    }

    let add = CommandSpec::new(CERTUTIL)
        .args(["-A", "-d", uri.as_str(), "-t", CA_TRUST_FLAGS, "-n", nickname, "-i"])
        .arg(installer.ca.path.display().to_string());
    installer.run_step(&add, &add.to_string())?;
    Ok(())
}

/// Give directories touched under `sudo` back to the invoking user.
fn restore_ownership(installer: &TrustInstaller<'_>, dir: &Path) {
    let (true, Some(user)) = (installer.ctx.elevated, installer.ctx.invoking_user.as_deref()) else {
        return;
    };
    if installer.ctx.platform == Platform::Windows || !dir.exists() {
        return;
    }
    let chown = CommandSpec::new("chown")
        .arg("-R")
        .arg(format!("{}:", user))
        .arg(dir.display().to_string());
    match installer.runner.run(&chown) {
        Ok(output) if output.success => debug!(dir = %dir.display(), %user, "restored ownership"),
        Ok(output) => warn!(dir = %dir.display(), error = %output.failure_summary(), "chown failed"),
        Err(e) => warn!(dir = %dir.display(), error = %e, "chown failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firefox_profiles_match_default_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("abcd.default-release")).unwrap();
        fs::create_dir_all(dir.path().join("efgh.default")).unwrap();
        fs::create_dir_all(dir.path().join("ijkl.dev-edition")).unwrap();
        fs::write(dir.path().join("zzz.default.txt"), b"").unwrap();

        let profiles = firefox_profiles(dir.path());
        assert_eq!(
            profiles,
            vec![
                dir.path().join("abcd.default-release"),
                dir.path().join("efgh.default"),
            ]
        );
    }

    #[test]
    fn test_missing_profile_root_is_empty() {
        assert!(firefox_profiles(Path::new("/nonexistent/firefox")).is_empty());
    }

    #[test]
    fn test_nss_uri() {
        assert_eq!(nss_uri(Path::new("/home/u/.pki/nssdb")), "sql:/home/u/.pki/nssdb");
    }
}
