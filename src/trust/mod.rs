//! Trust Store Installer
//!
//! Propagates the CA's public certificate into trust stores. Targets are a
//! platform tag crossed with a store kind:
//!
//! | Platform | System store                         | Chromium NSS    | Firefox NSS          |
//! |----------|--------------------------------------|-----------------|----------------------|
//! | macOS    | `security add-trusted-cert` (keychain) | uses keychain | `Profiles/*.default*` |
//! | Linux    | anchor copy + `update-ca-certificates` | `~/.pki/nssdb` | `~/.mozilla/firefox/*.default*` |
//! | Windows  | `certutil -addstore Root`            | uses system store | not managed        |
//!
//! Each target is attempted independently and ends in its own
//! [`TargetState`]. Only the system target decides whether the CA counts as
//! trusted; browser targets are advisory.
//!
//! The installer only ever sees a [`PublicCaCertificate`], so the CA key
//! cannot reach an external tool. All external programs run through a
//! [`CommandRunner`] and privileged steps are confirmed through [`Confirm`].

pub mod command;
mod nss;
mod system;

use std::fmt;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::ca_manager::PublicCaCertificate;
use crate::configs::TrustConfig;
use crate::error::{CaError, Result};

pub use command::{
    AssumeYes, CommandOutput, CommandRunner, CommandSpec, Confirm, Elevation, StdinConfirm,
    SystemRunner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

impl Platform {
    /// Platform of the running binary, if supported.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTarget {
    System(Platform),
    ChromiumNss,
    FirefoxNss,
}

impl fmt::Display for TrustTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustTarget::System(platform) => write!(f, "{} system trust store", platform),
            TrustTarget::ChromiumNss => f.write_str("Chromium NSS database"),
            TrustTarget::FirefoxNss => f.write_str("Firefox NSS profiles"),
        }
    }
}

/// Outcome for a single trust target.
#[derive(Debug)]
pub enum TargetState {
    NotAttempted,
    Installed(String),
    Skipped(String),
    Failed(CaError),
}

impl TargetState {
    pub fn is_installed(&self) -> bool {
        matches!(self, TargetState::Installed(_))
    }
}

/// Per-target result of [`TrustInstaller::install`].
#[derive(Debug, Default)]
pub struct InstallReport {
    pub targets: Vec<(TrustTarget, TargetState)>,
}

impl InstallReport {
    pub fn state(&self, target: TrustTarget) -> Option<&TargetState> {
        self.targets
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, state)| state)
    }

    /// True when the system target was installed. Browser targets do not count.
    pub fn is_trusted(&self) -> bool {
        self.targets
            .iter()
            .any(|(target, state)| matches!(target, TrustTarget::System(_)) && state.is_installed())
    }

    /// The system target's failure, if any.
    pub fn system_error(&self) -> Option<&CaError> {
        self.targets.iter().find_map(|(target, state)| match (target, state) {
            (TrustTarget::System(_), TargetState::Failed(e)) => Some(e),
            _ => None,
        })
    }
}

/// Where and as whom the installer runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustContext {
    pub platform: Platform,
    /// Home of the user whose browser stores are updated.
    pub home: Option<PathBuf>,
    /// The user who invoked `sudo`, when running elevated on their behalf.
    pub invoking_user: Option<String>,
    /// The process runs with root privileges.
    pub elevated: bool,
    pub nss_nickname: String,
    pub linux_anchor_path: PathBuf,
    pub macos_keychain: PathBuf,
}

impl TrustContext {
    /// Detect platform, privileges and the invoking user from the environment.
    pub fn detect(config: &TrustConfig) -> Result<Self> {
        let platform = Platform::current().ok_or_else(|| {
            CaError::Config("trust store installation is not supported on this OS".to_string())
        })?;
        let elevated = is_elevated();
        let invoking_user = if elevated {
            std::env::var("SUDO_USER")
                .ok()
                .filter(|user| !user.is_empty() && user != "root")
        } else {
            None
        };
        let home = match &invoking_user {
            Some(user) => Some(user_home(platform, user)),
            None => dirs::home_dir(),
        };

        Ok(Self {
            platform,
            home,
            invoking_user,
            elevated,
            nss_nickname: config.nss_nickname.clone(),
            linux_anchor_path: config.linux_anchor_path.clone(),
            macos_keychain: config.macos_keychain.clone(),
        })
    }
}

fn user_home(platform: Platform, user: &str) -> PathBuf {
    match platform {
        Platform::MacOs => PathBuf::from("/Users").join(user),
        Platform::Windows => PathBuf::from(r"C:\Users").join(user),
        Platform::Linux => PathBuf::from("/home").join(user),
    }
}

#[cfg(unix)]
fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_elevated() -> bool {
    false
}

pub struct TrustInstaller<'a> {
    ca: PublicCaCertificate,
    ctx: TrustContext,
    runner: &'a dyn CommandRunner,
    confirm: &'a dyn Confirm,
}

impl<'a> TrustInstaller<'a> {
    pub fn new(
        ca: PublicCaCertificate,
        ctx: TrustContext,
        runner: &'a dyn CommandRunner,
        confirm: &'a dyn Confirm,
    ) -> Self {
        Self {
            ca,
            ctx,
            runner,
            confirm,
        }
    }

    pub fn context(&self) -> &TrustContext {
        &self.ctx
    }

    /// Install into every target. Only a missing CA certificate fails the
    /// whole call; everything else is reported per target.
    pub fn install(&self) -> Result<InstallReport> {
        self.require_ca()?;

        let mut report = InstallReport::default();
        let system_target = TrustTarget::System(self.ctx.platform);
        let system_state = match self.install_system() {
            Ok(detail) => TargetState::Installed(detail),
            Err(e) => TargetState::Failed(e),
        };
        report.targets.push((system_target, system_state));
        report.targets.extend(self.install_browsers());

        for (target, state) in &report.targets {
            match state {
                TargetState::Installed(detail) => info!(%target, %detail, "trust target installed"),
                TargetState::Skipped(reason) => info!(%target, %reason, "trust target skipped"),
                TargetState::Failed(e) => warn!(%target, error = %e, "trust target failed"),
                TargetState::NotAttempted => {}
            }
        }
        Ok(report)
    }

    /// Register the CA with the operating system store.
    ///
    /// # Errors
    /// - `CaError::UserCancelled` when the confirmation is declined; nothing ran
    /// - `CaError::ToolMissing` with manual instructions
    /// - `CaError::Permission` with the manual command when a step fails
    pub fn install_system(&self) -> Result<String> {
        self.require_ca()?;
        system::install(self)
    }

    /// Install into the Chromium and Firefox NSS stores.
    pub fn install_browsers(&self) -> Vec<(TrustTarget, TargetState)> {
        vec![
            (TrustTarget::ChromiumNss, nss::install_chromium(self)),
            (TrustTarget::FirefoxNss, nss::install_firefox(self)),
        ]
    }

    /// Best-effort query of the system store for the CA's subject name.
    ///
    /// On Linux this only checks that the anchor file is in place.
    pub fn is_trusted(&self) -> bool {
        system::is_trusted(self)
    }

    fn require_ca(&self) -> Result<()> {
        if self.ca.path.is_file() {
            Ok(())
        } else {
            Err(CaError::NotFound {
                what: "CA certificate",
                path: self.ca.path.clone(),
            })
        }
    }

    /// Run a step, mapping spawn errors and non-zero exits to `Permission`.
    fn run_step(&self, spec: &CommandSpec, manual_command: &str) -> Result<CommandOutput> {
        let output = self.runner.run(spec).map_err(|e| CaError::Permission {
            message: format!("failed to run `{}`: {}", spec, e),
            manual_command: Some(manual_command.to_string()),
        })?;
        if !output.success {
            return Err(CaError::Permission {
                message: format!("`{}` failed: {}", spec, output.failure_summary()),
                manual_command: Some(manual_command.to_string()),
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_home_per_platform() {
        assert_eq!(user_home(Platform::Linux, "dev"), PathBuf::from("/home/dev"));
        assert_eq!(user_home(Platform::MacOs, "dev"), PathBuf::from("/Users/dev"));
    }

    #[test]
    fn test_report_trust_is_system_only() {
        let report = InstallReport {
            targets: vec![
                (
                    TrustTarget::System(Platform::Linux),
                    TargetState::Failed(CaError::UserCancelled {
                        manual_command: None,
                    }),
                ),
                (TrustTarget::ChromiumNss, TargetState::Installed("ok".to_string())),
                (TrustTarget::FirefoxNss, TargetState::Installed("ok".to_string())),
            ],
        };
        assert!(!report.is_trusted());
        assert!(report.system_error().is_some());
        assert!(report
            .state(TrustTarget::ChromiumNss)
            .is_some_and(TargetState::is_installed));
    }

    #[test]
    fn test_target_display() {
        assert_eq!(
            TrustTarget::System(Platform::MacOs).to_string(),
            "macOS system trust store"
        );
    }
}
