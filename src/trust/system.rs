//! OS-level trust anchor registration, one strategy per platform.

use tracing::debug;

use super::command::{CommandSpec, Elevation};
use super::{Platform, TrustInstaller};
use crate::error::{CaError, Result};

/// A platform's install recipe: the steps to run and how to do it by hand.
struct SystemPlan {
    tool: &'static str,
    steps: Vec<CommandSpec>,
    manual_command: String,
}

fn plan(installer: &TrustInstaller<'_>) -> SystemPlan {
    let ca_path = installer.ca.path.display().to_string();
    let ctx = &installer.ctx;

    match ctx.platform {
        Platform::MacOs => {
            let add = CommandSpec::new("security")
                .args(["add-trusted-cert", "-d", "-r", "trustRoot", "-k"])
                .arg(ctx.macos_keychain.display().to_string())
                .arg(ca_path)
                .elevation(Elevation::Sudo);
            SystemPlan {
                tool: "security",
                manual_command: add.to_string(),
                steps: vec![add],
            }
        }
        Platform::Linux => {
            let copy = CommandSpec::new("cp")
                .arg(ca_path)
                .arg(ctx.linux_anchor_path.display().to_string())
                .elevation(Elevation::Sudo);
            let refresh = CommandSpec::new("update-ca-certificates").elevation(Elevation::Sudo);
            SystemPlan {
                tool: "update-ca-certificates",
                manual_command: format!("{} && {}", copy, refresh),
                steps: vec![copy, refresh],
            }
        }
        Platform::Windows => {
            let add = CommandSpec::new("certutil")
                .args(["-addstore", "Root"])
                .arg(ca_path)
                .elevation(Elevation::Administrator);
            SystemPlan {
                tool: "certutil",
                manual_command: add.to_string(),
                steps: vec![add],
            }
        }
    }
}

/// Instructions for distributions without `update-ca-certificates`.
fn linux_manual_instructions(installer: &TrustInstaller<'_>) -> String {
    let ca_path = installer.ca.path.display();
    format!(
        "Install the CA manually for your distribution:\n\
         - Debian/Ubuntu: sudo cp {ca} {anchor} && sudo update-ca-certificates\n\
         - Fedora/RHEL:   sudo cp {ca} /etc/pki/ca-trust/source/anchors/ && sudo update-ca-trust\n\
         - Arch Linux:    sudo trust anchor {ca}",
        ca = ca_path,
        anchor = installer.ctx.linux_anchor_path.display(),
    )
}

pub(super) fn install(installer: &TrustInstaller<'_>) -> Result<String> {
    let plan = plan(installer);

    if !installer.runner.tool_exists(plan.tool) {
        let instructions = match installer.ctx.platform {
            Platform::Linux => linux_manual_instructions(installer),
            _ => format!("Run manually once `{}` is available:\n  {}", plan.tool, plan.manual_command),
        };
        return Err(CaError::ToolMissing {
            tool: plan.tool.to_string(),
            instructions,
        });
    }

    let prompt = format!(
        "Install \"{}\" into the {} system trust store? This runs: {}",
        installer.ca.common_name, installer.ctx.platform, plan.manual_command
    );
    if !installer.confirm.confirm(&prompt) {
        return Err(CaError::UserCancelled {
            manual_command: Some(plan.manual_command),
        });
    }

    for step in &plan.steps {
        installer.run_step(step, &plan.manual_command)?;
    }

    Ok(match installer.ctx.platform {
        Platform::MacOs => format!("added to {}", installer.ctx.macos_keychain.display()),
        Platform::Linux => format!("anchored at {}", installer.ctx.linux_anchor_path.display()),
        Platform::Windows => "added to the Root certificate store".to_string(),
    })
}

pub(super) fn is_trusted(installer: &TrustInstaller<'_>) -> bool {
    let common_name = installer.ca.common_name.clone();
    let query = match installer.ctx.platform {
        Platform::Linux => return installer.ctx.linux_anchor_path.is_file(),
        Platform::MacOs => CommandSpec::new("security")
            .args(["find-certificate", "-c"])
            .arg(common_name),
        Platform::Windows => CommandSpec::new("certutil")
            .args(["-store", "Root"])
            .arg(common_name),
    };

    match installer.runner.run(&query) {
        Ok(output) => output.success,
        Err(e) => {
            debug!(command = %query, error = %e, "trust query failed");
            false
        }
    }
}
