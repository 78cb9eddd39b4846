//! Setup flow: make sure a CA exists, then push it into every trust target.
//!
//! ```text
//! NoCa ──ensure──▶ CaReady ──install──▶ per target: Installed | Skipped | Failed
//! ```

use tracing::info;

use crate::ca_manager::CaManager;
use crate::error::Result;
use crate::trust::{CommandRunner, Confirm, InstallReport, TrustContext, TrustInstaller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    NoCa,
    /// `created` is true when this run generated the CA.
    CaReady { created: bool },
    TrustAttempted,
}

#[derive(Debug)]
pub struct SetupReport {
    pub ca_created: bool,
    pub trust: InstallReport,
}

pub struct SetupFlow<'a> {
    ca_manager: &'a CaManager,
    ctx: TrustContext,
    runner: &'a dyn CommandRunner,
    confirm: &'a dyn Confirm,
    stage: SetupStage,
}

impl<'a> SetupFlow<'a> {
    pub fn new(
        ca_manager: &'a CaManager,
        ctx: TrustContext,
        runner: &'a dyn CommandRunner,
        confirm: &'a dyn Confirm,
    ) -> Self {
        let stage = if ca_manager.exists() {
            SetupStage::CaReady { created: false }
        } else {
            SetupStage::NoCa
        };
        Self {
            ca_manager,
            ctx,
            runner,
            confirm,
            stage,
        }
    }

    pub fn stage(&self) -> SetupStage {
        self.stage
    }

    /// Run the flow to completion. CA errors abort; trust errors are reported
    /// per target inside the returned report.
    pub fn run(&mut self) -> Result<SetupReport> {
        let (_, created) = self.ca_manager.ensure()?;
        self.stage = SetupStage::CaReady { created };
        if created {
            info!("setup generated a new root CA");
        }

        let public = self.ca_manager.public_certificate()?;
        let installer = TrustInstaller::new(public, self.ctx.clone(), self.runner, self.confirm);
        let trust = installer.install()?;
        self.stage = SetupStage::TrustAttempted;

        Ok(SetupReport {
            ca_created: created,
            trust,
        })
    }
}
