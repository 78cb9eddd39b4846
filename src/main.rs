//! localtls command-line entry point.
//!
//! Every subcommand is a thin call into the library; this file only parses
//! arguments, prints progress and maps errors to an exit status.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use localtls::configs::{AppConfig, Paths, HOME_ENV_VAR};
use localtls::doctor::{gather_report, print_doctor_report};
use localtls::domain_name::{is_wildcard, sanitize};
use localtls::license::{
    enforce_wildcard_quota, LicenseClient, LicenseSource, MachineInfo, WildcardDecision,
};
use localtls::logging::init_logging;
use localtls::setup::SetupFlow;
use localtls::trust::{AssumeYes, Confirm, StdinConfirm, SystemRunner};
use localtls::{
    CaError, CaManager, CertificateInventory, CertificateIssuer, InstallReport, TargetState,
    TrustContext, TrustInstaller,
};

const LOOPBACK_DOMAINS: [&str; 2] = ["localhost", "127.0.0.1"];

#[derive(Parser)]
#[command(name = "localtls", version, about = "Locally trusted development certificates")]
struct Cli {
    /// Storage root (overrides LOCALTLS_HOME and the config file)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local CA and install it into trust stores
    Init {
        /// Regenerate the CA even if one exists
        #[arg(long)]
        force: bool,
        /// Skip trust store installation
        #[arg(long)]
        no_trust: bool,
    },
    /// Issue a certificate for one or more domains
    Cert {
        #[arg(required = true)]
        domains: Vec<String>,
        /// Do not add localhost and 127.0.0.1
        #[arg(long)]
        no_loopback: bool,
    },
    /// List issued certificates
    List {
        #[arg(long)]
        json: bool,
    },
    /// Renew certificates that expire soon
    Renew {
        /// Renewal threshold in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Install the CA into system and browser trust stores
    Trust,
    /// Show whether the CA is trusted by the system
    Status,
    /// Diagnose the installation
    Doctor,
    /// Create the CA if needed and install it everywhere
    Setup,
}

struct Engine {
    config: AppConfig,
    ca_manager: CaManager,
    issuer: CertificateIssuer,
    inventory: CertificateInventory,
}

impl Engine {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().or_else(AppConfig::default_path);
        let config = match config_path {
            Some(path) => AppConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AppConfig::default(),
        };
        init_logging(&config.logging);

        let paths = Paths::resolve(cli.home.clone(), std::env::var_os(HOME_ENV_VAR), &config)
            .context("Failed to resolve storage root")?;
        debug!(root = %paths.root.display(), "resolved storage root");

        let ca_manager = CaManager::new(paths.clone(), config.ca.clone());
        let issuer = CertificateIssuer::new(ca_manager.clone(), &paths, config.leaf.clone());
        let inventory = CertificateInventory::new(issuer.clone());

        Ok(Self {
            config,
            ca_manager,
            issuer,
            inventory,
        })
    }

    fn trust_context(&self) -> Result<TrustContext> {
        TrustContext::detect(&self.config.trust).context("Failed to inspect trust environment")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let engine = Engine::new(&cli)?;
    let confirm: &dyn Confirm = if cli.yes { &AssumeYes } else { &StdinConfirm };

    match &cli.command {
        Commands::Init { force, no_trust } => cmd_init(&engine, confirm, *force, *no_trust),
        Commands::Cert {
            domains,
            no_loopback,
        } => cmd_cert(&engine, domains, *no_loopback),
        Commands::List { json } => cmd_list(&engine, *json),
        Commands::Renew { days } => cmd_renew(&engine, *days),
        Commands::Trust => cmd_trust(&engine, confirm),
        Commands::Status => cmd_status(&engine),
        Commands::Doctor => cmd_doctor(&engine),
        Commands::Setup => cmd_setup(&engine, confirm),
    }
}

fn cmd_init(engine: &Engine, confirm: &dyn Confirm, force: bool, no_trust: bool) -> Result<()> {
    if engine.ca_manager.exists() && !force {
        println!("✓ Local CA already exists at {}", engine.ca_manager.cert_path().display());
    } else {
        if engine.ca_manager.exists() {
            println!("! Regenerating the CA invalidates every certificate issued so far.");
            println!("  Re-issue them with `localtls cert` afterwards.");
            if !confirm.confirm_destructive("Replace the existing CA?") {
                bail!("CA regeneration cancelled");
            }
        }
        let ca = engine
            .ca_manager
            .generate()
            .context("Failed to generate root CA")?;
        println!("✓ Root CA generated: {}", ca.common_name());
        println!("✓ Certificate: {}", engine.ca_manager.cert_path().display());
    }

    if !no_trust {
        let installer_ctx = engine.trust_context()?;
        let runner = SystemRunner::new(installer_ctx.elevated);
        let installer = TrustInstaller::new(
            engine.ca_manager.public_certificate()?,
            installer_ctx,
            &runner,
            confirm,
        );
        let report = installer.install()?;
        print_install_report(&report);
    }

    if engine.config.license.token.is_some() {
        match LicenseClient::new(&engine.config.license)
            .and_then(|client| client.machine_ping(&MachineInfo::current()))
        {
            Ok(()) => debug!("machine registered"),
            Err(e) => debug!(error = %e, "machine ping failed"),
        }
    }
    Ok(())
}

fn cmd_cert(engine: &Engine, domains: &[String], no_loopback: bool) -> Result<()> {
    if !engine.ca_manager.exists() {
        bail!("CA not found. Run `localtls init` first.");
    }
    let primary = domains
        .first()
        .ok_or_else(|| anyhow!("at least one domain is required"))?;

    if is_wildcard(primary) {
        let identifier = sanitize(primary);
        // Re-issuing an existing wildcard does not use up another slot
        let existing = engine
            .inventory
            .list()?
            .iter()
            .filter(|r| r.is_wildcard() && r.identifier != identifier)
            .count();
        if let WildcardDecision::AllowedLocally { reason } =
            enforce_wildcard_quota(&engine.config.license, existing)?
        {
            println!("! Could not verify license ({}), proceeding with local check", reason);
        }
    }

    let mut requested: Vec<String> = domains.to_vec();
    if !no_loopback {
        for extra in LOOPBACK_DOMAINS {
            if !requested.iter().any(|d| d == extra) {
                requested.push(extra.to_string());
            }
        }
    }

    let issued = engine
        .issuer
        .issue(&requested)
        .with_context(|| format!("Failed to issue certificate for {}", primary))?;

    println!("✓ Certificate issued for {}", issued.domains.join(", "));
    println!("  Certificate: {}", issued.cert_path().display());
    println!("  Private key: {}", issued.key_path().display());
    println!("  Expires:     {}", issued.not_after.format("%Y-%m-%d"));
    Ok(())
}

fn cmd_list(engine: &Engine, json: bool) -> Result<()> {
    let mut records = engine.inventory.list()?;
    records.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No certificates issued yet. Run `localtls cert <domain>`.");
        return Ok(());
    }

    let now = chrono::Utc::now();
    println!("{:<40} {:<12} {:>6}", "DOMAIN", "EXPIRES", "DAYS");
    for record in &records {
        println!(
            "{:<40} {:<12} {:>6}",
            record.domain(),
            record.not_after.format("%Y-%m-%d"),
            record.days_remaining(now)
        );
    }
    Ok(())
}

fn cmd_renew(engine: &Engine, days: Option<u32>) -> Result<()> {
    let threshold = days.unwrap_or(engine.config.renewal.threshold_days);
    match engine.inventory.renew(threshold) {
        Ok(renewed) if renewed.is_empty() => {
            println!("✓ No certificates expire within {} days", threshold);
            Ok(())
        }
        Ok(renewed) => {
            for domain in &renewed {
                println!("✓ Renewed {}", domain);
            }
            Ok(())
        }
        Err(CaError::Renewal {
            renewed,
            domain,
            source,
        }) => {
            for done in &renewed {
                println!("✓ Renewed {}", done);
            }
            println!("✗ Failed to renew {}", domain);
            Err(anyhow::Error::new(*source).context(format!("Renewal stopped at {}", domain)))
        }
        Err(e) => Err(e).context("Failed to renew certificates"),
    }
}

fn cmd_trust(engine: &Engine, confirm: &dyn Confirm) -> Result<()> {
    let ctx = engine.trust_context()?;
    let runner = SystemRunner::new(ctx.elevated);
    let public = engine
        .ca_manager
        .public_certificate()
        .context("CA not found. Run `localtls init` first.")?;
    let report = TrustInstaller::new(public, ctx, &runner, confirm).install()?;
    print_install_report(&report);

    if !report.is_trusted() {
        bail!("The CA was not installed into the system trust store");
    }
    Ok(())
}

fn cmd_status(engine: &Engine) -> Result<()> {
    if !engine.ca_manager.exists() {
        println!("✗ No local CA. Run `localtls init`.");
        return Ok(());
    }
    let ctx = engine.trust_context()?;
    let runner = SystemRunner::new(ctx.elevated);
    let installer = TrustInstaller::new(
        engine.ca_manager.public_certificate()?,
        ctx,
        &runner,
        &AssumeYes,
    );
    if installer.is_trusted() {
        println!("✓ CA is trusted by the system");
    } else {
        println!("✗ CA is not trusted by the system. Run `localtls trust`.");
    }
    Ok(())
}

fn cmd_doctor(engine: &Engine) -> Result<()> {
    let ctx = engine.trust_context()?;
    let runner = SystemRunner::new(ctx.elevated);
    let installer = engine
        .ca_manager
        .public_certificate()
        .ok()
        .map(|public| TrustInstaller::new(public, ctx, &runner, &AssumeYes));

    let report = gather_report(
        &engine.ca_manager,
        &engine.inventory,
        installer.as_ref(),
        engine.config.renewal.threshold_days,
        chrono::Utc::now(),
    )?;
    print_doctor_report(&report);
    Ok(())
}

fn cmd_setup(engine: &Engine, confirm: &dyn Confirm) -> Result<()> {
    let ctx = engine.trust_context()?;
    let runner = SystemRunner::new(ctx.elevated);
    let mut flow = SetupFlow::new(&engine.ca_manager, ctx, &runner, confirm);
    let report = flow.run().context("Setup failed")?;

    if report.ca_created {
        println!("✓ Root CA generated");
    } else {
        println!("✓ Using existing root CA");
    }
    print_install_report(&report.trust);

    if !report.trust.is_trusted() {
        bail!("Setup finished without system trust");
    }
    Ok(())
}

fn print_install_report(report: &InstallReport) {
    for (target, state) in &report.targets {
        match state {
            TargetState::Installed(detail) => println!("✓ {}: {}", target, detail),
            TargetState::Skipped(reason) => println!("- {}: skipped ({})", target, reason),
            TargetState::NotAttempted => println!("- {}: not attempted", target),
            TargetState::Failed(e) => {
                println!("✗ {}: {}", target, e);
                if let Some(manual) = e.manual_command() {
                    println!("  Run manually:");
                    for line in manual.lines() {
                        println!("    {}", line);
                    }
                }
            }
        }
    }
}
