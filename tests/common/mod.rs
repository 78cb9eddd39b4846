#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use localtls::configs::{CaConfig, LeafConfig, Paths};
use localtls::trust::{CommandOutput, CommandRunner, CommandSpec, Confirm, Platform};
use localtls::{CaManager, CertificateInventory, CertificateIssuer, TrustContext};
use openssl::x509::X509;
use tempfile::TempDir;

/// A storage root in a temp dir with a CA already generated.
pub struct Fixture {
    pub dir: TempDir,
    pub paths: Paths,
    pub ca_manager: CaManager,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self::without_ca();
        fixture.ca_manager.generate().unwrap();
        fixture
    }

    pub fn without_ca() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let ca_manager = CaManager::new(paths.clone(), CaConfig::default());
        Self {
            dir,
            paths,
            ca_manager,
        }
    }

    pub fn issuer(&self) -> CertificateIssuer {
        self.issuer_with_validity(365)
    }

    pub fn issuer_with_validity(&self, validity_days: u32) -> CertificateIssuer {
        let leaf = LeafConfig {
            validity_days,
            ..LeafConfig::default()
        };
        CertificateIssuer::new(self.ca_manager.clone(), &self.paths, leaf)
    }

    pub fn inventory(&self) -> CertificateInventory {
        CertificateInventory::new(self.issuer())
    }

    pub fn home(&self) -> PathBuf {
        let home = self.dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        home
    }

    pub fn trust_context(&self, platform: Platform) -> TrustContext {
        TrustContext {
            platform,
            home: Some(self.home()),
            invoking_user: None,
            elevated: false,
            nss_nickname: "localtls Local CA".to_string(),
            linux_anchor_path: self.dir.path().join("anchors").join("localtls.crt"),
            macos_keychain: PathBuf::from("/Library/Keychains/System.keychain"),
        }
    }
}

pub fn read_cert(path: &Path) -> X509 {
    X509::from_pem(&fs::read(path).unwrap()).unwrap()
}

/// SAN entries rendered as `DNS:name` / `IP:addr`, in certificate order.
pub fn san_strings(cert: &X509) -> Vec<String> {
    cert.subject_alt_names()
        .unwrap()
        .iter()
        .map(|name| {
            if let Some(dns) = name.dnsname() {
                format!("DNS:{}", dns)
            } else {
                let bytes = name.ipaddress().unwrap();
                let ip: IpAddr = match bytes.len() {
                    4 => <[u8; 4]>::try_from(bytes).unwrap().into(),
                    _ => <[u8; 16]>::try_from(bytes).unwrap().into(),
                };
                format!("IP:{}", ip)
            }
        })
        .collect()
}

/// Records every command and emulates `certutil` NSS databases in memory.
#[derive(Default)]
pub struct FakeRunner {
    pub commands: RefCell<Vec<CommandSpec>>,
    /// Entries per NSS database URI.
    pub nss_entries: RefCell<HashMap<String, usize>>,
    pub missing_tools: HashSet<String>,
    pub failing_programs: HashSet<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_tool(mut self, tool: &str) -> Self {
        self.missing_tools.insert(tool.to_string());
        self
    }

    pub fn failing(mut self, program: &str) -> Self {
        self.failing_programs.insert(program.to_string());
        self
    }

    pub fn programs(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    pub fn entries(&self, db: &Path) -> usize {
        self.nss_entries
            .borrow()
            .get(&format!("sql:{}", db.display()))
            .copied()
            .unwrap_or(0)
    }

    pub fn seed_entries(&self, db: &Path, count: usize) {
        self.nss_entries
            .borrow_mut()
            .insert(format!("sql:{}", db.display()), count);
    }

    fn certutil(&self, args: &[String]) -> CommandOutput {
        let Some(db) = args
            .iter()
            .position(|a| a == "-d")
            .and_then(|i| args.get(i + 1))
        else {
            return CommandOutput::success();
        };
        let mut entries = self.nss_entries.borrow_mut();
        let count = entries.entry(db.clone()).or_insert(0);
        match args.first().map(String::as_str) {
            Some("-A") => {
                *count += 1;
                CommandOutput::success()
            }
            Some("-D") if *count > 0 => {
                *count -= 1;
                CommandOutput::success()
            }
            Some("-D") => CommandOutput::failure(255, "could not find certificate named"),
            _ => CommandOutput::success(),
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.commands.borrow_mut().push(command.clone());
        if self.failing_programs.contains(&command.program) {
            return Ok(CommandOutput::failure(1, "permission denied"));
        }
        if command.program == "certutil" {
            return Ok(self.certutil(&command.args));
        }
        Ok(CommandOutput::success())
    }

    fn tool_exists(&self, tool: &str) -> bool {
        !self.missing_tools.contains(tool)
    }
}

/// Answers every prompt the same way and counts the prompts.
pub struct ScriptedConfirm {
    pub answer: bool,
    pub asked: Cell<usize>,
}

impl ScriptedConfirm {
    pub fn yes() -> Self {
        Self {
            answer: true,
            asked: Cell::new(0),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            asked: Cell::new(0),
        }
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}
