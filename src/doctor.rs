//! Installation diagnostics (`localtls doctor`).

use chrono::{DateTime, Utc};

use crate::ca_manager::CaManager;
use crate::error::Result;
use crate::inventory::CertificateInventory;
use crate::trust::TrustInstaller;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaStatus {
    pub present: bool,
    pub common_name: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
    /// Why an existing CA could not be loaded.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateHealth {
    pub domain: String,
    pub not_after: DateTime<Utc>,
    pub days_remaining: i64,
    pub due_for_renewal: bool,
}

/// A detected problem and the command that fixes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub problem: String,
    pub fix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorReport {
    pub ca: CaStatus,
    /// `None` when the trust store could not be queried (no CA).
    pub os_trusted: Option<bool>,
    pub certificates: Vec<CertificateHealth>,
    pub issues: Vec<Issue>,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Collect the report. `installer` is only available once a CA exists.
pub fn gather_report(
    ca_manager: &CaManager,
    inventory: &CertificateInventory,
    installer: Option<&TrustInstaller<'_>>,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> Result<DoctorReport> {
    let mut issues = Vec::new();

    let ca = if ca_manager.exists() {
        match ca_manager.load() {
            Ok(ca) => CaStatus {
                present: true,
                common_name: Some(ca.common_name()),
                not_after: ca.not_after().ok(),
                error: None,
            },
            Err(e) => {
                issues.push(Issue {
                    problem: format!("CA files are unreadable: {}", e),
                    fix: "localtls init --force".to_string(),
                });
                CaStatus {
                    present: true,
                    common_name: None,
                    not_after: None,
                    error: Some(e.to_string()),
                }
            }
        }
    } else {
        issues.push(Issue {
            problem: "No local CA has been created".to_string(),
            fix: "localtls init".to_string(),
        });
        CaStatus {
            present: false,
            common_name: None,
            not_after: None,
            error: None,
        }
    };

    if let Some(not_after) = ca.not_after {
        if not_after < now {
            issues.push(Issue {
                problem: "The CA certificate has expired".to_string(),
                fix: "localtls init --force".to_string(),
            });
        }
    }

    let os_trusted = installer.map(TrustInstaller::is_trusted);
    if os_trusted == Some(false) {
        issues.push(Issue {
            problem: "The CA is not in the system trust store".to_string(),
            fix: "localtls trust".to_string(),
        });
    }

    let mut certificates: Vec<CertificateHealth> = inventory
        .list()?
        .into_iter()
        .map(|record| CertificateHealth {
            domain: record.domain(),
            not_after: record.not_after,
            days_remaining: record.days_remaining(now),
            due_for_renewal: record.expires_within(threshold_days, now),
        })
        .collect();
    certificates.sort_by(|a, b| a.domain.cmp(&b.domain));

    let due = certificates.iter().filter(|c| c.due_for_renewal).count();
    if due > 0 {
        issues.push(Issue {
            problem: format!("{} certificate(s) expire within {} days", due, threshold_days),
            fix: format!("localtls renew --days {}", threshold_days),
        });
    }

    Ok(DoctorReport {
        ca,
        os_trusted,
        certificates,
        issues,
    })
}

const BOX_WIDTH: usize = 61;

fn row(text: &str) {
    println!("│ {} │", truncate_string(text, BOX_WIDTH - 2));
}

fn section(title: &str) {
    println!("┌{}┐", "─".repeat(BOX_WIDTH));
    row(title);
    println!("├{}┤", "─".repeat(BOX_WIDTH));
}

fn end_section() {
    println!("└{}┘\n", "─".repeat(BOX_WIDTH));
}

pub fn print_doctor_report(report: &DoctorReport) {
    println!("\n╔{}╗", "═".repeat(BOX_WIDTH));
    println!("║ {} ║", truncate_string("LOCALTLS DOCTOR", BOX_WIDTH - 2));
    println!("╚{}╝\n", "═".repeat(BOX_WIDTH));

    section("CERTIFICATE AUTHORITY");
    match (&report.ca, &report.ca.error) {
        (ca, None) if ca.present => {
            row("Status:        ✓ PRESENT");
            if let Some(cn) = &ca.common_name {
                row(&format!("Subject:       {}", cn));
            }
            if let Some(not_after) = ca.not_after {
                row(&format!("Expires:       {}", not_after.format("%Y-%m-%d")));
            }
        }
        (_, Some(error)) => {
            row("Status:        ✗ UNREADABLE");
            row(&format!("Error:         {}", error));
        }
        _ => row("Status:        ✗ MISSING"),
    }
    match report.os_trusted {
        Some(true) => row("System trust:  ✓ INSTALLED"),
        Some(false) => row("System trust:  ✗ NOT INSTALLED"),
        None => row("System trust:  - UNKNOWN"),
    }
    end_section();

    section("CERTIFICATES");
    if report.certificates.is_empty() {
        row("No certificates issued yet");
    }
    for cert in &report.certificates {
        let marker = if cert.due_for_renewal { "✗" } else { "✓" };
        row(&format!(
            "{} {:<36} {:>5} days",
            marker,
            truncate_string(&cert.domain, 36),
            cert.days_remaining
        ));
    }
    end_section();

    section("SUMMARY");
    if report.is_healthy() {
        row("✓ Everything looks good");
    }
    for issue in &report.issues {
        row(&format!("✗ {}", issue.problem));
        row(&format!("  fix: {}", issue.fix));
    }
    end_section();
}

/// Pad or cut `s` to exactly `max_len` characters.
fn truncate_string(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        format!("{:<width$}", s, width = max_len)
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
