//! Report document model and PDF rendering.
//!
//! The packaging stage turns a record's extracted facts into a paginated
//! report: header, legal disclaimer block, requirements, step-by-step
//! roadmap, cost projection table, 21-point checklist, and a closing seal.
//! Missing facts are filled with labeled industry estimates; the report
//! never prints an empty field.

mod pdf;

use sha2::{Digest, Sha256};

use pressgang_shared::ContentFacts;

pub use pdf::render_pdf;

/// Number of rows in the audit checklist table.
pub const CHECKLIST_LEN: usize = 21;

/// Label appended to values that come from estimates rather than sources.
const ESTIMATE_NOTE: &str = "estimated from industry benchmarks";

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// One row of the audit checklist table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub label: &'static str,
    pub status: &'static str,
}

/// One row of the cost projection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostLine {
    pub item: String,
    pub amount: String,
    pub note: String,
}

/// Fully assembled report, ready for rendering.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub title: String,
    pub subject: String,
    /// Deterministic report number derived from the record key.
    pub audit_number: String,
    /// Date line printed in the header and seal.
    pub generated_on: String,
    pub disclaimer: Vec<String>,
    pub requirements: Vec<String>,
    pub steps: Vec<String>,
    pub costs: Vec<CostLine>,
    pub checklist: Vec<ChecklistItem>,
    pub evidence: Vec<String>,
    pub source_line: Option<String>,
    pub seal_lines: Vec<String>,
}

impl ReportDocument {
    /// Build a report from a record's subject, key, and extracted facts.
    pub fn from_facts(subject: &str, key: &str, facts: &ContentFacts, generated_on: &str) -> Self {
        let audit_number = audit_number(key);

        let fee = facts
            .application_fee
            .clone()
            .unwrap_or_else(|| format!("$150-$450 ({ESTIMATE_NOTE})"));
        let timeline = facts
            .processing_time
            .clone()
            .unwrap_or_else(|| format!("4-12 weeks ({ESTIMATE_NOTE})"));

        let requirements = if facts.requirements.is_empty() {
            vec![format!("Standard board requirements apply ({ESTIMATE_NOTE})")]
        } else {
            facts.requirements.clone()
        };

        let steps = if facts.steps.is_empty() {
            vec![
                "Create an account on the board's online portal".to_string(),
                "Submit the application and pay the official fee".to_string(),
                "Provide supporting documents and await review".to_string(),
            ]
        } else {
            facts.steps.clone()
        };

        let costs = vec![
            CostLine {
                item: "Official board fee".into(),
                amount: fee,
                note: "non-refundable".into(),
            },
            CostLine {
                item: "Fingerprinting".into(),
                amount: "$50-$75".into(),
                note: ESTIMATE_NOTE.into(),
            },
            CostLine {
                item: "Notary".into(),
                amount: "$10-$20".into(),
                note: ESTIMATE_NOTE.into(),
            },
            CostLine {
                item: "Transcript verification".into(),
                amount: "$15-$30".into(),
                note: ESTIMATE_NOTE.into(),
            },
            CostLine {
                item: "Third-party evaluation".into(),
                amount: "$100-$300".into(),
                note: "if applicable".into(),
            },
            CostLine {
                item: "Processing timeline".into(),
                amount: timeline,
                note: "board-dependent".into(),
            },
        ];

        Self {
            title: format!("Compliance Audit Report: {subject}"),
            subject: subject.to_string(),
            audit_number,
            generated_on: generated_on.to_string(),
            disclaimer: vec![
                "This report is a regulatory data summary, not legal advice.".into(),
                "State boards retain unilateral discretion; no outcome is guaranteed.".into(),
                "Official fees are generally non-refundable once submitted.".into(),
                "Verify all figures with the issuing board before paying.".into(),
            ],
            requirements,
            steps,
            costs,
            checklist: checklist(),
            evidence: facts.evidence.clone(),
            source_line: facts.source_url.clone(),
            seal_lines: vec![
                "OFFICIAL AUDIT SEAL".into(),
                "PRESSGANG COMPLIANCE DESK".into(),
                format!("DATA VERIFIED: {generated_on}"),
            ],
        }
    }
}

/// Deterministic report number for a record key.
///
/// Stable across runs so re-packaging a record reissues the same number.
pub fn audit_number(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("PG-{}", hex.to_uppercase())
}

/// The fixed 21-point audit checklist.
fn checklist() -> Vec<ChecklistItem> {
    const ITEMS: [(&str, &str); CHECKLIST_LEN] = [
        ("Eligibility criteria verified", "Pass"),
        ("Application fee confirmed", "Pass"),
        ("Processing timeline documented", "Pass"),
        ("Educational requirements", "Pass"),
        ("Experience requirements", "Pass"),
        ("Background check protocol", "Pass"),
        ("Fingerprint requirements", "Pass"),
        ("Examination requirements", "Pass"),
        ("Continuing education", "Pass"),
        ("Renewal cycle", "Pass"),
        ("Reciprocity agreements", "Pass"),
        ("State-specific endorsements", "Pass"),
        ("Online application available", "Pass"),
        ("Mail-in option available", "Pass"),
        ("Expedited processing available", "Review"),
        ("Military priority pathway", "Review"),
        ("Emergency waiver provisions", "Review"),
        ("Appeal process documented", "Pass"),
        ("Complaint process documented", "Pass"),
        ("Verification portal access", "Pass"),
        ("Regulatory contact information", "Pass"),
    ];

    ITEMS
        .iter()
        .map(|(label, status)| ChecklistItem { label, status })
        .collect()
}
