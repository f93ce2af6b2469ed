//! Sample findings for trying out listing and exports without fetching
//! anything or calling the extraction service.

use chrono::{Days, NaiveDate};
use tracing::{info, instrument};

use regwatch_fetcher::fingerprint;
use regwatch_shared::{ConsumerProfile, ExtractedFinding, Impact, Result, Source};
use regwatch_storage::{NewChange, NewFinding, NewSnapshot, Storage};

use crate::scorer;

pub const DEMO_SOURCE_NAME: &str = "Demo Source - Payment Scheme Updates";
pub const DEMO_SOURCE_URL: &str = "https://example.com/demo";

struct DemoItem {
    title: &'static str,
    summary: &'static str,
    deadline_in_days: u64,
    impact: Impact,
    categories: &'static [&'static str],
    regions: &'static [&'static str],
    transaction_types: &'static [&'static str],
    technical_requirements: &'static [&'static str],
    keywords: &'static [&'static str],
}

const DEMO_ITEMS: &[DemoItem] = &[
    DemoItem {
        title: "Visa AFT Recipient Data Requirements",
        summary: "Visa is mandating new recipientDetails fields for all Account Funding \
                  Transactions. Merchants processing crypto purchases or securities trading \
                  must include recipient name, address and account details.",
        deadline_in_days: 85,
        impact: Impact::High,
        categories: &["6051", "6211"],
        regions: &["Global"],
        transaction_types: &["AFT", "Original Credit"],
        technical_requirements: &[
            "Add recipientDetails object to AFT API requests",
            "Include recipientName, recipientAddress, recipientAccountNumber fields",
            "Validate required fields before submission",
            "Handle the new decline codes",
        ],
        keywords: &["AFT", "Visa", "crypto", "recipient data", "compliance"],
    },
    DemoItem {
        title: "Mastercard Enhanced Fraud Monitoring Update",
        summary: "Updated Enhanced Fraud Monitoring rules for high-risk MCCs. Crypto and \
                  forex merchants must keep fraud rates below 0.5% or face program enrollment.",
        deadline_in_days: 120,
        impact: Impact::High,
        categories: &["6051", "6211"],
        regions: &["Global"],
        transaction_types: &["Purchase", "Refund"],
        technical_requirements: &[
            "Monitor fraud-to-sales ratio in real time",
            "Alert automatically on threshold breaches",
            "Report chargebacks automatically",
        ],
        keywords: &["EFM", "fraud", "Mastercard", "chargeback", "monitoring"],
    },
    DemoItem {
        title: "CBUAE VASP Guidelines for Crypto Exchanges",
        summary: "Virtual Asset Service Providers operating in the UAE must register and \
                  comply with enhanced KYC/AML, transaction monitoring and reporting rules.",
        deadline_in_days: 150,
        impact: Impact::High,
        categories: &["6051"],
        regions: &["MENA", "UAE"],
        transaction_types: &["Crypto Purchase", "Crypto Sale", "Crypto Transfer"],
        technical_requirements: &[
            "Implement enhanced KYC verification",
            "Automate suspicious transaction reporting",
            "Keep an audit trail of compliance checks",
        ],
        keywords: &["CBUAE", "VASP", "crypto", "KYC", "AML"],
    },
    DemoItem {
        title: "Visa Direct API v2.0 Migration",
        summary: "Visa Direct API v1.0 is deprecated. Integrations must move to v2.0 with \
                  new authentication and additional data fields before the legacy API closes.",
        deadline_in_days: 240,
        impact: Impact::Medium,
        categories: &["6051", "6211"],
        regions: &["Global"],
        transaction_types: &["OCT", "Visa Direct"],
        technical_requirements: &[
            "Move the integration to API v2.0",
            "Implement OAuth 2.0 authentication",
            "Test all disbursement flows in sandbox",
        ],
        keywords: &["Visa Direct", "API", "migration", "disbursement"],
    },
    DemoItem {
        title: "PCI DSS v4.0 Compliance Deadline",
        summary: "Merchants and service providers must finish migrating from PCI DSS v3.2.1. \
                  Changes cover multi-factor authentication, encryption and security testing.",
        deadline_in_days: 180,
        impact: Impact::Low,
        categories: &["6051", "6211", "5999"],
        regions: &["Global"],
        transaction_types: &["All card transactions"],
        technical_requirements: &[
            "Require MFA for administrative access",
            "Use TLS 1.3 at minimum",
            "Run quarterly vulnerability scans",
        ],
        keywords: &["PCI DSS", "security", "encryption", "MFA"],
    },
];

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl DemoItem {
    fn fields(&self, today: NaiveDate) -> ExtractedFinding {
        ExtractedFinding {
            title: self.title.into(),
            summary: self.summary.into(),
            deadline: today.checked_add_days(Days::new(self.deadline_in_days)),
            impact: self.impact,
            categories: owned(self.categories),
            regions: owned(self.regions),
            transaction_types: owned(self.transaction_types),
            technical_requirements: owned(self.technical_requirements),
            keywords: owned(self.keywords),
        }
    }
}

/// Record the sample findings under an inactive demo source, scoring each
/// against `profile`. Deadlines are relative to `today`.
///
/// Every item gets its own snapshot and processed change, so the rows look
/// exactly like the output of a real cycle. Seeding twice adds a second set.
#[instrument(skip_all, fields(profile = %profile.name))]
pub async fn seed_demo(
    storage: &Storage,
    profile: &ConsumerProfile,
    today: NaiveDate,
) -> Result<Source> {
    // Inactive so scans never try to fetch the placeholder locator.
    let source = storage
        .upsert_source(DEMO_SOURCE_NAME, DEMO_SOURCE_URL, "demo", false)
        .await?;

    for (i, item) in DEMO_ITEMS.iter().enumerate() {
        let content = format!("Demo snapshot {} for {}", i + 1, item.title);
        let hash = fingerprint(&content);
        let snapshot = storage
            .insert_snapshot(&NewSnapshot::success(&source.id, content, hash))
            .await?;

        let change = storage
            .insert_change(&NewChange {
                source_id: source.id.clone(),
                prior_snapshot_id: None,
                new_snapshot_id: snapshot.id,
                diff_text: format!("+{}\n+{}", item.title, item.summary),
            })
            .await?;

        let fields = item.fields(today);
        let relevance_score = scorer::score(&fields, profile);
        storage
            .record_finding(&NewFinding {
                change_id: change.id,
                source_id: source.id.clone(),
                fields,
                relevance_score,
            })
            .await?;
    }

    info!(findings = DEMO_ITEMS.len(), "seeded demo data");
    Ok(source)
}

/// Number of findings one call to [`seed_demo`] records.
pub fn demo_item_count() -> usize {
    DEMO_ITEMS.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regwatch_storage::FindingQuery;

    fn profile() -> ConsumerProfile {
        ConsumerProfile {
            name: "Acme".into(),
            categories: vec!["6051".into()],
            regions: vec!["Global".into()],
            keywords: vec!["fraud".into(), "chargeback".into(), "crypto".into()],
        }
    }

    #[tokio::test]
    async fn seeded_findings_are_scored_and_listed() {
        let storage = Storage::open_in_memory().await.unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let source = seed_demo(&storage, &profile(), today).await.unwrap();
        assert!(!source.active);
        assert!(storage.list_active_sources().await.unwrap().is_empty());

        let findings = storage
            .list_findings(&FindingQuery::default())
            .await
            .unwrap();
        assert_eq!(findings.len(), demo_item_count());
        assert!(findings.iter().all(|f| f.source_name == DEMO_SOURCE_NAME));

        let vasp = findings
            .iter()
            .find(|f| f.finding.title.starts_with("CBUAE"))
            .unwrap();
        // Category and high impact match, regional scope does not
        assert_eq!(vasp.finding.relevance_score, 9);
        assert_eq!(vasp.finding.deadline, NaiveDate::from_ymd_opt(2026, 5, 31));

        assert!(storage.list_unprocessed_changes().await.unwrap().is_empty());
        assert_eq!(
            storage.count_snapshots(&source.id).await.unwrap(),
            demo_item_count() as u64
        );
    }
}
