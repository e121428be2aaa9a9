//! Direct-to-database fixture seeding for the verifier under test.
//!
//! The verifier only attests agents it knows about, so before a run the
//! harness inserts one policy pair and one `verifiermain` row per mock
//! agent, straight into the verifier's database. After the run the rows are
//! removed again, together with whatever attestation state the run created.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::info;

use crate::domain::models::config::ExecutionConfig;

const POLICY_ROW_ID: i64 = 99999;
const IMA_POLICY_NAME: &str = "perf-test-policy";
const UEFI_REFSTATE_NAME: &str = "perf-test-refstate";
const AGENT_ID_PATTERN: &str = "perf-test-agent-%";

/// The AK public blob every fixture agent row carries; it matches the key
/// the mock TPM quotes claim to be signed with.
const AGENT_AK_TPM: &str = concat!(
    "ARgAAQALAAUAcgAAABAAFAALCAAAAAAAAQDKCQgvW7DnsrfpQKm5GXULIdSgQsag5Q4sJnSDIHEw+Lm9LAVzmE5qwLyp3hNOCEslyPR46z",
    "Nide/aRGBRy2RZS9vvZMPZim0iVoNU31nwV7+f2NZTi/I8c4owaPrL/Ti/VAT7uv7lrDvSxTOKNakdC4wBD5hMvERHwwAytgXKhpILXpvx",
    "j9LFtgUVGNtgjDXwqa1He+27CsZjL3g/oeILk1Mk590WMFcrD/TConyqlDDC3J+xdncC6KPuNPWqizUvHXrUtxD5wFqgPuMQvx3NxhPVgj",
    "tTFwT8QoDbRXAZQexk9TyZu2GrKqH9JPytwMDTIDroMe1ukCY4tS3iqMfh"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DbKind {
    Postgres,
    MySql,
}

impl DbKind {
    fn from_url(db_url: &str) -> Result<Self> {
        let scheme = db_url.split("://").next().unwrap_or_default();
        if scheme.starts_with("mysql") || scheme.starts_with("mariadb") {
            Ok(Self::MySql)
        } else if scheme.starts_with("postgres") {
            Ok(Self::Postgres)
        } else {
            bail!("unsupported database scheme '{scheme}'");
        }
    }

    /// Bind-parameter placeholder in this engine's dialect.
    fn placeholder(self, position: usize) -> String {
        match self {
            Self::Postgres => format!("${position}"),
            Self::MySql => "?".to_string(),
        }
    }
}

/// A connection to the verifier's database plus the fixture rows it manages.
pub struct VerifierFixtures {
    pool: AnyPool,
    kind: DbKind,
    agent_count: usize,
    data_dir: PathBuf,
}

impl VerifierFixtures {
    pub async fn connect(config: &ExecutionConfig, data_dir: &Path) -> Result<Self> {
        install_default_drivers();

        let kind = DbKind::from_url(&config.db_url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(2)
            .connect(&config.db_url)
            .await
            .with_context(|| format!("failed to connect to database at {}", config.db_url))?;

        Ok(Self {
            pool,
            kind,
            agent_count: config.agent_count,
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// Insert the policy pair and one agent row per mock agent.
    pub async fn set_up(&self) -> Result<()> {
        let ima_policy = self.load_policy("ima_runtime_policy.json")?;
        let uefi_refstate = self.load_policy("uefi_refstate.json")?;
        let p = |position| self.kind.placeholder(position);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open fixture transaction")?;

        let insert_ima = format!(
            "INSERT INTO allowlists (id, name, ima_policy) VALUES ({}, {}, {})",
            p(1),
            p(2),
            p(3)
        );
        sqlx::query(&insert_ima)
            .bind(POLICY_ROW_ID)
            .bind(IMA_POLICY_NAME)
            .bind(&ima_policy)
            .execute(&mut *tx)
            .await
            .context("failed to insert IMA policy fixture")?;

        let insert_uefi = format!(
            "INSERT INTO mbpolicies (id, name, mb_policy) VALUES ({}, {}, {})",
            p(1),
            p(2),
            p(3)
        );
        sqlx::query(&insert_uefi)
            .bind(POLICY_ROW_ID)
            .bind(UEFI_REFSTATE_NAME)
            .bind(&uefi_refstate)
            .execute(&mut *tx)
            .await
            .context("failed to insert UEFI refstate fixture")?;

        let tpm_policy = json!({ "mask": "0xffff" }).to_string();
        let insert_agent = format!(
            "INSERT INTO verifiermain (
                agent_id, tpm_policy, accept_tpm_hash_algs, accept_tpm_signing_algs,
                supported_version, ak_tpm, ima_policy_id, mb_policy_id, ima_pcrs
            ) VALUES (
                {}, {}, '[\"sha256\", \"sha1\"]',
                '[\"ecschnorr\",\"rsassa\"]', 2.2,
                {}, {}, {}, '[10]'
            )",
            p(1),
            p(2),
            p(3),
            p(4),
            p(5)
        );
        for index in 0..self.agent_count {
            let agent_id = format!("perf-test-agent-{index}");
            sqlx::query(&insert_agent)
                .bind(&agent_id)
                .bind(&tpm_policy)
                .bind(AGENT_AK_TPM)
                .bind(POLICY_ROW_ID)
                .bind(POLICY_ROW_ID)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert fixture row for {agent_id}"))?;
        }

        tx.commit()
            .await
            .context("failed to commit fixture transaction")?;
        info!(agents = self.agent_count, "seeded verifier database fixtures");
        Ok(())
    }

    /// Remove everything `set_up` created plus the attestation state the run
    /// accumulated against the fixture agents.
    pub async fn tear_down(&self) -> Result<()> {
        let p1 = self.kind.placeholder(1);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open teardown transaction")?;

        for table in ["evidence_items", "attestations", "verifiermain"] {
            let delete = format!("DELETE FROM {table} WHERE agent_id LIKE {p1}");
            sqlx::query(&delete)
                .bind(AGENT_ID_PATTERN)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to clear {table} fixture rows"))?;
        }

        let delete_ima = format!("DELETE FROM allowlists WHERE name = {p1}");
        sqlx::query(&delete_ima)
            .bind(IMA_POLICY_NAME)
            .execute(&mut *tx)
            .await
            .context("failed to delete IMA policy fixture")?;

        let delete_uefi = format!("DELETE FROM mbpolicies WHERE name = {p1}");
        sqlx::query(&delete_uefi)
            .bind(UEFI_REFSTATE_NAME)
            .execute(&mut *tx)
            .await
            .context("failed to delete UEFI refstate fixture")?;

        tx.commit()
            .await
            .context("failed to commit teardown transaction")?;
        info!("removed verifier database fixtures");
        Ok(())
    }

    /// Policies are stored as compact JSON strings; parsing first catches a
    /// corrupt fixture file before it reaches the database.
    fn load_policy(&self, file_name: &str) -> Result<String> {
        let path = self.data_dir.join(file_name);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read policy fixture {}", path.display()))?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("policy fixture {} is not valid JSON", path.display()))?;
        Ok(parsed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_kind_detection() {
        assert_eq!(
            DbKind::from_url("postgresql://host:5432/verifier").unwrap(),
            DbKind::Postgres
        );
        assert_eq!(
            DbKind::from_url("mysql+pymysql://host/db").unwrap(),
            DbKind::MySql
        );
        assert!(DbKind::from_url("sqlite:///tmp/db").is_err());
    }

    #[test]
    fn test_placeholders_match_dialect() {
        assert_eq!(DbKind::Postgres.placeholder(3), "$3");
        assert_eq!(DbKind::MySql.placeholder(3), "?");
    }
}
