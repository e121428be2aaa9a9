//! Mock evidence families used by the load generator.
//!
//! The quote blobs are fixed opaque fixtures; the verifier under test is
//! seeded with a matching AK, so it will accept (or at least meaningfully
//! process) every submission. Event-log contents come from fixture files and
//! are read once per process.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::domain::errors::{HarnessError, HarnessResult};
use crate::domain::models::evidence::{
    Certification, CertificationCapabilities, CertificationData, CertificationKey, EventLog,
    EventLogCapabilities, EventLogData, EvidenceBundle,
};

const TPM_QUOTE_SUBJECT_DATA: &str = concat!(
    "AQAAAAsAA///AQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAwAAAAgAAAAgAC3cxiiWwb3dJKKzge0JHJiK",
    "LwGiqVsEtsPUBN25tdf5AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAgAP7ErT+kac4IevtZ8P4KYWDbqNCT3VOMBab+yIXNG+",
    "ywAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAgANHzUtYtqVybhs47cdiuTWmZFeF8+Zf8HPzmx2Zou8VpAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAgAD1FjP5VzAPqH0Q/FWK+7I31HHXhSp/PmnI0oT8ZjnlpAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAgAKvos/pq7LNsL9k8b27d5mHCGzU9AHQQonOdab+n4bm+AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAgAPQexFad",
    "Crm+/XirWJafGQGdyZwfuT2T9egqIW9NQvfdAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAgAGPVCCQKlULigxIYYtt78HVqif",
    "j3TPZC1qKShcguFNxjAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAgAImEH1qasjDZTOWVkrFb2Dm1lefxjASmJ4q23DVXEsxa",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAIAAAAIABpRSqT4KQWN0sh93YPCCEy0n7zi7uK+EEPaGAcDjVGOAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAIACDCiZeiQ32aziYlEs/qFzTAD7q+qk5iRC5EQW2dpjBlAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAIAAKFEfDdVUHO2cLlAcueq9grOa9Mgp8gf6N7JoQKJuFyAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAIAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAIAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAIAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAIAAwb52LlPF9k9xufPj1x51lLrTGxNE94t3cJK9BbhPsrwAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAIAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAQAAACAAC8Qme3wDd7pKlPsu+wgL12NorW1NPtVGarc+cum8Ht8AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=="
);

const TPM_QUOTE_MESSAGE: &str = concat!(
    "/1RDR4AYACIAC7s9pXY4dla3uHjUOVIJLQQ+VXb8+AhpubvOfxvMGB/aABRTYjd0Tmxxc2QzMnVJMVpQV3REcwAAAAFoGSAKAAAAKwAAAA",
    "ABAAECAAAAAAAAAAABAAsD//8BACA6FyLB7MLIIRkedpNB5VHSOHfXLsRkm1U74Y8eveoMKw=="
);

const TPM_QUOTE_SIGNATURE: &str = concat!(
    "ABQACwEACxh9sNgq3oYbq87obxRPA8v3tzwuBYLr53u1hz/iAaErnr5L+pHNvslCHXIm3SXDrpHdRp6GAO+1hR1w+VgQSaeN+4bsM0JO9k",
    "Ar/3ToKx0Q2bAMRnMANEBUlnFJfkAGyG/Ms4koGGhgcSrHkc8zjOiYDCdwj0DxavzF0MpG/OCrYgAup60f7YyxfzJ5QzYx72owBPPUfA+N",
    "1QuBfzGDBAzwt0+TdVa3udPCF4CLtZrDcUERAok29PmVX6EFhMfw7GmSFCSAmUqtPIvjva8K46ynBVYGsR1sfVY58eqL53C4XLSkG1+vS4",
    "NV5KnSyBRVzvs27FUWlJOJekk5mEvZxw=="
);

static UEFI_LOG_CONTENTS: OnceLock<String> = OnceLock::new();
static IMA_LOG_CONTENTS: OnceLock<String> = OnceLock::new();

/// A mock TPM quote: full capability advertisement plus the fixed quote
/// triple.
pub fn tpm_quote() -> Certification {
    let all_pcrs: Vec<u32> = (0..=22).collect();

    let mut certification = Certification::new("tpm_quote");
    certification.capabilities = Some(CertificationCapabilities {
        component_version: "2.0".to_string(),
        hash_algorithms: vec!["sha256".to_string(), "sha1".to_string()],
        signature_schemes: vec!["rsassa".to_string()],
        available_subjects: BTreeMap::from([
            ("sha1".to_string(), all_pcrs.clone()),
            ("sha256".to_string(), all_pcrs),
        ]),
        certification_keys: vec![CertificationKey {
            key_class: "asymmetric".to_string(),
            key_algorithm: "rsa".to_string(),
            key_size: 2048,
            server_identifier: "ak".to_string(),
        }],
    });
    certification.data = Some(CertificationData {
        subject_data: TPM_QUOTE_SUBJECT_DATA.to_string(),
        message: TPM_QUOTE_MESSAGE.to_string(),
        signature: TPM_QUOTE_SIGNATURE.to_string(),
    });
    certification
}

/// A mock UEFI event log backed by `data/uefi_log.txt`.
pub fn uefi_log(data_dir: &Path) -> HarnessResult<EventLog> {
    let contents = cached_fixture(&UEFI_LOG_CONTENTS, data_dir.join("uefi_log.txt"))?;

    let mut log = EventLog::new("uefi_log");
    let mut capabilities = EventLogCapabilities::new(20);
    capabilities.formats = vec!["application/octet-stream".to_string()];
    log.capabilities = Some(capabilities);
    log.data = Some(EventLogData { entries: contents });
    Ok(log)
}

/// A mock IMA measurement log backed by `data/ima_log.txt`.
pub fn ima_log(data_dir: &Path) -> HarnessResult<EventLog> {
    let contents = cached_fixture(&IMA_LOG_CONTENTS, data_dir.join("ima_log.txt"))?;

    let mut log = EventLog::new("ima_log");
    let mut capabilities = EventLogCapabilities::new(20);
    capabilities.supports_partial_access = true;
    capabilities.appendable = true;
    log.capabilities = Some(capabilities);
    log.data = Some(EventLogData { entries: contents });
    Ok(log)
}

/// The standard per-task snapshot: one certification item plus the two
/// event logs.
pub fn standard_bundle(data_dir: &Path) -> HarnessResult<EvidenceBundle> {
    Ok(vec![
        Box::new(tpm_quote()),
        Box::new(uefi_log(data_dir)?),
        Box::new(ima_log(data_dir)?),
    ])
}

fn cached_fixture(cell: &OnceLock<String>, path: PathBuf) -> HarnessResult<String> {
    if let Some(contents) = cell.get() {
        return Ok(contents.clone());
    }
    let contents = fs::read_to_string(&path)
        .map_err(|source| HarnessError::EvidenceFixture { path, source })?;
    Ok(cell.get_or_init(|| contents).clone())
}
