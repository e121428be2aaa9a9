//! Evidence model.
//!
//! Evidence is opaque to the dispatch engine: each item only needs to render
//! its capability set (sent during capability negotiation) and its collected
//! data (sent during evidence submission). Either rendering may be absent,
//! in which case the item is left out of the corresponding payload array.

use serde_json::{json, Value};
use std::collections::BTreeMap;

/// An evidence item as the protocol engine sees it.
pub trait Evidence: Send {
    /// Rendering used in the create-phase `evidence_supported` array.
    fn render_supported(&self) -> Option<Value>;

    /// Rendering used in the update-phase `evidence_collected` array.
    fn render_collected(&self) -> Option<Value>;
}

/// The per-task evidence snapshot. Built fresh for every task so that no two
/// tasks share mutable state.
pub type EvidenceBundle = Vec<Box<dyn Evidence>>;

/// Certification-class evidence (TPM-quote-shaped).
pub struct Certification {
    pub evidence_type: String,
    pub capabilities: Option<CertificationCapabilities>,
    pub data: Option<CertificationData>,
}

impl Certification {
    pub fn new(evidence_type: impl Into<String>) -> Self {
        Self {
            evidence_type: evidence_type.into(),
            capabilities: None,
            data: None,
        }
    }
}

impl Evidence for Certification {
    fn render_supported(&self) -> Option<Value> {
        let capabilities = self.capabilities.as_ref()?;
        Some(json!({
            "evidence_class": "certification",
            "evidence_type": &self.evidence_type,
            "capabilities": capabilities.render(),
        }))
    }

    fn render_collected(&self) -> Option<Value> {
        let data = self.data.as_ref()?;
        Some(json!({
            "evidence_class": "certification",
            "evidence_type": &self.evidence_type,
            "data": data.render(),
        }))
    }
}

/// What a certification component can attest to.
pub struct CertificationCapabilities {
    pub component_version: String,
    pub hash_algorithms: Vec<String>,
    pub signature_schemes: Vec<String>,
    /// Subject indices available per hash algorithm (e.g. PCR banks)
    pub available_subjects: BTreeMap<String, Vec<u32>>,
    pub certification_keys: Vec<CertificationKey>,
}

impl CertificationCapabilities {
    pub fn render(&self) -> Value {
        json!({
            "component_version": &self.component_version,
            "hash_algorithms": &self.hash_algorithms,
            "signature_schemes": &self.signature_schemes,
            "available_subjects": &self.available_subjects,
            "certification_keys": self.certification_keys
                .iter()
                .map(CertificationKey::render)
                .collect::<Vec<_>>(),
        })
    }
}

/// A key the certification component can sign with.
pub struct CertificationKey {
    pub key_class: String,
    pub key_algorithm: String,
    pub key_size: u32,
    pub server_identifier: String,
}

impl CertificationKey {
    pub fn render(&self) -> Value {
        json!({
            "key_class": &self.key_class,
            "key_algorithm": &self.key_algorithm,
            "key_size": self.key_size,
            "server_identifier": &self.server_identifier,
        })
    }
}

/// An opaque signed quote: subject data, message, and signature blobs.
pub struct CertificationData {
    pub subject_data: String,
    pub message: String,
    pub signature: String,
}

impl CertificationData {
    pub fn render(&self) -> Value {
        json!({
            "subject_data": &self.subject_data,
            "message": &self.message,
            "signature": &self.signature,
        })
    }
}

/// Log-class evidence (event-log-shaped).
pub struct EventLog {
    pub evidence_type: String,
    pub capabilities: Option<EventLogCapabilities>,
    pub data: Option<EventLogData>,
}

impl EventLog {
    pub fn new(evidence_type: impl Into<String>) -> Self {
        Self {
            evidence_type: evidence_type.into(),
            capabilities: None,
            data: None,
        }
    }
}

impl Evidence for EventLog {
    fn render_supported(&self) -> Option<Value> {
        let capabilities = self.capabilities.as_ref()?;
        Some(json!({
            "evidence_class": "log",
            "evidence_type": &self.evidence_type,
            "capabilities": capabilities.render(),
        }))
    }

    fn render_collected(&self) -> Option<Value> {
        let data = self.data.as_ref()?;
        Some(json!({
            "evidence_class": "log",
            "evidence_type": &self.evidence_type,
            "data": data.render(),
        }))
    }
}

/// Access characteristics of an event log.
pub struct EventLogCapabilities {
    pub entry_count: u32,
    pub supports_partial_access: bool,
    pub appendable: bool,
    pub formats: Vec<String>,
}

impl EventLogCapabilities {
    pub fn new(entry_count: u32) -> Self {
        Self {
            entry_count,
            supports_partial_access: false,
            appendable: false,
            formats: vec!["text/plain".to_string()],
        }
    }

    /// The false flags are omitted from the wire form entirely.
    pub fn render(&self) -> Value {
        let mut output = json!({
            "entry_count": self.entry_count,
            "formats": &self.formats,
        });
        if self.supports_partial_access {
            output["supports_partial_access"] = Value::Bool(true);
        }
        if self.appendable {
            output["appendable"] = Value::Bool(true);
        }
        output
    }
}

/// Raw log contents.
pub struct EventLogData {
    pub entries: String,
}

impl EventLogData {
    pub fn render(&self) -> Value {
        json!({ "entries": &self.entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certification_without_capabilities_renders_nothing() {
        let cert = Certification::new("tpm_quote");
        assert!(cert.render_supported().is_none());
        assert!(cert.render_collected().is_none());
    }

    #[test]
    fn test_certification_supported_shape() {
        let mut cert = Certification::new("tpm_quote");
        cert.capabilities = Some(CertificationCapabilities {
            component_version: "2.0".to_string(),
            hash_algorithms: vec!["sha256".to_string()],
            signature_schemes: vec!["rsassa".to_string()],
            available_subjects: BTreeMap::from([("sha256".to_string(), vec![0, 1, 2])]),
            certification_keys: vec![CertificationKey {
                key_class: "asymmetric".to_string(),
                key_algorithm: "rsa".to_string(),
                key_size: 2048,
                server_identifier: "ak".to_string(),
            }],
        });

        let rendered = cert.render_supported().unwrap();
        assert_eq!(rendered["evidence_class"], "certification");
        assert_eq!(rendered["evidence_type"], "tpm_quote");
        assert_eq!(rendered["capabilities"]["component_version"], "2.0");
        assert_eq!(
            rendered["capabilities"]["certification_keys"][0]["key_size"],
            2048
        );
        assert!(cert.render_collected().is_none());
    }

    #[test]
    fn test_event_log_optional_flags_omitted_when_false() {
        let mut log = EventLog::new("uefi_log");
        log.capabilities = Some(EventLogCapabilities::new(20));

        let rendered = log.render_supported().unwrap();
        let capabilities = &rendered["capabilities"];
        assert_eq!(capabilities["entry_count"], 20);
        assert!(capabilities.get("supports_partial_access").is_none());
        assert!(capabilities.get("appendable").is_none());
    }

    #[test]
    fn test_event_log_collected_carries_entries() {
        let mut log = EventLog::new("ima_log");
        log.data = Some(EventLogData {
            entries: "entry-1\nentry-2".to_string(),
        });

        let rendered = log.render_collected().unwrap();
        assert_eq!(rendered["evidence_class"], "log");
        assert_eq!(rendered["data"]["entries"], "entry-1\nentry-2");
    }
}
