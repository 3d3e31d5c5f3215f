//! Per-firm chatbot configuration.
//!
//! Each law firm using the service is a *client* with its own bot name,
//! greeting, contact details, and fee wording. Requests name their client
//! with `clientId`; unknown ids get the `default` client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::knowledge::CaseType;

/// Id of the client used when a request names none or an unknown one.
pub const DEFAULT_CLIENT_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub chatbot_name: String,
    pub greeting: String,
    #[serde(default = "default_case_types")]
    pub supported_case_types: Vec<String>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    #[serde(default = "default_fee_structure")]
    pub fee_structure: String,
    /// Office location used for attorney matching.
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_case_types() -> Vec<String> {
    CaseType::ALL.iter().map(|c| c.as_str().to_string()).collect()
}

fn default_fee_structure() -> String {
    "Contingency fee (no upfront cost).".to_string()
}

fn default_location() -> String {
    "NY".to_string()
}

impl ClientConfig {
    /// Supported case types this build recognizes, in configured order.
    pub fn case_types(&self) -> Vec<CaseType> {
        self.supported_case_types
            .iter()
            .filter_map(|s| CaseType::parse(s))
            .collect()
    }

    /// `"call 555-123-4567 or email info@firm.com"`, or an empty string.
    pub fn contact_line(&self) -> String {
        match &self.contact {
            Some(ContactInfo {
                phone,
                email: Some(email),
            }) => format!("call {} or email {}", phone, email),
            Some(ContactInfo { phone, email: None }) => format!("call {}", phone),
            None => String::new(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chatbot_name: "Law Firm AI Assistant".to_string(),
            greeting: "Welcome to our law firm. How can I assist you with your legal matter today?"
                .to_string(),
            supported_case_types: default_case_types(),
            contact: Some(ContactInfo {
                phone: "555-123-4567".to_string(),
                email: Some("info@lawfirm.com".to_string()),
            }),
            fee_structure: default_fee_structure(),
            location: default_location(),
        }
    }
}

/// The built-in demo firm.
fn smith_injury_law() -> ClientConfig {
    ClientConfig {
        chatbot_name: "Smith Injury Law AI Assistant".to_string(),
        greeting:
            "Welcome to Smith Injury Law. How can I assist you with your legal matter today?"
                .to_string(),
        contact: Some(ContactInfo {
            phone: "555-123-4567".to_string(),
            email: Some("info@smithinjurylaw.com".to_string()),
        }),
        ..ClientConfig::default()
    }
}

/// Lookup table of configured clients. Always contains [`DEFAULT_CLIENT_ID`].
#[derive(Debug, Clone)]
pub struct ClientDirectory {
    clients: BTreeMap<String, ClientConfig>,
    fallback: ClientConfig,
}

impl ClientDirectory {
    /// Build from configured clients. With none configured, the built-in
    /// `default` and `smith-injury-law` clients are used; otherwise only a
    /// missing `default` is filled in.
    pub fn new(configured: BTreeMap<String, ClientConfig>) -> Self {
        let mut clients = configured;
        if clients.is_empty() {
            clients.insert("smith-injury-law".to_string(), smith_injury_law());
        }
        let fallback = clients
            .entry(DEFAULT_CLIENT_ID.to_string())
            .or_default()
            .clone();
        Self { clients, fallback }
    }

    /// The named client, or `default`.
    pub fn resolve(&self, client_id: Option<&str>) -> &ClientConfig {
        client_id
            .and_then(|id| self.clients.get(id))
            .unwrap_or(&self.fallback)
    }

    pub fn get(&self, client_id: &str) -> Option<&ClientConfig> {
        self.clients.get(client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClientConfig)> {
        self.clients.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientDirectory {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_clients() {
        let dir = ClientDirectory::default();
        assert_eq!(dir.len(), 2);
        assert_eq!(
            dir.resolve(Some("smith-injury-law")).chatbot_name,
            "Smith Injury Law AI Assistant"
        );
    }

    #[test]
    fn test_unknown_client_resolves_to_default() {
        let dir = ClientDirectory::default();
        assert_eq!(dir.resolve(Some("nobody")).chatbot_name, "Law Firm AI Assistant");
        assert_eq!(dir.resolve(None).chatbot_name, "Law Firm AI Assistant");
    }

    #[test]
    fn test_configured_clients_replace_builtins_but_keep_default() {
        let mut configured = BTreeMap::new();
        configured.insert(
            "acme".to_string(),
            ClientConfig {
                chatbot_name: "Acme Bot".to_string(),
                ..ClientConfig::default()
            },
        );
        let dir = ClientDirectory::new(configured);
        assert_eq!(dir.len(), 2);
        assert!(dir.get("smith-injury-law").is_none());
        assert!(dir.get(DEFAULT_CLIENT_ID).is_some());
    }

    #[test]
    fn test_case_types_skip_unknown() {
        let client = ClientConfig {
            supported_case_types: vec!["car_accident".into(), "maritime".into()],
            ..ClientConfig::default()
        };
        assert_eq!(client.case_types(), vec![CaseType::CarAccident]);
    }

    #[test]
    fn test_contact_line() {
        let mut client = ClientConfig::default();
        assert_eq!(client.contact_line(), "call 555-123-4567 or email info@lawfirm.com");
        client.contact = None;
        assert_eq!(client.contact_line(), "");
    }
}
