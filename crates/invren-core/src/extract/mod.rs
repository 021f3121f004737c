//! Filename extraction from first-page invoice text.

pub mod patterns;

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use patterns::{AGENT_CODE, INVOICE_NUMBER, LAST_NAME};

/// Number of leading agent-code characters dropped from the derived name.
pub const DEFAULT_AGENT_PREFIX_LEN: usize = 3;

/// One of the three labelled fields on an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Sales person code after `SALES PERSON:`.
    Agent,
    /// Invoice number after `INVOICE NO.`.
    Invoice,
    /// Customer last name after `FOR:`.
    LastName,
}

impl Field {
    /// All fields, in the order they are reported.
    pub const ALL: [Field; 3] = [Field::Agent, Field::Invoice, Field::LastName];

    /// Label the field is found under on the invoice.
    pub fn label(self) -> &'static str {
        match self {
            Field::Agent => "SALES PERSON",
            Field::Invoice => "INVOICE NO",
            Field::LastName => "FOR",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Field::Agent => &AGENT_CODE,
            Field::Invoice => &INVOICE_NUMBER,
            Field::LastName => &LAST_NAME,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three values a filename is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFields {
    /// Agent code including its branch prefix.
    pub agent: String,
    /// Invoice number without the `ITIN` token.
    pub invoice: String,
    /// Customer last name.
    pub last_name: String,
}

impl InvoiceFields {
    /// Build `{agent minus prefix}_{invoice}_{last name}.pdf`.
    ///
    /// Agent codes are ASCII by construction of the pattern, so the prefix is
    /// cut on a byte boundary. A code shorter than the prefix yields an empty
    /// suffix; [`FilenameExtractor`] never produces such fields.
    pub fn derived_name(&self, agent_prefix_len: usize) -> String {
        let suffix = self.agent.get(agent_prefix_len..).unwrap_or("");
        format!("{}_{}_{}.pdf", suffix, self.invoice, self.last_name)
    }
}

/// Outcome of running the field patterns over a page of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    /// All three fields matched.
    Complete(InvoiceFields),
    /// At least one field is missing; no partial values are kept.
    Incomplete { missing: Vec<Field> },
}

impl ExtractionResult {
    /// Whether every field matched.
    pub fn is_complete(&self) -> bool {
        matches!(self, ExtractionResult::Complete(_))
    }

    /// Fields that were not found.
    pub fn missing(&self) -> &[Field] {
        match self {
            ExtractionResult::Complete(_) => &[],
            ExtractionResult::Incomplete { missing } => missing,
        }
    }
}

/// Extracts invoice fields and derives the target filename.
#[derive(Debug, Clone)]
pub struct FilenameExtractor {
    agent_prefix_len: usize,
}

impl FilenameExtractor {
    /// Create an extractor with the default three-character agent prefix.
    pub fn new() -> Self {
        Self {
            agent_prefix_len: DEFAULT_AGENT_PREFIX_LEN,
        }
    }

    /// Set how many leading agent-code characters are dropped.
    pub fn with_agent_prefix_len(mut self, len: usize) -> Self {
        self.agent_prefix_len = len;
        self
    }

    /// Agent prefix length in use.
    pub fn agent_prefix_len(&self) -> usize {
        self.agent_prefix_len
    }

    /// Run all three patterns over `text`.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let agent = capture(Field::Agent, text).filter(|code| {
            let long_enough = code.len() >= self.agent_prefix_len;
            if !long_enough {
                debug!(
                    "Agent code {:?} is shorter than the {}-character prefix",
                    code, self.agent_prefix_len
                );
            }
            long_enough
        });
        let invoice = capture(Field::Invoice, text);
        let last_name = capture(Field::LastName, text);

        match (agent, invoice, last_name) {
            (Some(agent), Some(invoice), Some(last_name)) => {
                debug!("Extracted agent={}, invoice={}, last_name={}", agent, invoice, last_name);
                ExtractionResult::Complete(InvoiceFields {
                    agent,
                    invoice,
                    last_name,
                })
            }
            (agent, invoice, last_name) => {
                let found = [agent.is_some(), invoice.is_some(), last_name.is_some()];
                let missing: Vec<Field> = Field::ALL
                    .into_iter()
                    .zip(found)
                    .filter(|(_, present)| !present)
                    .map(|(field, _)| field)
                    .collect();
                debug!("Missing fields: {:?}", missing);
                ExtractionResult::Incomplete { missing }
            }
        }
    }

    /// Extract and, when complete, return the derived filename.
    pub fn derive_name(&self, text: &str) -> Option<String> {
        match self.extract(text) {
            ExtractionResult::Complete(fields) => Some(fields.derived_name(self.agent_prefix_len)),
            ExtractionResult::Incomplete { .. } => None,
        }
    }
}

impl Default for FilenameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn capture(field: Field, text: &str) -> Option<String> {
    field
        .pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract invoice fields with default settings.
pub fn extract(page_text: &str) -> ExtractionResult {
    FilenameExtractor::new().extract(page_text)
}
