//! Regex patterns for the labelled invoice fields.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Sales person / agent code, e.g. "SALES PERSON: AGT123"
    pub static ref AGENT_CODE: Regex = Regex::new(
        r"SALES PERSON:\s*([A-Z0-9]+)"
    ).unwrap();

    // Invoice number, optional ITIN prefix dropped, e.g. "INVOICE NO. ITIN000456"
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"INVOICE NO\.\s+(?:ITIN)?(\d+)"
    ).unwrap();

    // Customer last name, must be followed by a slash, e.g. "FOR: SMITH/JOHN".
    // No lookahead in the regex crate: the slash is matched outside the group.
    pub static ref LAST_NAME: Regex = Regex::new(
        r"FOR:\s+([A-Z]+)/"
    ).unwrap();
}
