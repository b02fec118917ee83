use std::sync::LazyLock;

use regex::Regex;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.+\-]+@[A-Za-z0-9\-]+\.[A-Za-z0-9.\-]+$")
        .expect("EMAIL_REGEX: invalid regex pattern")
});

/// Splits raw recipient text on commas and line breaks (`\n`, `\r\n` or a
/// lone `\r`), trimming each entry and dropping blanks. Order is preserved.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_valid_address(address: &str) -> bool {
    EMAIL_REGEX.is_match(address)
}

/// Every entry that fails validation, in input order.
pub fn invalid_addresses(recipients: &[String]) -> Vec<String> {
    recipients
        .iter()
        .filter(|address| !is_valid_address(address))
        .cloned()
        .collect()
}
