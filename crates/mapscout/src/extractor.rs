//! Turns loosely structured model output into [`BusinessRecord`]s.
//!
//! The expected shape is one `TAG: value` line per field, entries separated by
//! a `---` line:
//!
//! ```text
//! NAME: Joe's Cafe
//! PHONE: +1 555 010 2030
//! EMAIL: hello@joes.example
//! ADDRESS: 1 Main St, Springfield
//! WEBSITE: https://joes.example
//! RATING: 4.5/5
//! ---
//! ```
//!
//! Models drift from that shape, so parsing is tolerant: tags may appear in any
//! order and any case, separators may be replaced by a blank line before the
//! next `NAME:`, and placeholder values like `N/A` count as missing. When no
//! entry can be recovered at all, the text is scanned for a bare email address
//! or phone number instead.

use regex::Regex;

use crate::model::{BusinessRecord, ADDRESS_NOT_FOUND, NOT_FOUND};

/// Name of the single record produced by the raw-text scan.
pub const CONTACT_LEADS_NAME: &str = "Contact Leads Found";
/// Address of the single record produced by the raw-text scan.
pub const CONTACT_LEADS_ADDRESS: &str = "Contact details extracted from raw text summary.";

const SEPARATOR: &str = "---";
const NAME_TAG: &str = "NAME";

/// Extract business records from `text`, preserving their order.
///
/// Never fails; the worst case is an empty vector.
pub fn extract_records(text: &str) -> Vec<BusinessRecord> {
    let records: Vec<BusinessRecord> = split_blocks(text)
        .iter()
        .filter_map(|block| parse_block(block))
        .collect();

    if !records.is_empty() {
        return records;
    }

    scan_contact_leads(text).into_iter().collect()
}

/// Split on `---` lines, and on a blank line directly followed by a line that
/// starts with the (case-sensitive) `NAME:` tag.
fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut prev_blank = false;

    for line in text.lines() {
        if line.trim() == SEPARATOR {
            blocks.push(std::mem::take(&mut current));
            prev_blank = false;
            continue;
        }

        if prev_blank && line.starts_with("NAME:") {
            blocks.push(std::mem::take(&mut current));
        }

        prev_blank = line.trim().is_empty();
        current.push(line);
    }

    blocks.push(current);
    blocks
}

fn parse_block(raw_lines: &[&str]) -> Option<BusinessRecord> {
    let lines: Vec<&str> = raw_lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    // A lone line is never a full entry.
    if lines.len() < 2 {
        return None;
    }

    let name = field_value(&lines, NAME_TAG)
        .map(strip_markup)
        .filter(|n| !n.is_empty())?;

    Some(BusinessRecord {
        name,
        phone: field_or(&lines, "PHONE", NOT_FOUND),
        email: field_or(&lines, "EMAIL", NOT_FOUND),
        address: field_or(&lines, "ADDRESS", ADDRESS_NOT_FOUND),
        website: field_value(&lines, "WEBSITE").map(str::to_string),
        rating: field_value(&lines, "RATING").map(str::to_string),
    })
}

fn field_or(lines: &[&str], tag: &str, sentinel: &str) -> String {
    field_value(lines, tag).unwrap_or(sentinel).to_string()
}

/// Value of the first line tagged `tag`, or `None` when the tag is missing or
/// holds a placeholder.
fn field_value<'a>(lines: &[&'a str], tag: &str) -> Option<&'a str> {
    let line = lines.iter().copied().find(|l| has_tag(l, tag))?;
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    if is_placeholder(value) {
        None
    } else {
        Some(value)
    }
}

fn has_tag(line: &str, tag: &str) -> bool {
    line.get(..tag.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(tag))
        && line[tag.len()..].starts_with(':')
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.is_empty() || lower == "n/a" || lower == "not found"
}

fn strip_markup(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '*' | '#'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Last resort for answers that ignored the format entirely: surface the
/// first email address and phone number found anywhere in the text.
fn scan_contact_leads(text: &str) -> Option<BusinessRecord> {
    let email_re =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid regex");
    let phone_re = Regex::new(r"\+?[0-9][0-9\s-]{8,}").expect("valid regex");

    let email = email_re.find(text).map(|m| m.as_str().to_string());
    let phone = phone_re.find(text).map(|m| m.as_str().trim().to_string());

    if email.is_none() && phone.is_none() {
        return None;
    }

    Some(BusinessRecord {
        name: CONTACT_LEADS_NAME.to_string(),
        phone: phone.unwrap_or_else(|| NOT_FOUND.to_string()),
        email: email.unwrap_or_else(|| NOT_FOUND.to_string()),
        address: CONTACT_LEADS_ADDRESS.to_string(),
        website: None,
        rating: None,
    })
}
