//! Printable documents and CSV exports.
//!
//! Receipts, prescriptions and referral letters render to plain text and/or
//! HTML. Reports render to CSV. Rendering is pure: callers load the records
//! and pass them in.

mod letters;
mod receipt;
mod reports;

pub use letters::*;
pub use receipt::*;
pub use reports::*;

use chrono::DateTime;

use crate::config::ClinicProfile;

/// Quote a CSV field when it contains a separator, quote or line break.
pub fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Two decimals followed by the currency code.
pub fn format_money(amount: f64, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

/// "2024-03-04 09:06" for an RFC 3339 timestamp; other input is returned as is.
pub fn display_timestamp(value: &str) -> String {
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => ts.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => value.to_string(),
    }
}

/// Clinic name, address and contact lines for document headers.
fn clinic_lines(clinic: &ClinicProfile) -> Vec<String> {
    let mut lines = vec![clinic.name.clone()];
    if let Some(address) = &clinic.address {
        lines.push(address.clone());
    }
    let contact: Vec<String> = [
        clinic.phone.as_ref().map(|p| format!("Tel: {}", p)),
        clinic.email.clone(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !contact.is_empty() {
        lines.push(contact.join("  "));
    }
    lines
}

fn clinic_header_html(clinic: &ClinicProfile) -> String {
    let mut lines = clinic_lines(clinic).into_iter();
    let mut html = String::from("<header>\n");
    if let Some(name) = lines.next() {
        html.push_str(&format!("<h1>{}</h1>\n", escape_html(&name)));
    }
    for line in lines {
        html.push_str(&format!("<p>{}</p>\n", escape_html(&line)));
    }
    html.push_str("</header>\n");
    html
}

fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>\nbody {{ font-family: sans-serif; max-width: 48em; margin: 2em auto; }}\n\
         table {{ width: 100%; border-collapse: collapse; }}\n\
         th, td {{ padding: 0.25em 0.5em; border-bottom: 1px solid #ddd; text-align: left; }}\n\
         td.num {{ text-align: right; }}\n</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

fn centered(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), text)
}
