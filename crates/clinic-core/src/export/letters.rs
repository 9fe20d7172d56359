//! Prescription prints and referral letters.

use chrono::{DateTime, NaiveDate};

use super::{clinic_header_html, clinic_lines, escape_html, html_document};
use crate::config::ClinicProfile;
use crate::models::{Doctor, Patient, Prescription, PrescriptionItem, ReferralLetter, Urgency};

/// Calendar date of an RFC 3339 timestamp.
fn issued_on(timestamp: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|ts| ts.date_naive())
}

fn long_date(timestamp: &str) -> String {
    match issued_on(timestamp) {
        Some(date) => date.format("%-d %B %Y").to_string(),
        None => timestamp.to_string(),
    }
}

/// "Jane Doe, 34 y" or just the name when the birth date is unknown.
fn patient_line(patient: &Patient, on: Option<NaiveDate>) -> String {
    match on.and_then(|date| patient.age_on(date)) {
        Some(age) => format!("{}, {} y", patient.name, age),
        None => patient.name.clone(),
    }
}

fn doctor_title(doctor: &Doctor) -> String {
    match &doctor.specialty {
        Some(specialty) => format!("Dr. {} ({})", doctor.name, specialty),
        None => format!("Dr. {}", doctor.name),
    }
}

/// Dosage, frequency and duration joined for one prescription line.
fn directions(item: &PrescriptionItem) -> String {
    let mut parts = Vec::new();
    if let Some(dosage) = &item.dosage {
        parts.push(dosage.clone());
    }
    if let Some(frequency) = &item.frequency {
        parts.push(frequency.clone());
    }
    if let Some(days) = item.duration_days {
        parts.push(format!("for {} day{}", days, if days == 1 { "" } else { "s" }));
    }
    parts.join(", ")
}

/// Printable prescription.
pub fn prescription_html(
    clinic: &ClinicProfile,
    prescription: &Prescription,
    patient: &Patient,
    doctor: &Doctor,
) -> String {
    let date = issued_on(&prescription.created_at);
    let mut body = clinic_header_html(clinic);

    body.push_str("<h2>Prescription</h2>\n");
    body.push_str(&format!(
        "<p>Date: {}</p>\n<p>Patient: {}</p>\n",
        escape_html(&long_date(&prescription.created_at)),
        escape_html(&patient_line(patient, date))
    ));
    if !patient.allergies.is_empty() {
        body.push_str(&format!(
            "<p class=\"allergies\"><strong>Allergies:</strong> {}</p>\n",
            escape_html(&patient.allergies.join(", "))
        ));
    }

    body.push_str(
        "<table>\n<tr><th>Rx</th><th>Directions</th><th>Qty</th><th>Instructions</th></tr>\n",
    );
    for item in &prescription.items {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td>{}</td></tr>\n",
            escape_html(&item.drug_name),
            escape_html(&directions(item)),
            item.quantity,
            escape_html(item.instructions.as_deref().unwrap_or("")),
        ));
    }
    body.push_str("</table>\n");

    if let Some(notes) = &prescription.notes {
        body.push_str(&format!("<p>{}</p>\n", escape_html(notes)));
    }
    body.push_str(&format!(
        "<p class=\"signature\">{}<br>Signature: ____________________</p>\n",
        escape_html(&doctor_title(doctor))
    ));

    html_document(&format!("Prescription - {}", patient.name), &body)
}

/// Referral letter as plain text.
pub fn referral_text(
    clinic: &ClinicProfile,
    letter: &ReferralLetter,
    patient: &Patient,
    doctor: &Doctor,
) -> String {
    let mut out = clinic_lines(clinic);
    out.push(String::new());
    out.push(long_date(&letter.created_at));
    out.push(String::new());

    let mut to = format!("To: {}", letter.referred_to);
    if let Some(specialty) = &letter.specialty {
        to.push_str(&format!(" ({})", specialty));
    }
    out.push(to);
    if letter.urgency == Urgency::Urgent {
        out.push("URGENT REFERRAL".to_string());
    }
    out.push(format!(
        "Re: {}",
        patient_line(patient, issued_on(&letter.created_at))
    ));
    out.push(String::new());

    out.push("Dear colleague,".to_string());
    out.push(String::new());
    out.push(format!(
        "I am referring the above patient for: {}",
        letter.reason
    ));
    if let Some(summary) = &letter.clinical_summary {
        out.push(String::new());
        out.push("Clinical summary:".to_string());
        out.push(summary.clone());
    }
    if !patient.allergies.is_empty() {
        out.push(String::new());
        out.push(format!("Known allergies: {}", patient.allergies.join(", ")));
    }
    out.push(String::new());
    out.push("Kind regards,".to_string());
    out.push(doctor_title(doctor));

    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Referral letter as HTML.
pub fn referral_html(
    clinic: &ClinicProfile,
    letter: &ReferralLetter,
    patient: &Patient,
    doctor: &Doctor,
) -> String {
    let mut body = clinic_header_html(clinic);

    body.push_str(&format!(
        "<p>{}</p>\n",
        escape_html(&long_date(&letter.created_at))
    ));
    let mut to = escape_html(&letter.referred_to);
    if let Some(specialty) = &letter.specialty {
        to.push_str(&format!(" ({})", escape_html(specialty)));
    }
    body.push_str(&format!("<p>To: {}</p>\n", to));
    if letter.urgency == Urgency::Urgent {
        body.push_str("<p class=\"urgent\"><strong>URGENT REFERRAL</strong></p>\n");
    }
    body.push_str(&format!(
        "<p><strong>Re: {}</strong></p>\n",
        escape_html(&patient_line(patient, issued_on(&letter.created_at)))
    ));
    body.push_str("<p>Dear colleague,</p>\n");
    body.push_str(&format!(
        "<p>I am referring the above patient for: {}</p>\n",
        escape_html(&letter.reason)
    ));
    if let Some(summary) = &letter.clinical_summary {
        body.push_str(&format!(
            "<h3>Clinical summary</h3>\n<p>{}</p>\n",
            escape_html(summary).replace('\n', "<br>\n")
        ));
    }
    if !patient.allergies.is_empty() {
        body.push_str(&format!(
            "<p>Known allergies: {}</p>\n",
            escape_html(&patient.allergies.join(", "))
        ));
    }
    body.push_str(&format!(
        "<p>Kind regards,<br>{}</p>\n",
        escape_html(&doctor_title(doctor))
    ));

    html_document(&format!("Referral - {}", patient.name), &body)
}
