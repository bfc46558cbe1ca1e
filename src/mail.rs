use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use mailparse::{parse_mail, MailHeaderMap};
use std::fs;
use std::path::Path;

use crate::models::RawEmail;

/// Build a `RawEmail` from an RFC822 message on disk. Convenience for the
/// CLI; the library itself only ever sees `RawEmail` values.
pub fn read_eml(path: &Path) -> Result<RawEmail> {
    let raw = fs::read(path).with_context(|| format!("Failed to read email file {:?}", path))?;
    from_rfc822(&raw)
}

pub fn from_rfc822(raw: &[u8]) -> Result<RawEmail> {
    let parsed = parse_mail(raw).context("Failed to parse RFC822 message")?;

    let sender = parsed.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let received_at = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    let (html_body, text_body) = split_bodies(&parsed)?;

    Ok(RawEmail {
        sender,
        subject,
        html_body,
        text_body,
        received_at,
    })
}

/// Pull out the HTML and plain-text parts. Single-part messages land in
/// whichever slot their content type says; multipart messages are walked
/// one level deep, which covers the common multipart/alternative layout.
fn split_bodies(parsed: &mailparse::ParsedMail) -> Result<(String, Option<String>)> {
    if parsed.subparts.is_empty() {
        let content_type = &parsed.ctype.mimetype;
        let body = parsed.get_body()?;
        return if content_type.contains("text/html") {
            Ok((body, None))
        } else {
            Ok((String::new(), Some(body)))
        };
    }

    let mut html = None;
    let mut text = None;
    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/html") && html.is_none() {
            html = Some(part.get_body()?);
        } else if content_type.contains("text/plain") && text.is_none() {
            text = Some(part.get_body()?);
        }
    }

    if html.is_none() && text.is_none() {
        // Last resort: first part, treated as plain text.
        if let Some(part) = parsed.subparts.first() {
            text = Some(part.get_body()?);
        }
    }

    if html.is_none() && text.is_none() {
        return Err(anyhow!("No readable body part in message"));
    }

    Ok((html.unwrap_or_default(), text))
}
