//! Two independent layers: `sanitize` strips markup and script vectors from
//! anything stored or displayed, the `validate_*` functions check meaning.
//! A value has to pass both.

use haven_core::models::{GuestContact, GuestEntry};
use haven_core::{CoreError, CoreResult};
use haven_shared::Masked;
use once_cell::sync::Lazy;
use regex::Regex;

pub mod limits {
    pub const NAME: usize = 100;
    pub const EMAIL: usize = 254;
    pub const PHONE: usize = 20;
    pub const NOTES: usize = 1000;
    pub const DISCOUNT_CODE: usize = 32;
    pub const REFERENCE: usize = 32;
    pub const MAX_GUEST_AGE: u8 = 120;
}

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<\s*(script|style|iframe|object|embed)\b[^>]*>.*?<\s*/\s*(script|style|iframe|object|embed)\s*>").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static DANGEROUS_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(javascript|vbscript|data)\s*:").unwrap());
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").unwrap());

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$").unwrap()
});
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[1-9][0-9]{7,14}$").unwrap());
static PHONE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-().]").unwrap());
static FULL_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{L}][\p{L}\s'\-]*$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(STAY|EXP)-[0-9]{6}-[A-Z0-9]{6}$").unwrap());
static DISCOUNT_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").unwrap());

/// True when the input carries markup or a script-capable URI scheme.
pub fn contains_markup(input: &str) -> bool {
    TAG.is_match(input) || DANGEROUS_SCHEME.is_match(input) || EVENT_HANDLER.is_match(input)
}

/// Strips script blocks, tags, event-handler attributes, dangerous URI
/// schemes and control characters, trims, and caps the length in characters.
pub fn sanitize(input: &str, max_len: usize) -> String {
    let without_blocks = SCRIPT_BLOCK.replace_all(input, "");
    let without_tags = TAG.replace_all(&without_blocks, "");
    let without_handlers = EVENT_HANDLER.replace_all(&without_tags, "");
    let without_schemes = DANGEROUS_SCHEME.replace_all(&without_handlers, "");

    without_schemes
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .chars()
        .take(max_len)
        .collect()
}

pub fn validate_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(CoreError::validation("email", "Email address is required"));
    }
    if email.chars().count() > limits::EMAIL {
        return Err(CoreError::validation("email", "Email address is too long"));
    }
    if contains_markup(&email) || !EMAIL.is_match(&email) {
        return Err(CoreError::validation(
            "email",
            "Please enter a valid email address",
        ));
    }
    Ok(email)
}

/// Accepts international numbers with an optional leading `+`; spaces,
/// dashes, dots and parentheses are ignored.
pub fn validate_phone(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation("phone", "Phone number is required"));
    }
    if trimmed.chars().count() > limits::PHONE + 10 {
        return Err(CoreError::validation("phone", "Phone number is too long"));
    }
    let compact = PHONE_SEPARATORS.replace_all(trimmed, "");
    if !PHONE.is_match(&compact) {
        return Err(CoreError::validation(
            "phone",
            "Please enter a valid international phone number, e.g. +91 98765 43210",
        ));
    }
    Ok(compact.into_owned())
}

pub fn validate_full_name(raw: &str) -> CoreResult<String> {
    validate_name_field("full_name", raw)
}

fn validate_name_field(field: &str, raw: &str) -> CoreResult<String> {
    let name = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    if name.is_empty() {
        return Err(CoreError::validation(field, "Name is required"));
    }
    if name.chars().count() < 2 {
        return Err(CoreError::validation(field, "Name must be at least 2 characters"));
    }
    if name.chars().count() > limits::NAME {
        return Err(CoreError::validation(
            field,
            format!("Name must be at most {} characters", limits::NAME),
        ));
    }
    if !FULL_NAME.is_match(&name) {
        return Err(CoreError::validation(
            field,
            "Name may only contain letters, spaces, hyphens and apostrophes",
        ));
    }
    Ok(name)
}

/// Validates and normalises the three contact fields, reporting the first bad one.
pub fn validate_contact(full_name: &str, email: &str, phone: &str) -> CoreResult<GuestContact> {
    Ok(GuestContact {
        full_name: validate_full_name(full_name)?,
        email: Masked::new(validate_email(email)?),
        phone: Masked::new(validate_phone(phone)?),
    })
}

/// Every guest needs a non-empty name; ages are optional but bounded.
pub fn validate_guest_roster(guests: &[GuestEntry]) -> CoreResult<Vec<GuestEntry>> {
    if guests.is_empty() {
        return Err(CoreError::validation("guests", "At least one guest name is required"));
    }

    guests
        .iter()
        .enumerate()
        .map(|(i, guest)| {
            let field = format!("guests[{}].name", i);
            let cleaned = sanitize(&guest.name, limits::NAME);
            if cleaned.is_empty() {
                return Err(CoreError::validation(field, "Guest name is required"));
            }
            if let Some(age) = guest.age {
                if age > limits::MAX_GUEST_AGE {
                    return Err(CoreError::validation(
                        format!("guests[{}].age", i),
                        format!("Age must be between 0 and {}", limits::MAX_GUEST_AGE),
                    ));
                }
            }
            Ok(GuestEntry {
                name: cleaned,
                age: guest.age,
            })
        })
        .collect()
}

/// Roster check plus one named entry per booked guest or attendee.
pub fn validate_party_roster(guests: &[GuestEntry], party: u32) -> CoreResult<Vec<GuestEntry>> {
    let roster = validate_guest_roster(guests)?;
    if roster.len() != party as usize {
        return Err(CoreError::validation(
            "guests",
            format!("Enter a name for each of the {} guest(s)", party),
        ));
    }
    Ok(roster)
}

pub fn clean_special_requests(raw: Option<&str>) -> Option<String> {
    raw.map(|r| sanitize(r, limits::NOTES)).filter(|r| !r.is_empty())
}

/// Upper-cases and checks a discount code. `None` when it cannot be a code at all.
pub fn normalize_discount_code(raw: &str) -> Option<String> {
    let code = sanitize(raw, limits::DISCOUNT_CODE + 1).to_uppercase();
    if DISCOUNT_CODE.is_match(&code) {
        Some(code)
    } else {
        None
    }
}

pub fn validate_booking_reference(raw: &str) -> CoreResult<String> {
    let reference = sanitize(raw, limits::REFERENCE).to_uppercase();
    if !REFERENCE.is_match(&reference) {
        return Err(CoreError::validation(
            "booking_reference",
            "Booking reference should look like STAY-261201-AB12CD",
        ));
    }
    Ok(reference)
}

pub fn is_well_formed_reference(reference: &str) -> bool {
    REFERENCE.is_match(reference)
}
