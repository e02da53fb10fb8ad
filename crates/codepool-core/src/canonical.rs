//! Canonical form for unique codes.
//!
//! Codes arrive from people typing them in, so they carry spurious case,
//! spacing and punctuation. The canonical form is:
//! - lowercased
//! - restricted to ASCII lowercase letters and digits
//!
//! Everything else is dropped. The mapping is total and idempotent.
//!
//! Canonicalization is applied to a candidate code only after the request has
//! cleared the idempotency check, so a change to these rules can never alter
//! the meaning of an outcome that is already on record.

/// Returns true if `c` survives canonicalization unchanged.
fn is_allowed(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Reduce a raw code to its canonical comparison key.
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .filter(|&c| is_allowed(c))
        .collect()
}

/// Check whether `code` is already in canonical form.
pub fn is_canonical(code: &str) -> bool {
    code.chars().all(is_allowed)
}
