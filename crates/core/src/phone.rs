//! Recipient phone number normalisation.

/// Shortest and longest digit strings accepted as a recipient.
const MIN_DIGITS: usize = 9;
const MAX_DIGITS: usize = 15;

/// Strip separators (`-`, spaces, parentheses, a leading `+`) from a phone
/// number, keeping digits only.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Whether `phone` is a normalised, plausibly deliverable number.
pub fn is_valid_recipient(phone: &str) -> bool {
    (MIN_DIGITS..=MAX_DIGITS).contains(&phone.len()) && phone.chars().all(|c| c.is_ascii_digit())
}
