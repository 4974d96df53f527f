//! Input validation helpers shared by ingress and the creation paths.

/// Validate a session short code ("S1", "W2", "SAT-AM"). Codes are
/// uppercase alphanumeric with optional dashes, at most 10 characters,
/// starting with a letter.
pub fn is_valid_session_code(code: &str) -> bool {
    regex::Regex::new(r"^[A-Z][A-Z0-9-]{0,9}$")
        .map(|re| re.is_match(code))
        .unwrap_or(false)
}

/// Validate a door-device identifier. Device ids are printable ASCII
/// without whitespace, between 3 and 64 characters.
pub fn is_valid_device_id(device_id: &str) -> bool {
    (3..=64).contains(&device_id.len())
        && device_id
            .chars()
            .all(|c| c.is_ascii() && !c.is_control() && !c.is_whitespace())
}

/// Validate email format
pub fn is_valid_email(email: &str) -> bool {
    email.contains('@') && email.contains('.') && email.len() > 5
}

/// Validate phone number format (basic validation)
pub fn is_valid_phone(phone: &str) -> bool {
    phone.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ')
        && phone.len() >= 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_code_validation() {
        assert!(is_valid_session_code("S1"));
        assert!(is_valid_session_code("SAT-AM"));
        assert!(is_valid_session_code("W10"));
        assert!(!is_valid_session_code("s1"));
        assert!(!is_valid_session_code("1S"));
        assert!(!is_valid_session_code(""));
        assert!(!is_valid_session_code("TOOLONGCODE1"));
    }

    #[test]
    fn test_device_id_validation() {
        assert!(is_valid_device_id("door-ipad-3"));
        assert!(is_valid_device_id("kiosk_front"));
        assert!(!is_valid_device_id("ab"));
        assert!(!is_valid_device_id("has space"));
        assert!(!is_valid_device_id("tab\there"));
    }

    #[test]
    fn test_email_and_phone_validation() {
        assert!(is_valid_email("guest@example.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(is_valid_phone("+1 555-010-0200"));
        assert!(!is_valid_phone("555"));
    }
}
