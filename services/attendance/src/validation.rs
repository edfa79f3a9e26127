//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Validate a matric number: exactly 11 ASCII digits
pub fn validate_matric(matric: &str) -> Result<(), String> {
    let matric = matric.trim();

    if matric.is_empty() {
        return Err("Matric number is required".to_string());
    }

    static MATRIC_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = MATRIC_REGEX
        .get_or_init(|| Regex::new(r"^[0-9]+$").expect("Failed to compile matric regex"));

    if !regex.is_match(matric) {
        return Err("Matric number must contain digits only, no letters or spaces".to_string());
    }

    if matric.len() != 11 {
        return Err(format!(
            "Matric number must be exactly 11 digits (you entered {})",
            matric.len()
        ));
    }

    Ok(())
}

/// Validate a submitted attendance code: exactly 4 ASCII digits
pub fn validate_code(code: &str) -> Result<(), String> {
    let code = code.trim();

    static CODE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = CODE_REGEX
        .get_or_init(|| Regex::new(r"^[0-9]{4}$").expect("Failed to compile code regex"));

    if !regex.is_match(code) {
        return Err("Attendance code must be exactly 4 digits".to_string());
    }

    Ok(())
}

/// Validate a name field is non-empty after trimming
pub fn validate_name(name: &str, field: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    Ok(())
}

/// Normalize a surname for storage: trimmed, upper-case
pub fn normalize_surname(surname: &str) -> String {
    surname.trim().to_uppercase()
}

/// Normalize other names for storage: trimmed, title-case per word
pub fn normalize_other_names(other_names: &str) -> String {
    other_names
        .trim()
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_matric() {
        assert!(validate_matric("20200123456").is_ok());
        assert!(validate_matric(" 20200123456 ").is_ok());
        assert!(validate_matric("2020012345").is_err()); // 10 digits
        assert!(validate_matric("202001234567").is_err()); // 12 digits
        assert!(validate_matric("2020O123456").is_err()); // letter O
        assert!(validate_matric("").is_err());
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("4823").is_ok());
        assert!(validate_code("0000").is_ok());
        assert!(validate_code("482").is_err());
        assert!(validate_code("48235").is_err());
        assert!(validate_code("48a3").is_err());
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_surname("  okafor "), "OKAFOR");
        assert_eq!(
            normalize_other_names("chukwuemeka JOHN"),
            "Chukwuemeka John"
        );
        assert_eq!(normalize_other_names("  mary-ann  "), "Mary-ann");
    }
}
