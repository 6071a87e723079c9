//! Shared range-validation helpers used by all section validators.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if `value` is empty or contains characters outside `[A-Za-z0-9_]`.
pub(crate) fn validate_identifier(errors: &mut Vec<String>, name: &str, value: &str) {
    if value.is_empty() {
        errors.push(format!("{name} must not be empty"));
    } else if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        errors.push(format!("{name} = {value:?} is not a valid identifier"));
    }
}
