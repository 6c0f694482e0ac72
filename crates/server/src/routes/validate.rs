//! Input checks shared by the mutation handlers. Each returns the normalized value.

use crate::error::{AppError, Result};

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 100;

pub fn person_name(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    let len = value.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "{field} must be between {NAME_MIN} and {NAME_MAX} characters"
        )));
    }
    Ok(value.to_string())
}

pub fn email(value: &str) -> Result<String> {
    let value = value.trim().to_lowercase();
    let valid = value.chars().count() <= EMAIL_MAX
        && !value.chars().any(char::is_whitespace)
        && matches!(
            value.split_once('@'),
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        );
    if !valid {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    Ok(value)
}

pub fn password(value: &str) -> Result<()> {
    let len = value.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "Password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"
        )));
    }
    Ok(())
}

pub fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<String> {
    let value = value.unwrap_or_default().trim();
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

pub fn hours(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(value)
}

/// Full-record updates may repeat the id in the body; it has to agree with the path.
pub fn id_matches(path_id: &str, body_id: Option<&str>) -> Result<()> {
    match body_id {
        Some(body_id) if body_id != path_id => Err(AppError::Validation(
            "Id in the body does not match the id in the path".to_string(),
        )),
        _ => Ok(()),
    }
}
