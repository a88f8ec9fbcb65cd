use crate::error::{Error, ErrorDetails, FieldViolation};

pub mod deeplink;
pub mod fallback;
pub mod premium;
pub mod status;
pub mod suggest;

/// Records a violation for `field` when `value` is empty or only whitespace.
fn require_non_blank(
    violations: &mut Vec<FieldViolation>,
    field: &str,
    value: &str,
    message: &str,
) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::new(field, message));
    }
}

fn into_validation_result(violations: Vec<FieldViolation>) -> Result<(), Error> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::new(ErrorDetails::Validation { violations }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_non_blank() {
        let mut violations = Vec::new();
        require_non_blank(&mut violations, "mood", "  ", "Please select a mood");
        require_non_blank(&mut violations, "liquor", "Gin", "Please select a liquor type");
        assert_eq!(
            violations,
            vec![FieldViolation::new("mood", "Please select a mood")]
        );

        let err = into_validation_result(violations).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(into_validation_result(Vec::new()).is_ok());
    }
}
