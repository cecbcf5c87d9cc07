use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Turn raw bounds into a [`Span`], rejecting empty/inverted ranges and
/// timestamps outside the supported window.
pub(crate) fn checked_span(start: Ms, stop: Ms) -> Result<Span, EngineError> {
    if start >= stop {
        return Err(EngineError::InvalidRange { start, stop });
    }
    if start < MIN_VALID_TIMESTAMP_MS || stop > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(Span::new(start, stop))
}

pub(crate) fn check_comment(comment: Option<&str>) -> Result<(), EngineError> {
    if comment.is_some_and(|c| c.len() > MAX_COMMENT_LEN) {
        return Err(EngineError::LimitExceeded("comment too long"));
    }
    Ok(())
}

pub(crate) fn check_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("subject name too long"));
    }
    Ok(())
}

/// Interval count after committing `changes` on top of `current`.
pub(crate) fn interval_count_after(current: usize, changes: &[Change]) -> usize {
    changes.iter().fold(current, |n, c| match c {
        Change::Inserted(_) => n + 1,
        Change::Deleted(_) => n.saturating_sub(1),
        Change::Updated(_) => n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn span_bounds() {
        assert!(checked_span(10, 20).is_ok());
        assert!(matches!(
            checked_span(20, 20),
            Err(EngineError::InvalidRange { start: 20, stop: 20 })
        ));
        assert!(matches!(checked_span(30, 20), Err(EngineError::InvalidRange { .. })));
        assert!(matches!(checked_span(-5, 20), Err(EngineError::LimitExceeded(_))));
        assert!(matches!(
            checked_span(0, MAX_VALID_TIMESTAMP_MS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(checked_span(0, MAX_VALID_TIMESTAMP_MS).is_ok());
    }

    #[test]
    fn comment_and_name_length() {
        assert!(check_comment(None).is_ok());
        assert!(check_comment(Some(&"c".repeat(MAX_COMMENT_LEN))).is_ok());
        assert!(check_comment(Some(&"c".repeat(MAX_COMMENT_LEN + 1))).is_err());
        assert!(check_name(Some(&"n".repeat(MAX_NAME_LEN + 1))).is_err());
    }

    #[test]
    fn count_after_changes() {
        let changes = vec![
            Change::Deleted(Ulid::new()),
            Change::Deleted(Ulid::new()),
            Change::Inserted(StatusInterval::candidate(
                Ulid::new(),
                Ulid::new(),
                Span::new(0, 1),
                LeaseStatus::Leased,
                None,
            )),
        ];
        assert_eq!(interval_count_after(5, &changes), 4);
    }
}
