//! Turns a requested `[start, end]` / `limit` into a concrete slice of the
//! ordered qrel set.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrelWindow {
    /// Effective 1-based inclusive start.
    pub start_1b: u64,
    /// Effective 1-based inclusive end.
    pub end_1b: u64,
    pub intended_count: u64,
    /// `intended_count` after the limit is applied.
    pub processed_target: u64,
    pub is_subset: bool,
}

impl QrelWindow {
    /// Zero-based offset of the first row in the window.
    pub fn offset(&self) -> u64 {
        self.start_1b.saturating_sub(1)
    }
}

pub fn validate(
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<i64>,
) -> Result<(), ValidationError> {
    if matches!(limit, Some(l) if l <= 0) {
        return Err(ValidationError(
            "limit_qrels must be positive or unset".into(),
        ));
    }
    if matches!(start, Some(s) if s <= 0) {
        return Err(ValidationError(
            "start_qrel must be positive (1-based) if provided".into(),
        ));
    }
    if matches!(end, Some(e) if e <= 0) {
        return Err(ValidationError(
            "end_qrel must be positive (1-based) if provided".into(),
        ));
    }
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ValidationError(format!(
                "start_qrel ({}) cannot be greater than end_qrel ({})",
                s, e
            )));
        }
    }
    Ok(())
}

pub fn compute_window(
    total_available: u64,
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<i64>,
) -> QrelWindow {
    let total = total_available;
    let s = positive(start).unwrap_or(1);
    let e = positive(end).unwrap_or(total);

    let (start_1b, end_1b) = if total > 0 {
        (s.clamp(1, total), e.clamp(1, total))
    } else {
        (1, 1)
    };

    let intended_count = if total > 0 {
        (end_1b + 1).saturating_sub(start_1b)
    } else {
        0
    };
    let processed_target = match limit {
        Some(l) => intended_count.min(l.max(0) as u64),
        None => intended_count,
    };

    QrelWindow {
        start_1b,
        end_1b,
        intended_count,
        processed_target,
        is_subset: processed_target < total,
    }
}

/// An official run must cover the whole dataset.
pub fn ensure_official_guard(official: bool, window: &QrelWindow) -> Result<(), ValidationError> {
    if official && window.is_subset {
        return Err(ValidationError(
            "cannot mark run 'official' when processing only a subset of qrels (range and/or limit)"
                .into(),
        ));
    }
    Ok(())
}

fn positive(v: Option<i64>) -> Option<u64> {
    v.filter(|x| *x > 0).map(|x| x as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_bounds() {
        assert!(validate(None, None, Some(0)).is_err());
        assert!(validate(None, None, Some(-3)).is_err());
        assert!(validate(Some(0), None, None).is_err());
        assert!(validate(None, Some(-1), None).is_err());
        assert!(validate(Some(10), Some(9), None).is_err());
        assert!(validate(Some(9), Some(9), Some(1)).is_ok());
        assert!(validate(None, None, None).is_ok());
    }

    #[test]
    fn empty_dataset_yields_empty_window() {
        for (s, e, l) in [
            (None, None, None),
            (Some(5), Some(10), Some(3)),
            (Some(1), None, Some(100)),
        ] {
            let w = compute_window(0, s, e, l);
            assert_eq!(w.intended_count, 0);
            assert_eq!(w.processed_target, 0);
            assert!(!w.is_subset);
        }
    }

    #[test]
    fn intended_count_is_inclusive_span() {
        let total = 12;
        for start in 1..=total {
            for end in start..=total {
                let w = compute_window(total, Some(start as i64), Some(end as i64), None);
                assert_eq!(w.intended_count, end - start + 1, "start={start} end={end}");
                assert_eq!(w.processed_target, w.intended_count);
            }
        }
    }

    #[test]
    fn limit_caps_processed_target() {
        let total = 20;
        for limit in 1..=25i64 {
            let w = compute_window(total, Some(3), Some(12), Some(limit));
            assert_eq!(w.processed_target, w.intended_count.min(limit as u64));
        }
    }

    #[test]
    fn bounds_are_clamped_into_dataset() {
        let w = compute_window(50, Some(40), Some(500), None);
        assert_eq!((w.start_1b, w.end_1b), (40, 50));
        assert_eq!(w.intended_count, 11);
        assert_eq!(w.offset(), 39);
    }

    #[test]
    fn full_and_limited_runs() {
        let limited = compute_window(1000, None, None, Some(100));
        assert_eq!(limited.processed_target, 100);
        assert!(limited.is_subset);

        let full = compute_window(1000, Some(1), Some(1000), None);
        assert_eq!(full.processed_target, 1000);
        assert!(!full.is_subset);
    }

    #[test]
    fn official_guard_rejects_subsets_only() {
        let subset = compute_window(1000, None, None, Some(100));
        let err = ensure_official_guard(true, &subset).unwrap_err();
        assert!(err.0.contains("official"));

        assert!(ensure_official_guard(false, &subset).is_ok());
        let full = compute_window(1000, None, None, None);
        assert!(ensure_official_guard(true, &full).is_ok());
    }
}
