//! Offset/count slicing over an ordered candidate list.

use crate::error::OperationError;

/// Default page size for expansion when the caller supplies no count.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Slices `items` down to the `[offset, offset + count)` window.
///
/// A count of zero disables pagination and returns the full list. An offset
/// at or past the end returns an empty list. Input order is preserved;
/// ordering is established by the caller before this point.
pub fn paginate<T>(items: Vec<T>, offset: u32, count: u32) -> Vec<T> {
    if count == 0 {
        return items;
    }
    let offset = offset as usize;
    if offset >= items.len() {
        return Vec::new();
    }
    let end = offset.saturating_add(count as usize).min(items.len());
    items
        .into_iter()
        .skip(offset)
        .take(end - offset)
        .collect()
}

/// Validates a raw integer parameter as a non-negative offset or count.
/// Negative values are a caller error, not a clamp.
pub fn validate_page_param(name: &str, value: Option<i64>) -> Result<Option<u32>, OperationError> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(OperationError::invalid_request(format!(
            "Parameter '{name}' must not be negative, got {v}"
        ))),
        Some(v) => u32::try_from(v).map(Some).map_err(|_| {
            OperationError::invalid_request(format!("Parameter '{name}' is out of range: {v}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_zero_returns_everything() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(paginate(items.clone(), 0, 0), items);
        assert_eq!(paginate(items, 3, 0), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        assert_eq!(paginate(vec![1, 2, 3], 3, 10), Vec::<i32>::new());
        assert_eq!(paginate(vec![1, 2, 3], 7, 10), Vec::<i32>::new());
    }

    #[test]
    fn test_window_preserves_order() {
        assert_eq!(paginate(vec![1, 2, 3, 4, 5], 2, 50), vec![3, 4, 5]);
        assert_eq!(paginate(vec![1, 2, 3, 4, 5], 1, 2), vec![2, 3]);
    }

    #[test]
    fn test_negative_page_param_rejected() {
        assert!(validate_page_param("count", Some(-1)).is_err());
        assert_eq!(validate_page_param("count", Some(10)).unwrap(), Some(10));
        assert_eq!(validate_page_param("count", None).unwrap(), None);
    }
}
