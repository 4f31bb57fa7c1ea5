//! Prefixed short-UUID generation for task and image ids.

use uuid::Uuid;

/// A UUID v4 with hyphens stripped (32 hex chars).
pub fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A prefixed id like `task-3f9c2a81b04d` (12 random hex chars).
pub fn with_prefix(prefix: &str) -> String {
    format!("{prefix}-{}", &short_uuid()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_has_no_hyphens() {
        let id = short_uuid();
        assert_eq!(id.len(), 32);
        assert!(!id.contains('-'));
    }

    #[test]
    fn with_prefix_shape() {
        let id = with_prefix("task");
        assert!(id.starts_with("task-"));
        assert_eq!(id.len(), "task-".len() + 12);
    }

    #[test]
    fn ids_are_unique() {
        let a = with_prefix("img");
        let b = with_prefix("img");
        assert_ne!(a, b);
    }
}
