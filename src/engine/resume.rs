//! Parent ordering and resume positions

use crate::state::Checkpoint;
use crate::streams;
use std::cmp::Ordering;
use tracing::{info, warn};

/// Compare parent ids: numerically when both are integers, else as strings
pub fn compare_parent_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// Where a run starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumePoint {
    /// Index of the first parent to process
    pub parent_index: usize,
    /// Within that parent, skip entities up to and including this order index
    pub completed_through: Option<usize>,
}

impl ResumePoint {
    /// Whether entity `order` of parent `index` is already done
    pub fn skips(&self, index: usize, order: usize) -> bool {
        index == self.parent_index && self.completed_through.is_some_and(|done| order <= done)
    }
}

/// Translate a stored checkpoint into a resume point
///
/// `parent_ids` must already be in processing order. A checkpoint naming a
/// parent or entity absent from this run restarts from the first parent.
pub fn resume_point(
    checkpoint: &Checkpoint,
    parent_ids: &[String],
    traversed: impl Fn(&str) -> bool,
) -> ResumePoint {
    let Some(parent) = checkpoint.current_parent_id.as_deref() else {
        if checkpoint.current_entity_name.is_some() {
            warn!(?checkpoint, "Checkpoint names an entity without a parent, restarting");
        }
        return ResumePoint::default();
    };

    let Some(parent_index) = parent_ids.iter().position(|id| id == parent) else {
        warn!(parent, "Checkpoint parent not found in this run, restarting from the first parent");
        return ResumePoint::default();
    };

    let Some(entity) = checkpoint.current_entity_name.as_deref() else {
        info!(parent, "Resuming at the start of parent");
        return ResumePoint {
            parent_index,
            completed_through: None,
        };
    };

    match streams::order_index(entity) {
        Some(order) if traversed(entity) => {
            info!(parent, entity, "Resuming after completed entity");
            ResumePoint {
                parent_index,
                completed_through: Some(order),
            }
        }
        _ => {
            warn!(
                parent,
                entity, "Checkpoint entity not part of this run, restarting from the first parent"
            );
            ResumePoint::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test_case("2", "10", Ordering::Less; "numeric")]
    #[test_case("10", "10", Ordering::Equal; "equal")]
    #[test_case("abc", "abd", Ordering::Less; "strings")]
    #[test_case("9", "a", Ordering::Less; "mixed falls back to strings")]
    #[test_case("007", "7", Ordering::Less; "numeric tie broken by text")]
    fn test_compare_parent_ids(a: &str, b: &str, expected: Ordering) {
        assert_eq!(compare_parent_ids(a, b), expected);
    }

    #[test]
    fn test_sort_is_stable_ascending() {
        let mut parents = ids(&["12", "3", "100", "7"]);
        parents.sort_by(|a, b| compare_parent_ids(a, b));
        assert_eq!(parents, ids(&["3", "7", "12", "100"]));
    }

    #[test]
    fn test_clear_checkpoint_starts_at_beginning() {
        let point = resume_point(&Checkpoint::default(), &ids(&["1", "2"]), |_| true);
        assert_eq!(point, ResumePoint::default());
    }

    #[test]
    fn test_resume_after_completed_entity() {
        let checkpoint = Checkpoint::completed("5", "campaigns");
        let point = resume_point(&checkpoint, &ids(&["1", "5", "9"]), |_| true);

        assert_eq!(
            point,
            ResumePoint {
                parent_index: 1,
                completed_through: Some(0),
            }
        );
        assert!(point.skips(1, 0));
        assert!(!point.skips(1, 1));
        assert!(!point.skips(2, 0));
    }

    #[test]
    fn test_resume_entered_parent() {
        let point = resume_point(&Checkpoint::in_parent("9"), &ids(&["1", "5", "9"]), |_| true);
        assert_eq!(point.parent_index, 2);
        assert_eq!(point.completed_through, None);
        assert!(!point.skips(2, 0));
    }

    #[test]
    fn test_unknown_parent_restarts() {
        let point = resume_point(&Checkpoint::completed("42", "contacts"), &ids(&["1", "2"]), |_| true);
        assert_eq!(point, ResumePoint::default());
    }

    #[test]
    fn test_unknown_entity_restarts() {
        let point = resume_point(&Checkpoint::completed("2", "widgets"), &ids(&["1", "2"]), |_| true);
        assert_eq!(point, ResumePoint::default());
    }

    #[test]
    fn test_untraversed_entity_restarts() {
        let point = resume_point(
            &Checkpoint::completed("2", "contacts"),
            &ids(&["1", "2"]),
            |e| e == "campaigns",
        );
        assert_eq!(point, ResumePoint::default());
    }

    #[test]
    fn test_entity_without_parent_restarts() {
        let checkpoint = Checkpoint {
            current_parent_id: None,
            current_entity_name: Some("contacts".to_string()),
        };
        assert_eq!(resume_point(&checkpoint, &ids(&["1"]), |_| true), ResumePoint::default());
    }
}
