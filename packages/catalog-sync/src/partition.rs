//! Static partitioning of the category list across workers.

use std::ops::Range;
use tracing::{info, warn};

use crate::error::PartitionError;
use crate::types::category::Category;
use crate::types::checkpoint::CrawlCheckpoint;

/// Contiguous, balanced slice of `len` items for worker `index` of `count`.
///
/// The first `len % count` workers take one extra item. Slices of
/// consecutive workers abut, so together they cover `0..len` exactly once.
pub fn partition_range(len: usize, index: usize, count: usize) -> Result<Range<usize>, PartitionError> {
    if count == 0 {
        return Err(PartitionError::ZeroWorkers);
    }
    if index >= count {
        return Err(PartitionError::IndexOutOfRange { index, count });
    }

    let base = len / count;
    let rem = len % count;
    let start = index * base + index.min(rem);
    let size = base + usize::from(index < rem);
    Ok(start..start + size)
}

/// What one worker should crawl this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlan {
    pub worker_index: usize,
    pub worker_count: usize,

    /// Categories in static list order, starting at the resume point
    pub categories: Vec<Category>,

    /// Category the plan was resumed from, if any
    pub resumed_from: Option<String>,
}

/// Deterministically assigns disjoint category slices to workers.
///
/// Assignment depends only on `(index, worker_count)` and the fixed list;
/// workers never talk to each other.
#[derive(Debug, Clone)]
pub struct PartitionCoordinator {
    categories: Vec<Category>,
    worker_count: usize,
}

impl PartitionCoordinator {
    pub fn new(categories: Vec<Category>, worker_count: usize) -> Result<Self, PartitionError> {
        if worker_count == 0 {
            return Err(PartitionError::ZeroWorkers);
        }
        if worker_count > categories.len() {
            warn!(
                worker_count,
                categories = categories.len(),
                "More workers than categories; some workers will be idle"
            );
        }
        Ok(Self {
            categories,
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// The categories assigned to worker `index`.
    pub fn assignment(&self, index: usize) -> Result<&[Category], PartitionError> {
        let range = partition_range(self.categories.len(), index, self.worker_count)?;
        Ok(&self.categories[range])
    }

    /// Build worker `index`'s plan, optionally resuming from its checkpoint.
    ///
    /// Resume restarts at the checkpointed category from its first page. A
    /// checkpoint naming a category outside the assignment (the list or the
    /// worker count changed) is ignored.
    pub fn plan(
        &self,
        index: usize,
        resume: Option<&CrawlCheckpoint>,
    ) -> Result<WorkerPlan, PartitionError> {
        let assigned = self.assignment(index)?;

        let resume_at = resume.and_then(|checkpoint| {
            let position = assigned
                .iter()
                .position(|c| c.id == checkpoint.category_id);
            if position.is_none() {
                warn!(
                    worker = index,
                    category = %checkpoint.category_id,
                    "Checkpoint category not in this worker's assignment, starting over"
                );
            }
            position
        });

        let categories = assigned[resume_at.unwrap_or(0)..].to_vec();
        let resumed_from = resume_at.map(|i| assigned[i].id.clone());

        info!(
            worker = index,
            workers = self.worker_count,
            assigned = assigned.len(),
            planned = categories.len(),
            resumed_from = ?resumed_from,
            "Partition planned"
        );

        Ok(WorkerPlan {
            worker_index: index,
            worker_count: self.worker_count,
            categories,
            resumed_from,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::checkpoint::Progress;
    use proptest::prelude::*;

    fn categories(n: usize) -> Vec<Category> {
        (0..n)
            .map(|i| Category::new(format!("cat-{i}"), format!("Category {i}")))
            .collect()
    }

    fn ids(categories: &[Category]) -> Vec<&str> {
        categories.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_balanced_contiguous_slices() {
        let coordinator = PartitionCoordinator::new(categories(7), 3).unwrap();

        assert_eq!(ids(coordinator.assignment(0).unwrap()), vec!["cat-0", "cat-1", "cat-2"]);
        assert_eq!(ids(coordinator.assignment(1).unwrap()), vec!["cat-3", "cat-4"]);
        assert_eq!(ids(coordinator.assignment(2).unwrap()), vec!["cat-5", "cat-6"]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(
            PartitionCoordinator::new(categories(3), 0).unwrap_err(),
            PartitionError::ZeroWorkers
        );

        let coordinator = PartitionCoordinator::new(categories(3), 2).unwrap();
        assert_eq!(
            coordinator.assignment(2).unwrap_err(),
            PartitionError::IndexOutOfRange { index: 2, count: 2 }
        );
    }

    #[test]
    fn test_more_workers_than_categories() {
        let coordinator = PartitionCoordinator::new(categories(2), 4).unwrap();

        assert_eq!(coordinator.assignment(0).unwrap().len(), 1);
        assert_eq!(coordinator.assignment(1).unwrap().len(), 1);
        assert!(coordinator.assignment(3).unwrap().is_empty());
    }

    #[test]
    fn test_plan_resumes_from_checkpoint_category() {
        let coordinator = PartitionCoordinator::new(categories(6), 2).unwrap();
        let checkpoint = Progress {
            categories_completed: 1,
            records_saved: 10,
            current_category: "cat-4".to_string(),
            current_page: 3,
        }
        .to_checkpoint(1);

        let plan = coordinator.plan(1, Some(&checkpoint)).unwrap();

        assert_eq!(ids(&plan.categories), vec!["cat-4", "cat-5"]);
        assert_eq!(plan.resumed_from.as_deref(), Some("cat-4"));
    }

    #[test]
    fn test_plan_ignores_foreign_checkpoint() {
        let coordinator = PartitionCoordinator::new(categories(6), 2).unwrap();
        let checkpoint = Progress {
            current_category: "cat-0".to_string(),
            ..Default::default()
        }
        .to_checkpoint(1);

        let plan = coordinator.plan(1, Some(&checkpoint)).unwrap();

        assert_eq!(ids(&plan.categories), vec!["cat-3", "cat-4", "cat-5"]);
        assert!(plan.resumed_from.is_none());
    }

    proptest! {
        #[test]
        fn prop_assignments_cover_list_exactly_once(len in 1usize..80, workers_seed in 0usize..80) {
            let worker_count = workers_seed % len + 1;
            let all = categories(len);
            let coordinator = PartitionCoordinator::new(all.clone(), worker_count).unwrap();

            let mut joined = Vec::new();
            let mut sizes = Vec::new();
            for index in 0..worker_count {
                let slice = coordinator.assignment(index).unwrap();
                sizes.push(slice.len());
                joined.extend_from_slice(slice);
            }

            prop_assert_eq!(joined, all);
            let max = sizes.iter().max().copied().unwrap_or(0);
            let min = sizes.iter().min().copied().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn prop_assignment_is_deterministic(len in 0usize..50, worker_count in 1usize..10) {
            let first = PartitionCoordinator::new(categories(len), worker_count).unwrap();
            let second = PartitionCoordinator::new(categories(len), worker_count).unwrap();

            for index in 0..worker_count {
                prop_assert_eq!(first.assignment(index).unwrap(), second.assignment(index).unwrap());
            }
        }
    }
}
