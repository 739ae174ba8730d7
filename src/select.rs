//! Stratified random selection of the working set for one slideshow cycle.

use std::collections::HashSet;
use std::path::Path;

use rand::rngs::OsRng;
use rand::seq::{SliceRandom, index};
use rand::{Rng, TryRngCore};
use tracing::debug;

use crate::scan::{Catalog, MediaFile};

/// How many files to draw from each pool per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionBudget {
    /// Drawn from files of the current and previous year.
    pub recent: usize,
    /// Drawn from the remaining files of the last five years.
    pub five_year: usize,
    /// Drawn from the whole library.
    pub all: usize,
}

impl Default for SelectionBudget {
    fn default() -> Self {
        Self {
            recent: 250,
            five_year: 250,
            all: 500,
        }
    }
}

impl SelectionBudget {
    /// Upper bound for the size of a working set.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.recent
            .saturating_add(self.five_year)
            .saturating_add(self.all)
    }
}

/// Draw the three strata independently, merge them without duplicates and
/// shuffle the result.
///
/// Randomness comes straight from the operating system so the order cannot be
/// predicted or replayed.
pub fn select_working_set(catalog: &Catalog, budget: &SelectionBudget) -> Vec<MediaFile> {
    let mut rng = OsRng.unwrap_err();

    let draws = [
        (&catalog.recent_two_years, budget.recent),
        (&catalog.last_five_years, budget.five_year),
        (&catalog.all, budget.all),
    ];

    let mut seen: HashSet<&Path> = HashSet::new();
    let mut combined = Vec::new();
    for (pool, amount) in draws {
        for file in secure_sample(pool, amount, &mut rng) {
            if seen.insert(file.path()) {
                combined.push(file.clone());
            }
        }
    }
    combined.shuffle(&mut rng);

    debug!(
        recent_pool = catalog.recent_two_years.len(),
        five_year_pool = catalog.last_five_years.len(),
        all_pool = catalog.all.len(),
        selected = combined.len(),
        "working set selected"
    );
    combined
}

/// Sample `amount` distinct entries of `pool`, or the whole pool if it is not
/// larger than that.
fn secure_sample<'a, R: Rng + ?Sized>(
    pool: &'a [MediaFile],
    amount: usize,
    rng: &mut R,
) -> Vec<&'a MediaFile> {
    if pool.len() <= amount {
        return pool.iter().collect();
    }
    index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|i| &pool[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pool(n: usize) -> Vec<MediaFile> {
        (0..n)
            .map(|i| MediaFile::new(PathBuf::from(format!("/p/{i}.jpg"))))
            .collect()
    }

    #[test]
    fn small_pool_is_taken_whole() {
        let files = pool(3);
        let mut rng = OsRng.unwrap_err();
        let picked = secure_sample(&files, 3, &mut rng);
        assert_eq!(picked.len(), 3);
        let picked = secure_sample(&files, 10, &mut rng);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn large_pool_is_sampled_without_replacement() {
        let files = pool(50);
        let mut rng = OsRng.unwrap_err();
        let picked = secure_sample(&files, 20, &mut rng);
        assert_eq!(picked.len(), 20);
        let unique: HashSet<&Path> = picked.iter().map(|f| f.path()).collect();
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn zero_budget_selects_nothing() {
        let catalog = Catalog::from_files(pool(10), 2025);
        let budget = SelectionBudget {
            recent: 0,
            five_year: 0,
            all: 0,
        };
        assert!(select_working_set(&catalog, &budget).is_empty());
    }

    #[test]
    fn total_saturates() {
        let budget = SelectionBudget {
            recent: usize::MAX,
            five_year: 1,
            all: 1,
        };
        assert_eq!(budget.total(), usize::MAX);
    }
}
