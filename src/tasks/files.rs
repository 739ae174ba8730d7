use std::path::PathBuf;

use chrono::{Datelike, Local};
use tracing::{info, instrument};

use crate::scan::{MediaFile, scan};
use crate::select::{SelectionBudget, select_working_set};

/// Produces a fresh working set at the start of every slideshow cycle.
pub trait WorkingSetSource {
    fn rebuild(&mut self) -> Vec<MediaFile>;
}

/// Rescans the photo library from disk on every rebuild, so files added or
/// removed between cycles are picked up.
#[derive(Debug, Clone)]
pub struct PhotoLibrary {
    root: PathBuf,
    budget: SelectionBudget,
}

impl PhotoLibrary {
    #[must_use]
    pub fn new(root: PathBuf, budget: SelectionBudget) -> Self {
        Self { root, budget }
    }
}

impl WorkingSetSource for PhotoLibrary {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn rebuild(&mut self) -> Vec<MediaFile> {
        let current_year = Local::now().year();
        let catalog = scan(&self.root, current_year);
        info!(
            discovered = catalog.all.len(),
            recent = catalog.recent_two_years.len(),
            five_year = catalog.last_five_years.len(),
            current_year,
            "library scan complete"
        );
        let working_set = select_working_set(&catalog, &self.budget);
        info!(selected = working_set.len(), "new slideshow cycle");
        working_set
    }
}
