use indicatif::{ProgressBar, ProgressStyle};

/// Reports scan progress as periodic log lines and, optionally, a progress bar.
pub struct ProgressTracker {
    progress_bar: ProgressBar,
    total: usize,
    every: usize,
}

impl ProgressTracker {
    pub fn new(total: usize, every: usize, show_bar: bool) -> Self {
        let progress_bar = if show_bar {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            ) {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            progress_bar,
            total,
            every: every.max(1),
        }
    }

    /// Record that the file at `index` (0-based) was handled.
    ///
    /// `added` is false when the file was stepped over and is not in the catalog.
    pub fn advance(&self, index: usize, id: &str, added: bool) {
        if index % self.every == 0 {
            log::info!("{}", self.status_line(index, id, added));
        }
        self.progress_bar.inc(1);
    }

    fn status_line(&self, index: usize, id: &str, added: bool) -> String {
        let outcome = if added { "added" } else { "skipped" };
        format!(
            "{index}/{}({:.1} %) {id} is {outcome}.",
            self.total,
            self.percent(index)
        )
    }

    pub fn finish(&self, loaded: usize) {
        self.progress_bar.finish_and_clear();
        log::info!("{loaded}/{} images added", self.total);
    }

    fn percent(&self, index: usize) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * index as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let tracker = ProgressTracker::new(200, 100, false);
        assert_eq!(tracker.percent(0), 0.0);
        assert_eq!(tracker.percent(100), 50.0);
        assert_eq!(ProgressTracker::new(0, 100, false).percent(0), 100.0);
    }

    #[test]
    fn test_hidden_bar_counts() {
        let tracker = ProgressTracker::new(3, 0, false);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            tracker.advance(i, id, i != 1);
        }
        assert_eq!(tracker.progress_bar.position(), 3);
        assert_eq!(tracker.every, 1);
    }

    #[test]
    fn test_status_line_reports_outcome() {
        let tracker = ProgressTracker::new(4, 1, false);
        assert_eq!(tracker.status_line(0, "0001", true), "0/4(0.0 %) 0001 is added.");
        assert_eq!(
            tracker.status_line(2, "0003", false),
            "2/4(50.0 %) 0003 is skipped."
        );
    }
}
