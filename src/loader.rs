use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::{DatasetConfig, LabelErrorPolicy, LabelValuePolicy, Split};
use crate::errors::{LaneSegError, Result};
use crate::label::ClassLabelMap;
use crate::mask::InstanceMaskStack;
use crate::progress_tracker::ProgressTracker;
use crate::traits::{ImageFileReader, LabelMapReader, Sleeper, ThreadSleeper};

/// Scans a split of a dataset and builds its catalog of instance masks.
pub struct MaskLoader<R = ImageFileReader, S = ThreadSleeper> {
    config: DatasetConfig,
    reader: R,
    sleeper: S,
    show_progress_bar: bool,
}

impl MaskLoader {
    /// Loader that decodes label files from disk and sleeps on the calling thread.
    pub fn new(config: DatasetConfig) -> Result<Self> {
        let reader = ImageFileReader::default().with_max_alloc(config.max_label_alloc);
        Self::with_parts(config, reader, ThreadSleeper)
    }
}

impl<R: LabelMapReader, S: Sleeper> MaskLoader<R, S> {
    pub fn with_parts(config: DatasetConfig, reader: R, sleeper: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reader,
            sleeper,
            show_progress_bar: false,
        })
    }

    pub const fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    pub const fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Regular files of a split's image directory, sorted by file name.
    ///
    /// Works for every known split, including listing-only ones.
    pub fn list_images(&self, dataset_root: &Path, split: &str) -> Result<Vec<PathBuf>> {
        let split: Split = split.parse()?;
        let layout = self.config.layout(split)?;
        list_regular_files(&dataset_root.join(&layout.images_subdir))
    }

    /// Build the catalog of `split` under `dataset_root`.
    pub fn load(&self, dataset_root: &Path, split: &str) -> Result<Catalog> {
        let split: Split = split.parse()?;
        let layout = self.config.layout(split)?;
        let label_suffix = layout
            .label_suffix
            .as_deref()
            .ok_or_else(|| LaneSegError::InvalidSplit {
                name: split.to_string(),
            })?;

        let images_dir = dataset_root.join(&layout.images_subdir);
        let labels_dir = dataset_root.join(&layout.labels_subdir);
        ensure_dir(&labels_dir, "open label directory")?;
        let image_paths = list_regular_files(&images_dir)?;

        log::info!(
            "Loading split `{split}`: {} images from {}, labels from {}",
            image_paths.len(),
            images_dir.display(),
            labels_dir.display()
        );

        let mut catalog = Catalog::new(split, self.config.class_names.clone());
        let tracker = ProgressTracker::new(
            image_paths.len(),
            self.config.progress_interval,
            self.show_progress_bar,
        );
        let mut skipped = 0usize;

        for (index, image_path) in image_paths.iter().enumerate() {
            match self.load_entry(&catalog, image_path, &labels_dir, label_suffix) {
                Ok(entry) => {
                    tracker.advance(index, &entry.id, true);
                    catalog.insert(entry)?;
                }
                Err(err)
                    if err.is_per_file() && self.config.label_errors == LabelErrorPolicy::Skip =>
                {
                    log::warn!("Skipping {}: {err}", image_path.display());
                    skipped += 1;
                    tracker.advance(index, &image_path.to_string_lossy(), false);
                }
                Err(err) => return Err(err),
            }
        }

        tracker.finish(catalog.len());
        if skipped > 0 {
            log::warn!("{skipped} images of split `{split}` were skipped");
        }
        Ok(catalog)
    }

    fn load_entry(
        &self,
        catalog: &Catalog,
        image_path: &Path,
        labels_dir: &Path,
        label_suffix: &str,
    ) -> Result<CatalogEntry> {
        let id = image_id(image_path)?;
        if let Some(existing) = catalog.index_of(&id) {
            return Err(LaneSegError::DuplicateImageId {
                first: catalog.entry(existing)?.path.clone(),
                second: image_path.to_path_buf(),
                id,
            });
        }

        let label_path = label_file_path(labels_dir, image_path, label_suffix);
        let labels = self
            .config
            .retry
            .run(&label_path, &self.sleeper, || {
                self.reader.read_label_map(&label_path)
            })?;
        self.check_label_values(&labels, &label_path)?;

        let mask = InstanceMaskStack::from_label_map(&labels, self.config.num_classes())?;
        log::debug!(
            "{id}: {}x{} label, {} planes",
            mask.width(),
            mask.height(),
            mask.depth()
        );

        Ok(CatalogEntry::new(
            id,
            self.config.source.as_str(),
            image_path.to_path_buf(),
            label_path,
            mask,
        ))
    }

    fn check_label_values(&self, labels: &ClassLabelMap, label_path: &Path) -> Result<()> {
        let num_classes = self.config.num_classes();
        let Some(value) = labels.max_out_of_range(num_classes) else {
            return Ok(());
        };

        match self.config.label_values {
            LabelValuePolicy::Reject => Err(LaneSegError::InvalidLabelValue {
                path: label_path.to_path_buf(),
                value,
                num_classes,
            }),
            LabelValuePolicy::Ignore => {
                log::warn!(
                    "{}: {} pixels carry class values >= {num_classes} (max {value}) and belong to no mask",
                    label_path.display(),
                    labels.count_out_of_range(num_classes)
                );
                Ok(())
            }
        }
    }
}

/// Catalog id of an image: its file name without the extension.
///
/// Ids are compared as text, so a stem that is not valid UTF-8 is refused rather
/// than lossily converted.
pub fn image_id(path: &Path) -> Result<String> {
    path.file_stem()
        .unwrap_or_default()
        .to_str()
        .map(str::to_owned)
        .ok_or_else(|| LaneSegError::NonUtf8FileName {
            path: path.to_path_buf(),
        })
}

fn label_file_path(labels_dir: &Path, image_path: &Path, label_suffix: &str) -> PathBuf {
    let mut name = image_path.file_stem().unwrap_or_default().to_os_string();
    name.push(label_suffix);
    labels_dir.join(name)
}

fn ensure_dir(dir: &Path, operation: &str) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    Err(LaneSegError::FileSystem {
        path: dir.to_path_buf(),
        operation: operation.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "directory does not exist"),
    })
}

fn list_regular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    ensure_dir(dir, "open image directory")?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_unresolvable_link(&err) => {
                log::warn!("Ignoring {}: {err}", err.path().unwrap_or(dir).display());
                continue;
            }
            Err(err) => {
                return Err(LaneSegError::FileSystem {
                    path: err.path().unwrap_or(dir).to_path_buf(),
                    operation: "list image directory".to_string(),
                    source: err.into(),
                })
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

// A dangling or looping symlink inside the directory is not a regular file.
fn is_unresolvable_link(err: &walkdir::Error) -> bool {
    err.depth() > 0
        && err
            .path()
            .and_then(|path| path.symlink_metadata().ok())
            .is_some_and(|meta| meta.file_type().is_symlink())
}
