pub mod catalog;
pub mod config;
pub mod errors;
pub mod label;
pub mod loader;
pub mod logging;
pub mod mask;
pub mod progress_tracker;
pub mod retry;
pub mod traits;

pub mod mocks;

use std::path::Path;

pub use catalog::{Catalog, CatalogEntry};
pub use config::{
    Config, DatasetConfig, LabelErrorPolicy, LabelValuePolicy, Split, SplitLayout,
    LANE_CLASS_NAMES, LANE_SOURCE,
};
pub use errors::{LaneSegError, Result};
pub use label::ClassLabelMap;
pub use loader::MaskLoader;
pub use mask::InstanceMaskStack;
pub use retry::RetryPolicy;
pub use traits::*;

/// Load one split of a dataset from disk with `config`.
pub fn load(dataset_root: &Path, split: &str, config: DatasetConfig) -> Result<Catalog> {
    MaskLoader::new(config)?.load(dataset_root, split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_png_labels() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let images = root.join("images");
        let labels = root.join("labels").join("class_labels");
        fs::create_dir_all(&images)?;
        fs::create_dir_all(&labels)?;

        GrayImage::new(2, 2).save(images.join("0001.png"))?;
        GrayImage::from_raw(2, 2, vec![1, 2, 0, 3])
            .unwrap()
            .save(labels.join("0001_lane_line_label_id.png"))?;

        let mut catalog = load(root, "train", DatasetConfig::default())?;
        assert_eq!(catalog.len(), 1);

        let (mask, class_ids) = catalog.get_mask(0)?;
        assert_eq!(class_ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(mask.to_label_map().view(), ndarray::array![[1u16, 2], [0, 3]]);
        Ok(())
    }

    #[test]
    fn test_unknown_split_is_rejected_before_io() {
        let result = load(Path::new("/does/not/exist"), "training", DatasetConfig::default());
        assert!(matches!(result, Err(LaneSegError::InvalidSplit { .. })));
    }
}
