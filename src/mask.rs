use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use ndarray::prelude::*;

use crate::errors::{LaneSegError, Result};
use crate::label::ClassLabelMap;

/// One boolean plane per foreground class, `[height, width, K - 1]`.
///
/// Plane `i` is true exactly where the label map holds class `i + 1`. Background
/// (class 0) has no plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMaskStack {
    planes: Array3<bool>,
}

impl InstanceMaskStack {
    /// Build the planes for classes `1..num_classes` in ascending order.
    pub fn from_label_map(labels: &ClassLabelMap, num_classes: usize) -> Result<Self> {
        let labels = labels.view();
        let planes = (1..num_classes)
            .map(|class_id| labels.mapv(|v| usize::from(v) == class_id))
            .collect::<Vec<_>>();

        if planes.is_empty() {
            let (height, width) = labels.dim();
            return Ok(Self::empty(height, width));
        }

        let views = planes.iter().map(|p| p.view()).collect::<Vec<_>>();
        Ok(Self {
            planes: ndarray::stack(Axis(2), &views)?,
        })
    }

    /// A stack with no planes, left behind once a mask has been handed out.
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            planes: Array3::from_elem((height, width, 0), false),
        }
    }

    pub fn height(&self) -> usize {
        self.planes.dim().0
    }

    pub fn width(&self) -> usize {
        self.planes.dim().1
    }

    /// Number of planes, `K - 1` for a populated stack.
    pub fn depth(&self) -> usize {
        self.planes.dim().2
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    pub fn view(&self) -> ArrayView3<'_, bool> {
        self.planes.view()
    }

    pub fn into_inner(self) -> Array3<bool> {
        self.planes
    }

    /// Plane of a foreground class id (`1..K`).
    pub fn plane(&self, class_id: usize) -> Option<ArrayView2<'_, bool>> {
        (class_id >= 1 && class_id <= self.depth())
            .then(|| self.planes.index_axis(Axis(2), class_id - 1))
    }

    /// Pixel count of a class.
    pub fn class_area(&self, class_id: usize) -> usize {
        self.plane(class_id)
            .map_or(0, |plane| plane.iter().filter(|&&v| v).count())
    }

    /// Pixels covered by any class.
    pub fn union(&self) -> Array2<bool> {
        self.planes
            .map_axis(Axis(2), |planes| planes.iter().any(|&v| v))
    }

    /// Recover the class index of every pixel: the class of its set plane, or 0.
    pub fn to_label_map(&self) -> ClassLabelMap {
        let values = self.planes.map_axis(Axis(2), |planes| {
            planes
                .iter()
                .position(|&v| v)
                .map_or(0, |i| (i + 1) as u16)
        });
        ClassLabelMap::new(values)
    }

    /// Write each plane as an 8-bit PNG (`{id}_class{c}.png`, 255 = set).
    pub fn save_planes(&self, dir: &Path, id: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| LaneSegError::FileSystem {
            path: dir.to_path_buf(),
            operation: "create mask export directory".to_string(),
            source: e,
        })?;

        let (height, width) = (self.height() as u32, self.width() as u32);
        (1..=self.depth())
            .map(|class_id| {
                let plane = self.planes.index_axis(Axis(2), class_id - 1);
                let image = GrayImage::from_fn(width, height, |x, y| {
                    Luma([if plane[[y as usize, x as usize]] { 255 } else { 0 }])
                });
                let path = dir.join(format!("{id}_class{class_id}.png"));
                image.save(&path).map_err(|e| LaneSegError::FileSystem {
                    path: path.clone(),
                    operation: "write mask plane".to_string(),
                    source: std::io::Error::other(e),
                })?;
                Ok(path)
            })
            .collect()
    }
}
