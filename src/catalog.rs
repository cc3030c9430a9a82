use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Split;
use crate::errors::{LaneSegError, Result};
use crate::mask::InstanceMaskStack;

/// One image of a split together with its derived mask.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// File stem of the image, unique within the catalog.
    pub id: String,
    pub source: String,
    pub path: PathBuf,
    pub label_path: PathBuf,
    pub width: u32,
    pub height: u32,
    mask: InstanceMaskStack,
}

impl CatalogEntry {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        path: PathBuf,
        label_path: PathBuf,
        mask: InstanceMaskStack,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            path,
            label_path,
            width: mask.width() as u32,
            height: mask.height() as u32,
            mask,
        }
    }

    /// Mask still held by the entry; empty once taken.
    pub fn mask(&self) -> &InstanceMaskStack {
        &self.mask
    }

    pub fn has_mask(&self) -> bool {
        !self.mask.is_empty()
    }

    /// Move the mask out, leaving an empty stack of the same size behind.
    pub fn take_mask(&mut self) -> InstanceMaskStack {
        let empty = InstanceMaskStack::empty(self.height as usize, self.width as usize);
        std::mem::replace(&mut self.mask, empty)
    }
}

/// Entries of one split in scan order.
#[derive(Debug, Clone)]
pub struct Catalog {
    split: Split,
    class_names: Vec<String>,
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(split: Split, class_names: Vec<String>) -> Self {
        Self {
            split,
            class_names,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub const fn split(&self) -> Split {
        self.split
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    pub fn entry(&self, index: usize) -> Result<&CatalogEntry> {
        self.entries.get(index).ok_or(LaneSegError::OutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Foreground class ids, ascending. The same list goes with every mask.
    pub fn class_ids(&self) -> Vec<u16> {
        (1..self.class_names.len() as u16).collect()
    }

    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_names.get(class_id).map(String::as_str)
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Append an entry; ids must be unique.
    pub fn insert(&mut self, entry: CatalogEntry) -> Result<usize> {
        if let Some(&existing) = self.index.get(&entry.id) {
            return Err(LaneSegError::DuplicateImageId {
                id: entry.id,
                first: self.entries[existing].path.clone(),
                second: entry.path,
            });
        }

        let position = self.entries.len();
        self.index.insert(entry.id.clone(), position);
        self.entries.push(entry);
        Ok(position)
    }

    /// Hand out the mask of an entry together with the class id of each plane.
    ///
    /// The mask is moved out: a second call for the same index gets an empty stack.
    pub fn get_mask(&mut self, index: usize) -> Result<(InstanceMaskStack, Vec<u16>)> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(LaneSegError::OutOfRange { index, len })?;
        let mask = entry.take_mask();
        Ok((mask, self.class_ids()))
    }

    /// Path of the source image of an entry.
    pub fn get_reference(&self, index: usize) -> Result<&Path> {
        self.entry(index).map(|entry| entry.path.as_path())
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::ClassLabelMap;
    use ndarray::array;

    fn class_names() -> Vec<String> {
        crate::config::LANE_CLASS_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn entry(id: &str, file: &str) -> CatalogEntry {
        let labels = ClassLabelMap::new(array![[1, 2], [0, 3]]);
        let mask = InstanceMaskStack::from_label_map(&labels, 6).unwrap();
        CatalogEntry::new(
            id,
            "lane",
            PathBuf::from("images").join(file),
            PathBuf::from("labels").join(format!("{id}.png")),
            mask,
        )
    }

    #[test]
    fn test_mask_is_handed_out_once() -> Result<()> {
        let mut catalog = Catalog::new(Split::Train, class_names());
        catalog.insert(entry("0001", "0001.jpg"))?;

        let (mask, class_ids) = catalog.get_mask(0)?;
        assert_eq!(mask.depth(), 5);
        assert_eq!(mask.class_area(1), 1);
        assert_eq!(class_ids, vec![1, 2, 3, 4, 5]);
        assert!(!catalog.entry(0)?.has_mask());

        let (again, class_ids) = catalog.get_mask(0)?;
        assert!(again.is_empty());
        assert_eq!((again.height(), again.width()), (2, 2));
        assert_eq!(class_ids, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_duplicate_ids_are_rejected() -> Result<()> {
        let mut catalog = Catalog::new(Split::Val, class_names());
        catalog.insert(entry("road", "road.jpg"))?;

        let err = catalog.insert(entry("road", "road.png")).unwrap_err();
        match err {
            LaneSegError::DuplicateImageId { id, first, second } => {
                assert_eq!(id, "road");
                assert!(first.ends_with("road.jpg"));
                assert!(second.ends_with("road.png"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(catalog.len(), 1);
        Ok(())
    }

    #[test]
    fn test_accessors_and_bounds() -> Result<()> {
        let mut catalog = Catalog::new(Split::Train, class_names());
        catalog.insert(entry("a", "a.jpg"))?;
        catalog.insert(entry("b", "b.jpg"))?;

        assert_eq!(catalog.get_reference(1)?, Path::new("images/b.jpg"));
        assert_eq!(catalog.index_of("b"), Some(1));
        assert_eq!(catalog.class_name(3), Some("double_line"));
        assert_eq!(catalog.entry(0)?.width, 2);

        assert!(matches!(
            catalog.get_reference(2),
            Err(LaneSegError::OutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            catalog.get_mask(5),
            Err(LaneSegError::OutOfRange { index: 5, len: 2 })
        ));
        Ok(())
    }
}
