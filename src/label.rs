use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::{DynamicImage, ImageBuffer, ImageError, Pixel};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use num_traits::AsPrimitive;

/// Per-pixel class indices of one label image, `[height, width]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelMap {
    values: Array2<u16>,
}

impl ClassLabelMap {
    pub const fn new(values: Array2<u16>) -> Self {
        Self { values }
    }

    /// Decode class indices from an integer image.
    ///
    /// Only the first channel is used: an RGB label `(3, 0, 0)` means class 3. This is
    /// not a luminance conversion. Floating point images are rejected.
    pub fn from_image(image: &DynamicImage) -> Result<Self, ImageError> {
        let values = match image {
            DynamicImage::ImageLuma8(buffer) => first_channel(buffer),
            DynamicImage::ImageLumaA8(buffer) => first_channel(buffer),
            DynamicImage::ImageRgb8(buffer) => first_channel(buffer),
            DynamicImage::ImageRgba8(buffer) => first_channel(buffer),
            DynamicImage::ImageLuma16(buffer) => first_channel(buffer),
            DynamicImage::ImageLumaA16(buffer) => first_channel(buffer),
            DynamicImage::ImageRgb16(buffer) => first_channel(buffer),
            DynamicImage::ImageRgba16(buffer) => first_channel(buffer),
            other => {
                return Err(ImageError::Unsupported(
                    UnsupportedError::from_format_and_kind(
                        ImageFormatHint::Unknown,
                        UnsupportedErrorKind::Color(other.color().into()),
                    ),
                ))
            }
        };
        Ok(Self { values })
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, u16> {
        self.values.view()
    }

    pub fn into_inner(self) -> Array2<u16> {
        self.values
    }

    /// Number of pixels whose value is not a class in `0..num_classes`.
    pub fn count_out_of_range(&self, num_classes: usize) -> usize {
        self.values
            .iter()
            .filter(|&&v| usize::from(v) >= num_classes)
            .count()
    }

    /// Largest value outside `0..num_classes`, if any.
    pub fn max_out_of_range(&self, num_classes: usize) -> Option<u16> {
        self.values
            .iter()
            .copied()
            .filter(|&v| usize::from(v) >= num_classes)
            .max()
    }
}

fn first_channel<P>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>) -> Array2<u16>
where
    P: Pixel + 'static,
    P::Subpixel: AsPrimitive<u16>,
{
    // (channel, height, width)
    buffer
        .as_ndarray3()
        .index_axis_move(Axis(0), 0)
        .mapv(|v| v.as_())
}
