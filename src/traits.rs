use std::path::Path;
use std::time::Duration;

use image::error::{LimitError, LimitErrorKind};
use image::{ImageError, ImageReader, Limits};

use crate::label::ClassLabelMap;

/// ラベルマップ読み込みの抽象化
///
/// ローダーはこの抽象にだけ依存するので、テストではデコーダを使わずに
/// ラベルマップや失敗を差し込める
pub trait LabelMapReader {
    /// `path` のラベルマップをデコード
    ///
    /// 一時的なメモリ不足は `LimitErrorKind::InsufficientMemory` か
    /// `OutOfMemory` の I/O エラーで返すこと（ローダーが再試行する）
    fn read_label_map(&self, path: &Path) -> Result<ClassLabelMap, ImageError>;
}

/// 再試行の間の待機
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// `image` クレートでラベル画像をデコードする
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileReader {
    max_alloc: Option<u64>,
}

impl ImageFileReader {
    /// デコード時の確保量の上限（バイト）。`None` なら制限しない
    pub const fn with_max_alloc(mut self, max_alloc: Option<u64>) -> Self {
        self.max_alloc = max_alloc;
        self
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::no_limits();
        limits.max_alloc = self.max_alloc;
        limits
    }
}

impl LabelMapReader for ImageFileReader {
    fn read_label_map(&self, path: &Path) -> Result<ClassLabelMap, ImageError> {
        let mut reader = ImageReader::open(path)?;
        reader.limits(self.limits());
        let image = reader.decode().map_err(|err| match err {
            // 上限超過はファイルで決まるので、何度読んでも同じ結果になる
            ImageError::Limits(e) if e.kind() == LimitErrorKind::InsufficientMemory => {
                ImageError::Limits(LimitError::from_kind(LimitErrorKind::DimensionError))
            }
            other => other,
        })?;
        ClassLabelMap::from_image(&image)
    }
}

/// 呼び出したスレッドで待機する
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: LabelMapReader + ?Sized> LabelMapReader for &T {
    fn read_label_map(&self, path: &Path) -> Result<ClassLabelMap, ImageError> {
        (**self).read_label_map(path)
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
