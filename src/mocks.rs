use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::error::{
    DecodingError, ImageError, ImageFormatHint, LimitError, LimitErrorKind,
};
use ndarray::Array2;
use parking_lot::Mutex;

use crate::label::ClassLabelMap;
use crate::traits::{LabelMapReader, Sleeper};

/// メモリ確保に失敗したときのデコーダのエラー
pub fn out_of_memory() -> ImageError {
    ImageError::Limits(LimitError::from_kind(LimitErrorKind::InsufficientMemory))
}

/// テスト用のモックラベルリーダー
///
/// パスごとのラベルマップと、失敗のシナリオを持つ
#[derive(Debug, Default)]
pub struct MockLabelReader {
    labels: HashMap<PathBuf, Array2<u16>>,
    corrupt: Vec<PathBuf>,
    transient_failures: Mutex<HashMap<PathBuf, u32>>,
    reads: Mutex<Vec<PathBuf>>,
}

impl MockLabelReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(mut self, path: impl Into<PathBuf>, labels: Array2<u16>) -> Self {
        self.labels.insert(path.into(), labels);
        self
    }

    /// デコードに失敗するパスを登録
    pub fn with_corrupt(mut self, path: impl Into<PathBuf>) -> Self {
        self.corrupt.push(path.into());
        self
    }

    /// `path` の次の `count` 回の読み込みをメモリ不足で失敗させる
    pub fn with_transient_failures(self, path: impl Into<PathBuf>, count: u32) -> Self {
        self.transient_failures.lock().insert(path.into(), count);
        self
    }

    /// `read_label_map` に渡されたパス（呼び出し順）
    pub fn reads(&self) -> Vec<PathBuf> {
        self.reads.lock().clone()
    }
}

impl LabelMapReader for MockLabelReader {
    fn read_label_map(&self, path: &Path) -> Result<ClassLabelMap, ImageError> {
        self.reads.lock().push(path.to_path_buf());

        if let Some(remaining) = self.transient_failures.lock().get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(out_of_memory());
            }
        }

        if self.corrupt.iter().any(|p| p == path) {
            return Err(ImageError::Decoding(DecodingError::new(
                ImageFormatHint::Unknown,
                "corrupt label data",
            )));
        }

        self.labels
            .get(path)
            .cloned()
            .map(ClassLabelMap::new)
            .ok_or_else(|| {
                ImageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no label registered for {}", path.display()),
                ))
            })
    }
}

/// 待機せずに待機時間を記録するテスト用スリーパー
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scripted_failures_run_out() {
        let reader = MockLabelReader::new()
            .with_labels("a.png", array![[1, 2]])
            .with_transient_failures("a.png", 1);

        assert!(matches!(
            reader.read_label_map(Path::new("a.png")),
            Err(ImageError::Limits(_))
        ));
        let labels = reader.read_label_map(Path::new("a.png")).unwrap();
        assert_eq!(labels.width(), 2);
        assert_eq!(reader.reads().len(), 2);
    }

    #[test]
    fn test_unknown_and_corrupt_paths() {
        let reader = MockLabelReader::new().with_corrupt("bad.png");
        assert!(matches!(
            reader.read_label_map(Path::new("bad.png")),
            Err(ImageError::Decoding(_))
        ));
        assert!(matches!(
            reader.read_label_map(Path::new("missing.png")),
            Err(ImageError::IoError(_))
        ));
    }

    #[test]
    fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(1));
        sleeper.sleep(Duration::from_secs(4));
        assert_eq!(sleeper.total(), Duration::from_secs(5));
    }
}
