use clap::Parser;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{LaneSegError, Result};
use crate::retry::RetryPolicy;

/// カタログの各エントリに付けるデータセット名
pub const LANE_SOURCE: &str = "lane";

/// レーンデータセットのクラス表（先頭は背景）
pub const LANE_CLASS_NAMES: [&str; 6] = [
    "BG",
    "main_lane",
    "alter_lane",
    "double_line",
    "dashed_line",
    "single_line",
];

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Inspect lane label maps as per-class instance masks", long_about = None)]
pub struct Config {
    /// Dataset root containing the split image and label directories
    pub dataset_dir: PathBuf,

    /// Split to load (train or val)
    #[arg(short, long, default_value = "train")]
    pub split: String,

    /// Read attempts per label file under memory pressure
    #[arg(long, default_value_t = 99)]
    pub max_attempts: u32,

    /// Backoff unit; attempt n waits n² of these
    #[arg(long, default_value_t = 1000)]
    pub base_delay_ms: u64,

    /// Log a progress line every N files
    #[arg(long, default_value_t = 100)]
    pub progress_interval: usize,

    /// Skip images whose label is missing or broken instead of aborting
    #[arg(long, default_value_t = false)]
    pub skip_bad_labels: bool,

    /// Reject label maps containing class values outside the class table
    #[arg(long, default_value_t = false)]
    pub strict_labels: bool,

    /// Write every mask plane as a PNG into this directory
    #[arg(short, long)]
    pub export_masks: Option<PathBuf>,

    #[arg(short, long, default_value_t = log::LevelFilter::Info, value_parser = check_level)]
    pub log_level: log::LevelFilter,

    /// Also write the log to a timestamped file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Show a progress bar
    #[arg(short, long, default_value_t = false)]
    pub progress: bool,

    /// Refuse label files whose decoded buffer needs more than this many MiB
    #[arg(long)]
    pub max_label_alloc_mb: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    /// コマンドライン引数からローダー設定を組み立てる
    pub fn dataset_config(&self) -> Result<DatasetConfig> {
        let label_errors = if self.skip_bad_labels {
            LabelErrorPolicy::Skip
        } else {
            LabelErrorPolicy::Abort
        };
        let label_values = if self.strict_labels {
            LabelValuePolicy::Reject
        } else {
            LabelValuePolicy::Ignore
        };

        let config = DatasetConfig::default()
            .with_retry(RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.base_delay_ms),
            ))
            .with_progress_interval(self.progress_interval)
            .with_label_errors(label_errors)
            .with_label_values(label_values)
            .with_max_label_alloc(
                self.max_label_alloc_mb
                    .map(|mb| mb.saturating_mul(1024 * 1024)),
            );
        config.validate()?;
        Ok(config)
    }
}

fn check_level(s: &str) -> std::result::Result<log::LevelFilter, String> {
    s.parse().map_err(|_| {
        format!("{s} is not a log level. Supported levels: off, error, warn, info, debug, trace")
    })
}

/// データセットの分割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Split {
    Train,
    /// 学習データと同じ構成のテスト用分割。一覧のみでロードはしない
    TrainTest,
    Val,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::TrainTest, Split::Val];

    pub const fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::TrainTest => "train_test",
            Split::Val => "val",
        }
    }
}

impl FromStr for Split {
    type Err = LaneSegError;

    fn from_str(s: &str) -> Result<Self> {
        Split::ALL
            .into_iter()
            .find(|split| split.as_str() == s)
            .ok_or_else(|| LaneSegError::InvalidSplit {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分割ごとの画像・ラベルディレクトリ（データセットルートからの相対パス）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLayout {
    pub images_subdir: PathBuf,
    pub labels_subdir: PathBuf,
    /// 画像のステムに付けてラベルファイル名にする接尾辞
    ///
    /// `None` はラベルを持たない一覧専用の分割
    pub label_suffix: Option<String>,
}

impl SplitLayout {
    pub fn new(
        images_subdir: impl Into<PathBuf>,
        labels_subdir: impl Into<PathBuf>,
        label_suffix: Option<&str>,
    ) -> Self {
        Self {
            images_subdir: images_subdir.into(),
            labels_subdir: labels_subdir.into(),
            label_suffix: label_suffix.map(str::to_string),
        }
    }

    /// 画像ステムに対応するラベルファイル名
    pub fn label_file_name(&self, stem: &str) -> Option<String> {
        self.label_suffix
            .as_ref()
            .map(|suffix| format!("{stem}{suffix}"))
    }
}

/// ラベルが使えない画像の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelErrorPolicy {
    #[default]
    Abort,
    Skip,
}

/// クラス表にない値を持つラベル画素の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelValuePolicy {
    /// どのマスクにも含めず、画素数をログに出す
    #[default]
    Ignore,
    Reject,
}

/// `MaskLoader` が使うデータセット設定
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub source: String,
    /// クラスIDで引くクラス名（ID 0 は背景）
    pub class_names: Vec<String>,
    pub layouts: BTreeMap<Split, SplitLayout>,
    pub retry: RetryPolicy,
    pub progress_interval: usize,
    pub label_errors: LabelErrorPolicy,
    pub label_values: LabelValuePolicy,
    /// ラベル1枚のデコードに許すメモリ量（バイト）。`None` なら無制限
    pub max_label_alloc: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let layouts = BTreeMap::from([
            (
                Split::Train,
                SplitLayout::new(
                    "images",
                    PathBuf::from("labels").join("class_labels"),
                    Some("_lane_line_label_id.png"),
                ),
            ),
            (
                Split::TrainTest,
                SplitLayout::new(
                    "images_test",
                    PathBuf::from("labels_test").join("class_labels"),
                    None,
                ),
            ),
            (
                Split::Val,
                SplitLayout::new("images_real_world", "labels_real_world", Some(".png")),
            ),
        ]);

        Self {
            source: LANE_SOURCE.to_string(),
            class_names: LANE_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            layouts,
            retry: RetryPolicy::default(),
            progress_interval: 100,
            label_errors: LabelErrorPolicy::default(),
            label_values: LabelValuePolicy::default(),
            max_label_alloc: None,
        }
    }
}

impl DatasetConfig {
    /// 背景を含むクラス数 K
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// 前景クラスID `1..K`
    pub fn class_ids(&self) -> Vec<u16> {
        (1..self.num_classes() as u16).collect()
    }

    pub fn layout(&self, split: Split) -> Result<&SplitLayout> {
        self.layouts
            .get(&split)
            .ok_or_else(|| LaneSegError::InvalidSplit {
                name: split.to_string(),
            })
    }

    pub fn with_class_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.class_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_layout(mut self, split: Split, layout: SplitLayout) -> Self {
        self.layouts.insert(split, layout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn with_progress_interval(mut self, every: usize) -> Self {
        self.progress_interval = every;
        self
    }

    pub const fn with_label_errors(mut self, policy: LabelErrorPolicy) -> Self {
        self.label_errors = policy;
        self
    }

    pub const fn with_label_values(mut self, policy: LabelValuePolicy) -> Self {
        self.label_values = policy;
        self
    }

    pub const fn with_max_label_alloc(mut self, bytes: Option<u64>) -> Self {
        self.max_label_alloc = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let num_classes = self.num_classes();
        if num_classes < 2 {
            return Err(LaneSegError::Configuration {
                message: format!("need background plus at least one class, got {num_classes}"),
            });
        }
        if num_classes > u16::MAX as usize {
            return Err(LaneSegError::Configuration {
                message: format!("{num_classes} classes do not fit 16-bit label values"),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(LaneSegError::Configuration {
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.progress_interval == 0 {
            return Err(LaneSegError::Configuration {
                message: "progress_interval must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_split_names() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("val".parse::<Split>().unwrap(), Split::Val);
        assert_eq!("train_test".parse::<Split>().unwrap(), Split::TrainTest);

        for bad in ["Train", "test", "", "validation"] {
            assert!(matches!(
                bad.parse::<Split>(),
                Err(LaneSegError::InvalidSplit { name }) if name == bad
            ));
        }
    }

    #[test]
    fn test_default_layouts() {
        let config = DatasetConfig::default();
        assert_eq!(config.num_classes(), 6);
        assert_eq!(config.class_ids(), vec![1, 2, 3, 4, 5]);

        let train = config.layout(Split::Train).unwrap();
        assert_eq!(
            train.label_file_name("0001").as_deref(),
            Some("0001_lane_line_label_id.png")
        );
        assert_eq!(train.labels_subdir, Path::new("labels").join("class_labels"));

        let val = config.layout(Split::Val).unwrap();
        assert_eq!(val.images_subdir, Path::new("images_real_world"));
        assert_eq!(val.label_file_name("road").as_deref(), Some("road.png"));

        let listing_only = config.layout(Split::TrainTest).unwrap();
        assert_eq!(listing_only.label_file_name("0001"), None);
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        assert!(DatasetConfig::default().validate().is_ok());

        let only_background = DatasetConfig::default().with_class_names(["BG"]);
        assert!(matches!(
            only_background.validate(),
            Err(LaneSegError::Configuration { .. })
        ));

        let no_attempts =
            DatasetConfig::default().with_retry(RetryPolicy::new(0, Duration::from_secs(1)));
        assert!(no_attempts.validate().is_err());

        let no_progress = DatasetConfig::default().with_progress_interval(0);
        assert!(no_progress.validate().is_err());
    }

    #[test]
    fn test_cli_flags_map_to_policies() {
        let config = Config::try_parse_from([
            "lane-seg",
            "/data/lanes",
            "--split",
            "val",
            "--max-attempts",
            "3",
            "--base-delay-ms",
            "10",
            "--skip-bad-labels",
            "--strict-labels",
            "--max-label-alloc-mb",
            "64",
        ])
        .unwrap();

        let dataset = config.dataset_config().unwrap();
        assert_eq!(config.split, "val");
        assert_eq!(dataset.retry.max_attempts, 3);
        assert_eq!(dataset.retry.base_delay, Duration::from_millis(10));
        assert_eq!(dataset.label_errors, LabelErrorPolicy::Skip);
        assert_eq!(dataset.label_values, LabelValuePolicy::Reject);
        assert_eq!(dataset.max_label_alloc, Some(64 * 1024 * 1024));
    }

    #[test]
    fn test_label_alloc_is_unbounded_by_default() {
        let config = Config::try_parse_from(["lane-seg", "/data/lanes"]).unwrap();
        assert_eq!(config.dataset_config().unwrap().max_label_alloc, None);
    }
}
