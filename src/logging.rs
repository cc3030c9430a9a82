use std::path::{Path, PathBuf};

use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

use crate::errors::{LaneSegError, Result};

/// Log file name for a run started now.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(chrono::Local::now().format("%Y%m%d-%H%M%S").to_string() + ".log")
}

/// stderr at `level`, plus everything down to debug in a timestamped file when
/// `log_dir` is given.
pub fn build_log_config(level: LevelFilter, log_dir: Option<&Path>) -> Result<Config> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l})} {m}{n}")))
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(level)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");
    let mut root_level = level;

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir).map_err(|e| LaneSegError::FileSystem {
            path: dir.to_path_buf(),
            operation: "create log directory".to_string(),
            source: e,
        })?;
        let path = log_file_path(dir);
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%+)(utc)} [{f}:{L}] {h({l})} -> {m}{n}",
            )))
            .build(&path)
            .map_err(|e| LaneSegError::FileSystem {
                path,
                operation: "open log file".to_string(),
                source: e,
            })?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
        root_level = root_level.max(LevelFilter::Debug);
    }

    builder
        .build(root.build(root_level))
        .map_err(|e| LaneSegError::Configuration {
            message: format!("invalid log configuration: {e}"),
        })
}
