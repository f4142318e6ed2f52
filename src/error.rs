// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型 (Error taxonomy)

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// 摄像头索引无法打开 / 文件不存在
    #[error("source unavailable: {source_name} ({reason})")]
    SourceUnavailable { source_name: String, reason: String },

    /// 视频/图片容器无法解码, 或编码器不支持
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 模型加载或推理失败
    #[error("inference failure: {0}")]
    InferenceFailure(String),

    /// 输出路径无法打开或写入
    #[error("cannot write output {}: {reason}", path.display())]
    OutputWriteFailure { path: PathBuf, reason: String },

    /// 写入帧尺寸与打开时声明的分辨率不一致 (调用方错误)
    #[error("frame is {actual_width}x{actual_height}, writer expects {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn output_write(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::OutputWriteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 模型内部错误 (anyhow) 折叠为推理失败
    pub fn inference(err: anyhow::Error) -> Self {
        Error::InferenceFailure(format!("{err:#}"))
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for Error {
    fn from(err: opencv::Error) -> Self {
        Error::UnsupportedFormat(err.to_string())
    }
}
