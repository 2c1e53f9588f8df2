use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 对外暴露的错误类型，序列化后即响应体里的 `type` 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "no_error")]
    #[allow(dead_code)]
    None,

    #[serde(rename = "serialization_error")]
    Serialization,

    #[serde(rename = "size_too_large_error")]
    SizeTooLarge,

    #[serde(rename = "unknown_data_format_error")]
    UnknownDataFormat,

    #[serde(rename = "other_error")]
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::None => "no_error",
            ErrorKind::Serialization => "serialization_error",
            ErrorKind::SizeTooLarge => "size_too_large_error",
            ErrorKind::UnknownDataFormat => "unknown_data_format_error",
            ErrorKind::Other => "other_error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("could not decode request body, failed with '{0}'")]
    Serialization(String),

    #[error("{0}")]
    SizeTooLarge(String),

    #[error("{0} may not be image")]
    UnknownDataFormat(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Serialization(_) => ErrorKind::Serialization,
            AppError::SizeTooLarge(_) => ErrorKind::SizeTooLarge,
            AppError::UnknownDataFormat(_) => ErrorKind::UnknownDataFormat,
            AppError::Other(_) => ErrorKind::Other,
        }
    }

    /// 超出大小限制，`limit` 为字节数，消息里按 MB 展示
    pub fn size_limit(limit: u64) -> Self {
        AppError::SizeTooLarge(format!(
            "{}mb is the limit of the acceptable image size",
            limit >> 20
        ))
    }

    pub fn other(err: impl std::fmt::Display) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Other(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
