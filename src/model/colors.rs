use serde::{Deserialize, Deserializer, Serialize};
use crate::error::{AppError, ErrorKind};
use crate::util::hash::digest_fields;

/// 图片的获取方式
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadType {
    #[serde(rename = "url")]
    Url,

    #[serde(rename = "base64")]
    Base64,

    #[serde(rename = "file-upload")]
    FileUpload,

    // 未知类型在解码阶段不报错，留到解析图片来源时以 other_error 拒绝
    #[serde(untagged)]
    Unknown(String),
}

impl UploadType {
    pub fn as_str(&self) -> &str {
        match self {
            UploadType::Url => "url",
            UploadType::Base64 => "base64",
            UploadType::FileUpload => "file-upload",
            UploadType::Unknown(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for UploadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColorsRequest {
    #[serde(rename = "type")]
    pub upload_type: UploadType,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "num_prominent_colors", default, deserialize_with = "null_as_zero")]
    pub prominent_colors: usize,
}

// null 与缺省一样按 0 处理
fn null_as_zero<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<usize>::deserialize(deserializer)?.unwrap_or_default())
}

impl ColorsRequest {
    /// 只解码第一个 JSON 对象，之后的多余字节忽略
    pub fn from_body(raw: &[u8]) -> serde_json::Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_slice(raw);
        Self::deserialize(&mut deserializer)
    }

    /// 0 或超过上限时直接取上限，不报错
    pub fn normalize(&mut self, max_colors: usize) {
        if self.prominent_colors == 0 || self.prominent_colors > max_colors {
            self.prominent_colors = max_colors;
        }
    }

    /// 结果缓存的键，应在 normalize 之后计算
    pub fn fingerprint(&self) -> String {
        digest_fields(&[
            self.upload_type.as_str().as_bytes(),
            self.value.as_bytes(),
            &(self.prominent_colors as u64).to_be_bytes(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "msg")]
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorsResponse {
    pub prominent_colors: Option<Vec<String>>,
    pub error: Option<ErrorBody>,
}

impl ColorsResponse {
    pub fn colors(colors: Vec<String>) -> Self {
        Self {
            prominent_colors: Some(colors),
            error: None,
        }
    }

    pub fn failed(err: &AppError) -> Self {
        Self {
            prominent_colors: None,
            error: Some(err.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Result<Vec<String>, AppError>> for ColorsResponse {
    fn from(result: Result<Vec<String>, AppError>) -> Self {
        match result {
            Ok(colors) => ColorsResponse::colors(colors),
            Err(e) => ColorsResponse::failed(&e),
        }
    }
}
