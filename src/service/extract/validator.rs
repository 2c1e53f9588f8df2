use std::io::{ErrorKind as IoErrorKind, Read};
use crate::error::{AppError, AppResult};

/// 嗅探类型所需的前缀长度
pub const SNIFF_LEN: u64 = 512;

/// 分段读取图片，最多读 `max_size + 1` 字节
///
/// 1. 读前 512 字节（不足也可以）做魔数嗅探，不是 image/* 直接拒绝
/// 2. 继续读剩余的 `max_size - 512` 字节
/// 3. 再试读 1 字节，读得到说明超过上限
///
/// 不依赖对方声明的 Content-Length。
pub fn read_bounded<R: Read>(mut reader: R, max_size: u64) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    let head_len = SNIFF_LEN.min(max_size);

    (&mut reader).take(head_len).read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Err(AppError::Other("image data is empty".to_string()));
    }

    let content_type = sniff(&buf);
    if !content_type.starts_with("image/") {
        return Err(AppError::UnknownDataFormat(content_type));
    }

    if let Err(e) = (&mut reader).take(max_size - head_len).read_to_end(&mut buf) {
        // base64 之类的内容错误不算超限
        if e.kind() == IoErrorKind::InvalidData {
            return Err(AppError::from(e));
        }
        return Err(AppError::SizeTooLarge(format!(
            "{} {}mb is the limit of the acceptable image size",
            e,
            max_size >> 20
        )));
    }

    let mut probe = [0u8; 1];
    loop {
        match reader.read(&mut probe) {
            Ok(0) => break,
            Ok(_) => return Err(AppError::size_limit(max_size)),
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    Ok(buf)
}

/// 按魔数判断内容类型，识别不了的按文本 / 二进制区分
pub fn sniff(head: &[u8]) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    match std::str::from_utf8(head) {
        Ok(_) => "text/plain; charset=utf-8".to_string(),
        // 截断在多字节字符中间也算文本
        Err(e) if e.error_len().is_none() => "text/plain; charset=utf-8".to_string(),
        Err(_) => "application/octet-stream".to_string(),
    }
}
