use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{FindError, Result};

/// 读取 JSON 文件。文件不存在返回 `Ok(None)`，无法读取或格式错误返回错误描述
pub fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<Option<T>, String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("无法读取 {:?}: {}", path, e)),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| format!("格式错误 {:?}: {}", path, e))
}

/// 先写临时文件再原子替换目标文件
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| FindError::fs(dir, e))?;

    let data = serde_json::to_string_pretty(value)
        .map_err(|e| FindError::fs(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| FindError::fs(dir, e))?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| FindError::fs(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| FindError::fs(path, e.error))?;
    tracing::debug!("已保存 {:?} ({} 字节)", path, data.len());
    Ok(())
}
