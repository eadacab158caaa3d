use std::path::{Path, PathBuf};

use thiserror::Error;

/// 响应摘录最大长度（字符）
const EXCERPT_MAX_CHARS: usize = 200;

/// 搜索前端的错误分类
#[derive(Debug, Error)]
pub enum FindError {
    /// 后端程序不存在或不可执行
    #[error("{program} 不可用: {reason}")]
    BackendUnavailable { program: String, reason: String },

    /// 子进程 stderr 非空
    #[error("{program} 执行出错: {stderr}")]
    BackendExecution { program: String, stderr: String },

    #[error("响应解析失败, 数据片段: {excerpt}")]
    MalformedResponse { excerpt: String },

    #[error("请输入搜索内容")]
    UserInputEmpty,

    #[error("{0}")]
    Validation(String),

    #[error("输入文件数量 <{count}> 超过上限 <{limit}>")]
    CapacityExceeded { count: usize, limit: usize },

    /// 收藏/历史文件读写失败
    #[error("文件读写失败 {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP 请求失败: {0}")]
    Http(String),

    #[error("查询超时 ({0} ms)")]
    Timeout(u64),

    /// 编辑器/剪贴板等宿主能力调用失败
    #[error("宿主操作失败: {0}")]
    Host(String),
}

pub type Result<T> = std::result::Result<T, FindError>;

impl FindError {
    /// 截断响应体，生成 MalformedResponse
    pub fn malformed(body: &str) -> Self {
        let excerpt = if body.chars().count() > EXCERPT_MAX_CHARS {
            let head: String = body.chars().take(EXCERPT_MAX_CHARS).collect();
            format!("{}...", head)
        } else {
            body.to_string()
        };
        FindError::MalformedResponse { excerpt }
    }

    pub fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        FindError::FileSystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// 只有持久化写入失败会终止当前操作链，其余错误都以通知形式呈现
    pub fn is_fatal(&self) -> bool {
        matches!(self, FindError::FileSystem { .. })
    }
}

impl From<reqwest::Error> for FindError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FindError::Http(format!("连接超时: {}", e))
        } else {
            FindError::Http(e.to_string())
        }
    }
}
