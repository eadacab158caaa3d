use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::Range;

/// 一次文本搜索调用的参数，按命令变体克隆后覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub title: String,
    /// 为空时使用平台默认选项
    pub backend_options: String,
    /// 为空时搜索工作区根目录
    pub search_paths: Vec<String>,
    pub many_select: bool,
    pub replace_query_text: bool,
    pub skip_shell_quoting: bool,
    pub prompt_hint: Option<String>,
    /// 原样传递正则，不做转义
    pub raw_regex: bool,
}

impl SearchQuery {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.backend_options = options.into();
        self
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.prompt_hint = Some(hint.into());
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw_regex = true;
        self
    }

    pub fn resolved_options<'a>(&'a self, default: &'a str) -> &'a str {
        if self.backend_options.trim().is_empty() {
            default
        } else {
            &self.backend_options
        }
    }
}

/// 文本搜索的一条匹配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub file_path: String,
    /// 从 1 开始
    pub line_number: u64,
    pub column_start: usize,
    pub column_end: usize,
    pub matched_line_text: String,
    pub source_options: String,
}

impl MatchRecord {
    pub fn file_name(&self) -> String {
        base_name(&self.file_path)
    }

    pub fn label(&self) -> String {
        format!("{}:{}:{}", self.file_name(), self.line_number, self.column_start)
    }

    pub fn description(&self) -> String {
        normalize_path(&self.file_path)
    }

    pub fn detail(&self) -> String {
        self.matched_line_text.trim().to_string()
    }
}

/// rg summary 事件中的统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub matched_lines: u64,
    pub matches: u64,
    pub searches_with_match: u64,
    pub elapsed: String,
}

/// 一次文本搜索的解析结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub records: Vec<MatchRecord>,
    /// 命中文件数（begin 事件）
    pub total: usize,
    /// 匹配数（match 事件，受上限约束）
    pub matches: usize,
    pub capped: bool,
    pub truncated: bool,
    pub summary: Option<SearchSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Folder,
}

/// 文件名搜索 / 索引服务返回的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    /// 所在目录，不含文件名
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: Option<u64>,
    pub date_modified: Option<u64>,
}

impl IndexEntry {
    /// 由完整路径构造
    pub fn from_full_path(full: &str, entry_type: EntryType) -> Self {
        let trimmed = full.trim_end_matches(['/', '\\']);
        let trimmed = if trimmed.is_empty() { full } else { trimmed };
        let p = Path::new(trimmed);
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| trimmed.to_string());
        let path = p
            .parent()
            .map(|d| d.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name,
            path,
            entry_type,
            size: None,
            date_modified: None,
        }
    }

    pub fn full_path(&self) -> String {
        if self.path.is_empty() {
            return self.name.clone();
        }
        Path::new(&self.path)
            .join(&self.name)
            .to_string_lossy()
            .to_string()
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Folder
    }

    pub fn display_label(&self) -> String {
        match (self.entry_type, self.size) {
            (EntryType::File, Some(size)) => format!("{} ({})", self.name, format_size(size)),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub id: String,
    pub name: String,
    pub path: String,
    pub category: String,
    pub protect: bool,
}

/// 收藏文件的磁盘格式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesFile {
    pub files: Vec<FavoriteEntry>,
    pub directories: Vec<FavoriteEntry>,
    pub primary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub file_entries: Vec<MatchRecord>,
}

/// 选择列表中的一行
#[derive(Debug, Clone, PartialEq)]
pub enum ListEntry {
    File(MatchRecord),
    Path(IndexEntry),
    /// 文件分组分隔
    Separator(String),
    /// 会话回滚中的旧查询
    Recent(String),
    HistoryRow { rank: usize, entry: HistoryEntry },
    Favorite(FavoriteEntry),
    Problem(ProblemRow),
}

/// 诊断列表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemRow {
    pub file_path: String,
    pub range: Range,
    pub label: String,
    pub description: String,
}

impl ListEntry {
    pub fn label(&self) -> String {
        match self {
            ListEntry::File(r) => r.label(),
            ListEntry::Path(e) => e.display_label(),
            ListEntry::Separator(s) => s.clone(),
            ListEntry::Recent(q) => q.clone(),
            ListEntry::HistoryRow { rank, entry } => format!("{} {}", rank, entry.query),
            ListEntry::Favorite(f) => f.name.clone(),
            ListEntry::Problem(p) => p.label.clone(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            ListEntry::File(r) => r.description(),
            ListEntry::Path(e) => normalize_path(&e.full_path()),
            ListEntry::Separator(_) => String::new(),
            ListEntry::Recent(_) => "history".to_string(),
            ListEntry::HistoryRow { entry, .. } => entry
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            ListEntry::Favorite(f) => f.path.clone(),
            ListEntry::Problem(p) => p.description.clone(),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ListEntry::File(r) => r.detail(),
            ListEntry::HistoryRow { entry, .. } => format!("Results {}", entry.total),
            ListEntry::Favorite(f) if f.protect => "protected".to_string(),
            _ => String::new(),
        }
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, ListEntry::Separator(_))
    }

    /// 可作为打开/复制目标的路径
    pub fn target_path(&self) -> Option<String> {
        match self {
            ListEntry::File(r) => Some(r.file_path.clone()),
            ListEntry::Path(e) => Some(e.full_path()),
            ListEntry::Favorite(f) => Some(f.path.clone()),
            ListEntry::Problem(p) => Some(p.file_path.clone()),
            _ => None,
        }
    }
}

/// 把匹配列表按文件分组，组间插入分隔行
pub fn group_by_file(records: &[MatchRecord]) -> Vec<ListEntry> {
    let mut items = Vec::with_capacity(records.len());
    let mut current: Option<&str> = None;
    for record in records {
        if current != Some(record.file_path.as_str()) {
            if current.is_some() {
                items.push(ListEntry::Separator(record.description()));
            }
            current = Some(record.file_path.as_str());
        }
        items.push(ListEntry::File(record.clone()));
    }
    items
}

pub fn base_name(path: &str) -> String {
    let normalized = normalize_path(path);
    normalized
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(&normalized)
        .to_string()
}

/// 统一使用 `/` 作为分隔符
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
