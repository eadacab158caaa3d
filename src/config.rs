use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 子进程输出上限（约 200MB），超过后截断并上报
pub const MAX_BUF_SIZE: usize = 200_000 * 1024;

/// 历史记录默认上限
pub const HISTORY_MAX: usize = 15;

/// 收藏夹每个分区默认上限
pub const FAVOR_MAX: usize = 50;

/// 会话内最近查询回滚数量
pub const SCROLLBACK_MAX: usize = 10;

/// 链式搜索 (everything | rg) 允许的最大输入数量
pub const RG_LIMITS: usize = 50;

/// 内置二进制版本目录
pub const RG_VERSION: &str = "14_1_0";
pub const FD_VERSION: &str = "9_0_0";

/// 按平台区分的配置值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct PlatformValue<T> {
    pub windows: T,
    pub mac: T,
    pub linux: T,
}

impl<T: Clone> PlatformValue<T> {
    pub fn new(windows: T, mac: T, linux: T) -> Self {
        Self { windows, mac, linux }
    }

    pub fn same(value: T) -> Self {
        Self::new(value.clone(), value.clone(), value)
    }

    /// 取当前运行平台的值
    pub fn current(&self) -> &T {
        if cfg!(target_os = "windows") {
            &self.windows
        } else if cfg!(target_os = "macos") {
            &self.mac
        } else {
            &self.linux
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RgSettings {
    pub internal_enabled: bool,
    pub program: PlatformValue<String>,
    pub default_option: String,
    pub count: usize,
    pub exclude_patterns: Vec<String>,
    /// Custom 1..3 选项预设
    pub custom: Vec<String>,
    pub match_color_dark: String,
    pub match_color_light: String,
}

impl Default for RgSettings {
    fn default() -> Self {
        Self {
            internal_enabled: false,
            program: PlatformValue::new("rg.exe".into(), "rg".into(), "rg".into()),
            default_option: "--hidden -S".into(),
            count: 500,
            exclude_patterns: Vec::new(),
            custom: vec![
                "--hidden -S -w".into(),
                "--hidden -S -tjs -tts".into(),
                "--hidden -s".into(),
            ],
            match_color_dark: "#ffa500".into(),
            match_color_light: "#ff1b51".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FdSettings {
    pub internal_enabled: bool,
    pub program: PlatformValue<String>,
    pub default_option: String,
    /// `;` 分隔的搜索路径
    pub paths: PlatformValue<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for FdSettings {
    fn default() -> Self {
        Self {
            internal_enabled: false,
            program: PlatformValue::new("fd.exe".into(), "fd".into(), "fd".into()),
            default_option: "-H -s".into(),
            paths: PlatformValue::default(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Everything 过滤器预设
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EverythingFilter {
    pub query: String,
    pub regex: bool,
    pub fullpath: bool,
    pub in_workspace: bool,
    pub sort: String,
    pub ascending: bool,
    pub description: String,
    pub title: String,
    pub many: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EverythingSettings {
    pub host: String,
    pub port: u16,
    pub count: usize,
    pub limit_open_file: usize,
    pub exclude_patterns: Vec<String>,
    /// 非 Windows 平台上强制启用（连接远程 Everything 服务）
    pub force: bool,
    pub filters: BTreeMap<String, EverythingFilter>,
}

impl Default for EverythingSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3380,
            count: 500,
            limit_open_file: 100,
            exclude_patterns: Vec::new(),
            force: false,
            filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesSettings {
    pub path: PlatformValue<String>,
    pub categories: Vec<String>,
    pub max: Option<usize>,
}

impl FavoritesSettings {
    pub fn max(&self) -> usize {
        self.max.unwrap_or(FAVOR_MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub max: usize,
    pub path: Option<PathBuf>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max: HISTORY_MAX,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSettings {
    pub external_enabled: bool,
    pub external_program: String,
    pub external_option: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub timeout_ms: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub timeout_ms: u64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self { timeout_ms: 3_000 }
    }
}

/// 全部用户配置，缺失字段一律取默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rg: RgSettings,
    pub fd: FdSettings,
    pub everything: EverythingSettings,
    pub favorites: FavoritesSettings,
    pub history: HistorySettings,
    pub compare: CompareSettings,
    pub query: QuerySettings,
    pub notify: NotifySettings,
    /// 内置二进制所在根目录（其下为 bin/<版本>/<平台>/）
    pub extension_dir: Option<PathBuf>,
}

impl Settings {
    /// 读取配置文件；文件缺失或格式错误时回退到默认值
    pub fn load(path: Option<&Path>) -> Settings {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => settings_path(),
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("未读取到配置文件 {:?}: {}，使用默认配置", path, e);
                return Settings::default();
            }
        };
        match serde_json::from_str::<Settings>(&text) {
            Ok(settings) => {
                tracing::info!("已加载配置: {:?}", path);
                settings
            }
            Err(e) => {
                tracing::warn!("配置文件格式错误 {:?}: {}，使用默认配置", path, e);
                Settings::default()
            }
        }
    }

    /// 内置二进制根目录：配置优先，其次可执行文件所在目录
    pub fn extension_dir(&self) -> PathBuf {
        if let Some(dir) = &self.extension_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// 当前平台的 fd 搜索路径列表
    pub fn fd_paths(&self) -> Vec<String> {
        split_paths(self.fd.paths.current())
    }
}

/// 按 `;` 拆分路径列表，忽略空白项
pub fn split_paths(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 数据保存目录
pub fn data_dir() -> PathBuf {
    let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("findsuite");
    std::fs::create_dir_all(&p).ok();
    p
}

/// 默认配置文件位置
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("findsuite")
        .join("settings.json")
}

pub fn history_path(settings: &Settings) -> PathBuf {
    settings
        .history
        .path
        .clone()
        .unwrap_or_else(|| data_dir().join("history.json"))
}
