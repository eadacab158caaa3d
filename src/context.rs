use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, Settings};
use crate::controller::{FileSource, IndexSource, TextSource};
use crate::decoration::{SelectionManager, ThemeColors, ThemeKind};
use crate::diff::{DiffDispatcher, DiffKind, DiffLauncher};
use crate::error::{FindError, Result};
use crate::everything::IndexSearchClient;
use crate::fd::{FdMode, FdSearch};
use crate::favorites::FavoritesStore;
use crate::history::HistoryStore;
use crate::host::{Clipboard, DiffView, EditorHost, Notifier};
use crate::problem::ProblemNavigator;
use crate::ripgrep::{RgSearch, SearchVariant};
use crate::types::SearchQuery;

/// 启动时构造、之后只读的共享上下文
pub struct AppContext {
    pub settings: Settings,
    pub workspace: Vec<String>,
    pub rg: Arc<RgSearch>,
    pub fd: Arc<FdSearch>,
    /// 只在 Windows（或 everything.force）上可用
    pub everything: Option<Arc<IndexSearchClient>>,
}

impl AppContext {
    pub fn new(settings: Settings, workspace: Vec<String>) -> Self {
        let rg = Arc::new(RgSearch::new(&settings, &workspace));
        let fd = Arc::new(FdSearch::new(&settings, &workspace));
        let everything = IndexSearchClient::for_platform(&settings, &workspace).map(Arc::new);
        tracing::info!(
            "rg: {}, fd: {}, Everything: {}",
            rg.runner().program().program,
            fd.runner().program().program,
            if everything.is_some() { "可用" } else { "不可用" }
        );
        Self {
            settings,
            workspace,
            rg,
            fd,
            everything,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.query.timeout_ms)
    }

    pub fn variant_query(&self, variant: &SearchVariant) -> SearchQuery {
        variant.query(&self.settings, &self.workspace)
    }

    pub fn text_source(&self, query: SearchQuery) -> TextSource {
        TextSource::new(Arc::clone(&self.rg), query)
    }

    pub fn file_source(&self, mode: FdMode) -> FileSource {
        FileSource::new(Arc::clone(&self.fd), mode)
    }

    pub fn index_client(&self) -> Result<&Arc<IndexSearchClient>> {
        self.everything
            .as_ref()
            .ok_or_else(|| FindError::BackendUnavailable {
                program: "Everything".into(),
                reason: "仅支持 Windows，可设置 everything.force 强制启用".into(),
            })
    }

    pub fn index_source(&self, filter: &str, arg: Option<&str>) -> Result<IndexSource> {
        let client = self.index_client()?;
        let filter = client.filter(filter, arg)?;
        Ok(IndexSource::new(Arc::clone(client), filter))
    }
}

/// 会话之间共享的可变组件，由控制器借用
pub struct Workbench {
    pub selection: SelectionManager,
    pub favorites: FavoritesStore,
    pub history: HistoryStore,
    pub clipboard: Box<dyn Clipboard>,
    pub notifier: Box<dyn Notifier>,
    pub diff: DiffDispatcher,
    pub problems: ProblemNavigator,
    notify_timeout: Duration,
    diff_marks: Vec<(String, DiffKind)>,
}

/// 宿主相关的协作者
pub struct HostParts {
    pub editor: Box<dyn EditorHost>,
    pub clipboard: Box<dyn Clipboard>,
    pub notifier: Box<dyn Notifier>,
    pub diff_view: Box<dyn DiffView>,
    pub launcher: Box<dyn DiffLauncher>,
    pub theme: ThemeKind,
}

impl Workbench {
    pub fn new(favorites: FavoritesStore, history: HistoryStore, settings: &Settings, host: HostParts) -> Self {
        Self {
            selection: SelectionManager::new(
                host.editor,
                ThemeColors::from_settings(&settings.rg),
                host.theme,
            ),
            favorites,
            history,
            clipboard: host.clipboard,
            notifier: host.notifier,
            diff: DiffDispatcher::new(settings.compare.clone(), host.diff_view, host.launcher),
            problems: ProblemNavigator::new(),
            notify_timeout: Duration::from_millis(settings.notify.timeout_ms),
            diff_marks: Vec::new(),
        }
    }

    /// 按配置打开收藏和历史文件
    pub fn open(settings: &Settings, host: HostParts) -> Result<Self> {
        let favorites = FavoritesStore::from_settings(settings)?;
        let history = HistoryStore::open(config::history_path(settings), settings.history.max);
        Ok(Self::new(favorites, history, settings, host))
    }

    pub fn notify(&self, message: &str) {
        self.notifier.notify(message, self.notify_timeout);
    }

    /// 非致命错误以定时通知呈现，致命错误（持久化失败）以错误呈现
    pub fn report(&self, error: &FindError) {
        if error.is_fatal() {
            self.notifier.error(&error.to_string());
        } else {
            tracing::warn!("{}", error);
            self.notify(&error.to_string());
        }
    }

    /// 标记待比较的路径。凑满两项时取出并清空标记，只要有一项是目录就按目录比较
    pub fn mark_for_diff(&mut self, path: &str, kind: DiffKind) -> Option<(Vec<String>, DiffKind)> {
        self.diff_marks.push((path.to_string(), kind));
        if self.diff_marks.len() < 2 {
            return None;
        }
        let marks = std::mem::take(&mut self.diff_marks);
        let kind = if marks.iter().any(|(_, k)| *k == DiffKind::Directory) {
            DiffKind::Directory
        } else {
            DiffKind::File
        };
        Some((marks.into_iter().map(|(p, _)| p).collect(), kind))
    }
}
