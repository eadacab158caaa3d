//! 增量搜索控制器：每次输入变化发起一次查询，完成后整体替换列表。
//!
//! 旧查询不会被取消，只按代号丢弃过期结果；超时只放弃等待，不结束子进程。

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{EverythingFilter, SCROLLBACK_MAX};
use crate::context::Workbench;
use crate::decoration::RevealTarget;
use crate::diff::DiffKind;
use crate::error::{FindError, Result};
use crate::everything::IndexSearchClient;
use crate::fd::{FdMode, FdSearch};
use crate::picker::{filter_entries, PickerView};
use crate::ripgrep::RgSearch;
use crate::types::{group_by_file, ListEntry, SearchOutcome, SearchQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Typing,
    Querying,
    Displaying,
    Accepted,
    Cancelled,
}

/// 条目上的按钮
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemButton {
    /// 只打开，不定位
    View,
    CopyPath,
    /// 追加到剪贴板已有内容之后
    AppendPath,
    Favorite,
    Diff,
    Remove,
    Protect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent {
    ChangeValue(String),
    ChangeActive(usize),
    /// 选中的行号，多选时可以有多个
    Accept(Vec<usize>),
    TriggerButton { index: usize, button: ItemButton },
    Hide,
}

/// 一次查询的结果
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub entries: Vec<ListEntry>,
    pub title: String,
    pub outcome: Option<SearchOutcome>,
}

pub type QueryFuture = Pin<Box<dyn Future<Output = Result<Listing>> + Send>>;

/// 查询来源。返回的 future 不借用 self，可以放到后台任务中执行
pub trait QuerySource: Send + Sync {
    fn name(&self) -> String;
    fn query(&self, value: &str) -> QueryFuture;

    fn many_select(&self) -> bool {
        false
    }

    /// 完成的查询是否写入搜索历史
    fn records_history(&self) -> bool {
        false
    }

    /// 固定列表在条目删除后用存储中的最新行替换
    fn replace_rows(&self, _rows: Vec<ListEntry>) {}
}

pub fn text_title(title: &str, value: &str, outcome: &SearchOutcome) -> String {
    format!(
        "RipGrep: {} <{}> :: Results <{} / {}>",
        title, value, outcome.matches, outcome.total
    )
}

pub fn index_title(title: &str, value: &str, count: usize) -> String {
    format!("Everything: {} <{}> :: Results <{}>", title, value, count)
}

/// rg 文本搜索
pub struct TextSource {
    rg: Arc<RgSearch>,
    query: SearchQuery,
}

impl TextSource {
    pub fn new(rg: Arc<RgSearch>, query: SearchQuery) -> Self {
        Self { rg, query }
    }
}

impl QuerySource for TextSource {
    fn name(&self) -> String {
        format!("RipGrep: {}", self.query.title)
    }

    fn query(&self, value: &str) -> QueryFuture {
        let rg = Arc::clone(&self.rg);
        let query = self.query.clone();
        let value = value.to_string();
        Box::pin(async move {
            let outcome = rg.search(&value, &query).await?;
            Ok(Listing {
                entries: group_by_file(&outcome.records),
                title: text_title(&query.title, &value, &outcome),
                outcome: Some(outcome),
            })
        })
    }

    fn many_select(&self) -> bool {
        self.query.many_select
    }

    fn records_history(&self) -> bool {
        true
    }
}

/// Everything 索引搜索
pub struct IndexSource {
    client: Arc<IndexSearchClient>,
    filter: EverythingFilter,
}

impl IndexSource {
    pub fn new(client: Arc<IndexSearchClient>, filter: EverythingFilter) -> Self {
        Self { client, filter }
    }
}

impl QuerySource for IndexSource {
    fn name(&self) -> String {
        format!("Everything: {}", self.filter.title)
    }

    fn query(&self, value: &str) -> QueryFuture {
        let client = Arc::clone(&self.client);
        let filter = self.filter.clone();
        let value = value.to_string();
        Box::pin(async move {
            let entries = client.search(&filter, &value).await?;
            Ok(Listing {
                title: index_title(&filter.title, &value, entries.len()),
                entries: entries.into_iter().map(ListEntry::Path).collect(),
                outcome: None,
            })
        })
    }

    fn many_select(&self) -> bool {
        self.filter.many
    }
}

/// fd 文件名搜索
pub struct FileSource {
    fd: Arc<FdSearch>,
    mode: FdMode,
    many: bool,
}

impl FileSource {
    pub fn new(fd: Arc<FdSearch>, mode: FdMode) -> Self {
        Self {
            fd,
            mode,
            many: false,
        }
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }
}

impl QuerySource for FileSource {
    fn name(&self) -> String {
        format!("Fd: {}", self.mode.title())
    }

    fn query(&self, value: &str) -> QueryFuture {
        let fd = Arc::clone(&self.fd);
        let mode = self.mode.clone();
        let value = value.to_string();
        Box::pin(async move {
            let entries = fd.search(&value, &mode).await?;
            Ok(Listing {
                title: format!("Fd: {} <{}> :: Results <{}>", mode.title(), value, entries.len()),
                entries: entries.into_iter().map(ListEntry::Path).collect(),
                outcome: None,
            })
        })
    }

    fn many_select(&self) -> bool {
        self.many
    }
}

/// 固定列表（收藏、历史、诊断），输入只做本地过滤
pub struct StaticSource {
    title: String,
    entries: Mutex<Vec<ListEntry>>,
}

impl StaticSource {
    pub fn new(title: impl Into<String>, entries: Vec<ListEntry>) -> Self {
        Self {
            title: title.into(),
            entries: Mutex::new(entries),
        }
    }
}

impl QuerySource for StaticSource {
    fn name(&self) -> String {
        self.title.clone()
    }

    fn query(&self, value: &str) -> QueryFuture {
        let entries = {
            let rows = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            filter_entries(&rows, value)
        };
        let title = format!("{} :: <{}>", self.title, entries.len());
        Box::pin(async move {
            Ok(Listing {
                entries,
                title,
                outcome: None,
            })
        })
    }

    fn replace_rows(&self, rows: Vec<ListEntry>) {
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = rows;
    }
}

/// 会话内最近提交的查询，去重，新的在前
#[derive(Debug, Clone, Default)]
pub struct Scrollback {
    items: VecDeque<String>,
}

impl Scrollback {
    pub fn push(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        self.items.retain(|q| q != query);
        self.items.push_front(query.to_string());
        self.items.truncate(SCROLLBACK_MAX);
    }

    pub fn rows(&self) -> Vec<ListEntry> {
        self.items.iter().cloned().map(ListEntry::Recent).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 需要执行的查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTicket {
    pub generation: u64,
    pub value: String,
}

#[derive(Debug)]
pub enum Completion {
    Applied,
    /// 已有更新的结果显示，丢弃
    Stale,
    Failed(FindError),
}

/// 会话状态机，不涉及 IO
#[derive(Debug)]
pub struct SearchSession {
    state: SessionState,
    value: String,
    issued: u64,
    displayed: u64,
    /// 未完成查询的代号和输入值
    pending: BTreeMap<u64, String>,
    /// 当前列表对应的查询
    shown_value: String,
    entries: Vec<ListEntry>,
    title: String,
    outcome: Option<SearchOutcome>,
    scrollback: Scrollback,
}

impl SearchSession {
    pub fn new(title: impl Into<String>, scrollback: Scrollback) -> Self {
        Self {
            state: SessionState::Idle,
            value: String::new(),
            issued: 0,
            displayed: 0,
            pending: BTreeMap::new(),
            shown_value: String::new(),
            entries: scrollback.rows(),
            title: title.into(),
            outcome: None,
            scrollback,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// 产生当前列表的查询，可能落后于输入框
    pub fn shown_value(&self) -> &str {
        &self.shown_value
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn outcome(&self) -> Option<&SearchOutcome> {
        self.outcome.as_ref()
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    pub fn displayed_generation(&self) -> u64 {
        self.displayed
    }

    fn issue(&mut self, value: String) -> QueryTicket {
        self.issued += 1;
        self.value = value.clone();
        self.pending.insert(self.issued, value.clone());
        self.state = SessionState::Querying;
        QueryTicket {
            generation: self.issued,
            value,
        }
    }

    /// 丢弃所有未完成查询的结果
    fn supersede(&mut self) {
        self.displayed = self.issued;
        self.pending.clear();
    }

    /// 输入变化。非空时返回要执行的查询；为空时显示最近的查询
    pub fn change_value(&mut self, value: &str) -> Option<QueryTicket> {
        if matches!(self.state, SessionState::Accepted | SessionState::Cancelled) {
            return None;
        }
        self.state = SessionState::Typing;
        if value.trim().is_empty() {
            self.supersede();
            self.value.clear();
            self.shown_value.clear();
            self.outcome = None;
            self.entries = self.scrollback.rows();
            return None;
        }
        Some(self.issue(value.to_string()))
    }

    /// 查询完成：只接受比当前显示更新的结果，并整体替换列表
    pub fn complete(&mut self, generation: u64, result: Result<Listing>) -> Completion {
        if generation <= self.displayed || self.state == SessionState::Cancelled {
            tracing::debug!("丢弃过期结果 #{} (当前 #{})", generation, self.displayed);
            return Completion::Stale;
        }
        self.displayed = generation;
        let value = self.pending.remove(&generation).unwrap_or_default();
        self.pending.retain(|g, _| *g > generation);
        if generation == self.issued && self.state == SessionState::Querying {
            self.state = SessionState::Displaying;
        }
        match result {
            Ok(listing) => {
                self.shown_value = value;
                self.entries = listing.entries;
                self.title = listing.title;
                self.outcome = listing.outcome;
                Completion::Applied
            }
            Err(e) => {
                self.entries.clear();
                self.outcome = None;
                Completion::Failed(e)
            }
        }
    }

    pub fn entry(&self, index: usize) -> Option<&ListEntry> {
        self.entries.get(index).filter(|e| !e.is_separator())
    }

    /// 用新内容替换列表（历史详情）
    pub fn show(&mut self, title: String, entries: Vec<ListEntry>) {
        self.supersede();
        self.outcome = None;
        self.title = title;
        self.entries = entries;
        self.state = SessionState::Displaying;
    }

    /// 删除条目后刷新列表，保持当前输入的过滤
    pub fn replace_entries(&mut self, entries: Vec<ListEntry>) {
        self.entries = entries;
    }

    /// 选中最近的查询时用它替换输入并重新查询
    pub fn recall(&mut self, query: &str) -> QueryTicket {
        self.issue(query.to_string())
    }

    pub fn accept(&mut self) {
        let value = self.value.clone();
        self.scrollback.push(&value);
        self.state = SessionState::Accepted;
    }

    pub fn cancel(&mut self) {
        self.state = SessionState::Cancelled;
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Accepted | SessionState::Cancelled)
    }
}

/// 会话结束时交给调用方的结果
#[derive(Debug, Clone)]
pub struct SessionEnd {
    pub state: SessionState,
    pub value: String,
    pub selected: Vec<ListEntry>,
    pub scrollback: Scrollback,
}

/// 事件处理后的下一步
#[derive(Debug)]
pub enum Step {
    Continue,
    Query(QueryTicket),
    Finished(Vec<ListEntry>),
}

/// 把选择列表事件分派给会话状态机和各个组件
pub struct PickerController<'a> {
    bench: &'a mut Workbench,
    source: Arc<dyn QuerySource>,
    session: SearchSession,
    timeout: Duration,
}

impl<'a> PickerController<'a> {
    pub fn new(bench: &'a mut Workbench, source: Arc<dyn QuerySource>, scrollback: Scrollback, timeout: Duration) -> Self {
        let session = SearchSession::new(source.name(), scrollback);
        Self {
            bench,
            source,
            session,
            timeout,
        }
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn bench(&mut self) -> &mut Workbench {
        self.bench
    }

    fn render(&self, view: &mut dyn PickerView) {
        view.set_title(self.session.title());
        view.set_items(self.session.entries());
    }

    pub fn handle(&mut self, event: PickerEvent, view: &mut dyn PickerView) -> Step {
        match event {
            PickerEvent::ChangeValue(value) => match self.session.change_value(&value) {
                Some(ticket) => {
                    view.set_busy(true);
                    Step::Query(ticket)
                }
                None => {
                    view.set_busy(false);
                    self.render(view);
                    Step::Continue
                }
            },
            PickerEvent::ChangeActive(index) => {
                self.preview(index);
                Step::Continue
            }
            PickerEvent::Accept(indices) => self.accept(&indices, view),
            PickerEvent::TriggerButton { index, button } => {
                if let Err(e) = self.trigger(index, button, view) {
                    self.bench.report(&e);
                }
                Step::Continue
            }
            PickerEvent::Hide => {
                self.bench.selection.clear();
                self.session.cancel();
                Step::Finished(Vec::new())
            }
        }
    }

    /// 后台查询完成
    pub fn complete(&mut self, generation: u64, result: Result<Listing>, view: &mut dyn PickerView) {
        match self.session.complete(generation, result) {
            Completion::Stale => return,
            Completion::Applied => {
                if let Some(outcome) = self.session.outcome() {
                    if outcome.truncated {
                        self.bench.notify("输出超过缓冲上限，结果已截断");
                    }
                }
                if self.source.records_history() {
                    self.record_history();
                }
            }
            Completion::Failed(e) => self.bench.report(&e),
        }
        if self.session.state() != SessionState::Querying {
            view.set_busy(false);
        }
        self.render(view);
    }

    fn record_history(&mut self) {
        let Some(outcome) = self.session.outcome() else {
            return;
        };
        let records = outcome.records.clone();
        let total = outcome.total;
        let value = self.session.shown_value().to_string();
        if let Err(e) = self.bench.history.record(&value, records, total) {
            self.bench.report(&e);
        }
    }

    fn preview(&mut self, index: usize) {
        let target = match self.session.entry(index) {
            Some(ListEntry::File(r)) => RevealTarget::from(r),
            Some(ListEntry::Problem(p)) => RevealTarget::from(p),
            _ => return,
        };
        if let Err(e) = self.bench.selection.preview(&target) {
            self.bench.report(&e);
        }
    }

    fn accept(&mut self, indices: &[usize], view: &mut dyn PickerView) -> Step {
        let selected: Vec<ListEntry> = indices
            .iter()
            .filter_map(|i| self.session.entry(*i).cloned())
            .collect();
        if selected.is_empty() {
            return Step::Continue;
        }

        if let [single] = selected.as_slice() {
            match single {
                ListEntry::Recent(query) => {
                    view.set_value(query);
                    view.set_busy(true);
                    return Step::Query(self.session.recall(query));
                }
                ListEntry::HistoryRow { entry, .. } => {
                    let title = format!("History Details :: <{}>", entry.total);
                    self.session.show(title, group_by_file(&entry.file_entries));
                    self.render(view);
                    return Step::Continue;
                }
                _ => {}
            }
        }

        self.session.accept();
        if !self.source.many_select() {
            if let Some(entry) = selected.first() {
                if let Err(e) = self.open(entry) {
                    self.bench.report(&e);
                }
            }
        }
        Step::Finished(selected)
    }

    fn open(&mut self, entry: &ListEntry) -> Result<()> {
        match entry {
            ListEntry::File(r) => {
                self.bench.selection.open_and_reveal(&RevealTarget::from(r), None)?;
            }
            ListEntry::Problem(p) => {
                self.bench.selection.open_and_reveal(&RevealTarget::from(p), None)?;
            }
            ListEntry::Path(e) if !e.is_dir() => {
                self.bench.selection.view(Path::new(&e.full_path()))?;
            }
            ListEntry::Favorite(f) => {
                self.bench.selection.view(Path::new(&f.path))?;
            }
            _ => self.bench.selection.clear(),
        }
        Ok(())
    }

    fn trigger(&mut self, index: usize, button: ItemButton, view: &mut dyn PickerView) -> Result<()> {
        let entry = self
            .session
            .entry(index)
            .cloned()
            .ok_or_else(|| FindError::Validation(format!("没有第 {} 项", index)))?;
        match button {
            ItemButton::View => {
                let path = entry
                    .target_path()
                    .ok_or_else(|| FindError::Validation("该项没有可打开的路径".into()))?;
                self.bench.selection.view(Path::new(&path))?;
            }
            ItemButton::CopyPath => {
                let path = entry
                    .target_path()
                    .ok_or_else(|| FindError::Validation("该项没有路径".into()))?;
                self.bench.clipboard.write_text(&path)?;
                self.bench.notify(&format!("已复制 {}", path));
            }
            ItemButton::AppendPath => {
                let path = entry
                    .target_path()
                    .ok_or_else(|| FindError::Validation("该项没有路径".into()))?;
                let existing = self.bench.clipboard.read_text().unwrap_or_default();
                let text = if existing.trim().is_empty() {
                    path.clone()
                } else {
                    format!("{}\n{}", existing.trim_end(), path)
                };
                self.bench.clipboard.write_text(&text)?;
                self.bench.notify(&format!("已追加 {}", path));
            }
            ItemButton::Favorite => {
                let path = entry
                    .target_path()
                    .ok_or_else(|| FindError::Validation("该项没有路径".into()))?;
                if self.bench.favorites.add(Path::new(&path))? {
                    self.bench.notify(&format!("已收藏 {}", path));
                } else {
                    self.bench.notify(&format!("{} 已在收藏中或无法访问", path));
                }
            }
            ItemButton::Diff => {
                let path = entry
                    .target_path()
                    .ok_or_else(|| FindError::Validation("该项没有路径".into()))?;
                let kind = match &entry {
                    ListEntry::Path(e) if e.is_dir() => DiffKind::Directory,
                    ListEntry::Favorite(f) if Path::new(&f.path).is_dir() => DiffKind::Directory,
                    _ => DiffKind::File,
                };
                match self.bench.mark_for_diff(&path, kind) {
                    Some((marked, kind)) => {
                        self.bench.diff.diff_pair(&marked, kind)?;
                    }
                    None => self.bench.notify(&format!("已标记 {}，请再选择一项进行比较", path)),
                }
            }
            ItemButton::Remove => {
                let rows = match &entry {
                    ListEntry::Favorite(f) => {
                        self.bench.favorites.remove(&f.id)?;
                        self.bench.favorites.rows()
                    }
                    ListEntry::HistoryRow { entry: h, .. } => {
                        self.bench.history.remove(&h.id)?;
                        self.bench.history.rows()
                    }
                    _ => return Err(FindError::Validation("该项不能删除".into())),
                };
                let visible = filter_entries(&rows, self.session.value());
                self.session.replace_entries(visible);
                self.source.replace_rows(rows);
                self.render(view);
            }
            ItemButton::Protect => {
                let ListEntry::Favorite(f) = &entry else {
                    return Err(FindError::Validation("只有收藏项可以保护".into()));
                };
                let protect = self.bench.favorites.toggle_protect(&f.id)?;
                self.bench.notify(&format!(
                    "{} {}",
                    f.name,
                    if protect { "已保护" } else { "已取消保护" }
                ));
            }
        }
        Ok(())
    }

    fn spawn(&self, ticket: QueryTicket, tx: mpsc::UnboundedSender<(u64, Result<Listing>)>) {
        let fut = self.source.query(&ticket.value);
        let timeout = self.timeout;
        tracing::debug!("查询 #{}: <{}>", ticket.generation, ticket.value);
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, fut).await {
                Ok(r) => r,
                Err(_) => Err(FindError::Timeout(timeout.as_millis() as u64)),
            };
            let _ = tx.send((ticket.generation, result));
        });
    }

    /// 驱动会话直到接受或取消。事件流结束视为取消
    pub async fn run(
        mut self,
        view: &mut dyn PickerView,
        mut events: mpsc::UnboundedReceiver<PickerEvent>,
        initial: Option<String>,
    ) -> SessionEnd {
        let (tx, mut done) = mpsc::unbounded_channel();
        self.render(view);

        if let Some(value) = initial.filter(|v| !v.trim().is_empty()) {
            view.set_value(&value);
            if let Step::Query(ticket) = self.handle(PickerEvent::ChangeValue(value), view) {
                self.spawn(ticket, tx.clone());
            }
        }

        let selected = loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        self.bench.selection.clear();
                        self.session.cancel();
                        break Vec::new();
                    };
                    match self.handle(event, view) {
                        Step::Continue => {}
                        Step::Query(ticket) => self.spawn(ticket, tx.clone()),
                        Step::Finished(selected) => break selected,
                    }
                }
                Some((generation, result)) = done.recv() => {
                    self.complete(generation, result, view);
                }
            }
        };

        SessionEnd {
            state: self.session.state(),
            value: self.session.value().to_string(),
            selected,
            scrollback: self.session.scrollback().clone(),
        }
    }
}
