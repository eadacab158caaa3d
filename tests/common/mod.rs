#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use findsuite::config::Settings;
use findsuite::context::{HostParts, Workbench};
use findsuite::controller::{Listing, QueryFuture, QuerySource};
use findsuite::decoration::ThemeKind;
use findsuite::diff::DiffLauncher;
use findsuite::error::Result;
use findsuite::favorites::FavoritesStore;
use findsuite::history::HistoryStore;
use findsuite::host::{
    Clipboard, DecorationId, DiffView, DocumentId, EditorHost, HostCommand, Notifier, Range, RevealMode,
    ShowOptions, ViewId,
};
use findsuite::picker::PickerView;
use findsuite::types::{group_by_file, ListEntry, MatchRecord, SearchOutcome};

#[derive(Default)]
pub struct EditorState {
    pub documents: HashMap<PathBuf, DocumentId>,
    pub opened: Vec<PathBuf>,
    pub active: Option<(ViewId, PathBuf)>,
    pub selection: Option<Range>,
    pub revealed: Vec<Range>,
    /// 每个高亮句柄当前覆盖的区间
    pub decorations: HashMap<DecorationId, Vec<Range>>,
    pub disposed: HashSet<DecorationId>,
    pub commands: Vec<HostCommand>,
    next: u64,
}

impl EditorState {
    /// 未释放且非空的高亮数量
    pub fn live_highlights(&self) -> usize {
        self.decorations
            .iter()
            .filter(|(id, ranges)| !self.disposed.contains(id) && !ranges.is_empty())
            .count()
    }
}

#[derive(Clone, Default)]
pub struct FakeEditor(pub Rc<RefCell<EditorState>>);

impl EditorHost for FakeEditor {
    fn open_document(&mut self, path: &Path) -> Result<DocumentId> {
        let mut s = self.0.borrow_mut();
        if let Some(id) = s.documents.get(path) {
            return Ok(*id);
        }
        s.next += 1;
        let id = DocumentId(s.next);
        s.documents.insert(path.to_path_buf(), id);
        s.opened.push(path.to_path_buf());
        Ok(id)
    }

    fn show_document(&mut self, doc: DocumentId, _options: ShowOptions) -> Result<ViewId> {
        let mut s = self.0.borrow_mut();
        let path = s
            .documents
            .iter()
            .find(|(_, id)| **id == doc)
            .map(|(p, _)| p.clone())
            .unwrap_or_default();
        let view = ViewId(doc.0);
        s.active = Some((view, path));
        Ok(view)
    }

    fn set_selection(&mut self, _view: ViewId, range: Range) {
        self.0.borrow_mut().selection = Some(range);
    }

    fn reveal_range(&mut self, _view: ViewId, range: Range, _mode: RevealMode) {
        self.0.borrow_mut().revealed.push(range);
    }

    fn create_decoration(&mut self, _color: &str) -> DecorationId {
        let mut s = self.0.borrow_mut();
        s.next += 1;
        let id = DecorationId(s.next);
        s.decorations.insert(id, Vec::new());
        id
    }

    fn set_decorations(&mut self, _view: ViewId, decoration: DecorationId, ranges: &[Range]) {
        self.0
            .borrow_mut()
            .decorations
            .insert(decoration, ranges.to_vec());
    }

    fn dispose_decoration(&mut self, decoration: DecorationId) {
        self.0.borrow_mut().disposed.insert(decoration);
    }

    fn active_view(&self) -> Option<ViewId> {
        self.0.borrow().active.as_ref().map(|(v, _)| *v)
    }

    fn view_path(&self, _view: ViewId) -> Option<PathBuf> {
        self.0.borrow().active.as_ref().map(|(_, p)| p.clone())
    }

    fn selection(&self, _view: ViewId) -> Option<Range> {
        self.0.borrow().selection
    }

    fn run_command(&mut self, command: HostCommand) {
        self.0.borrow_mut().commands.push(command);
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub messages: Rc<RefCell<Vec<String>>>,
    pub errors: Rc<RefCell<Vec<String>>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, _timeout: Duration) {
        self.messages.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}

#[derive(Clone, Default)]
pub struct MemoryClipboard(pub Rc<RefCell<String>>);

impl Clipboard for MemoryClipboard {
    fn read_text(&mut self) -> Result<String> {
        Ok(self.0.borrow().clone())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        *self.0.borrow_mut() = text.to_string();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingDiffView(pub Rc<RefCell<Vec<(PathBuf, PathBuf)>>>);

impl DiffView for RecordingDiffView {
    fn show_diff(&mut self, left: &Path, right: &Path, _title: &str) -> Result<()> {
        self.0
            .borrow_mut()
            .push((left.to_path_buf(), right.to_path_buf()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingLauncher(pub Rc<RefCell<Vec<String>>>);

impl DiffLauncher for RecordingLauncher {
    fn launch(&mut self, command_line: &str) -> Result<()> {
        self.0.borrow_mut().push(command_line.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPicker {
    pub titles: Vec<String>,
    pub item_sets: Vec<Vec<ListEntry>>,
    pub values: Vec<String>,
    pub busy: bool,
}

impl RecordingPicker {
    pub fn last_items(&self) -> &[ListEntry] {
        self.item_sets.last().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

impl PickerView for RecordingPicker {
    fn set_title(&mut self, title: &str) {
        self.titles.push(title.to_string());
    }

    fn set_items(&mut self, items: &[ListEntry]) {
        self.item_sets.push(items.to_vec());
    }

    fn set_value(&mut self, value: &str) {
        self.values.push(value.to_string());
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

/// 测试用的所有宿主协作者
#[derive(Clone, Default)]
pub struct Host {
    pub editor: FakeEditor,
    pub notifier: RecordingNotifier,
    pub clipboard: MemoryClipboard,
    pub diff_view: RecordingDiffView,
    pub launcher: RecordingLauncher,
}

impl Host {
    pub fn parts(&self) -> HostParts {
        HostParts {
            editor: Box::new(self.editor.clone()),
            clipboard: Box::new(self.clipboard.clone()),
            notifier: Box::new(self.notifier.clone()),
            diff_view: Box::new(self.diff_view.clone()),
            launcher: Box::new(self.launcher.clone()),
            theme: ThemeKind::Dark,
        }
    }
}

pub fn workbench(dir: &Path, settings: &Settings, host: &Host) -> Workbench {
    let favorites = FavoritesStore::open(dir.join("favorites.json"), 5, vec!["main".into()])
        .expect("收藏文件");
    let history = HistoryStore::open(dir.join("history.json"), 5);
    Workbench::new(favorites, history, settings, host.parts())
}

pub fn record(path: &str, line: u64, start: usize, end: usize) -> MatchRecord {
    MatchRecord {
        file_path: path.to_string(),
        line_number: line,
        column_start: start,
        column_end: end,
        matched_line_text: "let value = 1;".into(),
        source_options: String::new(),
    }
}

/// 按输入返回预设结果，可为每个输入设置延迟
pub struct ScriptedSource {
    pub delays: HashMap<String, Duration>,
    pub records: Vec<MatchRecord>,
}

impl ScriptedSource {
    pub fn new(records: Vec<MatchRecord>) -> Self {
        Self {
            delays: HashMap::new(),
            records,
        }
    }

    pub fn delay(mut self, value: &str, delay: Duration) -> Self {
        self.delays.insert(value.to_string(), delay);
        self
    }
}

impl QuerySource for ScriptedSource {
    fn name(&self) -> String {
        "Scripted".into()
    }

    fn query(&self, value: &str) -> QueryFuture {
        let delay = self.delays.get(value).copied().unwrap_or_default();
        let value = value.to_string();
        let records = self.records.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            let outcome = SearchOutcome {
                total: records.len(),
                matches: records.len(),
                records,
                ..Default::default()
            };
            Ok(Listing {
                entries: group_by_file(&outcome.records),
                title: format!("Scripted <{}>", value),
                outcome: Some(outcome),
            })
        })
    }

    fn records_history(&self) -> bool {
        true
    }
}

pub fn shared(source: ScriptedSource) -> Arc<dyn QuerySource> {
    Arc::new(source)
}
