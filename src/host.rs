//! 宿主能力接口（编辑器、通知、剪贴板、差异视图）以及终端下的默认实现

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FindError, Result};

/// 0 基行列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn on_line(line: u32, start: u32, end: u32) -> Self {
        Self::new(Position::new(line, start), Position::new(line, end))
    }

    /// 光标（空选区）
    pub fn caret(pos: Position) -> Self {
        Self::new(pos, pos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecorationId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowOptions {
    pub preserve_focus: bool,
    pub preview: bool,
}

impl ShowOptions {
    pub fn preview() -> Self {
        Self {
            preserve_focus: true,
            preview: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealMode {
    InCenter,
    Default,
}

/// 宿主内置的诊断导航动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    CloseMarkersNavigation,
    MarkerNext,
    MarkerNextInFiles,
    MarkerPrevInFiles,
    ShowHover,
}

/// 编辑器/文档服务
pub trait EditorHost {
    /// 已打开的文档返回原有句柄
    fn open_document(&mut self, path: &Path) -> Result<DocumentId>;
    fn show_document(&mut self, doc: DocumentId, options: ShowOptions) -> Result<ViewId>;
    fn set_selection(&mut self, view: ViewId, range: Range);
    fn reveal_range(&mut self, view: ViewId, range: Range, mode: RevealMode);
    fn create_decoration(&mut self, color: &str) -> DecorationId;
    fn set_decorations(&mut self, view: ViewId, decoration: DecorationId, ranges: &[Range]);
    fn dispose_decoration(&mut self, decoration: DecorationId);
    fn active_view(&self) -> Option<ViewId>;
    fn view_path(&self, view: ViewId) -> Option<PathBuf>;
    fn selection(&self, view: ViewId) -> Option<Range>;
    fn run_command(&mut self, command: HostCommand);
}

/// 自动消失的提示
pub trait Notifier {
    fn notify(&self, message: &str, timeout: Duration);
    fn error(&self, message: &str);
}

pub trait Clipboard {
    fn read_text(&mut self) -> Result<String>;
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// 进程内差异视图
pub trait DiffView {
    fn show_diff(&mut self, left: &Path, right: &Path, title: &str) -> Result<()>;
}

/// 终端通知：写 stderr，stdout 留给 JSON 输出
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, message: &str, timeout: Duration) {
        tracing::info!("通知 ({} ms): {}", timeout.as_millis(), message);
        eprintln!("[提示] {}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
        eprintln!("[错误] {}", message);
    }
}

/// 系统剪贴板（首次使用时初始化）
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    fn handle(&mut self) -> Result<&mut arboard::Clipboard> {
        if self.inner.is_none() {
            let cb = arboard::Clipboard::new()
                .map_err(|e| FindError::Host(format!("无法访问剪贴板: {}", e)))?;
            self.inner = Some(cb);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| FindError::Host("剪贴板不可用".into()))
    }
}

impl Clipboard for SystemClipboard {
    fn read_text(&mut self) -> Result<String> {
        self.handle()?
            .get_text()
            .map_err(|e| FindError::Host(format!("读取剪贴板失败: {}", e)))
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.handle()?
            .set_text(text.to_string())
            .map_err(|e| FindError::Host(format!("写入剪贴板失败: {}", e)))
    }
}

struct TerminalView {
    path: PathBuf,
    selection: Option<Range>,
}

/// 终端“编辑器”：正式打开时交给系统默认程序，预览只输出位置
#[derive(Default)]
pub struct SystemEditor {
    documents: HashMap<PathBuf, DocumentId>,
    views: HashMap<ViewId, TerminalView>,
    launched: HashSet<PathBuf>,
    active: Option<ViewId>,
    next_id: u64,
}

impl SystemEditor {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn path_of(&self, doc: DocumentId) -> Option<PathBuf> {
        self.documents
            .iter()
            .find(|(_, id)| **id == doc)
            .map(|(p, _)| p.clone())
    }
}

impl EditorHost for SystemEditor {
    fn open_document(&mut self, path: &Path) -> Result<DocumentId> {
        if !path.exists() {
            return Err(FindError::fs(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在"),
            ));
        }
        if let Some(id) = self.documents.get(path) {
            return Ok(*id);
        }
        let id = DocumentId(self.next());
        self.documents.insert(path.to_path_buf(), id);
        Ok(id)
    }

    fn show_document(&mut self, doc: DocumentId, options: ShowOptions) -> Result<ViewId> {
        let path = self
            .path_of(doc)
            .ok_or_else(|| FindError::Host(format!("未知文档 {:?}", doc)))?;
        if !options.preview && !self.launched.contains(&path) {
            open::that(&path).map_err(|e| FindError::Host(format!("无法打开 {:?}: {}", path, e)))?;
            self.launched.insert(path.clone());
        }
        if let Some((id, _)) = self.views.iter().find(|(_, v)| v.path == path) {
            let id = *id;
            self.active = Some(id);
            return Ok(id);
        }
        let id = ViewId(self.next());
        self.views.insert(
            id,
            TerminalView {
                path,
                selection: None,
            },
        );
        self.active = Some(id);
        Ok(id)
    }

    fn set_selection(&mut self, view: ViewId, range: Range) {
        if let Some(v) = self.views.get_mut(&view) {
            v.selection = Some(range);
        }
    }

    fn reveal_range(&mut self, view: ViewId, range: Range, _mode: RevealMode) {
        if let Some(v) = self.views.get(&view) {
            eprintln!(
                "{}:{}:{}",
                v.path.display(),
                range.start.line + 1,
                range.start.character + 1
            );
        }
    }

    fn create_decoration(&mut self, color: &str) -> DecorationId {
        let id = DecorationId(self.next());
        tracing::debug!("创建高亮 {:?} ({})", id, color);
        id
    }

    fn set_decorations(&mut self, view: ViewId, decoration: DecorationId, ranges: &[Range]) {
        tracing::debug!("高亮 {:?} @ {:?}: {:?}", decoration, view, ranges);
    }

    fn dispose_decoration(&mut self, decoration: DecorationId) {
        tracing::debug!("释放高亮 {:?}", decoration);
    }

    fn active_view(&self) -> Option<ViewId> {
        self.active
    }

    fn view_path(&self, view: ViewId) -> Option<PathBuf> {
        self.views.get(&view).map(|v| v.path.clone())
    }

    fn selection(&self, view: ViewId) -> Option<Range> {
        self.views.get(&view).and_then(|v| v.selection)
    }

    fn run_command(&mut self, command: HostCommand) {
        tracing::debug!("宿主命令: {:?}", command);
    }
}

/// 终端差异视图：输出 `diff -u` 结果
#[derive(Debug, Default)]
pub struct TerminalDiffView;

impl DiffView for TerminalDiffView {
    fn show_diff(&mut self, left: &Path, right: &Path, title: &str) -> Result<()> {
        let output = std::process::Command::new("diff")
            .arg("-u")
            .arg(left)
            .arg(right)
            .output()
            .map_err(|e| FindError::Host(format!("无法执行 diff: {}", e)))?;
        println!("=== {} ===", title);
        println!("{}", String::from_utf8_lossy(&output.stdout));
        Ok(())
    }
}
