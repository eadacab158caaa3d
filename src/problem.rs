//! 诊断（problems）导航：文件内/跨文件跳转到下一个错误或警告，以及诊断列表

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FindError, Result};
use crate::host::{EditorHost, HostCommand, Position, Range, RevealMode, ShowOptions};
use crate::types::{base_name, ListEntry, ProblemRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Information => "Information",
            Severity::Hint => "Hint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl Diagnostic {
    fn start(&self) -> Position {
        self.range.start
    }
}

/// 诊断来源（语言服务、编译输出等）
pub trait DiagnosticsSource {
    fn all(&self) -> Vec<(PathBuf, Vec<Diagnostic>)>;

    fn for_file(&self, path: &Path) -> Vec<Diagnostic> {
        self.all()
            .into_iter()
            .find(|(p, _)| p == path)
            .map(|(_, d)| d)
            .unwrap_or_default()
    }
}

/// 从 JSON 文件读取的诊断快照：`{"<path>": [Diagnostic, ...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub files: BTreeMap<PathBuf, Vec<Diagnostic>>,
}

impl DiagnosticsSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FindError::fs(path, e))?;
        let files = serde_json::from_str(&text).map_err(|_| FindError::malformed(&text))?;
        Ok(Self { files })
    }
}

impl DiagnosticsSource for DiagnosticsSnapshot {
    fn all(&self) -> Vec<(PathBuf, Vec<Diagnostic>)> {
        self.files
            .iter()
            .map(|(p, d)| (p.clone(), d.clone()))
            .collect()
    }

    fn for_file(&self, path: &Path) -> Vec<Diagnostic> {
        self.files.get(path).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityFilter {
    ErrorOnly,
    ErrorAndWarning,
}

impl SeverityFilter {
    pub fn allows(&self, severity: Severity) -> bool {
        match self {
            SeverityFilter::ErrorOnly => severity == Severity::Error,
            SeverityFilter::ErrorAndWarning => {
                matches!(severity, Severity::Error | Severity::Warning)
            }
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SeverityFilter::ErrorOnly => "Problems :: Error",
            SeverityFilter::ErrorAndWarning => "Problems :: Warning & Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

fn sorted(mut diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diags.sort_by_key(|d| d.start());
    diags
}

fn filtered(diags: Vec<Diagnostic>, filter: SeverityFilter) -> Vec<Diagnostic> {
    diags.into_iter().filter(|d| filter.allows(d.severity)).collect()
}

/// 光标之后（含）最近的一个
fn closer_next<'a>(caret: Position, marker: &'a Diagnostic, best: Option<&'a Diagnostic>) -> Option<&'a Diagnostic> {
    if marker.start() < caret {
        return best;
    }
    match best {
        Some(b) if b.start() <= marker.start() => Some(b),
        _ => Some(marker),
    }
}

/// 光标之前（含）最近的一个
fn closer_prev<'a>(caret: Position, marker: &'a Diagnostic, best: Option<&'a Diagnostic>) -> Option<&'a Diagnostic> {
    if marker.start() > caret {
        return best;
    }
    match best {
        Some(b) if b.start() >= marker.start() => Some(b),
        _ => Some(marker),
    }
}

/// 诊断导航。记住上一次落点，避免在同一位置反复停留
#[derive(Debug, Default)]
pub struct ProblemNavigator {
    last: Option<(PathBuf, Position)>,
}

impl ProblemNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_position(&self) -> Option<(&Path, Position)> {
        self.last.as_ref().map(|(p, pos)| (p.as_path(), *pos))
    }

    /// 在当前文件中跳转。找到目标返回 true
    pub fn goto_in_file(
        &mut self,
        editor: &mut dyn EditorHost,
        source: &dyn DiagnosticsSource,
        filter: SeverityFilter,
        direction: Direction,
        wrap: bool,
    ) -> Result<bool> {
        let Some(view) = editor.active_view() else {
            return Ok(false);
        };
        let Some(path) = editor.view_path(view) else {
            return Ok(false);
        };
        let diagnostics = filtered(source.for_file(&path), filter);

        if self.last.as_ref().map(|(p, _)| p != &path).unwrap_or(false) {
            self.last = None;
        }
        if diagnostics.is_empty() {
            return Ok(false);
        }

        let caret = editor.selection(view).map(|r| r.start).unwrap_or_default();
        let last = self.last.as_ref().map(|(_, pos)| *pos);
        let mut next: Option<&Diagnostic> = None;
        for d in &diagnostics {
            if last == Some(d.start()) {
                continue;
            }
            next = match direction {
                Direction::Next => closer_next(caret, d, next),
                Direction::Prev => closer_prev(caret, d, next),
            };
        }
        let mut target = next.cloned();

        if target.is_none() && wrap {
            let ordered = sorted(diagnostics.clone());
            let edge = match direction {
                Direction::Next => ordered.first(),
                Direction::Prev => ordered.last(),
            }
            .cloned();
            if let Some(edge) = &edge {
                // 只有一个可去的位置且已经停在那里
                if last == Some(edge.start()) && caret == edge.start() {
                    return Ok(true);
                }
            }
            target = edge;
        }

        let Some(target) = target else {
            return Ok(false);
        };

        tracing::debug!(
            "跳转到 {}:{}:{}",
            path.display(),
            target.start().line + 1,
            target.start().character + 1
        );
        self.last = Some((path, target.start()));
        editor.set_selection(view, Range::caret(target.start()));
        editor.run_command(HostCommand::CloseMarkersNavigation);
        if filter == SeverityFilter::ErrorOnly {
            editor.run_command(HostCommand::MarkerNext);
        } else {
            editor.reveal_range(view, target.range, RevealMode::Default);
            editor.run_command(HostCommand::ShowHover);
        }
        Ok(true)
    }

    /// 先在当前文件内跳转（不回绕），到头后切换到排序后的下一个文件
    pub fn goto_in_files(
        &mut self,
        editor: &mut dyn EditorHost,
        source: &dyn DiagnosticsSource,
        filter: SeverityFilter,
        direction: Direction,
    ) -> Result<bool> {
        if self.goto_in_file(editor, source, filter, direction, false)? {
            return Ok(true);
        }

        let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = source
            .all()
            .into_iter()
            .map(|(p, d)| (p, filtered(d, filter)))
            .filter(|(_, d)| !d.is_empty())
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        if files.is_empty() {
            return Ok(false);
        }

        let active = editor.active_view().and_then(|v| editor.view_path(v));
        if files.len() == 1 && active.as_ref() == Some(&files[0].0) {
            return self.goto_in_file(editor, source, filter, direction, true);
        }

        let idx = active
            .as_ref()
            .and_then(|a| files.iter().position(|(p, _)| p == a))
            .map(|i| (i + 1) % files.len())
            .unwrap_or(0);
        let (path, diagnostics) = files.swap_remove(idx);
        let ordered = sorted(diagnostics);
        let edge = match direction {
            Direction::Next => ordered.first(),
            Direction::Prev => ordered.last(),
        };
        let Some(target) = edge else {
            return Ok(false);
        };

        tracing::info!("切换到 {}", path.display());
        self.last = Some((path.clone(), target.start()));
        let doc = editor.open_document(&path)?;
        let view = editor.show_document(doc, ShowOptions::default())?;
        editor.set_selection(view, Range::caret(target.start()));
        editor.run_command(HostCommand::CloseMarkersNavigation);
        editor.run_command(match direction {
            Direction::Next => HostCommand::MarkerNextInFiles,
            Direction::Prev => HostCommand::MarkerPrevInFiles,
        });
        Ok(true)
    }
}

fn relative_to(path: &Path, root: Option<&Path>) -> String {
    root.and_then(|r| path.strip_prefix(r).ok())
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn problem_row(path: &Path, d: &Diagnostic, root: Option<&Path>) -> ProblemRow {
    let source = d.source.clone().unwrap_or_else(|| {
        path.extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default()
    });
    let first_line = d.message.lines().next().unwrap_or("");
    ProblemRow {
        file_path: path.to_string_lossy().to_string(),
        range: d.range,
        label: format!(
            "({}:{}) {}: {}",
            source,
            d.start().line + 1,
            d.severity.name(),
            first_line
        ),
        description: relative_to(path, root),
    }
}

/// 把一个文件的诊断加入列表，行号变化处插入空分隔
fn push_file_rows(items: &mut Vec<ListEntry>, path: &Path, diags: &[Diagnostic], root: Option<&Path>) {
    let mut line = None;
    for d in diags {
        let current = d.start().line;
        if line.is_some() && line != Some(current) {
            items.push(ListEntry::Separator(String::new()));
        }
        line = Some(current);
        items.push(ListEntry::Problem(problem_row(path, d, root)));
    }
}

/// 当前文件的诊断列表
pub fn list_in_file(
    path: &Path,
    source: &dyn DiagnosticsSource,
    filter: SeverityFilter,
    root: Option<&Path>,
) -> Vec<ListEntry> {
    let diags = sorted(filtered(source.for_file(path), filter));
    let mut items = Vec::with_capacity(diags.len());
    push_file_rows(&mut items, path, &diags, root);
    items
}

/// 全部文件的诊断列表，文件之间以 `:: <目录名> ::` 分隔
pub fn list_in_files(source: &dyn DiagnosticsSource, filter: SeverityFilter, root: Option<&Path>) -> Vec<ListEntry> {
    let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = source
        .all()
        .into_iter()
        .map(|(p, d)| (p, sorted(filtered(d, filter))))
        .filter(|(_, d)| !d.is_empty())
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut items = Vec::new();
    for (path, diags) in &files {
        if !items.is_empty() {
            let dir = path
                .parent()
                .map(|p| base_name(&p.to_string_lossy()))
                .unwrap_or_default();
            items.push(ListEntry::Separator(format!(":: {} ::", dir)));
        }
        push_file_rows(&mut items, path, diags, root);
    }
    items
}
