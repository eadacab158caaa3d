use std::path::PathBuf;

use crate::config::RgSettings;
use crate::error::Result;
use crate::host::{DecorationId, EditorHost, Position, Range, RevealMode, ShowOptions, ViewId};
use crate::types::{MatchRecord, ProblemRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeKind {
    Light,
    Dark,
}

/// 高亮颜色（随主题变化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeColors {
    pub light: String,
    pub dark: String,
}

impl ThemeColors {
    pub fn from_settings(rg: &RgSettings) -> Self {
        Self {
            light: rg.match_color_light.clone(),
            dark: rg.match_color_dark.clone(),
        }
    }

    pub fn resolve(&self, theme: ThemeKind) -> &str {
        match theme {
            ThemeKind::Light => &self.light,
            ThemeKind::Dark => &self.dark,
        }
    }
}

/// 打开并定位的目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealTarget {
    pub path: PathBuf,
    pub range: Range,
}

impl From<&MatchRecord> for RevealTarget {
    fn from(r: &MatchRecord) -> Self {
        let line = r.line_number.saturating_sub(1) as u32;
        Self {
            path: PathBuf::from(&r.file_path),
            range: Range::on_line(line, r.column_start as u32, r.column_end as u32),
        }
    }
}

impl From<&ProblemRow> for RevealTarget {
    fn from(p: &ProblemRow) -> Self {
        Self {
            path: PathBuf::from(&p.file_path),
            range: p.range,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveHighlight {
    view: ViewId,
    decoration: DecorationId,
    range: Range,
}

/// 管理当前选中结果的打开、定位和唯一的临时高亮。
///
/// 任何时刻最多持有一个高亮句柄，新高亮之前先释放旧的。
pub struct SelectionManager {
    editor: Box<dyn EditorHost>,
    colors: ThemeColors,
    theme: ThemeKind,
    current: Option<ActiveHighlight>,
}

impl SelectionManager {
    pub fn new(editor: Box<dyn EditorHost>, colors: ThemeColors, theme: ThemeKind) -> Self {
        Self {
            editor,
            colors,
            theme,
            current: None,
        }
    }

    pub fn editor(&mut self) -> &mut dyn EditorHost {
        self.editor.as_mut()
    }

    pub fn color(&self) -> &str {
        self.colors.resolve(self.theme)
    }

    pub fn open_and_reveal(&mut self, target: &RevealTarget, options: Option<ShowOptions>) -> Result<ViewId> {
        self.clear();
        let options = options.unwrap_or_default();
        let doc = self.editor.open_document(&target.path)?;
        let view = self.editor.show_document(doc, options)?;
        self.editor.set_selection(view, target.range);
        self.editor.reveal_range(view, target.range, RevealMode::InCenter);
        if options.preview {
            self.highlight(view, target.range);
        }
        Ok(view)
    }

    /// 浏览时预览：保留焦点并高亮匹配区间
    pub fn preview(&mut self, target: &RevealTarget) -> Result<ViewId> {
        self.open_and_reveal(target, Some(ShowOptions::preview()))
    }

    /// 只打开文件，不定位
    pub fn view(&mut self, path: &std::path::Path) -> Result<ViewId> {
        self.clear();
        let doc = self.editor.open_document(path)?;
        let view = self.editor.show_document(doc, ShowOptions::default())?;
        self.editor
            .set_selection(view, Range::caret(Position::default()));
        Ok(view)
    }

    fn highlight(&mut self, view: ViewId, range: Range) {
        let color = self.colors.resolve(self.theme).to_string();
        let decoration = self.editor.create_decoration(&color);
        self.editor.set_decorations(view, decoration, &[range]);
        self.current = Some(ActiveHighlight {
            view,
            decoration,
            range,
        });
    }

    pub fn clear(&mut self) {
        if let Some(h) = self.current.take() {
            self.editor.set_decorations(h.view, h.decoration, &[]);
            self.editor.dispose_decoration(h.decoration);
        }
    }

    /// 主题切换后按新颜色重绘当前高亮
    pub fn set_theme(&mut self, theme: ThemeKind) {
        if self.theme == theme {
            return;
        }
        self.theme = theme;
        if let Some(h) = self.current {
            self.clear();
            self.highlight(h.view, h.range);
        }
    }

    pub fn active_highlight(&self) -> Option<(ViewId, Range)> {
        self.current.map(|h| (h.view, h.range))
    }
}

impl Drop for SelectionManager {
    fn drop(&mut self) {
        self.clear();
    }
}
