//! 选择列表的显示接口，以及本地列表（收藏、历史、诊断）的模糊过滤

use nucleo::pattern::{CaseMatching, Normalization, Pattern};
use nucleo::{Config, Matcher, Utf32Str};

use crate::types::ListEntry;

/// 选择列表界面
pub trait PickerView {
    fn set_title(&mut self, title: &str);
    /// 整体替换，从不追加
    fn set_items(&mut self, items: &[ListEntry]);
    fn set_value(&mut self, value: &str);
    fn set_busy(&mut self, busy: bool);
    fn set_placeholder(&mut self, _hint: &str) {}
}

/// 终端列表：每次替换时输出到 stderr
#[derive(Debug, Default)]
pub struct TerminalPicker {
    title: String,
    count: usize,
}

impl TerminalPicker {
    pub fn item_count(&self) -> usize {
        self.count
    }
}

impl PickerView for TerminalPicker {
    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        eprintln!("== {} ==", title);
    }

    fn set_items(&mut self, items: &[ListEntry]) {
        self.count = items.iter().filter(|i| !i.is_separator()).count();
        let mut n = 0;
        for item in items {
            if item.is_separator() {
                eprintln!("  ---- {}", item.label());
                continue;
            }
            eprintln!("  [{}] {}  {}  {}", n, item.label(), item.description(), item.detail());
            n += 1;
        }
    }

    fn set_value(&mut self, value: &str) {
        eprintln!("> {}", value);
    }

    fn set_busy(&mut self, busy: bool) {
        if busy {
            eprintln!("  ({} 搜索中...)", self.title);
        }
    }

    fn set_placeholder(&mut self, hint: &str) {
        eprintln!("  {}", hint);
    }
}

/// 按 label/description/detail 模糊匹配，得分高的在前；查询为空时原样返回
pub fn filter_entries(entries: &[ListEntry], query: &str) -> Vec<ListEntry> {
    let query = query.trim();
    if query.is_empty() {
        return entries.to_vec();
    }
    let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
    let mut matcher = Matcher::new(Config::DEFAULT.match_paths());
    let mut buf = Vec::new();

    let mut scored: Vec<(u32, usize)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_separator())
        .filter_map(|(i, e)| {
            let haystack = format!("{} {} {}", e.label(), e.description(), e.detail());
            pattern
                .score(Utf32Str::new(&haystack, &mut buf), &mut matcher)
                .map(|s| (s, i))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, i)| entries[i].clone()).collect()
}
