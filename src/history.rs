use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::persist::{read_json, write_json_atomic};
use crate::types::{group_by_file, HistoryEntry, ListEntry, MatchRecord};

/// 搜索历史：按 id 存储，容量有限，重复查询视为刷新
pub struct HistoryStore {
    file_path: Option<PathBuf>,
    entries: BTreeMap<String, HistoryEntry>,
    max: usize,
}

impl HistoryStore {
    /// 不落盘的历史
    pub fn in_memory(max: usize) -> Self {
        Self {
            file_path: None,
            entries: BTreeMap::new(),
            max: max.max(1),
        }
    }

    /// 读取失败时从空历史开始
    pub fn open(file_path: PathBuf, max: usize) -> Self {
        let entries = match read_json::<BTreeMap<String, HistoryEntry>>(&file_path) {
            Ok(Some(entries)) => entries,
            Ok(None) => BTreeMap::new(),
            Err(msg) => {
                tracing::warn!("{}，忽略历史记录", msg);
                BTreeMap::new()
            }
        };
        let mut store = Self {
            file_path: Some(file_path),
            entries,
            max: max.max(1),
        };
        while store.entries.len() > store.max {
            store.evict_oldest();
        }
        tracing::info!("已加载历史 {} 条", store.entries.len());
        store
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .values()
            .min_by_key(|e| e.timestamp)
            .map(|e| e.id.clone());
        if let Some(id) = oldest {
            if let Some(e) = self.entries.remove(&id) {
                tracing::debug!("历史已满，移除 <{}>", e.query);
            }
        }
    }

    /// 保证时间戳严格递增，同一毫秒内的连续记录也能正确排序
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.entries.values().map(|e| e.timestamp).max() {
            Some(latest) if now <= latest => latest + chrono::Duration::microseconds(1),
            _ => now,
        }
    }

    /// 记录一次搜索，返回新 id
    pub fn record(&mut self, query: &str, file_entries: Vec<MatchRecord>, total: usize) -> Result<String> {
        let duplicates: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.query == query)
            .map(|e| e.id.clone())
            .collect();
        for id in duplicates {
            self.entries.remove(&id);
        }
        while self.entries.len() >= self.max {
            self.evict_oldest();
        }

        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.to_string(),
            timestamp: self.next_timestamp(),
            total,
            file_entries,
        };
        let id = entry.id.clone();
        self.entries.insert(id.clone(), entry);
        self.save()?;
        Ok(id)
    }

    /// 按时间倒序
    pub fn list(&self) -> Vec<&HistoryEntry> {
        let mut list: Vec<&HistoryEntry> = self.entries.values().collect();
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list
    }

    /// 带序号的列表行
    pub fn rows(&self) -> Vec<ListEntry> {
        self.list()
            .into_iter()
            .enumerate()
            .map(|(i, e)| ListEntry::HistoryRow {
                rank: i + 1,
                entry: e.clone(),
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.get(id)
    }

    /// 历史详情：直接展示保存的结果，不重新搜索
    pub fn detail(&self, id: &str) -> Option<Vec<ListEntry>> {
        self.entries.get(id).map(|e| group_by_file(&e.file_entries))
    }

    pub fn remove(&mut self, id: &str) -> Result<Option<HistoryEntry>> {
        let removed = self.entries.remove(id);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<()> {
        match &self.file_path {
            Some(path) => write_json_atomic(path, &self.entries),
            None => Ok(()),
        }
    }
}
