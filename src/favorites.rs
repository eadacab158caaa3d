use std::path::{Path, PathBuf};

use crate::config::{self, Settings};
use crate::error::{FindError, Result};
use crate::persist::{read_json, write_json_atomic};
use crate::types::{FavoriteEntry, FavoritesFile, ListEntry};

pub const FAVORITES_FILE: &str = "favorites.json";

/// 收藏夹：文件/目录两个分区，各自有容量上限，每次修改立即落盘
pub struct FavoritesStore {
    file_path: PathBuf,
    entries: FavoritesFile,
    max: usize,
    categories: Vec<String>,
}

impl FavoritesStore {
    /// 平台配置的目录优先，否则放在数据目录
    pub fn location(settings: &Settings) -> PathBuf {
        let configured = settings.favorites.path.current().trim();
        if configured.is_empty() {
            config::data_dir().join(FAVORITES_FILE)
        } else {
            PathBuf::from(configured).join(FAVORITES_FILE)
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::open(
            Self::location(settings),
            settings.favorites.max(),
            settings.favorites.categories.clone(),
        )
    }

    /// 读取失败时回退为空收藏并重建文件；写入失败向上返回
    pub fn open(file_path: PathBuf, max: usize, categories: Vec<String>) -> Result<Self> {
        let mut store = Self {
            file_path,
            entries: FavoritesFile::default(),
            max: max.max(1),
            categories,
        };
        match read_json::<FavoritesFile>(&store.file_path) {
            Ok(Some(entries)) => {
                tracing::info!(
                    "已加载收藏: {} 个文件, {} 个目录",
                    entries.files.len(),
                    entries.directories.len()
                );
                store.entries = entries;
            }
            Ok(None) => {
                tracing::info!("收藏文件不存在，新建 {:?}", store.file_path);
                store.entries = store.empty_entries();
                store.save()?;
            }
            Err(msg) => {
                tracing::warn!("{}，重建收藏文件", msg);
                store.entries = store.empty_entries();
                store.save()?;
            }
        }
        Ok(store)
    }

    fn empty_entries(&self) -> FavoritesFile {
        FavoritesFile {
            files: Vec::new(),
            directories: Vec::new(),
            primary: self.primary(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// 默认分类：已保存的值，其次第一个配置分类
    pub fn primary(&self) -> String {
        if !self.entries.primary.is_empty() {
            return self.entries.primary.clone();
        }
        self.categories.first().cloned().unwrap_or_default()
    }

    pub fn set_primary(&mut self, category: &str) -> Result<()> {
        self.entries.primary = category.to_string();
        self.save()
    }

    pub fn add(&mut self, path: &Path) -> Result<bool> {
        self.add_with_category(path, None)
    }

    /// 新增收藏；路径已存在或无法 stat 时返回 false
    pub fn add_with_category(&mut self, path: &Path, category: Option<&str>) -> Result<bool> {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("无法读取 {:?}: {}", path, e);
                return Ok(false);
            }
        };
        let is_dir = meta.is_dir();
        let path_str = path.to_string_lossy().to_string();
        let category = if is_dir {
            String::new()
        } else {
            category.map(str::to_string).unwrap_or_else(|| self.primary())
        };
        let max = self.max;

        let items = if is_dir {
            &mut self.entries.directories
        } else {
            &mut self.entries.files
        };
        if items.iter().any(|f| f.path == path_str) {
            tracing::info!("{} 已在收藏中", path_str);
            return Ok(false);
        }

        while items.len() >= max {
            let idx = items.iter().position(|f| !f.protect).unwrap_or(0);
            let evicted = items.remove(idx);
            tracing::info!("收藏数量达到上限 ({})，移除最早的 {}", max, evicted.path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());
        items.push(FavoriteEntry {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            path: path_str,
            category,
            protect: is_dir,
        });
        self.save()?;
        Ok(true)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut FavoriteEntry> {
        self.entries
            .files
            .iter_mut()
            .chain(self.entries.directories.iter_mut())
            .find(|f| f.id == id)
    }

    /// 按 id 删除；受保护的条目不能删除
    pub fn remove(&mut self, id: &str) -> Result<FavoriteEntry> {
        let entry = self
            .find_mut(id)
            .ok_or_else(|| FindError::Validation(format!("收藏中不存在 <{}>", id)))?;
        if entry.protect {
            return Err(FindError::Validation(format!(
                "<{}> 已受保护，请先取消保护",
                entry.name
            )));
        }
        let removed = if let Some(i) = self.entries.files.iter().position(|f| f.id == id) {
            self.entries.files.remove(i)
        } else {
            let i = self
                .entries
                .directories
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| FindError::Validation(format!("收藏中不存在 <{}>", id)))?;
            self.entries.directories.remove(i)
        };
        self.save()?;
        tracing::info!("已移除收藏 {}", removed.name);
        Ok(removed)
    }

    /// 切换保护标记，返回新值
    pub fn toggle_protect(&mut self, id: &str) -> Result<bool> {
        let entry = self
            .find_mut(id)
            .ok_or_else(|| FindError::Validation(format!("收藏中不存在 <{}>", id)))?;
        entry.protect = !entry.protect;
        let protect = entry.protect;
        self.save()?;
        Ok(protect)
    }

    pub fn list(&self) -> &FavoritesFile {
        &self.entries
    }

    /// 列表视图：先文件后目录
    pub fn rows(&self) -> Vec<ListEntry> {
        self.entries
            .files
            .iter()
            .chain(self.entries.directories.iter())
            .cloned()
            .map(ListEntry::Favorite)
            .collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries
            .files
            .iter()
            .chain(self.entries.directories.iter())
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.files.len() + self.entries.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries = self.empty_entries();
        self.save()?;
        tracing::info!("收藏已清空");
        Ok(())
    }

    /// 从磁盘重新加载（外部修改后）
    pub fn refresh(&mut self) -> Result<()> {
        match read_json::<FavoritesFile>(&self.file_path) {
            Ok(Some(entries)) => self.entries = entries,
            Ok(None) => {
                self.entries = self.empty_entries();
                self.save()?;
            }
            Err(msg) => {
                tracing::warn!("{}，重建收藏文件", msg);
                self.entries = self.empty_entries();
                self.save()?;
            }
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        write_json_atomic(&self.file_path, &self.entries)
    }
}
