use std::path::Path;

use tokio::task::JoinHandle;

use crate::config::{self, CompareSettings};
use crate::error::{FindError, Result};
use crate::host::DiffView;
use crate::runner::{self, CommandLine};
use crate::types::base_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    File,
    Directory,
}

/// 实际执行的比较方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffInvocation {
    External(String),
    InProcess { left: String, right: String },
}

/// 启动外部比较程序
pub trait DiffLauncher {
    fn launch(&mut self, command_line: &str) -> Result<()>;

    /// 取走仍在运行的后台任务
    fn take_pending(&mut self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// 后台执行外部比较程序，不等待其退出，stderr 写日志
#[derive(Debug, Default)]
pub struct ShellLauncher {
    pending: Vec<JoinHandle<()>>,
}

impl DiffLauncher for ShellLauncher {
    fn launch(&mut self, command_line: &str) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| FindError::Host(format!("没有可用的异步运行时: {}", e)))?;
        let line = command_line.to_string();
        let task = handle.spawn(async move {
            match runner::execute(&line, None, config::MAX_BUF_SIZE).await {
                Ok(out) if !out.stderr.trim().is_empty() => {
                    tracing::warn!("比较程序 stderr: {}", out.stderr.trim())
                }
                Ok(_) => tracing::debug!("比较程序已退出: {}", line),
                Err(e) => tracing::error!("比较程序执行失败: {}", e),
            }
        });
        self.pending.retain(|t| !t.is_finished());
        self.pending.push(task);
        Ok(())
    }

    fn take_pending(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.pending)
    }
}

pub struct DiffDispatcher {
    settings: CompareSettings,
    view: Box<dyn DiffView>,
    launcher: Box<dyn DiffLauncher>,
}

impl DiffDispatcher {
    pub fn new(settings: CompareSettings, view: Box<dyn DiffView>, launcher: Box<dyn DiffLauncher>) -> Self {
        Self {
            settings,
            view,
            launcher,
        }
    }

    /// 命令行模式退出前等待外部比较程序
    pub fn take_pending(&mut self) -> Vec<JoinHandle<()>> {
        self.launcher.take_pending()
    }

    fn external_program(&self) -> Option<&str> {
        let prog = self.settings.external_program.trim();
        (self.settings.external_enabled && !prog.is_empty()).then_some(prog)
    }

    /// `"<prog>" <opt> "<a>" "<b>"`
    pub fn external_command(&self, left: &str, right: &str) -> Option<String> {
        self.external_program().map(|prog| {
            CommandLine::new(prog)
                .raw(&self.settings.external_option)
                .arg(left)
                .arg(right)
                .render()
        })
    }

    fn check_kind(&self, kind: DiffKind) -> Result<()> {
        if kind == DiffKind::Directory && self.external_program().is_none() {
            return Err(FindError::Validation(
                "目录比较需要外部比较程序，请先配置 compare.external_program".into(),
            ));
        }
        Ok(())
    }

    fn check_pair(left: &str, right: &str) -> Result<()> {
        if left == right {
            return Err(FindError::Validation("两个文件路径相同".into()));
        }
        Ok(())
    }

    fn invoke(&mut self, left: &str, right: &str) -> Result<DiffInvocation> {
        if let Some(cmd) = self.external_command(left, right) {
            tracing::info!("外部比较: {}", cmd);
            self.launcher.launch(&cmd)?;
            return Ok(DiffInvocation::External(cmd));
        }
        let title = format!("{} ↔ {}", base_name(left), base_name(right));
        self.view.show_diff(Path::new(left), Path::new(right), &title)?;
        Ok(DiffInvocation::InProcess {
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    /// 比较恰好两个选中项
    pub fn diff_pair(&mut self, selected: &[String], kind: DiffKind) -> Result<DiffInvocation> {
        if selected.len() != 2 {
            return Err(FindError::Validation(format!(
                "请选择两个文件，当前选择了 {} 个",
                selected.len()
            )));
        }
        Self::check_pair(&selected[0], &selected[1])?;
        self.check_kind(kind)?;
        self.invoke(&selected[0], &selected[1])
    }

    /// 按顺序两两比较，落单的最后一项忽略。全部校验通过后才开始执行
    pub fn diff_sequence(&mut self, paths: &[String], kind: DiffKind) -> Result<Vec<DiffInvocation>> {
        self.check_kind(kind)?;
        let pairs: Vec<&[String]> = paths.chunks_exact(2).collect();
        for pair in &pairs {
            Self::check_pair(&pair[0], &pair[1])?;
        }
        if paths.len() % 2 == 1 {
            tracing::info!("剩余 1 项未配对，已忽略: {}", paths[paths.len() - 1]);
        }
        pairs
            .into_iter()
            .map(|pair| self.invoke(&pair[0], &pair[1]))
            .collect()
    }
}
