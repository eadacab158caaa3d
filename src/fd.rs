use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Settings;
use crate::error::{FindError, Result};
use crate::runner::{resolve_program, Backend, CommandLine, ProcessRunner};
use crate::types::{EntryType, IndexEntry};

/// fd 查询模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdMode {
    Files,
    Directories,
    /// 当前工作区下全部文件
    WorkspaceFiles,
    /// 指定目录下的文件
    FilesIn(String),
}

impl FdMode {
    fn type_option(&self) -> &'static str {
        match self {
            FdMode::Directories => "-t d",
            _ => "-t f",
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            FdMode::Directories => EntryType::Folder,
            _ => EntryType::File,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FdMode::Directories => "Directory to search",
            _ => "Filename to search",
        }
    }

    fn scoped_dir(&self) -> Option<&str> {
        match self {
            FdMode::WorkspaceFiles => Some("."),
            FdMode::FilesIn(dir) => Some(dir),
            _ => None,
        }
    }
}

/// `<program> -a <options> <defaultOptions> <query> <searchPaths...> [-E <pattern>]...`
pub fn build_command(
    program: &str,
    text: &str,
    mode: &FdMode,
    default_option: &str,
    search_paths: &[String],
    exclude_patterns: &[String],
) -> CommandLine {
    let mut cmd = CommandLine::new(program)
        .raw("-a")
        .raw(mode.type_option())
        .raw(default_option);

    match mode.scoped_dir() {
        Some(dir) => {
            cmd = if text.trim().is_empty() {
                cmd.raw("-g").arg("**/*")
            } else {
                cmd.raw(text)
            };
            cmd = cmd.raw("--full-path").arg(dir);
        }
        None => {
            cmd = cmd.raw(text).raw("--full-path").args(search_paths);
        }
    }

    for pattern in exclude_patterns {
        cmd = cmd.raw("-E").arg(pattern);
    }
    cmd
}

/// 每行一个路径，去重并保留首次出现的顺序
pub fn parse_lines(stdout: &str, entry_type: EntryType) -> Vec<IndexEntry> {
    let mut seen = HashSet::new();
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.to_string()))
        .map(|l| IndexEntry::from_full_path(l, entry_type))
        .collect()
}

/// fd 后端
pub struct FdSearch {
    runner: ProcessRunner,
    default_option: String,
    platform_paths: Vec<String>,
    project_roots: Vec<String>,
    exclude_patterns: Vec<String>,
    hint_shown: AtomicBool,
}

impl FdSearch {
    pub fn new(settings: &Settings, workspace: &[String]) -> Self {
        let runner = ProcessRunner::new(resolve_program(settings, Backend::Fd));
        Self::with_runner(runner, settings, workspace)
    }

    pub fn with_runner(runner: ProcessRunner, settings: &Settings, workspace: &[String]) -> Self {
        // 没有工作区时搜索用户主目录
        let project_roots = if workspace.is_empty() {
            vec![dirs::home_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| ".".to_string())]
        } else {
            workspace.to_vec()
        };
        Self {
            runner,
            default_option: settings.fd.default_option.clone(),
            platform_paths: settings.fd_paths(),
            project_roots,
            exclude_patterns: settings.fd.exclude_patterns.clone(),
            hint_shown: AtomicBool::new(false),
        }
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// 平台搜索路径未配置时的一次性提示
    pub fn path_hint(&self) -> Option<String> {
        if !self.platform_paths.is_empty() || self.hint_shown.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(format!(
            "请配置 fd.paths.{} 以扩大搜索范围",
            std::env::consts::OS
        ))
    }

    pub fn command_for(&self, text: &str, mode: &FdMode) -> Result<CommandLine> {
        if text.trim().is_empty() && mode.scoped_dir().is_none() {
            return Err(FindError::UserInputEmpty);
        }
        let mut paths = self.platform_paths.clone();
        paths.extend(self.project_roots.iter().cloned());
        Ok(build_command(
            &self.runner.program().program,
            text.trim(),
            mode,
            &self.default_option,
            &paths,
            &self.exclude_patterns,
        ))
    }

    pub async fn search(&self, text: &str, mode: &FdMode) -> Result<Vec<IndexEntry>> {
        let command = self.command_for(text, mode)?;
        let output = self.runner.run(&command).await?;
        if !output.stderr.trim().is_empty() {
            tracing::error!("fd stderr: {}", output.stderr.trim());
            return Err(FindError::BackendExecution {
                program: self.runner.program().program.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        let entries = parse_lines(&output.stdout, mode.entry_type());
        tracing::info!("fd 完成: {} 条", entries.len());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_lines_are_dropped() {
        let out = "/a/x.rs\n/a/y.rs\n/a/x.rs\n\n";
        let entries = parse_lines(out, EntryType::File);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].full_path(), "/a/x.rs");
        assert_eq!(entries[1].name, "y.rs");
    }

    #[cfg(not(windows))]
    #[test]
    fn file_mode_command() {
        let cmd = build_command(
            "fd",
            "main",
            &FdMode::Files,
            "-H -s",
            &["/opt/src".to_string(), "/home/me/my proj".to_string()],
            &["node_modules".to_string()],
        );
        assert_eq!(
            cmd.render(),
            "fd -a -t f -H -s main --full-path /opt/src '/home/me/my proj' -E node_modules"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn scoped_mode_lists_everything_under_dir() {
        let cmd = build_command("fd", "", &FdMode::FilesIn("/tmp/a b".into()), "-H -s", &[], &[]);
        assert_eq!(cmd.render(), "fd -a -t f -H -s -g '**/*' --full-path '/tmp/a b'");
    }

    #[test]
    fn directory_mode_yields_folders() {
        let entries = parse_lines("/srv/www/\n", FdMode::Directories.entry_type());
        assert!(entries[0].is_dir());
        assert_eq!(entries[0].name, "www");
    }
}
