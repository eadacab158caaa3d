use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::{self, Settings};
use crate::error::{FindError, Result};

/// 外部命令行后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Ripgrep,
    Fd,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Ripgrep => "rg",
            Backend::Fd => "fd",
        }
    }

    fn version_dir(&self) -> &'static str {
        match self {
            Backend::Ripgrep => config::RG_VERSION,
            Backend::Fd => config::FD_VERSION,
        }
    }
}

/// 解析后的可执行程序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProgram {
    pub backend: Backend,
    pub program: String,
    /// 使用随包分发的二进制
    pub bundled: bool,
}

/// 内置二进制位置: `<ext>/bin/<ver>/<platform>[-armv7]/<name>[.exe]`
pub fn bundled_path(ext_dir: &Path, backend: Backend, os: &str, arch: &str) -> Option<PathBuf> {
    let base = ext_dir.join("bin").join(backend.version_dir());
    let name = backend.name();
    match os {
        "windows" => Some(base.join("win32").join(format!("{}.exe", name))),
        "macos" => Some(base.join("darwin").join(name)),
        "linux" => {
            let arm = arch == "arm" || arch == "aarch64";
            if arm && backend == Backend::Ripgrep {
                Some(base.join("linux-armv7").join(name))
            } else {
                Some(base.join("linux").join(name))
            }
        }
        _ => None,
    }
}

/// 选择后端程序：启用内置时用随包二进制，否则用配置的程序名（经 PATH 查找）
pub fn resolve_program(settings: &Settings, backend: Backend) -> ResolvedProgram {
    let (internal, configured) = match backend {
        Backend::Ripgrep => (settings.rg.internal_enabled, settings.rg.program.current()),
        Backend::Fd => (settings.fd.internal_enabled, settings.fd.program.current()),
    };

    if internal {
        let ext_dir = settings.extension_dir();
        if let Some(path) = bundled_path(
            &ext_dir,
            backend,
            std::env::consts::OS,
            std::env::consts::ARCH,
        ) {
            return ResolvedProgram {
                backend,
                program: path.to_string_lossy().to_string(),
                bundled: true,
            };
        }
    }

    let program = if configured.trim().is_empty() {
        backend.name().to_string()
    } else {
        configured.clone()
    };
    ResolvedProgram {
        backend,
        program,
        bundled: false,
    }
}

/// 路径/参数加引号
#[cfg(not(windows))]
pub fn quote_arg(arg: &str) -> String {
    shell_words::quote(arg).into_owned()
}

/// cmd.exe 只认双引号
#[cfg(windows)]
pub fn quote_arg(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// 无论内容都加引号，用于含 `!`/`{}` 的 glob，避免 shell 展开
#[cfg(not(windows))]
pub fn force_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(windows)]
pub fn force_quote(arg: &str) -> String {
    quote_arg(arg)
}

/// 字面量模式下转义正则元字符
pub fn escape_query(text: &str, raw_regex: bool) -> String {
    if raw_regex {
        text.to_string()
    } else {
        regex::escape(text)
    }
}

/// 逐段拼接的 shell 命令行，记录日志的就是实际执行的字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    parts: Vec<String>,
}

impl CommandLine {
    pub fn new(program: &str) -> Self {
        Self {
            parts: vec![quote_arg(program)],
        }
    }

    /// 加引号的参数
    pub fn arg(mut self, arg: &str) -> Self {
        self.parts.push(quote_arg(arg));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for a in args {
            self.parts.push(quote_arg(a.as_ref()));
        }
        self
    }

    /// 总是加引号的参数
    pub fn quoted(mut self, arg: &str) -> Self {
        self.parts.push(force_quote(arg));
        self
    }

    /// 原样插入（用户配置的选项片段）
    pub fn raw(mut self, fragment: &str) -> Self {
        let fragment = fragment.trim();
        if !fragment.is_empty() {
            self.parts.push(fragment.to_string());
        }
        self
    }

    pub fn render(&self) -> String {
        self.parts.join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// 子进程输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// 输出超过上限被截断
    pub truncated: bool,
    pub status: Option<i32>,
}

impl RunOutput {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().filter(|l| !l.trim().is_empty())
    }
}

/// 智能检测编码：先尝试 UTF-8，失败则按 GBK 解码
pub fn decode_output(bytes: &[u8]) -> String {
    let (decoded_utf8, _, had_errors_utf8) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors_utf8 {
        decoded_utf8.into_owned()
    } else {
        let (decoded_gbk, _, _) = encoding_rs::GBK.decode(bytes);
        decoded_gbk.into_owned()
    }
}

fn shell_command(line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").raw_arg(line);
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
}

/// 通过系统 shell 执行命令行，stdout 最多保留 `max_bytes` 字节。
///
/// 超出上限后继续读完剩余输出（让子进程正常退出），只丢弃多余部分并标记 `truncated`。
pub async fn execute(line: &str, cwd: Option<&Path>, max_bytes: usize) -> Result<RunOutput> {
    tracing::debug!("执行命令: {}", line);
    let mut cmd = shell_command(line);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| FindError::BackendUnavailable {
        program: line.split_whitespace().next().unwrap_or_default().to_string(),
        reason: format!("无法启动子进程: {}", e),
    })?;

    let mut stdout = child.stdout.take().ok_or_else(|| FindError::BackendExecution {
        program: line.to_string(),
        stderr: "无法获取 stdout".to_string(),
    })?;
    let stderr_pipe = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::warn!("读取 stderr 失败: {}", e);
            }
        }
        buf
    });

    let mut collected: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];
    let mut truncated = false;
    loop {
        let n = stdout
            .read(&mut chunk)
            .await
            .map_err(|e| FindError::BackendExecution {
                program: line.to_string(),
                stderr: format!("读取 stdout 失败: {}", e),
            })?;
        if n == 0 {
            break;
        }
        let room = max_bytes.saturating_sub(collected.len());
        if room > 0 {
            collected.extend_from_slice(&chunk[..n.min(room)]);
        }
        if n > room {
            truncated = true;
        }
    }

    if truncated {
        // 丢弃被截断的半行
        if let Some(pos) = collected.iter().rposition(|b| *b == b'\n') {
            collected.truncate(pos + 1);
        }
        tracing::warn!("输出超过 {} 字节，已截断", max_bytes);
    }

    let status = child
        .wait()
        .await
        .map_err(|e| FindError::BackendExecution {
            program: line.to_string(),
            stderr: format!("等待子进程失败: {}", e),
        })?;
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    let output = RunOutput {
        stdout: decode_output(&collected),
        stderr: decode_output(&stderr_bytes),
        truncated,
        status: status.code(),
    };
    tracing::debug!(
        "命令结束: status={:?}, stdout={} 字节, stderr={} 字节",
        output.status,
        collected.len(),
        stderr_bytes.len()
    );
    Ok(output)
}

/// 绑定某个后端程序的执行器，首次使用时探测程序是否可用并缓存结果
pub struct ProcessRunner {
    program: ResolvedProgram,
    max_bytes: usize,
    cwd: Option<PathBuf>,
    probe: tokio::sync::OnceCell<std::result::Result<(), String>>,
}

impl ProcessRunner {
    pub fn new(program: ResolvedProgram) -> Self {
        Self {
            program,
            max_bytes: config::MAX_BUF_SIZE,
            cwd: None,
            probe: tokio::sync::OnceCell::new(),
        }
    }

    pub fn with_limit(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn program(&self) -> &ResolvedProgram {
        &self.program
    }

    /// 一次性能力探测（进程生命周期内只执行一次）
    pub async fn ensure_available(&self) -> Result<()> {
        let outcome = self
            .probe
            .get_or_init(|| probe_program(&self.program))
            .await;
        outcome.clone().map_err(|reason| FindError::BackendUnavailable {
            program: self.program.program.clone(),
            reason,
        })
    }

    pub async fn run(&self, command: &CommandLine) -> Result<RunOutput> {
        self.ensure_available().await?;
        let line = command.render();
        tracing::info!("{} 命令: {}", self.program.backend.name(), line);
        execute(&line, self.cwd.as_deref(), self.max_bytes).await
    }
}

async fn probe_program(program: &ResolvedProgram) -> std::result::Result<(), String> {
    if cfg!(windows) {
        if program.bundled && !Path::new(&program.program).exists() {
            return Err(format!("内置程序不存在: {}", program.program));
        }
        return Ok(());
    }

    #[cfg(unix)]
    if program.bundled {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        match tokio::fs::set_permissions(&program.program, perms).await {
            Ok(()) => tracing::info!("{} 已添加执行权限", program.program),
            Err(e) => tracing::error!("添加执行权限失败 {}: {}", program.program, e),
        }
    }

    let output = Command::new("which")
        .arg(&program.program)
        .output()
        .await
        .map_err(|e| format!("无法执行 which: {}", e))?;
    let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || found.is_empty() {
        return Err(format!("{} 未安装或不可执行", program.program));
    }
    tracing::info!("{} 位于 {}", program.program, found);
    Ok(())
}
