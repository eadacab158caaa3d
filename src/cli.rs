use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use crate::config::{self, Settings};
use crate::context::{AppContext, HostParts, Workbench};
use crate::controller::{
    index_title, text_title, ItemButton, PickerController, PickerEvent, QuerySource, Scrollback, StaticSource,
};
use crate::decoration::ThemeKind;
use crate::diff::{DiffKind, ShellLauncher};
use crate::error::FindError;
use crate::fd::FdMode;
use crate::favorites::FavoritesStore;
use crate::history::HistoryStore;
use crate::host::{
    EditorHost, Notifier, Position, Range, ShowOptions, SystemClipboard, SystemEditor, TerminalDiffView,
    TerminalNotifier,
};
use crate::picker::TerminalPicker;
use crate::problem::{self, DiagnosticsSnapshot, Direction, SeverityFilter};
use crate::ripgrep::SearchVariant;
use crate::types::{IndexEntry, ListEntry, SearchQuery};

#[derive(Parser, Debug)]
#[command(author, version, about = "findsuite 统一搜索前端（ripgrep / fd / Everything）", long_about = None)]
pub struct CliArgs {
    /// 配置文件（默认=用户配置目录下的 findsuite/settings.json）
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// 工作区根目录，可多次指定（默认=当前目录）
    #[arg(short = 'w', long = "workspace", global = true)]
    pub workspace: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// ripgrep 文本搜索
    Rg(RgArgs),
    /// fd 文件名搜索
    Fd(FdArgs),
    /// Everything 索引搜索（Windows）
    Everything(EverythingArgs),
    /// 交互式选择列表，从标准输入读取事件
    Interactive(InteractiveArgs),
    /// 收藏夹
    #[command(subcommand)]
    Favorites(FavoritesCmd),
    /// 搜索历史
    #[command(subcommand)]
    History(HistoryCmd),
    /// 比较文件或目录（按顺序两两比较）
    Diff(DiffArgs),
    /// 诊断导航
    #[command(subcommand)]
    Problems(ProblemsCmd),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VariantArg {
    Text,
    Regex,
    Folder,
    Workspace,
    File,
    Favorites,
    Custom1,
    Custom2,
    Custom3,
}

#[derive(Args, Debug)]
pub struct RgArgs {
    /// 搜索内容，可包含 rg 选项
    pub query: String,

    #[arg(long, value_enum, default_value_t = VariantArg::Text)]
    pub variant: VariantArg,

    /// folder/file 变体的目标路径
    #[arg(short = 'p', long = "path")]
    pub path: Option<String>,

    /// 覆盖默认选项
    #[arg(short = 'o', long = "options")]
    pub options: Option<String>,
}

#[derive(Args, Debug)]
pub struct FdArgs {
    pub query: Option<String>,

    /// 搜索目录
    #[arg(short = 'd', long = "dirs")]
    pub dirs: bool,

    /// 只在该目录下搜索文件
    #[arg(short = 'i', long = "in")]
    pub within: Option<String>,

    /// 工作区内全部文件
    #[arg(long = "workspace-files")]
    pub workspace_files: bool,

    /// 在结果中继续用 rg 搜索文本（fd | rg）
    #[arg(long = "rg")]
    pub then_rg: Option<String>,
}

#[derive(Args, Debug)]
pub struct EverythingArgs {
    pub query: String,

    /// 过滤器名（files / folder / workspace / path / 用户预设...）
    #[arg(short = 'f', long = "filter", default_value = "files")]
    pub filter: String,

    /// path 过滤器的目录参数
    #[arg(short = 'a', long = "arg")]
    pub arg: Option<String>,

    /// 在结果中继续用 rg 搜索文本（everything | rg）
    #[arg(long = "rg")]
    pub then_rg: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Rg,
    Fd,
    Everything,
    Favorites,
    History,
}

#[derive(Args, Debug)]
pub struct InteractiveArgs {
    #[arg(short = 'b', long = "backend", value_enum, default_value_t = BackendArg::Rg)]
    pub backend: BackendArg,

    #[arg(long, value_enum, default_value_t = VariantArg::Text)]
    pub variant: VariantArg,

    #[arg(short = 'f', long = "filter", default_value = "files")]
    pub filter: String,

    /// 初始输入（例如编辑器选中的文字）
    #[arg(long = "initial")]
    pub initial: Option<String>,

    /// 用剪贴板内容作为初始输入
    #[arg(long = "from-clipboard")]
    pub from_clipboard: bool,
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCmd {
    Add {
        path: PathBuf,
        #[arg(long)]
        category: Option<String>,
    },
    Remove {
        id: String,
    },
    Protect {
        id: String,
    },
    List,
    Clear,
    Refresh,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCmd {
    List,
    Remove { id: String },
    Clear,
    /// 显示保存的结果，不重新搜索
    Show { id: String },
    /// 重新执行该查询
    Replay { id: String },
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    pub paths: Vec<String>,

    /// 目录比较（需要外部比较程序）
    #[arg(short = 'd', long = "dir")]
    pub dir: bool,
}

#[derive(Args, Debug)]
pub struct ProblemArgs {
    /// 诊断快照 JSON：{"<path>": [{range, severity, message, source}]}
    #[arg(long = "diagnostics")]
    pub diagnostics: PathBuf,

    /// 当前文件
    #[arg(long = "file")]
    pub file: Option<PathBuf>,

    /// 光标行（从 1 开始）
    #[arg(long = "line", default_value_t = 1)]
    pub line: u32,

    /// 光标列（从 1 开始）
    #[arg(long = "col", default_value_t = 1)]
    pub col: u32,

    /// 同时包含警告
    #[arg(long = "warnings")]
    pub warnings: bool,

    /// 跨文件
    #[arg(long = "all")]
    pub all: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProblemsCmd {
    Next(ProblemArgs),
    Prev(ProblemArgs),
    List(ProblemArgs),
}

fn envelope(query: &str, kind: &str, results: Value) -> Value {
    json!({
        "code": 0,
        "msg": "success",
        "query": query,
        "type": kind,
        "results": results
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn entry_json(entry: &ListEntry) -> Value {
    json!({
        "label": entry.label(),
        "description": entry.description(),
        "detail": entry.detail(),
        "path": entry.target_path(),
    })
}

fn variant_of(arg: VariantArg, path: Option<&str>, favorites: impl FnOnce() -> Vec<String>) -> SearchVariant {
    let here = || path.unwrap_or(".").to_string();
    match arg {
        VariantArg::Text => SearchVariant::Text,
        VariantArg::Regex => SearchVariant::Regex,
        VariantArg::Folder => SearchVariant::CurrentFolder(here()),
        VariantArg::Workspace => SearchVariant::Workspace,
        VariantArg::File => SearchVariant::CurrentFile(here()),
        VariantArg::Favorites => SearchVariant::Favorites(favorites()),
        VariantArg::Custom1 => SearchVariant::Custom(1),
        VariantArg::Custom2 => SearchVariant::Custom(2),
        VariantArg::Custom3 => SearchVariant::Custom(3),
    }
}

fn favorite_paths(settings: &Settings) -> Vec<String> {
    match FavoritesStore::from_settings(settings) {
        Ok(store) => store.paths(),
        Err(e) => {
            tracing::error!("收藏夹不可用: {}", e);
            Vec::new()
        }
    }
}

fn host_parts() -> HostParts {
    HostParts {
        editor: Box::new(SystemEditor::default()),
        clipboard: Box::new(SystemClipboard::default()),
        notifier: Box::new(TerminalNotifier),
        diff_view: Box::new(TerminalDiffView),
        launcher: Box::new(ShellLauncher::default()),
        theme: ThemeKind::Dark,
    }
}

// CLI入口
pub async fn run_cli(args: CliArgs) -> anyhow::Result<()> {
    let settings = Settings::load(args.config.as_deref());
    let workspace = if args.workspace.is_empty() {
        vec![std::env::current_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| ".".to_string())]
    } else {
        args.workspace.clone()
    };

    match dispatch(args.command, settings, workspace).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let output = json!({ "code": 1, "msg": format!("{:#}", e) });
            print_json(&output)?;
            Err(e)
        }
    }
}

async fn dispatch(command: Command, settings: Settings, workspace: Vec<String>) -> anyhow::Result<()> {
    match command {
        Command::Favorites(cmd) => return favorites(cmd, &settings),
        Command::History(cmd) => {
            let ctx = AppContext::new(settings, workspace);
            return history(cmd, &ctx).await;
        }
        Command::Diff(args) => return diff(args, &settings).await,
        Command::Problems(cmd) => return problems(cmd, &settings),
        _ => {}
    }

    let ctx = AppContext::new(settings, workspace);
    match command {
        Command::Rg(args) => rg(args, &ctx).await,
        Command::Fd(args) => fd(args, &ctx).await,
        Command::Everything(args) => everything(args, &ctx).await,
        Command::Interactive(args) => interactive(args, &ctx).await,
        _ => Ok(()),
    }
}

async fn rg(args: RgArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let variant = variant_of(args.variant, args.path.as_deref(), || favorite_paths(&ctx.settings));
    let mut query = ctx.variant_query(&variant);
    if let Some(options) = args.options {
        query = query.with_options(options);
    }
    let outcome = ctx.rg.search(&args.query, &query).await?;

    let mut history = HistoryStore::open(config::history_path(&ctx.settings), ctx.settings.history.max);
    history.record(&args.query, outcome.records.clone(), outcome.total)?;

    let mut output = envelope(&args.query, "text", serde_json::to_value(&outcome.records)?);
    output["title"] = json!(text_title(&query.title, &args.query, &outcome));
    output["total"] = json!(outcome.total);
    output["matches"] = json!(outcome.matches);
    output["capped"] = json!(outcome.capped);
    output["truncated"] = json!(outcome.truncated);
    print_json(&output)
}

async fn chain_rg(ctx: &AppContext, text: &str, entries: &[IndexEntry]) -> anyhow::Result<()> {
    let outcome = ctx.rg.search_in(text, entries).await?;
    let mut output = envelope(text, "text", serde_json::to_value(&outcome.records)?);
    output["total"] = json!(outcome.total);
    output["matches"] = json!(outcome.matches);
    print_json(&output)
}

async fn fd(args: FdArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let mode = if let Some(dir) = args.within {
        FdMode::FilesIn(dir)
    } else if args.workspace_files {
        FdMode::WorkspaceFiles
    } else if args.dirs {
        FdMode::Directories
    } else {
        FdMode::Files
    };
    if let Some(hint) = ctx.fd.path_hint() {
        TerminalNotifier.notify(&hint, Duration::from_millis(ctx.settings.notify.timeout_ms));
    }
    let text = args.query.unwrap_or_default();
    let entries = ctx.fd.search(&text, &mode).await?;
    if let Some(rg_text) = args.then_rg {
        return chain_rg(ctx, &rg_text, &entries).await;
    }
    let output = envelope(&text, "filename", serde_json::to_value(&entries)?);
    print_json(&output)
}

async fn everything(args: EverythingArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let client = ctx.index_client()?;
    let filter = client.filter(&args.filter, args.arg.as_deref())?;
    let entries = client.search(&filter, &args.query).await?;
    if let Some(rg_text) = args.then_rg {
        return chain_rg(ctx, &rg_text, &entries).await;
    }
    let mut output = envelope(&args.query, "index", serde_json::to_value(&entries)?);
    output["title"] = json!(index_title(&filter.title, &args.query, entries.len()));
    print_json(&output)
}

/// 标准输入的一行转换为事件：
/// 普通文字=输入变化，`:a N` 浏览第 N 项，`:N[,M..]` 接受，`:b N <按钮>`，`:q` 关闭
pub fn parse_event(line: &str) -> Option<PickerEvent> {
    let Some(cmd) = line.strip_prefix(':') else {
        return Some(PickerEvent::ChangeValue(line.to_string()));
    };
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts.as_slice() {
        ["q"] => Some(PickerEvent::Hide),
        ["a", n] => n.parse().ok().map(PickerEvent::ChangeActive),
        ["b", n, button] => {
            let button = match *button {
                "view" => ItemButton::View,
                "copy" => ItemButton::CopyPath,
                "append" => ItemButton::AppendPath,
                "fav" => ItemButton::Favorite,
                "diff" => ItemButton::Diff,
                "remove" => ItemButton::Remove,
                "protect" => ItemButton::Protect,
                _ => return None,
            };
            n.parse().ok().map(|index| PickerEvent::TriggerButton { index, button })
        }
        [list] => list
            .split(',')
            .map(|n| n.trim().parse().ok())
            .collect::<Option<Vec<usize>>>()
            .map(PickerEvent::Accept),
        _ => None,
    }
}

async fn interactive(args: InteractiveArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let mut bench = Workbench::open(&ctx.settings, host_parts()).context("初始化失败")?;

    let source: Arc<dyn QuerySource> = match args.backend {
        BackendArg::Rg => {
            let variant = variant_of(args.variant, None, || bench.favorites.paths());
            Arc::new(ctx.text_source(ctx.variant_query(&variant)))
        }
        BackendArg::Fd => Arc::new(ctx.file_source(FdMode::Files)),
        BackendArg::Everything => Arc::new(ctx.index_source(&args.filter, None)?),
        BackendArg::Favorites => Arc::new(StaticSource::new("Favorites", bench.favorites.rows())),
        BackendArg::History => Arc::new(StaticSource::new("Ripgrep History List", bench.history.rows())),
    };

    let initial = if args.from_clipboard {
        bench.clipboard.read_text().ok()
    } else {
        args.initial
    };

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_event(line.trim_end()) {
                Some(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                None => eprintln!("无法识别的输入: {}", line),
            }
        }
    });

    let mut view = TerminalPicker::default();
    let controller = PickerController::new(&mut bench, source, Scrollback::default(), ctx.query_timeout());
    let end = controller.run(&mut view, rx, initial).await;

    let results: Vec<Value> = end.selected.iter().map(entry_json).collect();
    let mut output = envelope(&end.value, "interactive", json!(results));
    output["state"] = json!(format!("{:?}", end.state));
    print_json(&output)
}

fn favorites(cmd: FavoritesCmd, settings: &Settings) -> anyhow::Result<()> {
    let mut store = FavoritesStore::from_settings(settings)?;
    let (kind, results) = match cmd {
        FavoritesCmd::Add { path, category } => {
            let path = std::fs::canonicalize(&path).unwrap_or(path);
            let added = store.add_with_category(&path, category.as_deref())?;
            ("add", json!({ "added": added, "path": path }))
        }
        FavoritesCmd::Remove { id } => ("remove", serde_json::to_value(store.remove(&id)?)?),
        FavoritesCmd::Protect { id } => ("protect", json!({ "id": id, "protect": store.toggle_protect(&id)? })),
        FavoritesCmd::List => ("list", serde_json::to_value(store.list())?),
        FavoritesCmd::Clear => {
            store.clear()?;
            ("clear", json!([]))
        }
        FavoritesCmd::Refresh => {
            store.refresh()?;
            ("refresh", serde_json::to_value(store.list())?)
        }
    };
    print_json(&envelope("", kind, results))
}

async fn history(cmd: HistoryCmd, ctx: &AppContext) -> anyhow::Result<()> {
    let settings = &ctx.settings;
    let mut store = HistoryStore::open(config::history_path(settings), settings.history.max);
    let output = match cmd {
        HistoryCmd::List => {
            let rows: Vec<Value> = store.rows().iter().map(entry_json).collect();
            let mut out = envelope("", "history", json!(rows));
            out["ids"] = json!(store.list().iter().map(|e| e.id.clone()).collect::<Vec<_>>());
            out
        }
        HistoryCmd::Remove { id } => {
            let removed = store.remove(&id)?;
            envelope("", "history", json!({ "removed": removed.is_some(), "id": id }))
        }
        HistoryCmd::Clear => {
            store.clear()?;
            envelope("", "history", json!([]))
        }
        HistoryCmd::Show { id } => {
            let entry = store
                .get(&id)
                .ok_or_else(|| FindError::Validation(format!("历史中不存在 <{}>", id)))?;
            let rows: Vec<Value> = store
                .detail(&id)
                .unwrap_or_default()
                .iter()
                .map(entry_json)
                .collect();
            let mut out = envelope(&entry.query, "history", json!(rows));
            out["title"] = json!(format!("History Details :: <{}>", entry.total));
            out
        }
        HistoryCmd::Replay { id } => {
            let query = store
                .get(&id)
                .map(|e| e.query.clone())
                .ok_or_else(|| FindError::Validation(format!("历史中不存在 <{}>", id)))?;
            let outcome = ctx.rg.search(&query, &SearchQuery::new("History")).await?;
            store.record(&query, outcome.records.clone(), outcome.total)?;
            envelope(&query, "text", serde_json::to_value(&outcome.records)?)
        }
    };
    print_json(&output)
}

async fn diff(args: DiffArgs, settings: &Settings) -> anyhow::Result<()> {
    let mut bench = Workbench::open(settings, host_parts())?;
    let kind = if args.dir { DiffKind::Directory } else { DiffKind::File };
    let invocations = if args.paths.len() == 2 {
        vec![bench.diff.diff_pair(&args.paths, kind)?]
    } else if args.paths.len() > 2 {
        bench.diff.diff_sequence(&args.paths, kind)?
    } else {
        return Err(FindError::Validation(format!("请选择两个文件，当前选择了 {} 个", args.paths.len())).into());
    };
    for task in bench.diff.take_pending() {
        let _ = task.await;
    }
    let results: Vec<Value> = invocations.iter().map(|i| json!(format!("{:?}", i))).collect();
    print_json(&envelope("", "diff", json!(results)))
}

fn problems(cmd: ProblemsCmd, settings: &Settings) -> anyhow::Result<()> {
    let (args, direction) = match cmd {
        ProblemsCmd::Next(a) => (a, Some(Direction::Next)),
        ProblemsCmd::Prev(a) => (a, Some(Direction::Prev)),
        ProblemsCmd::List(a) => (a, None),
    };
    let source = DiagnosticsSnapshot::load(&args.diagnostics)?;
    let filter = if args.warnings {
        SeverityFilter::ErrorAndWarning
    } else {
        SeverityFilter::ErrorOnly
    };
    let root = std::env::current_dir().ok();

    let Some(direction) = direction else {
        let rows = match &args.file {
            Some(file) if !args.all => problem::list_in_file(file, &source, filter, root.as_deref()),
            _ => problem::list_in_files(&source, filter, root.as_deref()),
        };
        let results: Vec<Value> = rows.iter().map(entry_json).collect();
        let mut out = envelope("", "problems", json!(results));
        out["title"] = json!(filter.title());
        return print_json(&out);
    };

    let mut bench = Workbench::open(settings, host_parts())?;
    let editor = bench.selection.editor();
    if let Some(file) = &args.file {
        place_caret(editor, file, args.line, args.col)?;
    }
    let moved = if args.all {
        bench.problems.goto_in_files(editor, &source, filter, direction)?
    } else {
        bench.problems.goto_in_file(editor, &source, filter, direction, true)?
    };

    let position = editor
        .active_view()
        .and_then(|v| Some((editor.view_path(v)?, editor.selection(v)?)))
        .map(|(path, range)| {
            json!({
                "path": path,
                "line": range.start.line + 1,
                "col": range.start.character + 1,
            })
        });
    print_json(&envelope("", "problems", json!({ "moved": moved, "position": position })))
}

fn place_caret(editor: &mut dyn EditorHost, file: &Path, line: u32, col: u32) -> crate::Result<()> {
    let doc = editor.open_document(file)?;
    let view = editor.show_document(doc, ShowOptions::preview())?;
    let pos = Position::new(line.saturating_sub(1), col.saturating_sub(1));
    editor.set_selection(view, Range::caret(pos));
    Ok(())
}
