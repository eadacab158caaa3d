use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::{self, Settings};
use crate::error::{FindError, Result};
use crate::runner::{escape_query, resolve_program, Backend, CommandLine, ProcessRunner};
use crate::types::{normalize_path, IndexEntry, MatchRecord, SearchOutcome, SearchQuery, SearchSummary};

static OPTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--?[a-z]+").expect("静态正则"));

fn is_option(token: &str) -> bool {
    OPTION_RE.is_match(token)
}

fn is_word_quoted(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('"') && token[1..].contains('"')
}

/// 输入框内容拆分为 rg 参数。
///
/// 选项 (`-x` / `--xx`) 单独成项，选项后的第一个词开始新参数，其余词用空格接到前一个参数上。
/// 未设置 `skip_quote` 时去掉引号。
pub fn tokenize_value(value: &str, skip_quote: bool) -> Vec<String> {
    let mut acc: Vec<String> = Vec::new();
    for (index, curr) in value.split_whitespace().enumerate() {
        let after_option = acc.last().map(|s| is_option(s)).unwrap_or(false);
        if index == 0 || is_option(curr) || after_option {
            if !is_word_quoted(curr) && !is_option(curr) {
                acc.push(curr.to_string());
            } else if skip_quote {
                acc.push(curr.to_string());
            } else {
                acc.push(curr.replace('"', ""));
            }
            continue;
        }
        if let Some(last) = acc.last_mut() {
            last.push(' ');
            last.push_str(curr);
        }
    }
    acc
}

/// 参数中的搜索模式：第一个非选项项
fn pattern_index(tokens: &[String]) -> Option<usize> {
    tokens.iter().position(|t| !t.starts_with('-'))
}

/// 构造 rg 命令：`<program> <query> -n <options> [-g '!{..}'] <paths...> --json`
pub fn build_command(
    program: &str,
    tokens: &[String],
    query: &SearchQuery,
    default_option: &str,
    exclude_patterns: &[String],
    roots: &[String],
) -> CommandLine {
    let pattern_at = pattern_index(tokens);
    let mut cmd = CommandLine::new(program);
    for (i, token) in tokens.iter().enumerate() {
        let text = if Some(i) == pattern_at {
            escape_query(token, query.raw_regex)
        } else {
            token.clone()
        };
        cmd = if query.skip_shell_quoting {
            cmd.raw(&text)
        } else {
            cmd.arg(&text)
        };
    }
    cmd = cmd.raw("-n").raw(query.resolved_options(default_option));
    if !exclude_patterns.is_empty() {
        cmd = cmd.raw("-g").quoted(&format!("!{{{}}}", exclude_patterns.join(",")));
    }
    cmd.args(roots).raw("--json")
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(default)]
    text: Option<String>,
}

impl Text {
    fn into_string(self) -> String {
        self.text.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct SubMatch {
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
struct MatchData {
    path: Text,
    #[serde(default)]
    lines: Text,
    line_number: Option<u64>,
    #[serde(default)]
    submatches: Vec<SubMatch>,
}

/// 解析 `rg --json` 输出（纯函数）。
///
/// `begin` 计文件数，`match` 计匹配数并生成记录（只取第一个 submatch），
/// 达到 `cap` 后停止累积但继续读完整个流。
pub fn parse_json_lines(stdout: &str, cap: usize, source_options: &str) -> Result<SearchOutcome> {
    let mut outcome = SearchOutcome::default();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: RawEvent = serde_json::from_str(line).map_err(|_| FindError::malformed(line))?;
        match event.kind.as_str() {
            "begin" => {
                if outcome.matches >= cap {
                    outcome.capped = true;
                }
                if !outcome.capped {
                    outcome.total += 1;
                }
            }
            "match" => {
                if outcome.matches >= cap {
                    outcome.capped = true;
                    continue;
                }
                let data: MatchData =
                    serde_json::from_value(event.data).map_err(|_| FindError::malformed(line))?;
                let (start, end) = data
                    .submatches
                    .first()
                    .map(|s| (s.start, s.end.max(s.start)))
                    .unwrap_or((0, 0));
                let text = data.lines.into_string();
                outcome.records.push(MatchRecord {
                    file_path: normalize_path(&data.path.into_string()),
                    line_number: data.line_number.unwrap_or(1).max(1),
                    column_start: start,
                    column_end: end,
                    matched_line_text: text.trim_end_matches(['\n', '\r']).to_string(),
                    source_options: source_options.to_string(),
                });
                outcome.matches += 1;
            }
            "summary" => {
                let stats = &event.data["stats"];
                outcome.summary = Some(SearchSummary {
                    matched_lines: stats["matched_lines"].as_u64().unwrap_or(0),
                    matches: stats["matches"].as_u64().unwrap_or(0),
                    searches_with_match: stats["searches_with_match"].as_u64().unwrap_or(0),
                    elapsed: event.data["elapsed_total"]["human"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(outcome)
}

/// 预置的搜索命令变体
#[derive(Debug, Clone, PartialEq)]
pub enum SearchVariant {
    Text,
    Regex,
    CurrentFolder(String),
    Workspace,
    CurrentFile(String),
    Favorites(Vec<String>),
    /// 1..=3
    Custom(usize),
}

impl SearchVariant {
    pub fn query(&self, settings: &Settings, workspace: &[String]) -> SearchQuery {
        match self {
            SearchVariant::Text => SearchQuery::new("Text"),
            SearchVariant::Regex => SearchQuery::new("Regex").with_hint("Usage: (Get|Post)").raw(),
            SearchVariant::CurrentFolder(dir) => {
                SearchQuery::new("Current Folder").with_paths(vec![dir.clone()])
            }
            SearchVariant::Workspace => SearchQuery::new("Workspace").with_paths(workspace.to_vec()),
            SearchVariant::CurrentFile(file) => {
                SearchQuery::new("Current File").with_paths(vec![file.clone()])
            }
            SearchVariant::Favorites(paths) => {
                let mut q = SearchQuery::new("Favorites").with_paths(paths.clone());
                q.many_select = true;
                q
            }
            SearchVariant::Custom(n) => {
                let options = settings
                    .rg
                    .custom
                    .get(n.saturating_sub(1))
                    .cloned()
                    .unwrap_or_default();
                SearchQuery::new(format!("Custom {}", n)).with_options(options)
            }
        }
    }
}

/// 链式搜索：把索引结果作为 rg 的搜索路径，超过上限时在启动进程前拒绝
pub fn chain_roots(entries: &[IndexEntry], limit: usize) -> Result<Vec<String>> {
    if entries.is_empty() {
        return Err(FindError::Validation("请先选择要搜索的文件或目录".into()));
    }
    if entries.len() > limit {
        return Err(FindError::CapacityExceeded {
            count: entries.len(),
            limit,
        });
    }
    Ok(entries.iter().map(|e| e.full_path()).collect())
}

/// ripgrep 后端
pub struct RgSearch {
    runner: ProcessRunner,
    default_option: String,
    count: usize,
    exclude_patterns: Vec<String>,
    project_root: String,
}

impl RgSearch {
    pub fn new(settings: &Settings, workspace: &[String]) -> Self {
        let runner = ProcessRunner::new(resolve_program(settings, Backend::Ripgrep));
        Self::with_runner(runner, settings, workspace)
    }

    pub fn with_runner(runner: ProcessRunner, settings: &Settings, workspace: &[String]) -> Self {
        Self {
            runner,
            default_option: settings.rg.default_option.clone(),
            count: settings.rg.count,
            exclude_patterns: settings.rg.exclude_patterns.clone(),
            project_root: workspace.first().cloned().unwrap_or_else(|| ".".to_string()),
        }
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn command_for(&self, value: &str, query: &SearchQuery) -> Result<CommandLine> {
        let tokens = tokenize_value(value, query.skip_shell_quoting);
        if tokens.is_empty() {
            return Err(FindError::UserInputEmpty);
        }
        let roots = if query.search_paths.is_empty() {
            vec![self.project_root.clone()]
        } else {
            query.search_paths.clone()
        };
        Ok(build_command(
            &self.runner.program().program,
            &tokens,
            query,
            &self.default_option,
            &self.exclude_patterns,
            &roots,
        ))
    }

    pub async fn search(&self, value: &str, query: &SearchQuery) -> Result<SearchOutcome> {
        let command = self.command_for(value, query)?;
        let output = self.runner.run(&command).await?;
        if !output.stderr.trim().is_empty() {
            tracing::error!("rg stderr: {}", output.stderr.trim());
            return Err(FindError::BackendExecution {
                program: self.runner.program().program.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        let options = query.resolved_options(&self.default_option).to_string();
        let mut outcome = parse_json_lines(&output.stdout, self.count, &options)?;
        outcome.truncated = output.truncated;
        tracing::info!(
            "rg 完成: {} 个文件, {} 条匹配{}",
            outcome.total,
            outcome.matches,
            if outcome.capped { " (已达上限)" } else { "" }
        );
        Ok(outcome)
    }

    /// 在索引/文件名搜索选中的条目中继续搜索文本
    pub async fn search_in(&self, value: &str, entries: &[IndexEntry]) -> Result<SearchOutcome> {
        let roots = chain_roots(entries, config::RG_LIMITS)?;
        let query = SearchQuery::new("Chained").with_paths(roots);
        self.search(value, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEGIN: &str = r#"{"type":"begin","data":{"path":{"text":"/a/b.ts"}}}"#;
    const MATCH: &str = r#"{"type":"match","data":{"path":{"text":"/a/b.ts"},"line_number":3,"lines":{"text":"foo bar"},"submatches":[{"match":{"text":"bar"},"start":4,"end":7}]}}"#;

    #[test]
    fn tokenizer_groups_words_and_options() {
        assert_eq!(tokenize_value("foo bar", false), vec!["foo bar"]);
        assert_eq!(
            tokenize_value("foo -g *.rs -i", false),
            vec!["foo", "-g", "*.rs", "-i"]
        );
        assert_eq!(tokenize_value("\"ab\" -w", false), vec!["ab", "-w"]);
        assert_eq!(tokenize_value("\"ab\" -w", true), vec!["\"ab\"", "-w"]);
        assert!(tokenize_value("   ", false).is_empty());
    }

    #[cfg(not(windows))]
    #[test]
    fn command_shape() {
        let query = SearchQuery::new("Text");
        let cmd = build_command(
            "rg",
            &["a.b".to_string()],
            &query,
            "--hidden -S",
            &["node_modules".to_string(), "target".to_string()],
            &["/my dir".to_string()],
        );
        assert_eq!(
            cmd.render(),
            r#"rg 'a\.b' -n --hidden -S -g '!{node_modules,target}' '/my dir' --json"#
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn raw_regex_and_custom_options() {
        let query = SearchQuery::new("Regex").raw().with_options("-w");
        let cmd = build_command("rg", &["(Get|Post)".to_string()], &query, "--hidden -S", &[], &[".".to_string()]);
        assert_eq!(cmd.render(), "rg '(Get|Post)' -n -w . --json");
    }

    #[test]
    fn summary_is_kept_but_not_rendered() {
        let summary = r#"{"type":"summary","data":{"elapsed_total":{"human":"0.01s","nanos":1,"secs":0},"stats":{"matched_lines":1,"matches":1,"searches_with_match":1}}}"#;
        let input = format!("{}\n{}\n{}\n", BEGIN, MATCH, summary);
        let out = parse_json_lines(&input, 10, "").unwrap();
        assert_eq!(out.records.len(), 1);
        let s = out.summary.unwrap();
        assert_eq!(s.matched_lines, 1);
        assert_eq!(s.elapsed, "0.01s");
    }

    #[test]
    fn cap_reached_on_file_boundary_stops_counting_files() {
        let mut input = String::new();
        for f in 0..3 {
            let path = format!("/d/f{}.rs", f);
            input.push_str(&BEGIN.replace("/a/b.ts", &path));
            input.push('\n');
            for _ in 0..2 {
                input.push_str(&MATCH.replace("/a/b.ts", &path));
                input.push('\n');
            }
        }
        let out = parse_json_lines(&input, 4, "").unwrap();
        assert_eq!(out.records.len(), 4);
        assert_eq!(out.total, 2);
        assert!(out.capped);
    }

    #[test]
    fn non_json_line_is_malformed() {
        let err = parse_json_lines("{oops", 10, "").unwrap_err();
        assert!(matches!(err, FindError::MalformedResponse { .. }));
    }

    #[test]
    fn chain_rejects_over_limit() {
        let entries: Vec<IndexEntry> = (0..3)
            .map(|i| IndexEntry::from_full_path(&format!("/d/f{}", i), crate::types::EntryType::File))
            .collect();
        assert!(matches!(
            chain_roots(&entries, 2),
            Err(FindError::CapacityExceeded { count: 3, limit: 2 })
        ));
        assert_eq!(chain_roots(&entries, 3).unwrap().len(), 3);
    }

    #[test]
    fn custom_variant_uses_preset() {
        let settings = Settings::default();
        let q = SearchVariant::Custom(2).query(&settings, &[]);
        assert_eq!(q.backend_options, settings.rg.custom[1]);
        assert_eq!(q.title, "Custom 2");
        assert!(SearchVariant::Regex.query(&settings, &[]).raw_regex);
    }
}
