use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer};

use crate::config::{EverythingFilter, Settings};
use crate::error::{FindError, Result};
use crate::types::{EntryType, IndexEntry};

fn preset(query: &str, sort: &str, title: &str, many: bool) -> EverythingFilter {
    EverythingFilter {
        query: query.to_string(),
        sort: sort.to_string(),
        ascending: true,
        title: title.to_string(),
        many,
        ..Default::default()
    }
}

/// 内置过滤器（workspace / path 依赖运行时信息，单独构造）
static BUILTIN_FILTERS: Lazy<HashMap<&'static str, EverythingFilter>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("files", preset("files:", "date_modified", "Open Files", false));
    m.insert(
        "filesPipe",
        preset("files:", "date_modified", "Select Files and Rg (Like everything | rg)", true),
    );
    m.insert("folder", preset("folder:", "date_modified", "Open Folder", false));
    m.insert(
        "folderPipe",
        preset("folder:", "date_modified", "Select Folders and Rg (Like everything | rg)", true),
    );
    m.insert("diffFiles", preset("files:", "date_modified", "Select Files to Diff", true));
    m.insert("diffFolder", preset("folder:", "date_modified", "Select Folders to Diff", true));
    m.insert("folderFiles", preset("folder:", "date_modified", "Search Folder (1/2)", false));
    m.insert(
        "code-workspace",
        preset("ext:code-workspace", "name", "Open new window with workspace", false),
    );
    m
});

fn default_filter() -> EverythingFilter {
    EverythingFilter {
        sort: "name".into(),
        ascending: true,
        description: "Search All".into(),
        ..Default::default()
    }
}

/// 按名字取过滤器：用户预设优先，其次内置，最后默认过滤器
pub fn resolve_filter(
    name: &str,
    presets: &BTreeMap<String, EverythingFilter>,
    workspace: &[String],
    arg: Option<&str>,
) -> Result<EverythingFilter> {
    if let Some(f) = presets.get(name) {
        return Ok(f.clone());
    }
    if let Some(f) = BUILTIN_FILTERS.get(name) {
        return Ok(f.clone());
    }
    match name {
        "workspace" => {
            if workspace.is_empty() {
                return Err(FindError::Validation("当前没有打开的工作区".into()));
            }
            Ok(preset(
                &format!("path:{} files:", workspace.join("|")),
                "name",
                "Open Files",
                true,
            ))
        }
        "path" => Ok(preset(
            &format!("path:{}", arg.unwrap_or_default()),
            "name",
            "Open Folder",
            false,
        )),
        _ => Ok(default_filter()),
    }
}

/// 拼接发送给 Everything 的查询串。
///
/// 多个词之间用空格连接，编码进 URL 后即为 `+`。
pub fn build_search_query(
    filter: &EverythingFilter,
    text: &str,
    exclude_patterns: &[String],
    workspace: &[String],
) -> String {
    if filter.in_workspace {
        if workspace.is_empty() {
            return text.to_string();
        }
        return workspace
            .iter()
            .map(|ws| format!("{}\\*{}*", ws, text))
            .collect::<Vec<_>>()
            .join(" | ");
    }

    let mut parts: Vec<String> = Vec::new();
    if !filter.query.is_empty() {
        parts.push(filter.query.clone());
        parts.extend(
            exclude_patterns
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| format!("!path:{}", p)),
        );
    }
    parts.extend(text.split_whitespace().map(str::to_string));
    parts.join(" ").trim().to_string()
}

fn flag(v: bool) -> String {
    if v { "1" } else { "0" }.to_string()
}

pub fn build_url(
    host: &str,
    port: u16,
    filter: &EverythingFilter,
    q: &str,
    count: usize,
) -> Result<reqwest::Url> {
    let sort = if filter.sort.is_empty() { "name" } else { filter.sort.as_str() };
    let params: Vec<(&str, String)> = vec![
        ("json", "1".into()),
        ("path_column", "1".into()),
        ("size_column", "1".into()),
        ("date_modified_column", "1".into()),
        ("q", q.to_string()),
        ("path", flag(filter.fullpath)),
        ("sort", sort.to_string()),
        ("ascending", flag(filter.ascending)),
        ("regex", flag(filter.regex)),
        ("count", count.to_string()),
    ];
    let base = format!("http://{}:{}/", host, port);
    reqwest::Url::parse_with_params(&base, &params)
        .map_err(|e| FindError::Validation(format!("无效的 Everything 地址 {}: {}", base, e)))
}

/// Everything 的 size / date_modified 可能是数字也可能是字符串
fn de_opt_u64<'de, D>(d: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type", default)]
    kind: String,
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default, deserialize_with = "de_opt_u64")]
    size: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    date_modified: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    results: Vec<RawEntry>,
}

/// 解析 HTTP 响应（纯函数），非 2xx 或 JSON 错误都会被拒绝
pub fn parse_response(status: u16, body: &str) -> Result<Vec<IndexEntry>> {
    if !(200..300).contains(&status) {
        return Err(FindError::Http(format!(
            "Everything 返回异常状态码: {}",
            status
        )));
    }
    let raw: RawResponse = serde_json::from_str(body).map_err(|_| FindError::malformed(body))?;
    Ok(raw
        .results
        .into_iter()
        .map(|r| IndexEntry {
            entry_type: if r.kind == "file" {
                EntryType::File
            } else {
                EntryType::Folder
            },
            name: r.name,
            path: r.path,
            size: r.size,
            date_modified: r.date_modified,
        })
        .collect())
}

/// Everything HTTP 客户端（仅 Windows 上构造）
pub struct IndexSearchClient {
    http: reqwest::Client,
    host: String,
    port: u16,
    count: usize,
    limit_open_file: usize,
    exclude_patterns: Vec<String>,
    presets: BTreeMap<String, EverythingFilter>,
    workspace: Vec<String>,
}

impl IndexSearchClient {
    /// 非 Windows 平台返回 None，除非配置了 `everything.force`
    pub fn for_platform(settings: &Settings, workspace: &[String]) -> Option<Self> {
        if !cfg!(windows) && !settings.everything.force {
            return None;
        }
        match Self::new(settings, workspace) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Everything 客户端初始化失败: {}", e);
                None
            }
        }
    }

    pub fn new(settings: &Settings, workspace: &[String]) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.query.timeout_ms))
            .build()?;
        let ev = &settings.everything;
        Ok(Self {
            http,
            host: ev.host.clone(),
            port: ev.port,
            count: ev.count,
            limit_open_file: ev.limit_open_file,
            exclude_patterns: ev.exclude_patterns.clone(),
            presets: ev.filters.clone(),
            workspace: workspace.to_vec(),
        })
    }

    pub fn filter(&self, name: &str, arg: Option<&str>) -> Result<EverythingFilter> {
        resolve_filter(name, &self.presets, &self.workspace, arg)
    }

    pub fn url_for(&self, filter: &EverythingFilter, text: &str) -> Result<reqwest::Url> {
        let q = build_search_query(filter, text, &self.exclude_patterns, &self.workspace);
        build_url(&self.host, self.port, filter, &q, self.count)
    }

    pub async fn search(&self, filter: &EverythingFilter, text: &str) -> Result<Vec<IndexEntry>> {
        if text.trim().is_empty() && filter.query.is_empty() {
            return Err(FindError::UserInputEmpty);
        }
        let url = self.url_for(filter, text)?;
        tracing::info!("Everything 请求: {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let entries = parse_response(status, &body)?;
        tracing::info!("Everything 返回 {} 条", entries.len());
        Ok(entries)
    }

    /// 一次最多打开 `limit_open_file` 个结果
    pub fn limit_open<'a>(&self, entries: &'a [IndexEntry]) -> &'a [IndexEntry] {
        let n = entries.len().min(self.limit_open_file);
        if n < entries.len() {
            tracing::warn!("选中 {} 项，只打开前 {} 项", entries.len(), n);
        }
        &entries[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_query_with_excludes() {
        let f = resolve_filter("files", &BTreeMap::new(), &[], None).unwrap();
        let q = build_search_query(&f, "foo  bar", &["C:\\tmp".into(), String::new()], &[]);
        assert_eq!(q, "files: !path:C:\\tmp foo bar");
    }

    #[test]
    fn workspace_patterns_are_alternatives() {
        let f = EverythingFilter {
            in_workspace: true,
            ..Default::default()
        };
        let ws = vec!["C:\\a".to_string(), "D:\\b".to_string()];
        assert_eq!(build_search_query(&f, "x", &[], &ws), "C:\\a\\*x* | D:\\b\\*x*");
    }

    #[test]
    fn user_preset_overrides_builtin() {
        let mut presets = BTreeMap::new();
        presets.insert("files".to_string(), preset("ext:rs", "size", "Rust", false));
        let f = resolve_filter("files", &presets, &[], None).unwrap();
        assert_eq!(f.query, "ext:rs");
        assert!(resolve_filter("workspace", &BTreeMap::new(), &[], None).is_err());
    }

    #[test]
    fn url_is_encoded() {
        let f = resolve_filter("files", &BTreeMap::new(), &[], None).unwrap();
        let url = build_url("127.0.0.1", 3380, &f, "files: a b", 500).unwrap();
        let s = url.as_str();
        assert!(s.starts_with("http://127.0.0.1:3380/?json=1&path_column=1"));
        assert!(s.contains("q=files%3A+a+b"));
        assert!(s.contains("sort=date_modified"));
        assert!(s.contains("ascending=1"));
        assert!(s.ends_with("count=500"));
    }

    #[test]
    fn string_sizes_are_accepted() {
        let body = r#"{"totalResults":2,"results":[
            {"type":"file","name":"a.txt","path":"C:\\d","size":"2048","date_modified":"133000000000000000"},
            {"type":"folder","name":"d","path":"C:\\"}
        ]}"#;
        let entries = parse_response(200, body).unwrap();
        assert_eq!(entries[0].size, Some(2048));
        assert_eq!(entries[0].display_label(), "a.txt (2.0 KB)");
        assert_eq!(entries[1].entry_type, EntryType::Folder);
        assert_eq!(entries[1].display_label(), "d");
    }

    #[test]
    fn rejects_bad_status_and_body() {
        assert!(matches!(parse_response(503, "{}"), Err(FindError::Http(_))));
        assert!(matches!(
            parse_response(200, "<html>"),
            Err(FindError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn client_only_on_windows_unless_forced() {
        let mut settings = Settings::default();
        let client = IndexSearchClient::for_platform(&settings, &[]);
        assert_eq!(client.is_some(), cfg!(windows));
        settings.everything.force = true;
        assert!(IndexSearchClient::for_platform(&settings, &[]).is_some());
    }
}
