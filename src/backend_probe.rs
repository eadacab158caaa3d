use std::path::PathBuf;

use findsuite::config::Settings;
use findsuite::context::AppContext;
use findsuite::fd::FdMode;
use findsuite::ripgrep::SearchVariant;
use findsuite::types::{MatchRecord, SearchQuery};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    println!("=== 搜索后端探测 (自动化场景验证) ===");

    let config = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config.as_deref());
    let root = std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| ".".to_string());
    let ctx = AppContext::new(settings, vec![root.clone()]);

    let rg_ok = match ctx.rg.runner().ensure_available().await {
        Ok(()) => {
            println!("rg 状态: ✅ {}", ctx.rg.runner().program().program);
            true
        }
        Err(e) => {
            println!("rg 状态: ❌ {}", e);
            false
        }
    };
    let fd_ok = match ctx.fd.runner().ensure_available().await {
        Ok(()) => {
            println!("fd 状态: ✅ {}", ctx.fd.runner().program().program);
            true
        }
        Err(e) => {
            println!("fd 状态: ❌ {}", e);
            false
        }
    };

    if rg_ok {
        text_scenario(&ctx, "普通文本", "fn main", SearchQuery::new("Text")).await;
        text_scenario(&ctx, "正则原样传递", "fn\\s+main", ctx.variant_query(&SearchVariant::Regex)).await;
        text_scenario(&ctx, "正则元字符转义", "Vec<String>", SearchQuery::new("Text")).await;
        text_scenario(&ctx, "带选项的查询", "todo -i -g *.rs", SearchQuery::new("Text")).await;
    }

    if fd_ok {
        file_scenario(&ctx, "文件名", "Cargo", FdMode::Files).await;
        file_scenario(&ctx, "目录名", "src", FdMode::Directories).await;
        file_scenario(&ctx, "工作区全部文件", "", FdMode::WorkspaceFiles).await;
    }

    match &ctx.everything {
        Some(client) => {
            println!("\n[场景测试] Everything 文件搜索");
            match client.filter("files", None) {
                Ok(filter) => match client.search(&filter, "Cargo.toml").await {
                    Ok(entries) => {
                        println!("获取结果: {} 条", entries.len());
                        let missing = entries
                            .iter()
                            .take(10)
                            .filter(|e| !std::path::Path::new(&e.full_path()).exists())
                            .count();
                        verdict(entries.is_empty(), missing);
                    }
                    Err(e) => println!("  >>> [结论] 场景测试失败: {}", e),
                },
                Err(e) => println!("  >>> [结论] 场景测试失败: {}", e),
            }
        }
        None => println!("\nEverything: 当前平台不可用，跳过"),
    }

    println!("\n=== 所有场景测试完成 ===");
}

async fn text_scenario(ctx: &AppContext, name: &str, value: &str, query: SearchQuery) {
    println!("\n[场景测试] {}", name);
    match ctx.rg.command_for(value, &query) {
        Ok(cmd) => println!("命令: {}", cmd),
        Err(e) => {
            println!("  >>> [结论] 场景测试失败: {}", e);
            return;
        }
    }
    match ctx.rg.search(value, &query).await {
        Ok(outcome) => {
            println!(
                "获取结果: {} 个文件, {} 条匹配{}",
                outcome.total,
                outcome.matches,
                if outcome.capped { " (已达上限)" } else { "" }
            );
            for (i, r) in outcome.records.iter().take(5).enumerate() {
                println!("  {}. {}  {}", i + 1, r.label(), r.detail());
            }
            let missing = outcome
                .records
                .iter()
                .filter(|r: &&MatchRecord| !std::path::Path::new(&r.file_path).exists())
                .count();
            verdict(outcome.records.is_empty(), missing);
        }
        Err(e) => println!("  >>> [结论] 场景测试失败: {}", e),
    }
}

async fn file_scenario(ctx: &AppContext, name: &str, value: &str, mode: FdMode) {
    println!("\n[场景测试] {}", name);
    match ctx.fd.search(value, &mode).await {
        Ok(entries) => {
            println!("获取结果: {} 条", entries.len());
            for (i, e) in entries.iter().take(5).enumerate() {
                println!("  {}. {}", i + 1, e.full_path());
            }
            let missing = entries
                .iter()
                .filter(|e| !std::path::Path::new(&e.full_path()).exists())
                .count();
            verdict(entries.is_empty(), missing);
        }
        Err(e) => println!("  >>> [结论] 场景测试失败: {}", e),
    }
}

fn verdict(empty: bool, missing: usize) {
    if missing > 0 {
        println!("  >>> [结论] 场景测试失败: 存在 {} 个损坏路径", missing);
    } else if empty {
        println!("  >>> [结论] 场景测试跳过: 未找到匹配项");
    } else {
        println!("  >>> [结论] 场景测试通过");
    }
}
