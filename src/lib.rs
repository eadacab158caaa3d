//! findsuite：把 ripgrep、fd 和 Everything 三种搜索后端统一到一个增量选择列表之后，
//! 附带收藏夹、搜索历史、文件比较和诊断导航。

pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod decoration;
pub mod diff;
pub mod error;
pub mod everything;
pub mod fd;
pub mod favorites;
pub mod history;
pub mod host;
pub mod persist;
pub mod picker;
pub mod problem;
pub mod ripgrep;
pub mod runner;
pub mod types;

pub use error::{FindError, Result};
