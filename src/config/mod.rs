//! Configuration for ask
//!
//! ask reads a single JSON file, by default `~/.config/ask/config.json`
//! (`%USERPROFILE%\.config\ask\config.json` on Windows). The location can be
//! changed with `--config <path>` or the `ASK_CONFIG` environment variable.
//!
//! ```json
//! {
//!   "api_url": "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions",
//!   "api_key": "sk-...",
//!   "models": { "default": { "name": "qwen-plus" } },
//!   "roles": { "default": "You are a helpful assistant." },
//!   "upgrade": { "check_on_startup": false, "check_interval": 86400 }
//! }
//! ```
//!
//! A missing file means built-in defaults. `ASK_API_URL` and `ASK_API_KEY`
//! override the corresponding fields after loading, so credentials can stay
//! out of the file entirely.

pub mod global;

pub use global::{Config, ModelConfig};
