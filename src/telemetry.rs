// src/telemetry.rs
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: OnceLock<()> = OnceLock::new();

/// tracing の初期化 (何度呼んでも一度だけ)
///
/// `RUST_LOG` が無ければ `default_level` を使う。標準出力は JSON 用に空けておき、ログは標準エラーへ。
pub fn init_tracing(default_level: &str) {
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
    });
}
