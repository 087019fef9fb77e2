use anyhow::Result;
use chrono::{Datelike, Timelike};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

/// 本地时间格式（百分之一秒精度）/ Local time with centisecond precision
struct LogTimer;

impl fmt::time::FormatTime for LogTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        let cs = now.timestamp_subsec_millis() / 10;
        write!(
            w,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:02}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            cs
        )
    }
}

/// 构建日志过滤器：`RUST_LOG` 优先，其次 `logging.level`
/// Build the filter: `RUST_LOG` first, then `logging.level`
fn build_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level: String = crate::comm::config::get_global_config_manager()
        .ok()
        .and_then(|mgr| mgr.get("logging.level").ok())
        .unwrap_or_else(|| "info".to_string());
    EnvFilter::try_new(format!("{},sqlx=warn", level))
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"))
}

/// 初始化全局日志订阅者（重复调用安全）
/// Install the global subscriber (safe to call more than once)
pub fn init_tracing() -> Result<()> {
    LogTracer::init().ok();
    fmt::SubscriberBuilder::default()
        .with_env_filter(build_filter())
        .with_timer(LogTimer)
        .compact()
        .with_target(false)
        .try_init()
        .ok();
    Ok(())
}
