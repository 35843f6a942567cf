use std::io::Write;

use anstyle::{AnsiColor, Color, RgbColor, Style};

/// 默认以 Info 级别初始化日志
///
/// 仍然可以通过 `RUST_LOG` 环境变量覆盖
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

/// 初始化 env_logger，输出格式为 `[time] LEVEL [file:line] message`
///
/// 重复调用是安全的（例如多个测试都调用了该函数），后续的调用会被忽略
pub fn init_log_with_level(level: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .filter(None, level)
        .parse_default_env()
        .format(|buf, record| {
            let level_style = level_style(record.level());
            let grey_style = Style::new().fg_color(Some(Color::Rgb(RgbColor(110, 110, 110))));
            let text_style = Style::new().fg_color(Some(Color::Rgb(RgbColor(75, 75, 75))));

            let line = record.line().unwrap_or(!0);
            let file = short_file_name(record.file().unwrap_or(""));
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {text_style}{}{text_style:#}",
                record.args()
            )
        })
        .try_init();

    if result.is_err() {
        log::debug!("logger already initialized, skip.");
    }
}

fn level_style(level: log::Level) -> Style {
    let color = match level {
        log::Level::Error => AnsiColor::Red,
        log::Level::Warn => AnsiColor::Yellow,
        log::Level::Info => AnsiColor::Green,
        log::Level::Debug => AnsiColor::Blue,
        log::Level::Trace => AnsiColor::Magenta,
    };
    Style::new().fg_color(Some(Color::Ansi(color)))
}

/// 只保留文件名，兼容 windows 和 unix 的路径分隔符
fn short_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
