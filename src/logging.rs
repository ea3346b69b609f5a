use env_logger::Env;
use log::{LevelFilter, Record};
use std::io::Write;

fn log_level_str(record: &Record) -> String {
    let mut level_str = record.level().to_string();
    level_str.truncate(1);
    level_str
}

fn file_line(record: &Record) -> String {
    match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!(" {file}:{line}:"),
        (Some(file), None) => format!(" {file}:"),
        _ => String::new(),
    }
}

/// Log to stderr. `RUST_LOG` is read first; `filter_level` overrides it.
pub fn setup_logger(filter_level: LevelFilter) {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .filter_level(filter_level)
        .format(|buf, record| {
            let level = log_level_str(record);
            let location = if record.level() >= log::Level::Debug {
                file_line(record)
            } else {
                String::new()
            };
            writeln!(buf, "[{level}]{location} {}", record.args())
        })
        .init();
}

/// Level for `-v` repeated `verbose` times, starting from warnings.
/// `quiet` turns logging off.
pub fn verbosity_filter(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Off;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
