use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};

pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Timestamped log lines on stderr. `RUST_LOG` overrides the level;
/// otherwise `info`, or `debug` when verbose.
pub fn init_log(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format(TIME_FORMAT),
                record.level(),
                record.args()
            )
        })
        .init();
}
