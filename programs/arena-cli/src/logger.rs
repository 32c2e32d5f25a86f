use std::fs::File;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use time::{format_description::parse, OffsetDateTime};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the `-v` count. With `to_file` set, events go to a
/// timestamped file in the working directory instead of stderr.
pub fn init_logger(verbosity: u8, to_file: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = if to_file {
        let file_name = log_file_name(OffsetDateTime::now_utc())?;
        let file = File::create(&file_name).with_context(|| format!("cannot create log file `{file_name}`"))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
    } else {
        builder.with_writer(std::io::stderr).try_init()
    };
    installed.map_err(|e| anyhow!("cannot install tracing subscriber: {e}"))
}

fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn log_file_name(now: OffsetDateTime) -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]-[minute]-[second]_arena.log")?;
    Ok(now.format(&format)?)
}
