use color_eyre::eyre::Result;
use log::LevelFilter;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

const LOG_FILE_NAME: &str = "vcs-proxy.log";

/// Append log records to the state directory. Stdout is left to the payload.
pub fn init_logging(debug: bool) -> Result<PathBuf> {
    let log_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_dir = log_dir_from(env::var_os("HOME"), env::var_os("XDG_STATE_HOME"));
    fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join(LOG_FILE_NAME);

    env_logger::Builder::new()
        .filter_level(log_level)
        .target(env_logger::Target::Pipe(Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)?,
        )))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;

    log::info!("Logging to {} with level: {log_level}", log_file.display());
    Ok(log_file)
}

fn log_dir_from(home: Option<OsString>, xdg_state: Option<OsString>) -> PathBuf {
    match (home, xdg_state) {
        (_, Some(state)) if !state.is_empty() => PathBuf::from(state).join("vcs-proxy"),
        (Some(home), _) => PathBuf::from(home).join(".local/state").join("vcs-proxy"),
        (None, _) => PathBuf::from("/tmp/vcs-proxy"),
    }
}
