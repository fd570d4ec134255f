use log::LevelFilter;
use simplelog::{Config, WriteLogger};
use std::error::Error;
use std::str::FromStr;

pub struct Utils;

impl Utils {
    /// # Explanation
    /// This function initializes the logger. The level comes from the
    /// configuration and can be overridden with the RUST_LOG environment
    /// variable (one of error, warn, info, debug or trace). The output goes
    /// to a timestamped file so that consecutive runs do not overwrite each
    /// other.
    pub fn logger_init(level: &str) -> Result<(), Box<dyn Error>> {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
        let level = LevelFilter::from_str(&level).unwrap_or(LevelFilter::Info);

        let file_name = format!(
            "raspberry_pi_gestures_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let log_file = std::fs::File::create(file_name)?;
        WriteLogger::init(level, Config::default(), log_file)?;
        Ok(())
    }
}
