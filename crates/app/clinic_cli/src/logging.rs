use flexi_logger::{DeferredNow, Logger};
use log::Record;

use crate::Error;

pub fn init() -> Result<(), Error> {
    Logger::try_with_env_or_str("info")?
        .format(cli_format)
        .log_to_stdout()
        .start()?;

    Ok(())
}

fn cli_format(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    write!(w, "[{}] {}", record.level(), record.args())
}
