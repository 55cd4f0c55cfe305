use crate::cli::{
    actions::Action,
    commands::{self, ARG_VERBOSITY},
    dispatch::handler,
    telemetry,
};
use anyhow::Result;

/// Start the CLI
///
/// # Errors
/// Returns an error if logging cannot be initialized or the arguments are
/// inconsistent.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or_default();
    telemetry::init(Some(commands::verbosity_level(verbosity)))?;

    let action = handler(&matches)?;

    Ok(action)
}
