use crate::{
    cli::CheckArgs,
    core::{config::TupleMrConfig, serialization_info::SerializationInfo},
    io::registry::Registry,
    utils::util::Result,
};
use std::{
    io::{self, Write},
    sync::Arc,
};

/// Composes the job configuration and renders the derived layout.
pub fn describe(config: &TupleMrConfig) -> Result<String> {
    let info: Arc<SerializationInfo> = config.build(Arc::new(Registry::new()))?;
    let mut text = String::new();
    for source in info.sources() {
        text.push_str(&format!("{}\n", source.schema()));
    }
    text.push_str(&info.to_string());
    Ok(text)
}

pub fn check(args: CheckArgs) -> Result<()> {
    let config = TupleMrConfig::from_path(&args.config)?;
    let text = describe(&config)?;
    log::info!(
        "Configuration {} is valid ({} schemas)",
        args.config.display(),
        config.schemas.len()
    );
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
