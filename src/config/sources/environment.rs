//! Environment source: HUB_AUDIT__SECTION__KEY, e.g. HUB_AUDIT__POLLING__INTERVAL_SECS.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const PREFIX: &str = "HUB_AUDIT";
pub const SEPARATOR: &str = "__";

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(PREFIX)
            .separator(SEPARATOR)
            .try_parsing(true),
    )
}
