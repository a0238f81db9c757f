//! Merge rules: defaults, override order, conflict handling.

use crate::config::{
    default_base_url, default_connect_timeout, default_interval, default_request_timeout,
};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key; tables merge rather than
/// replace, so a workspace file may set only `polling.interval_secs`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("client.base_url", default_base_url())?
        .set_default("client.connect_timeout_secs", default_connect_timeout())?
        .set_default("client.request_timeout_secs", default_request_timeout())?
        .set_default("polling.interval_secs", default_interval())
}
