//! CLI domain: parse, route, output, and presentation only.
//! No report orchestration here; the route table dispatches to the report services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{map_error, CommandOutput};
pub use parse::{Cli, Commands};
pub use presentation::{
    format_config, format_progress_line, format_quota_json, format_quota_text,
    format_report_json, format_report_text, format_section_heading, format_status_json,
    format_status_text,
};
pub use route::RunContext;
