mod apps;
mod extendables;
mod publishers;
mod versions;

// Re-export functions from sub-modules here
pub use apps::handle_apps;
pub use extendables::handle_extendables;
pub use publishers::handle_publishers;
pub use versions::handle_versions;

use anyhow::Result;
use cliclack::log::success;
use serde_json::Value;

use crate::api::to_pretty_json;

/// Reports success and prints the server's answer to stdout
fn echo(headline: &str, value: &Value) -> Result<()> {
    success(headline)?;
    println!("{}", to_pretty_json(value)?);
    Ok(())
}
