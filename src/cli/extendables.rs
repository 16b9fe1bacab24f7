use anyhow::Result;
use cliclack::intro;

use crate::{
    api::{Registry, Transport},
    editor::{edit_version, Prompter},
    ExtendablesCmd,
};

use super::echo;

pub fn handle_extendables<T: Transport, P: Prompter>(
    cmd: ExtendablesCmd,
    registry: &Registry<T>,
    prompter: &mut P,
) -> Result<()> {
    match cmd {
        ExtendablesCmd::List => {
            let catalog = registry.list_extendables()?;
            echo("Extendables:", &catalog)
        }
        ExtendablesCmd::New {
            name,
            app_id,
            version,
        } => {
            intro(format!("🧩 Adding {name} to version {version} of app {app_id}"))?;
            let updated = edit_version(registry, prompter, &app_id, &version, Some(&name))?;
            echo("Version updated successfully:", &updated)
        }
    }
}
