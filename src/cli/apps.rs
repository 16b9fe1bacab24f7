use anyhow::Result;

use crate::{
    api::{Registry, Transport},
    editor::Prompter,
    AppsCmd,
};

use super::{echo, handle_extendables, handle_publishers, handle_versions};

/// Entrypoint for the `peek apps` subcommands
pub fn handle_apps<T: Transport, P: Prompter>(
    cmd: AppsCmd,
    registry: &Registry<T>,
    prompter: &mut P,
) -> Result<()> {
    match cmd {
        AppsCmd::List => {
            let apps = registry.list_apps()?;
            echo("Apps:", &apps)
        }
        AppsCmd::Create { name } => {
            let app = registry.create_app(&name)?;
            echo("App created successfully:", &app)
        }
        AppsCmd::Publishers(cmd) => handle_publishers(cmd, registry),
        AppsCmd::Versions(cmd) => handle_versions(cmd, registry, prompter),
        AppsCmd::Extendables(cmd) => handle_extendables(cmd, registry, prompter),
    }
}
