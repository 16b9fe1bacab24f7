use anyhow::Result;
use cliclack::intro;

use crate::{
    api::{Registry, Transport},
    editor::{edit_version, Prompter},
    VersionsCmd,
};

use super::echo;

pub fn handle_versions<T: Transport, P: Prompter>(
    cmd: VersionsCmd,
    registry: &Registry<T>,
    prompter: &mut P,
) -> Result<()> {
    match cmd {
        VersionsCmd::Create {
            app_id,
            version,
            description,
        } => {
            let created = registry.create_version(&app_id, &version, description.as_deref())?;
            echo("Version created successfully:", &created)
        }
        VersionsCmd::List { app_id } => {
            let versions = registry.list_versions(&app_id)?;
            echo("Versions:", &versions)
        }
        VersionsCmd::Publish { app_id, version } => {
            let published = registry.publish_version(&app_id, &version)?;
            echo("Version published successfully:", &published)
        }
        VersionsCmd::Edit { app_id, version } => {
            intro(format!("✎ Editing version {version} of app {app_id}"))?;
            let updated = edit_version(registry, prompter, &app_id, &version, None)?;
            echo("Version updated successfully:", &updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        api::mock::*,
        editor::scripted::{Reply, Scripted},
    };

    fn edit_cmd() -> VersionsCmd {
        VersionsCmd::Edit {
            app_id: "12".into(),
            version: "456".into(),
        }
    }

    #[test]
    fn edit_round_trip() {
        let transport = MockTransport::new()
            .respond_json(200, json!({"data": {"description": "d", "extendables": []}}))
            .respond_json(200, json!({"data": {"description": "d"}}));
        let registry = registry(token_only(), transport);
        let mut prompter = Scripted::new(Reply::Unchanged, true);

        handle_versions(edit_cmd(), &registry, &mut prompter).unwrap();

        let methods: Vec<_> = registry
            .transport()
            .requests()
            .into_iter()
            .map(|r| r.method)
            .collect();
        assert_eq!(methods, vec![Method::GET, Method::PUT]);
    }

    #[test]
    fn edit_with_invalid_json_fails() {
        let transport = MockTransport::new()
            .respond_json(200, json!({"data": {"description": "d", "extendables": []}}));
        let registry = registry(token_only(), transport);
        let mut prompter = Scripted::new(Reply::Text("{ invalid json }".into()), true);

        let err = handle_versions(edit_cmd(), &registry, &mut prompter).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
        assert_eq!(registry.transport().requests().len(), 1);
    }

    #[test]
    fn list_versions_uses_app_path() {
        let transport = MockTransport::new().respond_json(200, json!({"data": []}));
        let registry = registry(token_only(), transport);
        let mut prompter = Scripted::new(Reply::Abort, false);

        handle_versions(
            VersionsCmd::List {
                app_id: "12".into(),
            },
            &registry,
            &mut prompter,
        )
        .unwrap();

        let req = &registry.transport().requests()[0];
        assert_eq!(req.url.path(), "/app-registry/api/apps/12/versions/");
    }
}
