use anyhow::Result;
use clap::{Parser, Subcommand};
use cliclack::log::error;
use tracing::{debug, Level};

mod api;
mod cli;
mod editor;
mod error;

use api::Registry;
use config::Environment;
use editor::Terminal;

#[derive(Parser)]
#[command(name = "peek")]
#[command(about = "CLI for interacting with the Peek app-registry")]
pub struct Cli {
    /// Environment to use
    #[arg(long, value_enum, default_value_t = Environment::Local, global = true)]
    env: Environment,

    /// API token for authorization
    #[arg(long, env = "PEEK_API_TOKEN", hide_env_values = true, global = true)]
    api_token: Option<String>,

    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Commands for managing apps
    #[command(subcommand)]
    Apps(AppsCmd),
}

#[derive(Subcommand)]
pub enum AppsCmd {
    /// List all apps
    List,

    /// Create a new app
    Create {
        /// Name of the app
        #[arg(long)]
        name: String,
    },

    /// Commands for managing publishers
    #[command(subcommand)]
    Publishers(PublishersCmd),

    /// Commands for managing versions
    #[command(subcommand)]
    Versions(VersionsCmd),

    /// Commands for managing extendables
    #[command(subcommand)]
    Extendables(ExtendablesCmd),
}

#[derive(Subcommand)]
pub enum PublishersCmd {
    /// Create a new publisher
    ///
    /// Authenticates with ADMIN_BASIC_AUTH_USERNAME and ADMIN_BASIC_AUTH_PASSWORD.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        website_url: String,
        #[arg(long, default_value = "internal")]
        level: String,
    },
}

#[derive(Subcommand)]
pub enum VersionsCmd {
    /// Create a new version for an app
    Create {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// List all versions of an app
    List {
        #[arg(long)]
        app_id: String,
    },

    /// Publish a version of an app
    Publish {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        version: String,
    },

    /// Edit a version in your editor and write it back
    Edit {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        version: String,
    },
}

#[derive(Subcommand)]
pub enum ExtendablesCmd {
    /// List all extendables
    List,

    /// Add a configured extendable to a version
    ///
    /// The default configuration of the extendable is opened in your editor together
    /// with the rest of the version.
    New {
        /// Name of the extendable (e.g. extendable@v1)
        #[arg(long)]
        name: String,
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        version: String,
    },
}

fn main() {
    // Values from .env must be visible before clap reads PEEK_API_TOKEN
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        let _ = error(format!("{e}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let base_url = config.base_url(cli.env)?;
    let credentials = config::credentials(cli.api_token);
    debug!(env = ?cli.env, %base_url, "resolved environment");

    let registry = Registry::new(base_url, credentials);
    let mut terminal = Terminal::new(config.editor.clone());

    match cli.command {
        Commands::Apps(cmd) => cli::handle_apps(cmd, &registry, &mut terminal),
    }
}

mod config {
    use anyhow::{Context, Result};
    use clap::ValueEnum;
    use serde::Deserialize;
    use std::env;
    use std::fs::read_to_string;
    use std::path::{Path, PathBuf};
    use url::Url;

    use crate::api::{BasicAuth, Credentials};

    /// Name of the config file
    const CONFIG_FILE_NAME: &str = "config.toml";

    /// Name of the specific config directory for our config
    const CONFIG_DIR_NAME: &str = "peek-cli";

    /// Target deployment of the app-registry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    pub enum Environment {
        Stage,
        Local,
        Prod,
    }

    impl Environment {
        fn default_url(self) -> &'static str {
            match self {
                Environment::Stage => "https://noreaga.stage.peek.com",
                Environment::Local => "http://noreaga.peek.stack",
                Environment::Prod => "https://noreaga.peek.com",
            }
        }

        /// Environment variable that overrides the base-url
        fn url_var(self) -> &'static str {
            match self {
                Environment::Stage => "STAGE_URL",
                Environment::Local => "LOCAL_URL",
                Environment::Prod => "PROD_URL",
            }
        }
    }

    /// Configuration of the cmdline interface
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub struct Config {
        stage_url: Option<Url>,
        local_url: Option<Url>,
        prod_url: Option<Url>,

        /// Editor used for `versions edit` and `extendables new`.
        ///
        /// Defaults to `$VISUAL` or `$EDITOR`. Quote paths containing spaces,
        /// e.g. `editor = '"/opt/Sublime Text/subl" -w'`.
        pub editor: Option<String>,
    }

    impl Config {
        /// Reads the config file, if there is one
        pub fn load() -> Result<Self> {
            match config_file() {
                Some(file) => Self::from_file(&file),
                None => Ok(Self::default()),
            }
        }

        pub fn from_file(path: &Path) -> Result<Self> {
            let content = read_to_string(path)?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))
        }

        /// Base-url for the environment.
        ///
        /// Environment variables win over the config file, which wins over the defaults.
        pub fn base_url(&self, environment: Environment) -> Result<Url> {
            let var = env::var(environment.url_var()).ok();
            self.resolve_base_url(environment, var)
        }

        fn resolve_base_url(&self, environment: Environment, var: Option<String>) -> Result<Url> {
            if let Some(raw) = var.filter(|v| !v.is_empty()) {
                return Url::parse(&raw)
                    .with_context(|| format!("{} is not a valid url", environment.url_var()));
            }
            let configured = match environment {
                Environment::Stage => &self.stage_url,
                Environment::Local => &self.local_url,
                Environment::Prod => &self.prod_url,
            };
            match configured {
                Some(url) => Ok(url.clone()),
                None => Ok(Url::parse(environment.default_url())?),
            }
        }
    }

    /// Collects the credentials for this invocation
    pub fn credentials(api_token: Option<String>) -> Credentials {
        Credentials {
            api_token: api_token.filter(|t| !t.is_empty()),
            basic: basic_auth(
                env::var("ADMIN_BASIC_AUTH_USERNAME").ok(),
                env::var("ADMIN_BASIC_AUTH_PASSWORD").ok(),
            ),
        }
    }

    fn basic_auth(username: Option<String>, password: Option<String>) -> Option<BasicAuth> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BasicAuth { username, password })
            }
            _ => None,
        }
    }

    fn user_config_dir() -> Option<PathBuf> {
        // use XGD_CONFIG_HOME if possible, otherwise $HOME/.config
        if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg_config_home));
        }
        let home = env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config"))
    }

    /// Locations searched for the config file, in order of preference
    fn config_file_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = user_config_dir() {
            candidates.push(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        }

        // check XDG_CONFIG_DIRS for system wide configs
        let config_dirs = env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| "/etc/xdg".to_string());
        for dir in config_dirs.split(':') {
            if dir.trim().is_empty() {
                continue;
            }
            candidates.push(PathBuf::from(dir).join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        }
        candidates
    }

    fn config_file() -> Option<PathBuf> {
        config_file_candidates().into_iter().find(|p| p.is_file())
    }

}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "peek",
            "--env",
            "stage",
            "--api-token",
            "tok",
            "apps",
            "extendables",
            "new",
            "--name",
            "foo@v1",
            "--app-id",
            "12",
            "--version",
            "456",
        ])
        .unwrap();
        assert_eq!(cli.env, Environment::Stage);
        assert_eq!(cli.api_token.as_deref(), Some("tok"));
        match cli.command {
            Commands::Apps(AppsCmd::Extendables(ExtendablesCmd::New { name, .. })) => {
                assert_eq!(name, "foo@v1")
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn publisher_level_defaults_to_internal() {
        let cli = Cli::try_parse_from([
            "peek",
            "apps",
            "publishers",
            "create",
            "--name",
            "Acme",
            "--email",
            "a@acme.test",
            "--website-url",
            "https://acme.test",
        ])
        .unwrap();
        assert_eq!(cli.env, Environment::Local);
        match cli.command {
            Commands::Apps(AppsCmd::Publishers(PublishersCmd::Create { level, .. })) => {
                assert_eq!(level, "internal")
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!(Cli::try_parse_from(["peek", "--env", "sandbox", "apps", "list"]).is_err());
    }
}
