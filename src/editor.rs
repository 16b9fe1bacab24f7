//! Read, reshape, edit, confirm and write back an app version.
//!
//! The server hands out versions as `{"data": {.., "extendables": [{slug, configuration}]}}`
//! but only accepts `{"app_version": {.., "configured_extendables": [{extendable_slug, configuration}]}}`
//! on update. The functions in this module translate between the two before the document
//! is shown to the user.

use std::{
    env, fs,
    io::{self, Write},
    path::Path,
    process::Command,
    sync::{
        atomic::{AtomicBool, Ordering},
        Once,
    },
    time::SystemTime,
};

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{
    api::{to_pretty_json, Registry, Transport},
    error::{ApiError, ApiResult},
};

/// Key marking the schema type inside an extendable configuration
const TYPE_MARKER: &str = "__type__";

/// Human in the loop: an editing surface plus a yes/no prompt
pub trait Prompter {
    /// Lets the user edit `text`. Returns `None` if the user left without saving.
    fn edit(&mut self, text: &str) -> ApiResult<Option<String>>;

    fn confirm(&mut self, prompt: &str) -> ApiResult<bool>;
}

/// Converts a fetched version into the envelope the server accepts on update.
///
/// Top-level keys other than `data` are carried over untouched.
pub fn editable_version(fetched: &Value) -> ApiResult<Value> {
    let root = fetched
        .as_object()
        .ok_or_else(|| shape("expected a json object"))?;
    let data = root
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| shape("missing `data` object"))?;

    let configured = match data.get("extendables") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(configured_extendable)
            .collect::<ApiResult<Vec<_>>>()?,
        Some(_) => return Err(shape("`extendables` is not a list")),
    };

    let mut version: Map<String, Value> = data
        .iter()
        .filter(|(key, _)| key.as_str() != "extendables")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    version.insert("configured_extendables".to_string(), Value::Array(configured));

    let mut out: Map<String, Value> = root
        .iter()
        .filter(|(key, _)| key.as_str() != "data")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    out.insert("app_version".to_string(), Value::Object(version));
    Ok(Value::Object(out))
}

fn configured_extendable(item: &Value) -> ApiResult<Value> {
    let slug = item
        .get("slug")
        .ok_or_else(|| shape("extendable without `slug`"))?;
    let configuration = item
        .get("configuration")
        .ok_or_else(|| shape("extendable without `configuration`"))?;

    let mut out = Map::new();
    out.insert("extendable_slug".to_string(), slug.clone());
    out.insert("configuration".to_string(), configuration.clone());
    Ok(Value::Object(out))
}

/// Picks the catalog entry named `name` and turns it into a configured extendable.
///
/// The `__type__` marker is removed from the entry's configuration, `slug` becomes
/// `extendable_slug`, every other field is kept.
pub fn extendable_template(catalog: &Value, name: &str) -> ApiResult<Value> {
    let entries = catalog
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| shape("extendable catalog has no `data` list"))?;

    let entry = entries
        .iter()
        .find(|e| e.get("slug").and_then(Value::as_str) == Some(name))
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::ExtendableNotFound(name.to_string()))?;

    let out = entry
        .iter()
        .map(|(key, value)| match key.as_str() {
            "slug" => ("extendable_slug".to_string(), value.clone()),
            "configuration" => (key.clone(), without_type_marker(value)),
            _ => (key.clone(), value.clone()),
        })
        .collect();
    Ok(Value::Object(out))
}

fn without_type_marker(configuration: &Value) -> Value {
    match configuration {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != TYPE_MARKER)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Returns a copy of `editable` with `entry` appended to its configured extendables
pub fn with_extendable(editable: &Value, entry: Value) -> ApiResult<Value> {
    let mut out = editable.clone();
    out.get_mut("app_version")
        .and_then(|v| v.get_mut("configured_extendables"))
        .and_then(Value::as_array_mut)
        .ok_or_else(|| shape("missing `app_version.configured_extendables`"))?
        .push(entry);
    Ok(out)
}

fn shape(msg: &str) -> ApiError {
    ApiError::UnexpectedShape(msg.to_string())
}

/// One edit of one version, from fetch to submit
#[derive(Debug)]
pub struct EditSession {
    url: Url,
    editable: Value,
}

impl EditSession {
    /// Fetches the version and prepares the editable document.
    ///
    /// If `extendable` is set, the catalog is consulted first and the matching entry is
    /// appended to the document.
    pub fn open<T: Transport>(
        registry: &Registry<T>,
        app_id: &str,
        version: &str,
        extendable: Option<&str>,
    ) -> ApiResult<Self> {
        let template = match extendable {
            Some(name) => {
                let catalog = registry.extendable_catalog()?;
                Some(extendable_template(&catalog, name)?)
            }
            None => None,
        };

        let url = registry.version_url(app_id, version)?;
        let editable = registry
            .get_version(&url)
            .and_then(|fetched| editable_version(&fetched))
            .and_then(|doc| match template {
                Some(entry) => with_extendable(&doc, entry),
                None => Ok(doc),
            })
            .map_err(ApiError::fetch)?;

        debug!(%url, "prepared version for editing");
        Ok(EditSession { url, editable })
    }

    /// Hands the document to the user and returns the confirmed payload.
    ///
    /// Nothing is sent to the server here.
    pub fn review<P: Prompter>(&self, prompter: &mut P) -> ApiResult<Value> {
        let text = to_pretty_json(&self.editable)?;

        let edited = prompter
            .edit(&text)?
            .ok_or_else(|| ApiError::Cancelled("Update cancelled - no changes made".to_string()))?;
        debug!("received edited document");

        let payload: Value =
            serde_json::from_str(&edited).map_err(|e| ApiError::Validation(e.to_string()))?;

        if !prompter.confirm("Do you want to update this version?")? {
            return Err(ApiError::Cancelled("Update cancelled".to_string()));
        }
        Ok(payload)
    }

    /// Replaces the version with `payload` and returns the server's representation
    pub fn submit<T: Transport>(self, registry: &Registry<T>, payload: &Value) -> ApiResult<Value> {
        debug!(url = %self.url, "submitting version");
        registry.update_version(&self.url, payload)
    }
}

/// Runs the complete edit workflow for one version
pub fn edit_version<T: Transport, P: Prompter>(
    registry: &Registry<T>,
    prompter: &mut P,
    app_id: &str,
    version: &str,
    extendable: Option<&str>,
) -> ApiResult<Value> {
    let session = EditSession::open(registry, app_id, version, extendable)?;
    let payload = session.review(prompter)?;
    session.submit(registry, &payload)
}

/// Interactive terminal: external text editor and a cliclack confirmation
pub struct Terminal {
    editor: String,
}

impl Terminal {
    /// Uses the configured editor, falling back to `$VISUAL`, `$EDITOR` and finally the
    /// platform default.
    pub fn new(configured: Option<String>) -> Self {
        let editor = configured
            .filter(|e| !e.trim().is_empty())
            .or_else(|| env::var("VISUAL").ok().filter(|e| !e.trim().is_empty()))
            .or_else(|| env::var("EDITOR").ok().filter(|e| !e.trim().is_empty()))
            .unwrap_or_else(|| default_editor().to_string());
        Terminal { editor }
    }
}

fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

/// Splits an editor setting like `code --wait` into program and arguments.
///
/// Single or double quotes group words, e.g. `"/opt/Sublime Text/subl" -w`.
/// Backslashes carry no special meaning.
fn editor_command(editor: &str) -> ApiResult<(String, Vec<String>)> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in editor.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(ApiError::Editor(format!(
            "unbalanced quote in editor setting '{editor}'"
        )));
    }
    if in_word {
        words.push(current);
    }

    let mut words = words.into_iter();
    let program = words
        .next()
        .ok_or_else(|| ApiError::Editor("no editor configured".to_string()))?;
    Ok((program, words.collect()))
}

/// Raised by the Ctrl-C handler while an editor owns the terminal
static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static EDITING: AtomicBool = AtomicBool::new(false);
static HANDLER: Once = Once::new();

/// Keeps the process alive on Ctrl-C while the editor runs.
///
/// Outside of an edit, Ctrl-C terminates the process with status 130.
struct InterruptGuard;

impl InterruptGuard {
    fn install() -> Self {
        HANDLER.call_once(|| {
            let installed = ctrlc::set_handler(|| {
                if EDITING.load(Ordering::SeqCst) {
                    INTERRUPTED.store(true, Ordering::SeqCst);
                } else {
                    std::process::exit(130);
                }
            });
            if let Err(e) = installed {
                warn!("failed to install Ctrl-C handler: {e}");
            }
        });
        INTERRUPTED.store(false, Ordering::SeqCst);
        EDITING.store(true, Ordering::SeqCst);
        InterruptGuard
    }

    fn interrupted(&self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        EDITING.store(false, Ordering::SeqCst);
    }
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn editor_err(e: io::Error) -> ApiError {
    ApiError::Editor(e.to_string())
}

impl Prompter for Terminal {
    fn edit(&mut self, text: &str) -> ApiResult<Option<String>> {
        let (program, args) = editor_command(&self.editor)?;

        // Declared before `file`, so it is released only after the file is gone
        let guard = InterruptGuard::install();

        // Removed when `file` goes out of scope
        let mut file = tempfile::Builder::new()
            .prefix("peek-")
            .suffix(".json")
            .tempfile()
            .map_err(editor_err)?;
        file.write_all(text.as_bytes()).map_err(editor_err)?;
        file.flush().map_err(editor_err)?;
        let before = modified(file.path()).map_err(editor_err)?;

        debug!(editor = %program, path = %file.path().display(), "launching editor");
        let status = Command::new(&program)
            .args(&args)
            .arg(file.path())
            .status();

        if guard.interrupted() {
            debug!("editor interrupted");
            return Err(ApiError::Cancelled("Update cancelled".to_string()));
        }
        let status = status.map_err(|e| ApiError::Editor(format!("{program}: {e}")))?;
        if !status.success() {
            return Err(ApiError::Editor(format!("{program} exited with {status}")));
        }

        if modified(file.path()).map_err(editor_err)? == before {
            return Ok(None);
        }
        let edited = fs::read_to_string(file.path()).map_err(editor_err)?;
        Ok(Some(edited))
    }

    fn confirm(&mut self, prompt: &str) -> ApiResult<bool> {
        match cliclack::confirm(prompt).interact() {
            Ok(answer) => Ok(answer),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                Err(ApiError::Cancelled("Update cancelled".to_string()))
            }
            Err(e) => Err(editor_err(e)),
        }
    }
}
