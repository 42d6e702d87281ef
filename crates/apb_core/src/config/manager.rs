//! Config store for loading, saving, and atomic section updates.
//!
//! Key features:
//! - Lazy load on first access (creating the file with defaults)
//! - Section-level updates that re-read the file under a lock, so two
//!   writers touching different sections never lose each other's changes
//! - Unknown sections are dropped and missing keys filled on load
//! - Preserves comments and formatting of untouched sections with toml_edit

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{step_key, BatchSettings, ConfigSection};
use crate::models::BatchLayout;
use crate::storage::{atomic_write, FileLock, LockError, DEFAULT_LOCK_TIMEOUT};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config lock failed: {0}")]
    Lock(#[from] LockError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages one batch's configuration file.
pub struct ConfigStore {
    /// Path to the config file.
    config_path: PathBuf,
    /// Settings, once loaded.
    settings: Option<BatchSettings>,
    lock_timeout: Duration,
}

impl ConfigStore {
    /// Create a store for the given config file. Nothing is read yet.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Store for a batch's standard config location.
    pub fn for_layout(layout: &BatchLayout) -> Self {
        Self::new(layout.config_file())
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Current settings, loading (or creating) the file on first access.
    pub fn settings(&mut self) -> ConfigResult<&BatchSettings> {
        if self.settings.is_none() {
            self.load_or_create()?;
        }
        Ok(self.settings.get_or_insert_with(BatchSettings::default))
    }

    /// Settings validated for use by the pipeline.
    pub fn validated_settings(&mut self) -> ConfigResult<BatchSettings> {
        checked(self.settings()?.clone())
    }

    /// Validated settings read without touching the file.
    ///
    /// A missing file yields defaults; an existing one is parsed as is,
    /// without being created, normalized, or locked.
    pub fn peek_settings(&self) -> ConfigResult<BatchSettings> {
        let settings = match fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BatchSettings::default(),
            Err(e) => return Err(e.into()),
        };
        checked(settings)
    }

    /// Drop cached settings and load again from disk.
    pub fn reload(&mut self) -> ConfigResult<&BatchSettings> {
        self.settings = None;
        self.settings()
    }

    /// Load config from file, creating it with defaults if it doesn't exist.
    ///
    /// Also validates and cleans up the config, saving if changes were made.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        let _lock = FileLock::acquire(&self.config_path, self.lock_timeout)?;

        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = parse_validate_and_clean(&content)?;
            if was_modified {
                tracing::debug!("Normalizing config file {}", self.config_path.display());
                atomic_write(&self.config_path, render_with_comments(&settings)?.as_bytes())?;
            }
            self.settings = Some(settings);
        } else {
            let settings = BatchSettings::default();
            atomic_write(&self.config_path, render_with_comments(&settings)?.as_bytes())?;
            tracing::info!("Created default config at {}", self.config_path.display());
            self.settings = Some(settings);
        }
        Ok(())
    }

    /// Apply `edit` to one section as an atomic read-modify-write.
    ///
    /// The file is re-read under the lock, `edit` runs against the fresh
    /// settings, and only `section` is written back. Other sections keep
    /// whatever is on disk.
    pub fn update(
        &mut self,
        section: ConfigSection,
        edit: impl FnOnce(&mut BatchSettings),
    ) -> ConfigResult<&BatchSettings> {
        self.try_update(section, |settings| {
            edit(settings);
            Ok(())
        })
    }

    /// [`update`](Self::update) with a fallible edit. Nothing is written
    /// when `edit` fails.
    fn try_update(
        &mut self,
        section: ConfigSection,
        edit: impl FnOnce(&mut BatchSettings) -> ConfigResult<()>,
    ) -> ConfigResult<&BatchSettings> {
        let _lock = FileLock::acquire(&self.config_path, self.lock_timeout)?;

        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut fresh: BatchSettings = if current_content.trim().is_empty() {
            BatchSettings::default()
        } else {
            toml::from_str(&current_content)?
        };
        edit(&mut fresh)?;

        let mut doc: DocumentMut = if current_content.trim().is_empty() {
            render_with_comments(&fresh)?.parse()?
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = section_toml(&fresh, section)?.parse()?;
        let mut section_table = section_doc.as_table().clone();
        section_table.set_implicit(false);
        if let Some(existing) = doc.get(section.table_name()).and_then(Item::as_table) {
            *section_table.decor_mut() = existing.decor().clone();
        }
        doc[section.table_name()] = Item::Table(section_table);

        atomic_write(&self.config_path, doc.to_string().as_bytes())?;
        self.settings = Some(fresh);
        Ok(self.settings.get_or_insert_with(BatchSettings::default))
    }

    /// Mirror a step's completion flag.
    pub fn set_step_completed(&mut self, step: u8, completed: bool) -> ConfigResult<()> {
        self.update(ConfigSection::Steps, |s| {
            s.steps.insert(step_key(step), completed);
        })?;
        Ok(())
    }

    /// Set a value by dotted key, e.g. `resize.max_dimension`.
    ///
    /// The value is parsed as a TOML value; bare words are taken as strings.
    /// Keys under `extensions.` may be arbitrary; other sections only accept
    /// keys their schema defines.
    pub fn set_value(&mut self, dotted_key: &str, raw_value: &str) -> ConfigResult<()> {
        let unknown = || ConfigError::UnknownKey(dotted_key.to_string());
        let (table, key) = dotted_key.split_once('.').ok_or_else(unknown)?;
        let section = ConfigSection::from_table_name(table).ok_or_else(unknown)?;
        let value = parse_value(raw_value);

        // Round-trip the settings re-read under the lock through a TOML
        // table so the typed schema validates keys and value types.
        self.try_update(section, |fresh| {
            let mut as_table: toml::Table = toml::from_str(&toml::to_string(&*fresh)?)?;
            let section_table = as_table
                .entry(table.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()))
                .as_table_mut()
                .ok_or_else(unknown)?;

            let free_form = matches!(section, ConfigSection::Extensions | ConfigSection::Steps);
            if !free_form && !section_table.contains_key(key) {
                return Err(unknown());
            }
            insert_dotted(section_table, key, value);

            let updated: BatchSettings = toml::from_str(&toml::to_string(&as_table)?)?;
            let problems = updated.validate();
            if !problems.is_empty() {
                return Err(ConfigError::Invalid(problems));
            }
            *fresh = updated;
            Ok(())
        })?;
        Ok(())
    }
}

fn checked(settings: BatchSettings) -> ConfigResult<BatchSettings> {
    let problems = settings.validate();
    if problems.is_empty() {
        Ok(settings)
    } else {
        Err(ConfigError::Invalid(problems))
    }
}

/// Parse, validate, and clean up config content.
///
/// Returns the settings and whether any modifications were made.
fn parse_validate_and_clean(content: &str) -> ConfigResult<(BatchSettings, bool)> {
    let doc: DocumentMut = content.parse()?;
    let settings: BatchSettings = toml::from_str(content)?;

    let has_unknown = doc
        .iter()
        .any(|(key, _)| ConfigSection::from_table_name(key).is_none());

    // Missing keys show up as a difference after re-serializing.
    let original_table: toml::Table = toml::from_str(content)?;
    let full_table: toml::Table = toml::from_str(&toml::to_string(&settings)?)?;
    let was_modified = has_unknown || original_table != full_table;

    Ok((settings, was_modified))
}

/// Serialize just one section's table body.
fn section_toml(settings: &BatchSettings, section: ConfigSection) -> ConfigResult<String> {
    let content = match section {
        ConfigSection::Inputs => toml::to_string_pretty(&settings.inputs)?,
        ConfigSection::Mapping => toml::to_string_pretty(&settings.mapping)?,
        ConfigSection::Validation => toml::to_string_pretty(&settings.validation)?,
        ConfigSection::Embedding => toml::to_string_pretty(&settings.embedding)?,
        ConfigSection::Jpeg => toml::to_string_pretty(&settings.jpeg)?,
        ConfigSection::Resize => toml::to_string_pretty(&settings.resize)?,
        ConfigSection::Watermark => toml::to_string_pretty(&settings.watermark)?,
        ConfigSection::Steps => toml::to_string_pretty(&settings.steps)?,
        ConfigSection::Extensions => toml::to_string_pretty(&settings.extensions)?,
    };
    Ok(content)
}

/// Render the whole file with a comment above each section.
fn render_with_comments(settings: &BatchSettings) -> ConfigResult<String> {
    let mut doc: DocumentMut = toml::to_string_pretty(settings)?.parse()?;

    for section in ConfigSection::ALL {
        let name = section.table_name();
        if doc.get(name).is_none() {
            let mut empty = toml_edit::Table::new();
            empty.set_implicit(false);
            doc[name] = Item::Table(empty);
        }
        if let Some(table) = doc.get_mut(name).and_then(Item::as_table_mut) {
            table.set_implicit(false);
            table
                .decor_mut()
                .set_prefix(format!("\n# {}\n", section.comment()));
        }
    }

    let mut output = String::new();
    output.push_str("# Archival photo batch configuration\n");
    output.push_str("# Sections are rewritten individually; comments on other sections survive.\n");
    output.push_str(&doc.to_string());
    Ok(output)
}

fn parse_value(raw: &str) -> toml::Value {
    let wrapped = format!("v = {}", raw);
    toml::from_str::<toml::Table>(&wrapped)
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn insert_dotted(table: &mut toml::Table, key: &str, value: toml::Value) {
    match key.split_once('.') {
        Some((head, rest)) => {
            let child = table
                .entry(head.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !child.is_table() {
                *child = toml::Value::Table(toml::Table::new());
            }
            if let Some(child_table) = child.as_table_mut() {
                insert_dotted(child_table, rest, value);
            }
        }
        None => {
            table.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_access_creates_default_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config").join("batch.toml");

        let mut store = ConfigStore::new(&config_path);
        assert!(!config_path.exists());

        assert_eq!(store.settings().unwrap().resize.max_dimension, 1600);
        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[inputs]"));
        assert!(content.contains("[watermark]"));
        assert!(content.contains("# Bounded resize"));
    }

    #[test]
    fn existing_values_preserved_and_defaults_filled() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");
        fs::write(&config_path, "[jpeg]\nquality = 80\n\n[bogus]\nx = 1\n").unwrap();

        let mut store = ConfigStore::new(&config_path);
        assert_eq!(store.settings().unwrap().jpeg.quality, 80);

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(!content.contains("[bogus]"));
        assert!(content.contains("quality = 80"));
        assert!(content.contains("max_dimension = 1600"));
    }

    #[test]
    fn update_only_rewrites_target_section() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");

        let mut first = ConfigStore::new(&config_path);
        let mut second = ConfigStore::new(&config_path);
        first.settings().unwrap();
        second.settings().unwrap();

        // Two stores with stale in-memory copies edit different sections.
        first
            .update(ConfigSection::Resize, |s| s.resize.max_dimension = 900)
            .unwrap();
        second
            .update(ConfigSection::Jpeg, |s| s.jpeg.quality = 70)
            .unwrap();

        let mut reader = ConfigStore::new(&config_path);
        let settings = reader.settings().unwrap();
        assert_eq!(settings.resize.max_dimension, 900);
        assert_eq!(settings.jpeg.quality, 70);
    }

    #[test]
    fn step_mirror_persists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");

        let mut store = ConfigStore::new(&config_path);
        store.set_step_completed(3, true).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("step_3 = true"));
        assert!(ConfigStore::new(&config_path).settings().unwrap().step_completed(3));
    }

    #[test]
    fn set_value_validates_keys_and_ranges() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path().join("batch.toml"));

        store.set_value("resize.max_dimension", "1200").unwrap();
        store.set_value("inputs.spreadsheet_path", "/data/catalog.csv").unwrap();
        store.set_value("extensions.review.reviewer", "\"kim\"").unwrap();

        let settings = store.reload().unwrap().clone();
        assert_eq!(settings.resize.max_dimension, 1200);
        assert_eq!(settings.inputs.spreadsheet_path, "/data/catalog.csv");
        assert_eq!(
            settings.extensions["review"]["reviewer"].as_str(),
            Some("kim")
        );

        assert!(matches!(
            store.set_value("resize.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            store.set_value("watermark.opacity", "2.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn validated_settings_rejects_bad_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");
        fs::write(&config_path, "[watermark]\nopacity = -1.0\n").unwrap();

        let mut store = ConfigStore::new(&config_path);
        assert!(matches!(
            store.validated_settings(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn set_value_keeps_other_writers_changes_in_same_section() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");

        let mut stale = ConfigStore::new(&config_path);
        let mut other = ConfigStore::new(&config_path);
        stale.settings().unwrap();
        other.settings().unwrap();

        other.set_value("watermark.opacity", "0.3").unwrap();
        stale.set_value("watermark.copy_unrestricted", "false").unwrap();

        let settings = ConfigStore::new(&config_path).settings().unwrap().clone();
        assert_eq!(settings.watermark.opacity, 0.3);
        assert!(!settings.watermark.copy_unrestricted);
    }

    #[test]
    fn set_value_keeps_step_mirror_written_elsewhere() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");

        let mut cli = ConfigStore::new(&config_path);
        cli.settings().unwrap();
        ConfigStore::new(&config_path).set_step_completed(1, true).unwrap();

        cli.set_value("steps.note", "true").unwrap();

        let settings = ConfigStore::new(&config_path).settings().unwrap().clone();
        assert!(settings.step_completed(1));
        assert_eq!(settings.steps.get("note"), Some(&true));
    }

    #[test]
    fn rejected_set_value_leaves_file_alone() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");
        let mut store = ConfigStore::new(&config_path);
        store.set_value("jpeg.quality", "80").unwrap();
        let before = fs::read_to_string(&config_path).unwrap();

        assert!(store.set_value("watermark.opacity", "7").is_err());
        assert_eq!(fs::read_to_string(&config_path).unwrap(), before);
    }

    #[test]
    fn peek_settings_never_writes() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config").join("batch.toml");
        let store = ConfigStore::new(&config_path);

        assert_eq!(store.peek_settings().unwrap().resize.max_dimension, 1600);
        assert!(!config_path.exists());

        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        fs::write(&config_path, "[jpeg]\nquality = 75\n\n[bogus]\nx = 1\n").unwrap();
        assert_eq!(store.peek_settings().unwrap().jpeg.quality, 75);
        assert!(fs::read_to_string(&config_path).unwrap().contains("[bogus]"));

        fs::write(&config_path, "[watermark]\nopacity = 3.0\n").unwrap();
        assert!(matches!(store.peek_settings(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn no_temp_or_lock_left_behind() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");

        let mut store = ConfigStore::new(&config_path);
        store.set_step_completed(1, true).unwrap();

        assert!(!dir.path().join("batch.toml.tmp").exists());
        assert!(!dir.path().join("batch.toml.lock").exists());
    }
}
