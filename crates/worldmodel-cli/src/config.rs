//! Configuration Vault – reads/writes `~/.worldmodel/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use worldmodel_ingest::ListenerConfig;

/// Database path that selects a throwaway in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Persisted user configuration stored in `~/.worldmodel/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Tag marking map descriptions and instances created by ingestion.
    #[serde(default = "default_class_tag")]
    pub class_tag: String,

    /// Field of a descriptor's `ref` object that names the source channel.
    #[serde(default = "default_ref_field")]
    pub ref_field: String,

    /// Serialize dedup-then-create during ingestion.
    #[serde(default)]
    pub atomic_dedup: bool,

    #[serde(default = "default_max_updates_per_sec")]
    pub max_updates_per_sec: u32,
}

fn default_database_path() -> String {
    home_dir()
        .join(".worldmodel")
        .join("world_model.db")
        .to_string_lossy()
        .into_owned()
}
fn default_class_tag() -> String {
    "map".to_string()
}
fn default_ref_field() -> String {
    "topic".to_string()
}
fn default_max_updates_per_sec() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            class_tag: default_class_tag(),
            ref_field: default_ref_field(),
            atomic_dedup: false,
            max_updates_per_sec: default_max_updates_per_sec(),
        }
    }
}

impl Config {
    pub fn is_in_memory(&self) -> bool {
        self.database_path == IN_MEMORY
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            class_tag: self.class_tag.clone(),
            max_updates_per_sec: NonZeroU32::new(self.max_updates_per_sec).unwrap_or(NonZeroU32::MIN),
            atomic_dedup: self.atomic_dedup,
        }
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.worldmodel/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".worldmodel").join("config.toml")
}

/// Load the config from disk with environment overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config file at `path` as written, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `WORLDMODEL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WORLDMODEL_DATABASE` | `database_path` |
/// | `WORLDMODEL_CLASS_TAG` | `class_tag` |
/// | `WORLDMODEL_ATOMIC_DEDUP` | `atomic_dedup` (`true` / `false`) |
/// | `WORLDMODEL_MAX_UPDATES_PER_SEC` | `max_updates_per_sec` (non-zero) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WORLDMODEL_DATABASE") {
        cfg.database_path = v;
    }
    if let Ok(v) = std::env::var("WORLDMODEL_CLASS_TAG") {
        cfg.class_tag = v;
    }
    if let Ok(v) = std::env::var("WORLDMODEL_ATOMIC_DEDUP")
        && let Ok(flag) = v.parse::<bool>()
    {
        cfg.atomic_dedup = flag;
    }
    if let Ok(v) = std::env::var("WORLDMODEL_MAX_UPDATES_PER_SEC")
        && let Ok(rate) = v.parse::<NonZeroU32>()
    {
        cfg.max_updates_per_sec = rate.get();
    }
}

/// Save the config to disk, creating `~/.worldmodel/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Create `dir` (and parents), restricted to the owner on Unix.
pub fn create_private_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set permissions on {}: {}", dir.display(), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert!(cfg.database_path.ends_with("world_model.db"));
        assert_eq!(cfg.class_tag, "map");
        assert_eq!(cfg.ref_field, "topic");
        assert!(!cfg.atomic_dedup);
        assert_eq!(cfg.max_updates_per_sec, 1);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        let cfg = Config {
            database_path: IN_MEMORY.to_string(),
            atomic_dedup: true,
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!(loaded.is_in_memory());
        assert!(loaded.atomic_dedup);
        assert_eq!(loaded.class_tag, "map");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "class_tag = \"floorplan\"\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.class_tag, "floorplan");
        assert_eq!(loaded.ref_field, "topic");
        assert_eq!(loaded.max_updates_per_sec, 1);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_updates_per_sec = \"fast\"\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_worldmodel_dir() {
        let p = config_path_for_home(Path::new("/home/testuser"));
        assert!(p.to_string_lossy().contains(".worldmodel"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn listener_config_never_has_zero_rate() {
        let cfg = Config {
            max_updates_per_sec: 0,
            ..Config::default()
        };
        assert_eq!(cfg.listener_config().max_updates_per_sec.get(), 1);
    }

    #[test]
    fn apply_env_overrides_changes_database() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WORLDMODEL_DATABASE", "/tmp/wm.db") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.database_path, "/tmp/wm.db");
        unsafe { std::env::remove_var("WORLDMODEL_DATABASE") };
    }

    #[test]
    fn apply_env_overrides_changes_class_tag() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WORLDMODEL_CLASS_TAG", "floorplan") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.class_tag, "floorplan");
        unsafe { std::env::remove_var("WORLDMODEL_CLASS_TAG") };
    }

    #[test]
    fn apply_env_overrides_parses_atomic_dedup() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WORLDMODEL_ATOMIC_DEDUP", "true") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.atomic_dedup);
        unsafe { std::env::remove_var("WORLDMODEL_ATOMIC_DEDUP") };
    }

    #[test]
    fn apply_env_overrides_ignores_zero_rate() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WORLDMODEL_MAX_UPDATES_PER_SEC", "0") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.max_updates_per_sec, 1);
        unsafe { std::env::set_var("WORLDMODEL_MAX_UPDATES_PER_SEC", "5") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.max_updates_per_sec, 5);
        unsafe { std::env::remove_var("WORLDMODEL_MAX_UPDATES_PER_SEC") };
    }
}
