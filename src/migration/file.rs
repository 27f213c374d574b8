//! Migration script discovery, parsing and creation

use crate::config::MigConfig;
use crate::migration::MigrationError;
use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// `chrono` format of the timestamp part of a version.
pub const VERSION_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Extension used for scripts created by [`ScriptStore::create`].
pub const DEFAULT_EXTENSION: &str = "sql";

/// Highest `-NN` disambiguator appended to a colliding version.
const MAX_DISAMBIGUATOR: u32 = 99;

// <YYYYMMDD-HHMMSS>[-NN]_<description>.<up|down>.<ext>
static SCRIPT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8}-\d{6}(?:-\d{2})?)_(.+)\.(up|down)\.([A-Za-z0-9]+)$")
        .expect("static regex")
});

static DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Which half of a script pair a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of a script file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptName {
    pub version: String,
    pub description: String,
    pub direction: Direction,
    pub extension: String,
}

impl ScriptName {
    /// Parse a script file name.
    ///
    /// Expected format: `<YYYYMMDD-HHMMSS>[-NN]_<description>.<up|down>.<ext>`
    ///
    /// # Example
    /// - `20240101-000000_init.up.sql` → version `20240101-000000`, description `init`
    pub fn parse(filename: &str) -> Result<Self, MigrationError> {
        let malformed = || MigrationError::MalformedScriptName(filename.to_string());

        let caps = SCRIPT_NAME_RE.captures(filename).ok_or_else(malformed)?;
        let version = &caps[1];
        let description = &caps[2];

        // The digits must also be a real calendar timestamp.
        NaiveDateTime::parse_from_str(&version[..15], VERSION_FORMAT).map_err(|_| malformed())?;
        if description.contains(['/', '\\']) {
            return Err(malformed());
        }

        let direction = match &caps[3] {
            "up" => Direction::Up,
            _ => Direction::Down,
        };

        Ok(Self {
            version: version.to_string(),
            description: description.to_string(),
            direction,
            extension: caps[4].to_string(),
        })
    }

    pub fn filename(&self) -> String {
        format!(
            "{}_{}.{}.{}",
            self.version, self.description, self.direction, self.extension
        )
    }
}

/// An up-script on disk together with the identity of its down counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Timestamp-derived, lexically sortable version
    pub version: String,
    /// Free-text slug from the file name
    pub description: String,
    /// File extension shared by the up and down files
    pub extension: String,
    /// Path of the up-script
    pub path: PathBuf,
}

impl MigrationScript {
    fn from_name(dir: &Path, name: ScriptName) -> Self {
        let path = dir.join(name.filename());
        Self {
            version: name.version,
            description: name.description,
            extension: name.extension,
            path,
        }
    }

    /// Rebuild a script identity from a ledger row.
    ///
    /// The ledger stores the file name tail after `<version>_`, e.g. `init.up.sql`.
    pub fn from_ledger(dir: &Path, version: &str, stored: &str) -> Result<Self, MigrationError> {
        let name = ScriptName::parse(&format!("{version}_{stored}"))?;
        if name.direction != Direction::Up {
            return Err(MigrationError::MalformedScriptName(stored.to_string()));
        }
        Ok(Self::from_name(dir, name))
    }

    /// Value stored in the ledger's description column.
    pub fn ledger_description(&self) -> String {
        format!("{}.up.{}", self.description, self.extension)
    }

    pub fn down_path(&self) -> PathBuf {
        let name = ScriptName {
            version: self.version.clone(),
            description: self.description.clone(),
            direction: Direction::Down,
            extension: self.extension.clone(),
        };
        self.path.with_file_name(name.filename())
    }
}

/// Lists, reads and creates migration scripts in one directory.
///
/// Nothing is cached: every call goes back to the file system.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
    db_name: String,
}

impl ScriptStore {
    /// `db_name` is written into the `USE` preamble of new scripts.
    pub fn new(dir: impl AsRef<Path>, db_name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            db_name: db_name.into(),
        }
    }

    pub fn from_config(config: &MigConfig) -> Self {
        Self::new(&config.migrations_dir, config.db_name.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All up-scripts, sorted by version (oldest first).
    ///
    /// Files that are not up-scripts are ignored. Files that look like
    /// up-scripts but fail to parse are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryNotFound` if the directory is missing, or `Io` if it
    /// cannot be read.
    pub fn list_up(&self) -> Result<Vec<MigrationScript>, MigrationError> {
        let mut scripts = Vec::new();

        for filename in self.filenames()? {
            match ScriptName::parse(&filename) {
                Ok(name) if name.direction == Direction::Up => {
                    scripts.push(MigrationScript::from_name(&self.dir, name));
                }
                Ok(_) => {}
                Err(e) => {
                    if filename.contains(".up.") {
                        log::warn!("Skipping {}: {}", self.dir.join(&filename).display(), e);
                    }
                }
            }
        }

        scripts.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.description.cmp(&b.description))
        });
        Ok(scripts)
    }

    /// Identity of the script a ledger row refers to. The files need not exist.
    pub fn script_for(&self, version: &str, stored: &str) -> Result<MigrationScript, MigrationError> {
        MigrationScript::from_ledger(&self.dir, version, stored)
    }

    pub fn read_up(&self, script: &MigrationScript) -> Result<String, MigrationError> {
        read_script(&script.path)
    }

    /// Read the down-script paired with `script`.
    ///
    /// # Errors
    ///
    /// Returns `ScriptNotFound` when the down file does not exist.
    pub fn read_down(&self, script: &MigrationScript) -> Result<String, MigrationError> {
        read_script(&script.down_path())
    }

    /// Create an up/down pair stamped with the current local time.
    pub fn create(&self, description: &str) -> Result<(PathBuf, PathBuf), MigrationError> {
        self.create_at(description, Local::now().naive_local())
    }

    /// Create an up/down pair stamped with `now`.
    ///
    /// If a script with the same second-resolution version already exists, a
    /// `-01`..`-99` disambiguator is appended so versions stay unique and
    /// still sort in creation order.
    pub fn create_at(
        &self,
        description: &str,
        now: NaiveDateTime,
    ) -> Result<(PathBuf, PathBuf), MigrationError> {
        if !DESCRIPTION_RE.is_match(description) {
            return Err(MigrationError::InvalidDescription(description.to_string()));
        }

        fs::create_dir_all(&self.dir).map_err(|e| MigrationError::io(&self.dir, e))?;

        let base = now.format(VERSION_FORMAT).to_string();
        let version = self.next_free_version(&base)?;

        let script = MigrationScript::from_name(
            &self.dir,
            ScriptName {
                version,
                description: description.to_string(),
                direction: Direction::Up,
                extension: DEFAULT_EXTENSION.to_string(),
            },
        );
        let up_path = script.path.clone();
        let down_path = script.down_path();

        let preamble = format!("USE {};\n", self.db_name);
        write_new(&up_path, &preamble)?;
        write_new(&down_path, &preamble)?;

        log::debug!("Created {} and {}", up_path.display(), down_path.display());
        Ok((up_path, down_path))
    }

    fn next_free_version(&self, base: &str) -> Result<String, MigrationError> {
        let taken: BTreeSet<String> = self
            .filenames()?
            .iter()
            .filter_map(|f| ScriptName::parse(f).ok())
            .map(|n| n.version)
            .collect();

        if !taken.contains(base) {
            return Ok(base.to_string());
        }
        (1..=MAX_DISAMBIGUATOR)
            .map(|n| format!("{base}-{n:02}"))
            .find(|candidate| !taken.contains(candidate))
            .ok_or_else(|| MigrationError::VersionCollision {
                version: base.to_string(),
            })
    }

    fn filenames(&self) -> Result<Vec<String>, MigrationError> {
        if !self.dir.is_dir() {
            return Err(MigrationError::DirectoryNotFound(self.dir.clone()));
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| MigrationError::io(&self.dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrationError::io(&self.dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            // Non UTF-8 names cannot match the pattern.
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

fn read_script(path: &Path) -> Result<String, MigrationError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => MigrationError::ScriptNotFound {
            path: path.to_path_buf(),
        },
        _ => MigrationError::io(path, e),
    })
}

fn write_new(path: &Path, contents: &str) -> Result<(), MigrationError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| MigrationError::io(path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| MigrationError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_up_script_name() {
        let name = ScriptName::parse("20240101-000000_init.up.sql").unwrap();
        assert_eq!(name.version, "20240101-000000");
        assert_eq!(name.description, "init");
        assert_eq!(name.direction, Direction::Up);
        assert_eq!(name.extension, "sql");
        assert_eq!(name.filename(), "20240101-000000_init.up.sql");
    }

    #[test]
    fn test_parse_down_script_with_disambiguator() {
        let name = ScriptName::parse("20240101-000000-02_add_users.down.sql").unwrap();
        assert_eq!(name.version, "20240101-000000-02");
        assert_eq!(name.description, "add_users");
        assert_eq!(name.direction, Direction::Down);
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for bad in [
            "README.md",
            "20240101-000000_init.sql",
            "2024010-000000_init.up.sql",
            "20240101000000_init.up.sql",
            "20240101-000000_.up.sql",
            "20241301-000000_init.up.sql",
            "20240101-250000_init.up.sql",
            "20240101-000000_init.sideways.sql",
        ] {
            let err = ScriptName::parse(bad).unwrap_err();
            assert!(
                matches!(err, MigrationError::MalformedScriptName(ref n) if n == bad),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn test_ledger_description_round_trips_to_down_path() {
        let dir = Path::new("migrations");
        let script = MigrationScript::from_ledger(dir, "20240101-000000", "init.up.sql").unwrap();
        assert_eq!(script.description, "init");
        assert_eq!(script.ledger_description(), "init.up.sql");
        assert_eq!(script.path, dir.join("20240101-000000_init.up.sql"));
        assert_eq!(script.down_path(), dir.join("20240101-000000_init.down.sql"));
    }

    #[test]
    fn test_from_ledger_rejects_down_or_truncated_descriptions() {
        let dir = Path::new("migrations");
        assert!(matches!(
            MigrationScript::from_ledger(dir, "20240101-000000", "init.down.sql"),
            Err(MigrationError::MalformedScriptName(_))
        ));
        assert!(matches!(
            MigrationScript::from_ledger(dir, "20240101-000000", "init"),
            Err(MigrationError::MalformedScriptName(_))
        ));
    }

    #[test]
    fn test_list_up_missing_directory() {
        let store = ScriptStore::new("/nonexistent/path/that/does/not/exist", "bte");
        assert!(matches!(
            store.list_up(),
            Err(MigrationError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_create_writes_seeded_pair() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScriptStore::new(temp_dir.path().join("migrations"), "shop");

        let (up, down) = store.create_at("create_users", at(12, 30, 5)).unwrap();
        assert_eq!(
            up.file_name().unwrap(),
            "20240101-123005_create_users.up.sql"
        );
        assert_eq!(
            down.file_name().unwrap(),
            "20240101-123005_create_users.down.sql"
        );
        assert_eq!(fs::read_to_string(&up).unwrap(), "USE shop;\n");
        assert_eq!(fs::read_to_string(&down).unwrap(), "USE shop;\n");
    }

    #[test]
    fn test_create_rejects_unsafe_description() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScriptStore::new(temp_dir.path(), "bte");
        for bad in ["", "two words", "../escape", "dotted.name"] {
            assert!(matches!(
                store.create_at(bad, at(0, 0, 0)),
                Err(MigrationError::InvalidDescription(_))
            ));
        }
    }

    #[test]
    fn test_version_collision_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScriptStore::new(temp_dir.path(), "bte");
        let now = at(0, 0, 0);

        store.create_at("first", now).unwrap();
        for _ in 1..=MAX_DISAMBIGUATOR {
            store.create_at("again", now).unwrap();
        }
        assert!(matches!(
            store.create_at("overflow", now),
            Err(MigrationError::VersionCollision { ref version }) if version == "20240101-000000"
        ));
    }
}
