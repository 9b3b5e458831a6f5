//! Configuration loading.
//!
//! Config files are TOML, YAML or JSON, picked by extension. Every field has a
//! default so an empty file (or no file at all) is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{AttributeRule, AttributeSchema, Compression};

/// Environment variable overriding the database path.
pub const DATABASE_ENV: &str = "CORPUSMILL_DATABASE";

/// Lemma suffix metadata for one coarse tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Suffix appended to the lemma, e.g. `-n`.
    #[serde(default)]
    pub lpos: String,
}

/// Attribute synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    pub schema: BTreeMap<String, AttributeRule>,
    /// Join separator for multi-valued attributes.
    pub separator: String,
    /// Substitute for the separator inside values. Without one, a value
    /// containing the separator fails the build.
    pub replacement: Option<String>,
    /// Fields with this prefix get a derived `<field>__year` attribute.
    pub year_prefix: String,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            schema: BTreeMap::new(),
            separator: "|".to_string(),
            replacement: None,
            year_prefix: "date__".to_string(),
        }
    }
}

impl AttributeConfig {
    pub fn schema(&self) -> AttributeSchema {
        AttributeSchema::new(self.schema.clone())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    /// Corpus name used for exported file names.
    pub corpus: String,
    /// Record field holding the text to annotate.
    pub text_field: String,
    /// Dotted path of the record date used to window text exports.
    pub date_field: String,
    pub number_tag: String,
    pub number_placeholder: String,
    pub tagset: BTreeMap<String, TagInfo>,
    pub attributes: AttributeConfig,
    pub batch_size: usize,
    pub compression: Compression,
    pub export_dir: PathBuf,
    pub workers: usize,
    pub worker_timeout_secs: u64,

    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("corpus.db"),
            corpus: "corpus".to_string(),
            text_field: "body".to_string(),
            date_field: "date.original".to_string(),
            number_tag: "CD".to_string(),
            number_placeholder: "[number]".to_string(),
            tagset: default_tagset(),
            attributes: AttributeConfig::default(),
            batch_size: 100,
            compression: Compression::Xz,
            export_dir: PathBuf::from("data"),
            workers: 4,
            worker_timeout_secs: 3600,
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a specific file path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?,
        };

        config.source_path = Some(path.to_path_buf());
        config.resolve_paths();
        Ok(config)
    }

    /// Load from an explicit path, or let prefer discover a `corpusmill`
    /// config in its standard locations, falling back to defaults.
    /// Environment overrides apply last.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let discovered = match path {
            Some(p) => Some(p.to_path_buf()),
            None => discover().await,
        };

        let mut config = match discovered {
            Some(p) => Self::load_from_path(&p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `CORPUSMILL_DATABASE` if set.
    pub fn apply_env(&mut self) {
        if let Some(db) = std::env::var_os(DATABASE_ENV).filter(|v| !v.is_empty()) {
            self.database = PathBuf::from(db);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if self.attributes.separator.is_empty() {
            return Err(Error::Config("attribute separator is empty".to_string()));
        }
        if let Some(replacement) = &self.attributes.replacement {
            if replacement.contains(&self.attributes.separator) {
                return Err(Error::Config(
                    "attribute replacement contains the separator".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    /// Directory of the loaded config file, used for relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    fn resolve_paths(&mut self) {
        if let Some(base) = self.base_dir() {
            if self.database.is_relative() {
                self.database = base.join(&self.database);
            }
            if self.export_dir.is_relative() {
                self.export_dir = base.join(&self.export_dir);
            }
        }
    }
}

/// Path of the config file prefer discovers, if any.
async fn discover() -> Option<PathBuf> {
    match prefer::load("corpusmill").await {
        Ok(found) => found.source_path().map(|p| p.to_path_buf()),
        Err(_) => {
            tracing::debug!("No corpusmill config file discovered, using defaults");
            None
        }
    }
}

/// Penn Treebank tags with Sketch Engine style lemma suffixes.
fn default_tagset() -> BTreeMap<String, TagInfo> {
    const TAGS: &[(&str, &str)] = &[
        ("CC", "-c"),
        ("CD", "-m"),
        ("DT", "-x"),
        ("EX", "-x"),
        ("FW", "-x"),
        ("IN", "-i"),
        ("JJ", "-j"),
        ("JJR", "-j"),
        ("JJS", "-j"),
        ("LS", "-x"),
        ("MD", "-v"),
        ("NN", "-n"),
        ("NNS", "-n"),
        ("NNP", "-n"),
        ("NNPS", "-n"),
        ("PDT", "-x"),
        ("POS", "-x"),
        ("PRP", "-d"),
        ("PRP$", "-d"),
        ("RB", "-a"),
        ("RBR", "-a"),
        ("RBS", "-a"),
        ("RP", "-x"),
        ("SYM", "-x"),
        ("TO", "-x"),
        ("UH", "-x"),
        ("VB", "-v"),
        ("VBD", "-v"),
        ("VBG", "-v"),
        ("VBN", "-v"),
        ("VBP", "-v"),
        ("VBZ", "-v"),
        ("WDT", "-x"),
        ("WP", "-d"),
        ("WP$", "-d"),
        ("WRB", "-a"),
        (".", "-x"),
        (",", "-x"),
        (":", "-x"),
        ("``", "-x"),
        ("''", "-x"),
        ("-LRB-", "-x"),
        ("-RRB-", "-x"),
        ("HYPH", "-x"),
        ("NFP", "-x"),
        ("$", "-x"),
        ("#", "-x"),
    ];
    TAGS.iter()
        .map(|(tag, lpos)| {
            (
                tag.to_string(),
                TagInfo {
                    lpos: lpos.to_string(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.number_tag, "CD");
        assert_eq!(config.tagset["NN"].lpos, "-n");
        assert_eq!(config.attributes.separator, "|");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpusmill.toml");
        std::fs::write(
            &path,
            r#"
database = "db/corpus.db"
corpus = "reliefweb"
batch_size = 10

[attributes]
separator = ";"
replacement = ","

[attributes.schema.title]
multivalue = false

[attributes.schema.body]
drop = true

[tagset.NN]
lpos = "-n"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.corpus, "reliefweb");
        assert_eq!(config.database, dir.path().join("db/corpus.db"));
        assert_eq!(config.attributes.separator, ";");
        assert!(config.attributes.schema["body"].drop);
        assert_eq!(config.tagset.len(), 1);
        // untouched fields keep their defaults
        assert_eq!(config.text_field, "body");
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("c.yaml");
        std::fs::write(&yaml, "corpus: y\nworkers: 2\n").unwrap();
        let config = Config::load_from_path(&yaml).unwrap();
        assert_eq!(config.corpus, "y");
        assert_eq!(config.workers, 2);

        let json = dir.path().join("c.json");
        std::fs::write(&json, r#"{"compression": "zstd"}"#).unwrap();
        let config = Config::load_from_path(&json).unwrap();
        assert_eq!(config.compression, Compression::Zstd);
    }

    #[tokio::test]
    async fn test_load_explicit_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        std::fs::write(&path, "corpus: explicit\n").unwrap();

        let config = Config::load(Some(&path)).await.unwrap();
        assert_eq!(config.corpus, "explicit");
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));

        std::fs::write(&path, "batch_size: 0\n").unwrap();
        assert!(Config::load(Some(&path)).await.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_replacement() {
        let mut config = Config::default();
        config.attributes.replacement = Some("a|b".to_string());
        assert!(config.validate().is_err());
        config.attributes.replacement = None;
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
