//! Label and store configuration types for logdb.
//!
//! These types define which labels a store carries, how many records it keeps
//! resident in memory, and how its backing file is laid out. Configuration
//! happens at open time; the label set of an existing file can only grow.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result, StoreError};

/// Reserved label of the first column, holding the record time in seconds.
pub const TIME_LABEL: &str = "Time";

/// Default number of bytes reserved for the two header lines.
pub const DEFAULT_HEADER_RESERVE: usize = 2048;

/// Default size of the first chunk read from the end of the file on restore.
pub const DEFAULT_RESTORE_CHUNK_SIZE: usize = 1_000_000;

/// Separator between a group name and a sub label in flattened labels.
pub const GROUP_SEPARATOR: char = ':';

/// Declaration of the value labels of a store.
///
/// Labels are either a flat list or a two-level map of group to sub labels,
/// flattened to `"group:sub"`. The time label is never part of the spec; it
/// is always prepended by [`LabelSpec::flatten`].
///
/// # Example
///
/// ```rust
/// use logdb::schema::LabelSpec;
///
/// let spec = LabelSpec::grouped([
///     ("living", vec!["temperature", "humidity"]),
///     ("office", vec!["co2"]),
/// ]);
/// assert_eq!(
///     spec.flatten(),
///     vec!["Time", "living:temperature", "living:humidity", "office:co2"],
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelSpec {
    /// Plain label list, e.g. `["temperature", "humidity"]`.
    Flat(Vec<String>),

    /// Group to sub label lists, e.g. `{"living": ["temperature"]}`.
    Grouped(#[serde(with = "ordered_pairs")] Vec<(String, Vec<String>)>),
}

impl LabelSpec {
    /// Creates a flat label specification.
    pub fn flat<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Flat(labels.into_iter().map(Into::into).collect())
    }

    /// Creates a grouped label specification, keeping group order.
    pub fn grouped<I, G, L, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (G, L)>,
        G: Into<String>,
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Grouped(
            groups
                .into_iter()
                .map(|(group, subs)| (group.into(), subs.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    /// Returns the ordered label sequence, time label first.
    pub fn flatten(&self) -> Vec<String> {
        let mut labels = vec![TIME_LABEL.to_string()];
        match self {
            Self::Flat(list) => labels.extend(list.iter().cloned()),
            Self::Grouped(groups) => {
                for (group, subs) in groups {
                    labels.extend(subs.iter().map(|sub| group_label(group, sub)));
                }
            }
        }
        labels
    }

    /// Validates the flattened labels.
    ///
    /// Labels must be non-empty, unique, free of commas, line breaks and
    /// surrounding whitespace, and must not reuse the time label.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] naming the first offending label.
    pub fn validate(&self) -> Result<()> {
        let labels = self.flatten();
        let mut seen = HashSet::with_capacity(labels.len());

        for label in labels.iter().skip(1) {
            let reason = if label.is_empty() {
                Some("labels cannot be empty".to_string())
            } else if label == TIME_LABEL {
                Some(format!("label '{TIME_LABEL}' is reserved for the record time"))
            } else if label.contains([',', '\n', '\r']) {
                Some(format!("label '{label}' contains a separator character"))
            } else if label.trim() != label {
                Some(format!("label '{label}' has surrounding whitespace"))
            } else if !seen.insert(label.as_str()) {
                Some(format!("label '{label}' is declared twice"))
            } else {
                None
            };

            if let Some(reason) = reason {
                return Err(StoreError::InvalidConfig { reason }.into());
            }
        }

        Ok(())
    }
}

/// Composes a `"group:sub"` label.
pub fn group_label(group: &str, sub: &str) -> String {
    format!("{group}{GROUP_SEPARATOR}{sub}")
}

/// Bounds on the records kept resident in memory.
///
/// Both bounds may be active at the same time; the one evicting more records
/// wins. Resident size may overshoot a bound by the eviction slack before a
/// batch of the oldest records is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Maximum number of resident records. Also caps how many records are
    /// restored from the file at open time.
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Maximum age of resident records relative to the latest insert.
    #[serde(default, with = "option_duration_serde")]
    pub max_age: Option<Duration>,
}

impl RetentionConfig {
    /// Validates the retention bounds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] for a zero record count or age.
    pub fn validate(&self) -> Result<()> {
        if self.max_records == Some(0) {
            return Err(StoreError::InvalidConfig {
                reason: "max_records must be > 0".to_string(),
            }
            .into());
        }

        if self.max_age.is_some_and(|age| age.is_zero()) {
            return Err(StoreError::InvalidConfig {
                reason: "max_age cannot be zero".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Complete configuration of a [`Store`](crate::store::Store).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use logdb::schema::{LabelSpec, StoreConfig};
///
/// let config = StoreConfig::new(LabelSpec::flat(["temperature", "humidity"]))
///     .with_path("sensors.csv")
///     .with_max_records(10_000)
///     .with_max_age(Duration::from_secs(86_400))
///     .with_delta(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Value labels of the store.
    pub labels: LabelSpec,

    /// Backing CSV file. Without a path the store is memory-only.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Resident-set bounds.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Requests delta encoding for a newly created file. The mode stored in
    /// an existing file always wins.
    #[serde(default)]
    pub delta: bool,

    /// Bytes reserved for the two header lines of a new file.
    #[serde(default = "default_header_reserve")]
    pub header_reserve: usize,

    /// Size of the first chunk read backwards on restore; doubles per chunk.
    #[serde(default = "default_restore_chunk_size")]
    pub restore_chunk_size: usize,
}

fn default_header_reserve() -> usize {
    DEFAULT_HEADER_RESERVE
}

fn default_restore_chunk_size() -> usize {
    DEFAULT_RESTORE_CHUNK_SIZE
}

impl StoreConfig {
    /// Creates a memory-only configuration with default settings.
    pub fn new(labels: LabelSpec) -> Self {
        Self {
            labels,
            path: None,
            retention: RetentionConfig::default(),
            delta: false,
            header_reserve: DEFAULT_HEADER_RESERVE,
            restore_chunk_size: DEFAULT_RESTORE_CHUNK_SIZE,
        }
    }

    /// Attaches a backing file.
    #[must_use]
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Caps the resident record count.
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.retention.max_records = Some(max_records);
        self
    }

    /// Caps the resident record age.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.retention.max_age = Some(max_age);
        self
    }

    /// Requests delta encoding for a new file.
    #[must_use]
    pub fn with_delta(mut self, delta: bool) -> Self {
        self.delta = delta;
        self
    }

    /// Overrides the initial restore chunk size.
    #[must_use]
    pub fn with_restore_chunk_size(mut self, size: usize) -> Self {
        self.restore_chunk_size = size;
        self
    }

    /// Overrides the header reserve of a new file.
    #[must_use]
    pub fn with_header_reserve(mut self, reserve: usize) -> Self {
        self.header_reserve = reserve;
        self
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if any setting is out of range.
    pub fn validate(&self) -> Result<()> {
        self.labels.validate()?;
        self.retention.validate()?;

        if self.header_reserve == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "header_reserve must be > 0".to_string(),
            }
            .into());
        }

        if self.restore_chunk_size == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "restore_chunk_size must be > 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Serde support for optional Duration fields.
///
/// Durations are serialized as total seconds (f64) for human readability
/// in JSON configuration files.
mod option_duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = Option::<f64>::deserialize(deserializer)?;
        seconds
            .map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Serde support for order-preserving maps stored as `Vec<(K, V)>`.
///
/// JSON objects keep their key order this way, which matters wherever the
/// order of groups decides label order.
pub(crate) mod ordered_pairs {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, V, S>(pairs: &[(K, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (key, value) in pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<Vec<(K, V)>, D::Error>
    where
        K: Deserialize<'de>,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        struct PairVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for PairVisitor<K, V>
        where
            K: Deserialize<'de>,
            V: Deserialize<'de>,
        {
            type Value = Vec<(K, V)>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry()? {
                    pairs.push(entry);
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_flat() {
        let spec = LabelSpec::flat(["sens0", "sens1"]);
        assert_eq!(spec.flatten(), vec!["Time", "sens0", "sens1"]);
    }

    #[test]
    fn test_flatten_grouped_keeps_order() {
        let spec = LabelSpec::grouped([("office", vec!["co2", "voc"]), ("living", vec!["temp"])]);
        assert_eq!(
            spec.flatten(),
            vec!["Time", "office:co2", "office:voc", "living:temp"]
        );
    }

    #[test]
    fn test_grouped_from_json_keeps_order() {
        let spec: LabelSpec =
            serde_json::from_str(r#"{"zeta": ["b", "a"], "alpha": ["c"]}"#).unwrap();
        assert_eq!(spec.flatten(), vec!["Time", "zeta:b", "zeta:a", "alpha:c"]);

        let flat: LabelSpec = serde_json::from_str(r#"["x", "y"]"#).unwrap();
        assert_eq!(flat, LabelSpec::flat(["x", "y"]));
    }

    #[test]
    fn test_label_validation() {
        assert!(LabelSpec::flat(["a", "b"]).validate().is_ok());
        assert!(LabelSpec::flat(["a", "a"]).validate().is_err());
        assert!(LabelSpec::flat(["Time"]).validate().is_err());
        assert!(LabelSpec::flat([""]).validate().is_err());
        assert!(LabelSpec::flat(["a,b"]).validate().is_err());
        assert!(LabelSpec::flat([" a"]).validate().is_err());
        assert!(
            LabelSpec::grouped([("g", vec!["x"]), ("g", vec!["x"])])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_config_validation() {
        let config = StoreConfig::new(LabelSpec::flat(["a"]));
        assert!(config.validate().is_ok());

        assert!(config.clone().with_max_records(0).validate().is_err());
        assert!(config.clone().with_max_age(Duration::ZERO).validate().is_err());
        assert!(config.clone().with_restore_chunk_size(0).validate().is_err());
        assert!(config.with_header_reserve(0).validate().is_err());
    }

    #[test]
    fn test_config_json_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"labels": ["a", "b"], "retention": {"max_age": 3600.0}, "delta": true}"#,
        )
        .unwrap();

        assert_eq!(config.header_reserve, DEFAULT_HEADER_RESERVE);
        assert_eq!(config.restore_chunk_size, DEFAULT_RESTORE_CHUNK_SIZE);
        assert_eq!(config.retention.max_age, Some(Duration::from_secs(3600)));
        assert_eq!(config.retention.max_records, None);
        assert!(config.delta);
        assert!(config.path.is_none());
    }

    #[test]
    fn test_config_from_json_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"labels": {"living": ["temp"]}, "path": "log.csv", "retention": {"max_records": 100}}"#,
        )
        .unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.retention.max_records, Some(100));
        assert_eq!(config.path, Some(PathBuf::from("log.csv")));
        assert_eq!(config.labels.flatten(), vec!["Time", "living:temp"]);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(StoreConfig::from_json_file(&path).is_err());
    }
}
