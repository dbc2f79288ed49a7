use std::path::{Path, PathBuf};

use leadboard_core::ColumnMapping;
use leadboard_fetch::{BackoffPolicy, Credentials, HttpClientConfig};
use thiserror::Error;

use crate::duplicates::DEFAULT_DUPLICATE_THRESHOLD;

pub const LOGIN_VAR: &str = "LEADBOARD_LOGIN";
pub const PASSWORD_VAR: &str = "LEADBOARD_PASSWORD";
pub const CONTACTS_URL_VAR: &str = "LEADBOARD_CONTACTS_URL";
pub const RECORDS_URL_VAR: &str = "LEADBOARD_RECORDS_URL";
pub const TIMEOUT_VAR: &str = "LEADBOARD_HTTP_TIMEOUT_SECS";
pub const USER_AGENT_VAR: &str = "LEADBOARD_USER_AGENT";
pub const COLUMNS_FILE_VAR: &str = "LEADBOARD_COLUMNS_FILE";
pub const THRESHOLD_VAR: &str = "LEADBOARD_DUPLICATE_THRESHOLD";
pub const WEB_PORT_VAR: &str = "LEADBOARD_WEB_PORT";

pub const DEFAULT_WEB_PORT: u16 = 8000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("{key} must be {expected}, got `{value}`")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("reading column mapping {}: {source}", .path.display())]
    ColumnsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing column mapping {}: {source}", .path.display())]
    ColumnsYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Everything one pipeline run needs. Built once, before any network call.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub credentials: Credentials,
    pub contacts_url: String,
    pub records_url: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub columns: ColumnMapping,
    pub duplicate_threshold: u8,
}

impl PipelineConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let required = [LOGIN_VAR, PASSWORD_VAR, CONTACTS_URL_VAR, RECORDS_URL_VAR];
        let missing = required
            .into_iter()
            .filter(|key| read(*key).is_none())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let login = read(LOGIN_VAR).unwrap_or_default();
        let password = read(PASSWORD_VAR).unwrap_or_default();

        let http_timeout_secs: u64 = match read(TIMEOUT_VAR) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: TIMEOUT_VAR,
                expected: "a whole number of seconds",
                value: raw,
            })?,
            None => 20,
        };

        let duplicate_threshold = match read(THRESHOLD_VAR) {
            Some(raw) => parse_threshold(&raw).ok_or(ConfigError::Invalid {
                key: THRESHOLD_VAR,
                expected: "an integer between 0 and 100",
                value: raw,
            })?,
            None => DEFAULT_DUPLICATE_THRESHOLD,
        };

        let columns = match read(COLUMNS_FILE_VAR) {
            Some(path) => load_column_mapping(Path::new(path.trim()))?,
            None => ColumnMapping::default(),
        };

        Ok(Self {
            credentials: Credentials::new(login.trim(), password),
            contacts_url: read(CONTACTS_URL_VAR).unwrap_or_default().trim().to_string(),
            records_url: read(RECORDS_URL_VAR).unwrap_or_default().trim().to_string(),
            http_timeout_secs,
            user_agent: read(USER_AGENT_VAR).unwrap_or_else(|| "leadboard/0.1".to_string()),
            columns,
            duplicate_threshold,
        })
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: std::time::Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Dashboard port; unset or unparsable values fall back to the default.
pub fn web_port_from_env() -> u16 {
    std::env::var(WEB_PORT_VAR)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_WEB_PORT)
}

pub fn parse_threshold(raw: &str) -> Option<u8> {
    raw.trim().parse::<u8>().ok().filter(|t| *t <= 100)
}

/// Reads a YAML column mapping; keys left out keep their defaults.
pub fn load_column_mapping(path: &Path) -> Result<ColumnMapping, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ColumnsFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mapping: ColumnMapping =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::ColumnsYaml {
            path: path.to_path_buf(),
            source,
        })?;
    validate_column_mapping(&mapping)?;
    Ok(mapping)
}

/// Role columns must be named and the merge suffixes must tell the two sides
/// of a colliding header apart.
pub fn validate_column_mapping(mapping: &ColumnMapping) -> Result<(), ConfigError> {
    let invalid = |key: &'static str, expected: &'static str, value: &str| ConfigError::Invalid {
        key,
        expected,
        value: value.to_string(),
    };

    let named = [
        ("contact_id", &mapping.contact_id),
        ("contact_name", &mapping.contact_name),
        ("person_ref", &mapping.person_ref),
        ("process_name", &mapping.process_name),
        ("selection_process_name", &mapping.selection_process_name),
        ("stage_name", &mapping.stage_name),
        ("process_key", &mapping.process_key),
        ("contacts_suffix", &mapping.contacts_suffix),
        ("registrations_suffix", &mapping.registrations_suffix),
    ];
    if let Some((key, value)) = named.into_iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(invalid(key, "a non-empty name", value));
    }
    if mapping.contacts_suffix == mapping.registrations_suffix {
        return Err(invalid(
            "registrations_suffix",
            "a suffix different from contacts_suffix",
            &mapping.registrations_suffix,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        vars(&[
            (LOGIN_VAR, "ana"),
            (PASSWORD_VAR, "segredo"),
            (CONTACTS_URL_VAR, "https://crm.example.com/contatos.csv"),
            (RECORDS_URL_VAR, "https://crm.example.com/registros.csv"),
        ])
    }

    #[test]
    fn loads_required_values_with_defaults() {
        let env = complete();
        let config = PipelineConfig::from_vars(|k| env.get(k).cloned()).expect("config");
        assert_eq!(config.credentials.login, "ana");
        assert_eq!(config.credentials.password(), "segredo");
        assert_eq!(config.http_timeout_secs, 20);
        assert_eq!(config.duplicate_threshold, 98);
        assert_eq!(config.columns, ColumnMapping::default());
    }

    #[test]
    fn reports_every_missing_key() {
        let env = vars(&[(LOGIN_VAR, "ana"), (RECORDS_URL_VAR, "  ")]);
        let err = PipelineConfig::from_vars(|k| env.get(k).cloned()).unwrap_err();
        match err {
            ConfigError::Missing(keys) => {
                assert_eq!(keys, vec![PASSWORD_VAR, CONTACTS_URL_VAR, RECORDS_URL_VAR]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut env = complete();
        env.insert(THRESHOLD_VAR.into(), "140".into());
        let err = PipelineConfig::from_vars(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: THRESHOLD_VAR, .. }));
    }

    fn with_columns_file(yaml: &str) -> Result<PipelineConfig, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "{yaml}").expect("write");
        let mut env = complete();
        env.insert(COLUMNS_FILE_VAR.into(), file.path().display().to_string());
        PipelineConfig::from_vars(|k| env.get(k).cloned())
    }

    #[test]
    fn rejects_blank_merge_suffixes() {
        let err = with_columns_file("contacts_suffix: \"\"\nregistrations_suffix: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "contacts_suffix", .. }));
    }

    #[test]
    fn rejects_equal_merge_suffixes() {
        let err = with_columns_file("contacts_suffix: _x\nregistrations_suffix: _x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "registrations_suffix", .. }));
    }

    #[test]
    fn rejects_blank_contact_id() {
        let err = with_columns_file("contact_id: \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "contact_id", .. }));
    }

    #[test]
    fn default_mapping_is_valid() {
        assert!(validate_column_mapping(&ColumnMapping::default()).is_ok());
    }

    #[test]
    fn partial_column_mapping_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "contact_id: codigo\ncontacts_suffix: _c").expect("write");

        let mut env = complete();
        env.insert(
            COLUMNS_FILE_VAR.into(),
            file.path().display().to_string(),
        );
        let config = PipelineConfig::from_vars(|k| env.get(k).cloned()).expect("config");
        assert_eq!(config.columns.contact_id, "codigo");
        assert_eq!(config.columns.contacts_suffix, "_c");
        assert_eq!(config.columns.person_ref, "pessoa");
    }
}
