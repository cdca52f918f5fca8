use crate::config::Config;
use std::path::Path;

pub type Result<T> = std::result::Result<T, ConfigIoError>;

#[derive(Debug)]
pub enum ConfigIoError {
    CreateDefault {
        path: String,
        source: Box<ConfigIoError>,
    },
    Read {
        path: String,
        source: std::io::Error,
    },
    ParseToml {
        path: String,
        source: toml::de::Error,
    },
    Invalid {
        path: String,
        reason: String,
    },
    SerializeToml {
        source: toml::ser::Error,
    },
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    Write {
        path: String,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ConfigIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDefault { path, .. } => {
                write!(f, "failed to create default config at {path}")
            }
            Self::Read { path, .. } => write!(f, "failed reading config file {path}"),
            Self::ParseToml { path, .. } => write!(f, "invalid TOML in {path}"),
            Self::Invalid { path, reason } => write!(f, "invalid config in {path}: {reason}"),
            Self::SerializeToml { .. } => write!(f, "failed serializing config to TOML"),
            Self::CreateDir { path, .. } => write!(f, "failed creating directory {path}"),
            Self::Write { path, .. } => write!(f, "failed writing config file {path}"),
        }
    }
}

impl std::error::Error for ConfigIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDefault { source, .. } => Some(source.as_ref()),
            Self::Read { source, .. } => Some(source),
            Self::ParseToml { source, .. } => Some(source),
            Self::Invalid { .. } => None,
            Self::SerializeToml { source } => Some(source),
            Self::CreateDir { source, .. } => Some(source),
            Self::Write { source, .. } => Some(source),
        }
    }
}

pub async fn load_or_create_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        let default_cfg = Config::default();
        save_config(path, &default_cfg)
            .await
            .map_err(|source| ConfigIoError::CreateDefault {
                path: path.display().to_string(),
                source: Box::new(source),
            })?;
        return Ok(default_cfg);
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigIoError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let cfg: Config = toml::from_str(&content).map_err(|source| ConfigIoError::ParseToml {
        path: path.display().to_string(),
        source,
    })?;

    validate(&cfg).map_err(|reason| ConfigIoError::Invalid {
        path: path.display().to_string(),
        reason,
    })?;

    Ok(cfg)
}

pub async fn save_config(path: impl AsRef<Path>, cfg: &Config) -> Result<()> {
    let path = path.as_ref();

    let toml_string =
        toml::to_string_pretty(cfg).map_err(|source| ConfigIoError::SerializeToml { source })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ConfigIoError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
    }

    let tmp = path.with_extension("toml.tmp");
    tokio::fs::write(&tmp, toml_string)
        .await
        .map_err(|source| ConfigIoError::Write {
            path: tmp.display().to_string(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| ConfigIoError::Write {
            path: path.display().to_string(),
            source,
        })?;

    Ok(())
}

fn validate(cfg: &Config) -> std::result::Result<(), String> {
    if cfg.general.data_dir.trim().is_empty() {
        return Err("general.data_dir must not be empty".to_string());
    }
    if cfg.api.enabled && cfg.api.host.parse::<std::net::IpAddr>().is_err() {
        return Err(format!("api.host '{}' is not an IP address", cfg.api.host));
    }
    if cfg.session.metadata_timeout_secs == 0 || cfg.session.retry_metadata_timeout_secs == 0 {
        return Err("session metadata timeouts must be positive".to_string());
    }
    if cfg.session.ledger_retention_secs == 0 {
        return Err("session.ledger_retention_secs must be positive".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("rust-swarm-config-{tag}-{nanos}"));
        p
    }

    #[tokio::test]
    async fn missing_config_is_created_with_defaults() {
        let root = temp_dir("create");
        let path = root.join("config.toml");
        let cfg = load_or_create_config(&path).await.expect("load");
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let again = load_or_create_config(&path).await.expect("reload");
        assert_eq!(again, cfg);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn invalid_values_are_rejected() {
        let root = temp_dir("invalid");
        std::fs::create_dir_all(&root).expect("mkdir");
        let path = root.join("config.toml");
        std::fs::write(&path, "[api]\nhost = \"localhost\"\n").expect("write");
        let err = load_or_create_config(&path).await.expect_err("invalid host");
        assert!(matches!(err, ConfigIoError::Invalid { .. }), "{err}");

        std::fs::write(&path, "[api\n").expect("write");
        let err = load_or_create_config(&path).await.expect_err("bad toml");
        assert!(matches!(err, ConfigIoError::ParseToml { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }
}
