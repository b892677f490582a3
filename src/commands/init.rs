//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

/// Initialize gbtim configuration and database.
///
/// Writing the config refuses to clobber an existing file without `force`;
/// opening the database is always safe, existing rows are kept.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let base_dir = base_dir.unwrap_or_else(Config::default_base_dir);
    let config_path = base_dir.join("config.toml");

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.paths.config_file = config_path.clone();
    config.paths.db_file = base_dir.join("index.db");
    config.paths.base_dir = base_dir;

    config.validate()?;
    config.save(&config_path)?;
    info!("Created config at {:?}", config_path);

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_db() {
        let tmp = TempDir::new().unwrap();
        let config = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        assert!(config.paths.config_file.exists());
        assert!(config.paths.db_file.exists());

        let db = MetaDb::connect(&config).await.unwrap();
        assert!(db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        let err = cmd_init(Some(tmp.path().to_path_buf()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        cmd_init(Some(tmp.path().to_path_buf()), true).await.unwrap();
    }
}
