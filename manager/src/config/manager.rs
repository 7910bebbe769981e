// File: manager/src/config/manager.rs
use super::{Config, ServiceConfigFile};
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path).await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        config.validate()
            .map_err(|e| anyhow!("Invalid main config {}: {}", main_config_path, e))?;

        // Service seed files are optional
        let services_dir = format!("{}/services", config_dir);
        if !Path::new(&services_dir).is_dir() {
            info!("No services directory at {}, starting without seed services", services_dir);
            return Ok(config);
        }

        let pattern = format!("{}/*.toml", services_dir);
        let mut seen_ids = HashSet::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;

            debug!("Loading service config: {}", path.display());

            let content = fs::read_to_string(&path).await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let service_file: ServiceConfigFile = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            let service = service_file.service;
            if service.id <= 0 {
                return Err(anyhow!("Service in {} must have a positive id", path.display()));
            }
            if !seen_ids.insert(service.id) {
                return Err(anyhow!("Duplicate service id {} in {}", service.id, path.display()));
            }

            config.services.push(service);
        }

        config.services.sort_by_key(|s| s.id);

        info!("Loaded {} seed services", config.services.len());

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_loads_main_and_service_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "main.toml", "port = 9100\n");
        std::fs::create_dir(dir.path().join("services")).unwrap();
        write(
            &dir.path().join("services"),
            "b.toml",
            "[service]\nid = 2\nname = \"b\"\n[service.transport]\nkind = \"sse\"\nurl = \"http://localhost:1/sse\"\n",
        );
        write(
            &dir.path().join("services"),
            "a.toml",
            "[service]\nid = 1\nname = \"a\"\n[service.transport]\nkind = \"stdio\"\ncommand = \"sh\"\n",
        );

        let manager = ConfigManager::new(dir.path().to_string_lossy().to_string()).await.unwrap();
        let config = manager.get_current_config();
        assert_eq!(config.port, 9100);
        let ids: Vec<_> = config.services.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_service_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "main.toml", "");
        let services = dir.path().join("services");
        std::fs::create_dir(&services).unwrap();
        let body = "[service]\nid = 5\nname = \"x\"\n[service.transport]\nkind = \"stdio\"\ncommand = \"sh\"\n";
        write(&services, "one.toml", body);
        write(&services, "two.toml", body);

        let err = ConfigManager::new(dir.path().to_string_lossy().to_string())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Duplicate service id 5"));
    }

    #[tokio::test]
    async fn test_missing_services_dir_is_fine() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "main.toml", "");
        let manager = ConfigManager::new(dir.path().to_string_lossy().to_string()).await.unwrap();
        assert!(manager.get_current_config().services.is_empty());
    }
}
