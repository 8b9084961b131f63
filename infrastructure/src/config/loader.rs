//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Directory name under the user config dir
const APP_DIR: &str = "quorum-gateway";

/// Project-level config file names, checked in order
const PROJECT_FILES: [&str; 2] = ["quorum-gateway.toml", ".quorum-gateway.toml"];

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. Explicit config path (if provided)
    /// 2. Project root: `./quorum-gateway.toml` or `./.quorum-gateway.toml`
    /// 3. XDG config: `$XDG_CONFIG_HOME/quorum-gateway/config.toml`
    /// 4. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        Self::load_from(
            Self::global_config_path().as_deref(),
            Self::project_config_path().as_deref(),
            config_path.map(PathBuf::as_path),
        )
    }

    /// Merge the given sources over the defaults; missing files are skipped
    pub fn load_from(
        global: Option<&Path>,
        project: Option<&Path>,
        explicit: Option<&Path>,
    ) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // An explicit path must exist
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file_exact(path));
        }

        figment.extract().map_err(Box::new)
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/quorum-gateway/config.toml if set,
    /// otherwise falls back to ~/.config/quorum-gateway/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Describe the config file locations being used (for --show-config)
    pub fn describe_sources(explicit: Option<&PathBuf>) -> String {
        let mut out = String::from("Configuration sources (in priority order):\n");

        if let Some(path) = explicit {
            out.push_str(&format!("  [FOUND] Explicit: {}\n", path.display()));
        }

        match Self::project_config_path() {
            Some(path) => out.push_str(&format!("  [FOUND] Project: {}\n", path.display())),
            None => out.push_str(&format!(
                "  [     ] Project: ./{} or ./{}\n",
                PROJECT_FILES[0], PROJECT_FILES[1]
            )),
        }

        if let Some(path) = Self::global_config_path() {
            let mark = if path.exists() { "FOUND" } else { "     " };
            out.push_str(&format!("  [{}] Global:  {}\n", mark, path.display()));
        }

        out.push_str("  [     ] Default: built-in defaults\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert!(config.participants.is_empty());
        assert!(config.collaboration.cross_review);
    }

    #[test]
    fn test_global_config_path_returns_some() {
        // Should return a path (even if file doesn't exist)
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("quorum-gateway"));
    }

    #[test]
    fn test_later_sources_override_earlier() {
        let global = toml_file(
            r#"
[[participants]]
id = "global-only"
command = "sh"

[collaboration]
call_timeout_secs = 10
analysis_retries = 3
"#,
        );
        let project = toml_file(
            r#"
[collaboration]
call_timeout_secs = 20
"#,
        );
        let explicit = toml_file(
            r#"
[lifecycle]
grace_period_secs = 1
"#,
        );

        let config = ConfigLoader::load_from(
            Some(global.path()),
            Some(project.path()),
            Some(explicit.path()),
        )
        .unwrap();

        assert_eq!(config.participants.len(), 1);
        assert_eq!(config.collaboration.call_timeout_secs, 20);
        assert_eq!(config.collaboration.analysis_retries, 3);
        assert_eq!(config.lifecycle.grace_period_secs, 1);
        assert_eq!(config.lifecycle.handshake_timeout_secs, 15);
    }

    #[test]
    fn test_missing_optional_sources_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            ConfigLoader::load_from(Some(&dir.path().join("absent.toml")), None, None).unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from(None, None, Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let bad = toml_file("[collaboration\ncross_review = ");
        assert!(ConfigLoader::load_from(None, None, Some(bad.path())).is_err());
    }
}
