//! Render configuration
//!
//! Loads `RenderConfig` from YAML. Missing files fall back to defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use page_ast::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::format::{format_by_name, OutputFormat};
use crate::scope::Args;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PAGE_RENDER_CONFIG";

/// File looked up in the working directory when the env var is unset
pub const DEFAULT_CONFIG_FILE: &str = "page-render.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Global argument layer, visible to every page
    pub args: HashMap<String, serde_json::Value>,
    /// `html` or `text`
    pub default_format: String,
    /// Layout applied when a page declares none
    pub default_layout: Option<String>,
    /// Binding that embeds the content page inside a layout
    pub layout_page_name: String,
    /// Filter name that renders a named partial
    pub partial_filter_name: String,
    pub max_partial_depth: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            args: HashMap::new(),
            default_format: "html".to_string(),
            default_layout: None,
            layout_page_name: "page".to_string(),
            partial_filter_name: "partial".to_string(),
            max_partial_depth: 32,
        }
    }
}

impl RenderConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse render config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if format_by_name(&self.default_format).is_none() {
            bail!(
                "Unknown default_format '{}' (expected 'html' or 'text')",
                self.default_format
            );
        }
        if self.max_partial_depth == 0 {
            bail!("max_partial_depth must be at least 1");
        }
        if self.layout_page_name.trim().is_empty() || self.partial_filter_name.trim().is_empty() {
            bail!("layout_page_name and partial_filter_name must not be empty");
        }
        Ok(())
    }

    /// Global arguments as render values
    pub fn global_args(&self) -> Args {
        self.args
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }

    /// The configured default format, HTML if the name is unknown
    pub fn format(&self) -> Arc<dyn OutputFormat> {
        format_by_name(&self.default_format).unwrap_or_else(|| Arc::new(crate::format::HtmlFormat))
    }
}

pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Resolve the config file.
    ///
    /// Path resolution order:
    /// 1. PAGE_RENDER_CONFIG environment variable
    /// 2. `page-render.yaml` in the working directory
    /// 3. No file (defaults)
    pub fn from_env() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::new(path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::new(DEFAULT_CONFIG_FILE);
        }
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<RenderConfig> {
        let Some(path) = &self.path else {
            debug!("No render config file, using defaults");
            return Ok(RenderConfig::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = RenderConfig::from_yaml_str(&content)
            .with_context(|| format!("Invalid render config in {}", path.display()))?;

        info!(
            path = %path.display(),
            args = config.args.len(),
            format = %config.default_format,
            "Loaded render config"
        );
        Ok(config)
    }
}
