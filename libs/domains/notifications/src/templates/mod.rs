//! Email template cache.
//!
//! Templates are Handlebars files located by name: `<dir>/<name>.html`.
//! The first render of a name loads and compiles it; every later render
//! reuses the compiled template. Entries are never evicted.

use crate::error::{NotificationError, NotificationResult};
use core_config::{env_or_default, ConfigError, FromEnv};
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info};

/// File extension for template sources.
pub const TEMPLATE_EXTENSION: &str = "html";

/// Where template sources come from.
pub trait TemplateSource: Send + Sync {
    /// Load the raw source for `name`.
    fn load(&self, name: &str) -> NotificationResult<String>;

    /// Description for logs.
    fn describe(&self) -> String;
}

/// Template configuration.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    /// Directory holding `<name>.html` files.
    pub dir: PathBuf,
}

impl FromEnv for TemplateConfig {
    /// Reads:
    /// - TEMPLATES_DIR: defaults to `templates`
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dir: PathBuf::from(env_or_default("TEMPLATES_DIR", "templates")),
        })
    }
}

/// Loads templates from a directory by naming convention.
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    dir: PathBuf,
}

impl FileTemplateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &TemplateConfig) -> Self {
        Self::new(config.dir.clone())
    }

    /// Resolved path for a template name.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION))
    }
}

impl TemplateSource for FileTemplateSource {
    fn load(&self, name: &str) -> NotificationResult<String> {
        let path = self.path_for(name);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => NotificationError::TemplateNotFound(format!(
                "{} ({})",
                name,
                path.display()
            )),
            _ => NotificationError::TemplateError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )),
        })
    }

    fn describe(&self) -> String {
        format!("directory '{}'", self.dir.display())
    }
}

/// Fixed set of template sources held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateSource {
    sources: HashMap<String, String>,
}

impl StaticTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }
}

impl TemplateSource for StaticTemplateSource {
    fn load(&self, name: &str) -> NotificationResult<String> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| NotificationError::TemplateNotFound(name.to_string()))
    }

    fn describe(&self) -> String {
        format!("{} in-memory templates", self.sources.len())
    }
}

/// Compile-once, render-many template cache.
pub struct TemplateCache {
    source: Box<dyn TemplateSource>,
    registry: RwLock<Handlebars<'static>>,
}

impl TemplateCache {
    pub fn new<S: TemplateSource + 'static>(source: S) -> Self {
        info!(source = %source.describe(), "Template cache initialized");
        Self {
            source: Box::new(source),
            registry: RwLock::new(Handlebars::new()),
        }
    }

    /// Render `name` with `variables`.
    ///
    /// Loads and compiles the template on first use. Missing or invalid
    /// templates fail here and are not cached, so every attempt reports them.
    pub fn render<T: Serialize>(&self, name: &str, variables: &T) -> NotificationResult<String> {
        validate_name(name)?;

        {
            let registry = self.read()?;
            if registry.has_template(name) {
                return Ok(registry.render(name, variables)?);
            }
        }

        self.compile(name)?;
        Ok(self.read()?.render(name, variables)?)
    }

    /// Whether `name` has already been compiled.
    pub fn is_cached(&self, name: &str) -> bool {
        self.read()
            .map(|registry| registry.has_template(name))
            .unwrap_or(false)
    }

    /// Number of compiled templates.
    pub fn len(&self) -> usize {
        self.read()
            .map(|registry| registry.get_templates().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compile(&self, name: &str) -> NotificationResult<()> {
        let mut registry = self
            .registry
            .write()
            .map_err(|_| NotificationError::TemplateError("template cache lock poisoned".to_string()))?;

        // Another caller may have compiled it while we waited for the lock
        if registry.has_template(name) {
            return Ok(());
        }

        let source = self.source.load(name)?;
        registry.register_template_string(name, source)?;
        debug!(template = name, "Compiled template");
        Ok(())
    }

    fn read(&self) -> NotificationResult<std::sync::RwLockReadGuard<'_, Handlebars<'static>>> {
        self.registry
            .read()
            .map_err(|_| NotificationError::TemplateError("template cache lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("source", &self.source.describe())
            .field("compiled", &self.len())
            .finish()
    }
}

/// Template names map straight to file names, so keep them to one path segment.
fn validate_name(name: &str) -> NotificationResult<()> {
    let valid = !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\');

    if valid {
        Ok(())
    } else {
        Err(NotificationError::TemplateError(format!(
            "Invalid template name '{}'",
            name
        )))
    }
}
