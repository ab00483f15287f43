//! External tool detection.
//!
//! The [`ToolRegistry`] resolves the Pandoc executable (honouring a
//! configured override) and reports on the optional PDF engines Pandoc can
//! delegate to.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Name under which Pandoc is registered.
pub const PANDOC: &str = "pandoc";

/// PDF engines reported by [`ToolRegistry::check_all`]. None are required.
const PDF_ENGINE_TOOLS: &[&str] = &[
    "pdflatex",
    "xelatex",
    "lualatex",
    "tectonic",
    "wkhtmltopdf",
    "weasyprint",
    "typst",
];

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "pandoc").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
    /// Arguments placed before any per-invocation arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ToolConfig {
    /// A [`ToolCommand`] for this tool with its leading arguments applied.
    pub fn command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.path.clone());
        cmd.args(self.args.iter().cloned());
        cmd
    }

    /// First line of the tool's `--version` output.
    pub async fn version(&self) -> Option<String> {
        let output = self
            .command()
            .arg("--version")
            .timeout(VERSION_TIMEOUT)
            .execute()
            .await
            .ok()?;
        first_line(&output.stdout)
    }
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Whether conversions cannot run without it.
    pub required: bool,
    /// Version string (first line of `--version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured `pandoc_path` is used directly when it exists, looked up
    /// in `PATH` when it is a bare name, and otherwise ignored in favour of
    /// `pandoc` from `PATH`. Tools that are not found are omitted.
    pub fn discover(tools_config: &pb_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        let custom = tools_config.pandoc_path.as_deref();
        let pandoc = custom
            .and_then(resolve_custom)
            .or_else(|| which::which(PANDOC).ok());
        match pandoc {
            Some(path) => {
                tools.insert(
                    PANDOC.to_string(),
                    ToolConfig {
                        name: PANDOC.to_string(),
                        path,
                        args: tools_config.pandoc_args.clone(),
                    },
                );
            }
            None => tracing::warn!("pandoc not found; conversions will fail until it is installed"),
        }

        for &name in PDF_ENGINE_TOOLS {
            if let Ok(path) = which::which(name) {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                        args: Vec::new(),
                    },
                );
            }
        }

        Self { tools }
    }

    /// Return the [`ToolConfig`] for the given tool, or an
    /// [`pb_core::Error::Tool`] if it was not found during discovery.
    pub fn require(&self, name: &str) -> pb_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            pb_core::Error::tool(
                name,
                format!("{name} is not installed or not found in PATH"),
            )
        })
    }

    /// The Pandoc tool, if discovered.
    pub fn pandoc(&self) -> Option<&ToolConfig> {
        self.tools.get(PANDOC)
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        std::iter::once(PANDOC)
            .chain(PDF_ENGINE_TOOLS.iter().copied())
            .map(|name| {
                let required = name == PANDOC;
                match self.tools.get(name) {
                    Some(cfg) => ToolInfo {
                        name: name.to_string(),
                        available: true,
                        required,
                        version: detect_version(cfg),
                        path: Some(cfg.path.clone()),
                    },
                    None => ToolInfo {
                        name: name.to_string(),
                        available: false,
                        required,
                        version: None,
                        path: None,
                    },
                }
            })
            .collect()
    }
}

fn resolve_custom(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }
    match which::which(path) {
        Ok(found) => Some(found),
        Err(_) => {
            tracing::warn!(
                "Configured pandoc_path {} does not exist; falling back to PATH",
                path.display()
            );
            None
        }
    }
}

/// Blocking `<tool> --version`, for the CLI.
fn detect_version(cfg: &ToolConfig) -> Option<String> {
    let output = std::process::Command::new(&cfg.path)
        .args(&cfg.args)
        .arg("--version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    first_line(&String::from_utf8_lossy(&output.stdout))
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|s| s.to_string())
}
