//! Synchronization configuration.
//!
//! Handles loading, validating, and merging `md2wiki.toml`. The file is
//! optional and lives in the synchronization root. Values are layered:
//! stock defaults first, then the user file, then command-line flags (applied
//! by the binary after loading).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! space_key = "DOCS"            # Target space (required for remote sync)
//! root_page_id = "123456"       # Parent page for the root index document
//! title_prefix = "[Draft] "     # Prepended to every page title
//! generated_by = "This page has been generated with a tool."
//! skip_update = false           # Do not write page ids back into sources
//! keep_hierarchy = false        # Placeholder pages for directories without an index
//!
//! [site]
//! domain = "example.atlassian.net"
//! base_path = "/wiki/"
//!
//! [converter]
//! heading_anchors = false
//! force_valid_url = true
//! skip_title_heading = false
//! prefer_raster = true
//! render_mermaid = true
//! render_plantuml = true
//! render_drawio = true
//! render_latex = false
//! diagram_format = "png"
//! webui_links = false
//! use_panel = false
//! code_line_numbers = false
//!
//! [layout]
//! alignment = "center"
//!
//! [layout.image]
//! max_width = 800
//!
//! [layout.table]
//! display_mode = "responsive"
//!
//! [diagrams]
//! mermaid_command = "mmdc"
//! plantuml_command = "plantuml"
//! drawio_command = "draw.io"
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name of the configuration file looked up in the synchronization root.
pub const CONFIG_FILENAME: &str = "md2wiki.toml";

/// Banner text used when neither the document nor the config supplies one.
pub const DEFAULT_GENERATED_BY: &str = "This page has been generated with a tool.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration loaded from `md2wiki.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Default space for pages that carry no space-key directive.
    pub space_key: Option<String>,
    /// Existing page that becomes the parent of the root index document.
    pub root_page_id: Option<String>,
    /// Prefix prepended to every derived page title.
    pub title_prefix: Option<String>,
    /// Generated-by banner text. An empty string disables the banner.
    pub generated_by: String,
    /// Skip writing allocated page ids back into the source files.
    pub skip_update: bool,
    /// Give directories without an index document a placeholder page instead
    /// of lifting their documents to the nearest ancestor.
    pub keep_hierarchy: bool,
    pub site: SiteConfig,
    pub converter: ConverterConfig,
    pub layout: LayoutConfig,
    pub diagrams: DiagramsConfig,
    pub processing: ProcessingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            space_key: None,
            root_page_id: None,
            title_prefix: None,
            generated_by: DEFAULT_GENERATED_BY.to_string(),
            skip_update: false,
            keep_hierarchy: false,
            site: SiteConfig::default(),
            converter: ConverterConfig::default(),
            layout: LayoutConfig::default(),
            diagrams: DiagramsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.space_key
            && key.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "space_key must not be empty".into(),
            ));
        }
        if let Some(id) = &self.root_page_id
            && (id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ConfigError::Validation(format!(
                "root_page_id must be numeric, got {id:?}"
            )));
        }
        if !self.site.base_path.starts_with('/') || !self.site.base_path.ends_with('/') {
            return Err(ConfigError::Validation(
                "site.base_path must start and end with '/'".into(),
            ));
        }
        if self.layout.image.max_width == Some(0) {
            return Err(ConfigError::Validation(
                "layout.image.max_width must be positive".into(),
            ));
        }
        if self.layout.table.width == Some(0) {
            return Err(ConfigError::Validation(
                "layout.table.width must be positive".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Banner text, or `None` when the banner is disabled.
    pub fn generated_by(&self) -> Option<&str> {
        let text = self.generated_by.trim();
        (!text.is_empty()).then_some(text)
    }
}

/// Where the wiki lives, used to build absolute page links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Host name, e.g. `example.atlassian.net`. Empty yields host-relative links.
    pub domain: String,
    /// Path prefix of the wiki web UI.
    pub base_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            base_path: "/wiki/".to_string(),
        }
    }
}

impl SiteConfig {
    /// `https://{domain}{base_path}`, or just `base_path` without a domain.
    pub fn base_url(&self) -> String {
        if self.domain.is_empty() {
            self.base_path.clone()
        } else {
            format!("https://{}{}", self.domain, self.base_path)
        }
    }
}

/// Output format for pre-rendered diagrams and formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    #[default]
    Png,
    Svg,
}

impl DiagramFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DiagramFormat::Png => "png",
            DiagramFormat::Svg => "svg",
        }
    }
}

/// Options that steer the Markdown to storage format conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Emit an anchor macro before each heading and rewrite `#fragment` links.
    pub heading_anchors: bool,
    /// Fail the document on unresolvable relative links instead of warning.
    pub force_valid_url: bool,
    /// Drop the single top-level heading when it became the page title.
    pub skip_title_heading: bool,
    /// Replace `x.svg` with a co-located `x.png`.
    pub prefer_raster: bool,
    pub render_mermaid: bool,
    pub render_plantuml: bool,
    /// Render draw.io sources to images and attach `.drawio.png` /
    /// `.drawio.svg` as plain images. When false, the diagram XML is
    /// attached for the draw.io macro.
    pub render_drawio: bool,
    pub render_latex: bool,
    pub diagram_format: DiagramFormat,
    /// Link pages through `viewpage.action?pageId=` instead of the space path.
    pub webui_links: bool,
    /// Render callouts as colored panel macros.
    pub use_panel: bool,
    /// Show line numbers in code macros. This decorates the rendered code,
    /// it does not number the Markdown source.
    pub code_line_numbers: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            heading_anchors: false,
            force_valid_url: true,
            skip_title_heading: false,
            prefer_raster: true,
            render_mermaid: true,
            render_plantuml: true,
            render_drawio: true,
            render_latex: false,
            diagram_format: DiagramFormat::Png,
            webui_links: false,
            use_panel: false,
            code_line_numbers: false,
        }
    }
}

/// Block alignment for images and formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Center,
    Left,
    Right,
}

/// Column sizing mode for tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableDisplayMode {
    #[default]
    Responsive,
    Fixed,
}

/// Layout defaults. Front matter can override each key per document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub alignment: Option<Alignment>,
    pub image: ImageLayout,
    pub table: TableLayout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageLayout {
    pub alignment: Option<Alignment>,
    /// Display width cap in pixels. The attachment keeps its full size.
    pub max_width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableLayout {
    pub width: Option<u32>,
    pub display_mode: TableDisplayMode,
}

impl LayoutConfig {
    /// Effective image alignment: image-specific, then general, then center.
    pub fn image_alignment(&self) -> Alignment {
        self.image
            .alignment
            .or(self.alignment)
            .unwrap_or_default()
    }

    /// Overlay another layout: keys set in `overlay` win.
    pub fn overlaid(&self, overlay: &LayoutOverride) -> LayoutConfig {
        LayoutConfig {
            alignment: overlay.alignment.or(self.alignment),
            image: ImageLayout {
                alignment: overlay
                    .image
                    .as_ref()
                    .and_then(|i| i.alignment)
                    .or(self.image.alignment),
                max_width: overlay
                    .image
                    .as_ref()
                    .and_then(|i| i.max_width)
                    .or(self.image.max_width),
            },
            table: TableLayout {
                width: overlay
                    .table
                    .as_ref()
                    .and_then(|t| t.width)
                    .or(self.table.width),
                display_mode: overlay
                    .table
                    .as_ref()
                    .and_then(|t| t.display_mode)
                    .unwrap_or(self.table.display_mode),
            },
        }
    }
}

/// Sparse layout block as written in front matter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOverride {
    pub alignment: Option<Alignment>,
    pub image: Option<ImageLayoutOverride>,
    pub table: Option<TableLayoutOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLayoutOverride {
    pub alignment: Option<Alignment>,
    pub max_width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayoutOverride {
    pub width: Option<u32>,
    pub display_mode: Option<TableDisplayMode>,
}

/// External executables used by the command-based diagram renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagramsConfig {
    pub mermaid_command: String,
    pub plantuml_command: String,
    /// draw.io desktop executable, run with `--export`.
    pub drawio_command: String,
    /// Formula renderer. Reads LaTeX on stdin, writes the image to stdout.
    pub latex_command: Option<String>,
}

impl Default for DiagramsConfig {
    fn default() -> Self {
        Self {
            mermaid_command: "mmdc".to_string(),
            plantuml_command: "plantuml".to_string(),
            drawio_command: "draw.io".to_string(),
            latex_command: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of documents converted and published at once.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SyncConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `md2wiki.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SyncConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SyncConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `md2wiki.toml` in the synchronization root.
pub fn load_config(root: &Path) -> Result<SyncConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `md2wiki.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# md2wiki configuration
# =====================
# Place this file as md2wiki.toml in the synchronization root.
# Every key is optional. Unknown keys are rejected.

# Space that receives pages without a confluence-space-key directive.
# space_key = "DOCS"

# Existing page that becomes the parent of the root index document.
# Required when the root directory has no index.md or README.md.
# root_page_id = "123456"

# Text prepended to every page title.
# title_prefix = "[Draft] "

# Banner shown at the top of every page. Set to "" to disable.
generated_by = "This page has been generated with a tool."

# Do not write allocated page ids back into the Markdown sources.
skip_update = false

# Create a placeholder page for each directory without index.md or README.md.
# When false, documents in such directories hang under the nearest ancestor.
keep_hierarchy = false

[site]
# Wiki host used for absolute page links. Empty gives host-relative links.
domain = ""
base_path = "/wiki/"

[converter]
# Place an anchor macro before each heading (GitHub-style identifiers).
heading_anchors = false
# Fail a document when a relative link points to a missing target.
# When false, the link is kept as plain text and a warning is logged.
force_valid_url = true
# Remove the single top-level heading when it is used as the page title.
skip_title_heading = false
# Use fig.png instead of fig.svg when both exist.
prefer_raster = true
# Render diagrams to images (true) or upload their source for a wiki macro (false).
render_mermaid = true
render_plantuml = true
# Render .drawio files with diagrams.drawio_command and attach .drawio.png and
# .drawio.svg as images (true), or attach the diagram XML for the draw.io macro.
render_drawio = true
# Render LaTeX formulas to images (needs diagrams.latex_command).
render_latex = false
# Image format for rendered diagrams: "png" or "svg".
diagram_format = "png"
# Link pages through viewpage.action?pageId= (typical for on-prem wikis).
webui_links = false
# Render admonitions and alerts as colored panels.
use_panel = false
# Show line numbers in code macros.
code_line_numbers = false

[layout]
# Default alignment for block content: "center", "left" or "right".
# alignment = "center"

[layout.image]
# alignment = "center"
# Cap on the display width of images in pixels.
# max_width = 800

[layout.table]
# width = 760
# "responsive" or "fixed".
display_mode = "responsive"

[diagrams]
mermaid_command = "mmdc"
plantuml_command = "plantuml"
drawio_command = "draw.io"
# Reads LaTeX on stdin and writes an image to stdout.
# latex_command = "latex2png"

[processing]
# Maximum parallel workers (omit for auto = number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = SyncConfig::default();
        assert_eq!(config.space_key, None);
        assert_eq!(config.generated_by, DEFAULT_GENERATED_BY);
        assert!(config.converter.force_valid_url);
        assert!(config.converter.prefer_raster);
        assert!(!config.converter.heading_anchors);
        assert_eq!(config.converter.diagram_format, DiagramFormat::Png);
        assert_eq!(config.site.base_path, "/wiki/");
        assert!(config.converter.render_drawio);
        assert_eq!(config.diagrams.drawio_command, "draw.io");
        assert!(!config.keep_hierarchy);
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn generated_by_empty_disables_banner() {
        let config = SyncConfig {
            generated_by: "  ".into(),
            ..Default::default()
        };
        assert_eq!(config.generated_by(), None);
        assert_eq!(
            SyncConfig::default().generated_by(),
            Some(DEFAULT_GENERATED_BY)
        );
    }

    #[test]
    fn base_url_with_and_without_domain() {
        let mut site = SiteConfig::default();
        assert_eq!(site.base_url(), "/wiki/");
        site.domain = "example.atlassian.net".into();
        assert_eq!(site.base_url(), "https://example.atlassian.net/wiki/");
    }

    // =========================================================================
    // Layout overlay
    // =========================================================================

    #[test]
    fn image_alignment_falls_back_to_general_then_center() {
        let mut layout = LayoutConfig::default();
        assert_eq!(layout.image_alignment(), Alignment::Center);
        layout.alignment = Some(Alignment::Left);
        assert_eq!(layout.image_alignment(), Alignment::Left);
        layout.image.alignment = Some(Alignment::Right);
        assert_eq!(layout.image_alignment(), Alignment::Right);
    }

    #[test]
    fn overlay_keeps_unset_keys() {
        let base = LayoutConfig {
            alignment: Some(Alignment::Left),
            image: ImageLayout {
                alignment: None,
                max_width: Some(600),
            },
            table: TableLayout::default(),
        };
        let overlay = LayoutOverride {
            table: Some(TableLayoutOverride {
                width: Some(900),
                display_mode: Some(TableDisplayMode::Fixed),
            }),
            ..Default::default()
        };
        let merged = base.overlaid(&overlay);
        assert_eq!(merged.alignment, Some(Alignment::Left));
        assert_eq!(merged.image.max_width, Some(600));
        assert_eq!(merged.table.width, Some(900));
        assert_eq!(merged.table.display_mode, TableDisplayMode::Fixed);
    }

    // =========================================================================
    // Threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 64),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_deep_nested() {
        let base: toml::Value =
            toml::from_str("[converter]\nuse_panel = false\ncode_line_numbers = false").unwrap();
        let overlay: toml::Value = toml::from_str("[converter]\nuse_panel = true").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["converter"]["use_panel"].as_bool(), Some(true));
        assert_eq!(merged["converter"]["code_line_numbers"].as_bool(), Some(false));
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn load_config_without_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn load_config_partial_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
space_key = "DOCS"
title_prefix = "[Draft] "

[converter]
heading_anchors = true

[layout.image]
max_width = 640
"#,
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.space_key.as_deref(), Some("DOCS"));
        assert_eq!(config.title_prefix.as_deref(), Some("[Draft] "));
        assert!(config.converter.heading_anchors);
        assert!(config.converter.force_valid_url);
        assert_eq!(config.layout.image.max_width, Some(640));
    }

    #[test]
    fn unknown_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "[converter]\nheading_anchor = true\n",
        )
        .unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn bare_line_numbers_key_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "[converter]\nline_numbers = true\n",
        )
        .unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "space_key = [").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn validate_rejects_non_numeric_root() {
        let config = SyncConfig {
            root_page_id: Some("abc".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_base_path() {
        let mut config = SyncConfig::default();
        config.site.base_path = "wiki".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_processes() {
        let mut config = SyncConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let _: toml::Value = toml::from_str(stock_config_toml()).unwrap();
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SyncConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn stock_defaults_value_is_table() {
        let value = stock_defaults_value().unwrap();
        assert!(value.is_table());
        assert!(value.get("converter").is_some());
        assert!(value.get("processing").is_some());
    }
}
