//! Diagram rendering backend trait and the command-line implementation.
//!
//! The [`DiagramRenderer`] trait turns diagram source text into image bytes.
//! The production implementation is [`CommandRenderer`], which shells out to
//! the usual tools:
//!
//! | Kind     | Command                                                    |
//! |----------|------------------------------------------------------------|
//! | Mermaid  | `mmdc --input - --output <tmp> --outputFormat <fmt> ...`   |
//! | PlantUML | `plantuml -pipe -t<fmt> -charset utf-8` (stdout)           |
//! | draw.io  | `draw.io --export --format <fmt> --output <tmp> <tmp input>` |
//! | LaTeX    | configured command, source on stdin, image on stdout       |
//!
//! A failed render is a document-level error. Nothing is retried.

use crate::config::{DiagramFormat, DiagramsConfig};
use crate::digest;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("no renderer configured for {0}")]
    Unavailable(&'static str),
}

/// Diagram source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramKind {
    Mermaid,
    PlantUml,
    Drawio,
    Latex,
}

impl DiagramKind {
    pub fn name(self) -> &'static str {
        match self {
            DiagramKind::Mermaid => "mermaid",
            DiagramKind::PlantUml => "plantuml",
            DiagramKind::Drawio => "drawio",
            DiagramKind::Latex => "latex",
        }
    }

    /// Extension of the source attachment uploaded in macro mode.
    pub fn source_extension(self) -> &'static str {
        match self {
            DiagramKind::Mermaid => "mmd",
            DiagramKind::PlantUml => "puml",
            DiagramKind::Drawio => "drawio",
            DiagramKind::Latex => "tex",
        }
    }
}

/// Attachment name for a rendered image of `source`.
pub fn rendered_attachment_name(source: &str, format: DiagramFormat) -> String {
    let hash = digest::hash_bytes(source.as_bytes());
    format!("embedded_{}.{}", &hash[..16], format.extension())
}

/// Attachment name for the uploaded diagram source in macro mode.
pub fn source_attachment_name(source: &str, kind: DiagramKind) -> String {
    let hash = digest::hash_bytes(source.as_bytes());
    format!("embedded_{}.{}", &hash[..16], kind.source_extension())
}

/// Renders diagram source to image bytes.
///
/// Implementations must be `Sync`: documents are converted in parallel and
/// share one renderer.
pub trait DiagramRenderer: Sync {
    fn render(
        &self,
        source: &str,
        kind: DiagramKind,
        format: DiagramFormat,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Runs external executables configured in `[diagrams]`.
pub struct CommandRenderer {
    config: DiagramsConfig,
}

impl CommandRenderer {
    pub fn new(config: DiagramsConfig) -> Self {
        Self { config }
    }

    fn split_command(command: &str) -> Result<(String, Vec<String>), RenderError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(RenderError::Unavailable("empty command"))?;
        Ok((program, parts.collect()))
    }

    /// Run a command with `input` on stdin and return its stdout.
    fn pipe(program: &str, args: &[String], input: &[u8]) -> Result<Vec<u8>, RenderError> {
        log::debug!("executing {program} {}", args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(RenderError::Failed {
                command: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn render_mermaid(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        let (program, mut args) = Self::split_command(&self.config.mermaid_command)?;
        let output = temp_output(source, format);
        args.extend([
            "--input".to_string(),
            "-".to_string(),
            "--output".to_string(),
            output.to_string_lossy().into_owned(),
            "--outputFormat".to_string(),
            format.extension().to_string(),
            "--backgroundColor".to_string(),
            "transparent".to_string(),
            "--scale".to_string(),
            "2".to_string(),
        ]);
        let result = Self::pipe(&program, &args, source.as_bytes())
            .and_then(|_| std::fs::read(&output).map_err(RenderError::from));
        if output.exists()
            && let Err(e) = std::fs::remove_file(&output)
        {
            log::warn!("could not remove {}: {e}", output.display());
        }
        result
    }

    fn render_plantuml(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        let (program, mut args) = Self::split_command(&self.config.plantuml_command)?;
        args.extend([
            "-pipe".to_string(),
            format!("-t{}", format.extension()),
            "-charset".to_string(),
            "utf-8".to_string(),
        ]);
        Self::pipe(&program, &args, source.as_bytes())
    }

    /// draw.io only exports from a file, so the source goes through a
    /// temporary input as well.
    fn render_drawio(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        let (program, mut args) = Self::split_command(&self.config.drawio_command)?;
        let input = temp_output(source, format).with_extension("drawio");
        let output = temp_output(source, format);
        std::fs::write(&input, source)?;
        args.extend([
            "--export".to_string(),
            "--format".to_string(),
            format.extension().to_string(),
            "--output".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        match format {
            DiagramFormat::Png => {
                args.extend(["--scale".to_string(), "2".to_string(), "--transparent".to_string()])
            }
            DiagramFormat::Svg => args.push("--embed-svg-images".to_string()),
        }
        args.push(input.to_string_lossy().into_owned());
        let result = Self::pipe(&program, &args, &[])
            .and_then(|_| std::fs::read(&output).map_err(RenderError::from));
        for path in [&input, &output] {
            if path.exists()
                && let Err(e) = std::fs::remove_file(path)
            {
                log::warn!("could not remove {}: {e}", path.display());
            }
        }
        result
    }

    fn render_latex(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        let command = self
            .config
            .latex_command
            .as_deref()
            .ok_or(RenderError::Unavailable("latex"))?;
        let (program, args) = Self::split_command(command)?;
        Self::pipe(&program, &args, source.as_bytes())
    }
}

impl DiagramRenderer for CommandRenderer {
    fn render(
        &self,
        source: &str,
        kind: DiagramKind,
        format: DiagramFormat,
    ) -> Result<Vec<u8>, RenderError> {
        match kind {
            DiagramKind::Mermaid => self.render_mermaid(source, format),
            DiagramKind::PlantUml => self.render_plantuml(source, format),
            DiagramKind::Drawio => self.render_drawio(source, format),
            DiagramKind::Latex => self.render_latex(source),
        }
    }
}

/// Per-process, per-source temporary output path for tools that cannot
/// write to stdout.
fn temp_output(source: &str, format: DiagramFormat) -> PathBuf {
    let hash = digest::hash_bytes(source.as_bytes());
    std::env::temp_dir().join(format!(
        "md2wiki-{}-{}.{}",
        std::process::id(),
        &hash[..16],
        format.extension()
    ))
}
