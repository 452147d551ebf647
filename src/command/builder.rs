//! The command builder: ordered steps in, one `convert` command line out.

use super::calculations::{signed_offset, size_expression, variable_preset};
use super::params::{
    CropOptions, ExtentOptions, Gravity, ResizeFlag, ResizeOptions, RotateOptions, SharpenMode,
    SharpenOptions,
};
use crate::config::{self, ExecutionTuning, MagickConfig};
use crate::error::Result;
use crate::runner::{CommandRunner, Invocation, ShellRunner};
use crate::stream::{Destination, Source, quote_arg};
use std::fmt;

/// Resampling filter used by every resize.
const RESIZE_FILTER: &str = "Catrom";

/// The operation a [`Step`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Gravity,
    Resize,
    Crop,
    Extent,
    Rotate,
    Sharpen,
    Quality,
    Strip,
}

/// One rendered fragment of the command line, e.g. `-crop 1x2+3+4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub fragment: String,
}

/// A fully rendered command line.
///
/// Tokens are joined with single spaces when displayed; the result is meant to
/// be run by a POSIX shell (paths are quoted and resize flags escaped for it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Explicit output codec, e.g. `png`. Prefixes the destination.
    pub format: Option<String>,
}

impl ExecuteOptions {
    pub fn format(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
        }
    }
}

/// Accumulates `convert` options in call order.
///
/// Every configuration method returns `&mut Self` for chaining. Options that
/// are incomplete or invalid are skipped silently rather than reported: the
/// command is rendered as if the call had not been made.
///
/// ```
/// use magick_pipe::command::{CommandBuilder, CropOptions};
/// use magick_pipe::config::MagickConfig;
/// use magick_pipe::stream::{Destination, Source};
///
/// let line = CommandBuilder::new(&MagickConfig::default())
///     .strip()
///     .quality(5.0)
///     .crop(&CropOptions { width: Some(1), height: Some(2), x: Some(3), y: Some(4) })
///     .render(&Source::path("src.jpg"), &Destination::path("dst.jpg"), None);
///
/// assert_eq!(
///     line.to_string(),
///     r#"convert "src.jpg" -strip -quality 5 -crop 1x2+3+4 "dst.jpg""#
/// );
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    executable: String,
    input_options: Vec<String>,
    steps: Vec<Step>,
    tuning: ExecutionTuning,
}

impl CommandBuilder {
    pub fn new(config: &MagickConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            input_options: Vec::new(),
            steps: Vec::new(),
            tuning: config.execution.clone(),
        }
    }

    /// Builder using the process-wide defaults from [`config::set_defaults`].
    pub fn from_defaults() -> Self {
        Self::new(&config::defaults())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn input_options(&self) -> &[String] {
        &self.input_options
    }

    fn push(&mut self, kind: StepKind, fragment: String) -> &mut Self {
        self.steps.push(Step { kind, fragment });
        self
    }

    /// See <http://www.imagemagick.org/script/command-line-options.php#gravity>.
    pub fn gravity(&mut self, value: &str) -> &mut Self {
        match value.parse::<Gravity>() {
            Ok(gravity) => self.push(StepKind::Gravity, format!("-gravity {gravity}")),
            Err(()) => self,
        }
    }

    /// Resize; with only one side given the other follows the aspect ratio.
    pub fn resize(&mut self, opts: &ResizeOptions) -> &mut Self {
        if opts.width.is_none() && opts.height.is_none() {
            return self;
        }
        let flag = opts
            .flag
            .as_deref()
            .and_then(ResizeFlag::parse)
            .map(ResizeFlag::shell_token)
            .unwrap_or("");
        self.push(
            StepKind::Resize,
            format!(
                "-filter {RESIZE_FILTER} -resize {}{flag}",
                size_expression(opts.width, opts.height)
            ),
        )
    }

    pub fn crop(&mut self, opts: &CropOptions) -> &mut Self {
        let (Some(width), Some(height), Some(x), Some(y)) = (opts.width, opts.height, opts.x, opts.y)
        else {
            return self;
        };
        self.push(
            StepKind::Crop,
            format!(
                "-crop {width}x{height}{}{}",
                signed_offset(x),
                signed_offset(y)
            ),
        )
    }

    pub fn extent(&mut self, opts: &ExtentOptions) -> &mut Self {
        let (Some(width), Some(height)) = (opts.width, opts.height) else {
            return self;
        };
        self.push(StepKind::Extent, format!("-extent {width}x{height}"))
    }

    /// Rotate by `angle` degrees around `(x, y)`.
    ///
    /// An angle of exactly 0 means "no rotation" and adds nothing.
    pub fn rotate(&mut self, opts: &RotateOptions) -> &mut Self {
        let (Some(angle), Some(x), Some(y)) = (opts.angle, opts.x, opts.y) else {
            return self;
        };
        if angle == 0.0 || ![angle, x, y].iter().all(|v| v.is_finite()) {
            return self;
        }
        let background = opts
            .background
            .as_deref()
            .map(|color| {
                format!(
                    "-background {} -virtual-pixel background ",
                    quote_arg(color)
                )
            })
            .unwrap_or_default();
        self.push(
            StepKind::Rotate,
            format!("{background}-distort ScaleRotateTranslate '{x},{y} {angle}'"),
        )
    }

    /// Unsharp mask from a named preset, or from the working dimensions in
    /// `variable` mode.
    pub fn sharpen(&mut self, opts: &SharpenOptions) -> &mut Self {
        let Some(mode) = opts.mode.as_deref().and_then(|m| m.parse::<SharpenMode>().ok()) else {
            return self;
        };
        let preset = match mode {
            SharpenMode::Preset(preset) => Some(preset),
            SharpenMode::Variable => variable_preset(opts.width, opts.height),
            SharpenMode::Off => None,
        };
        let Some(preset) = preset else {
            return self;
        };
        let unsharp = preset.unsharp();
        self.push(
            StepKind::Sharpen,
            format!(
                "-unsharp {}x{}+{}+{}",
                unsharp.radius,
                unsharp.sigma(),
                unsharp.amount,
                unsharp.threshold
            ),
        )
    }

    pub fn quality(&mut self, value: f64) -> &mut Self {
        if !value.is_finite() {
            return self;
        }
        self.push(StepKind::Quality, format!("-quality {value}"))
    }

    /// Input resolution, e.g. for rasterizing SVG or PDF.
    ///
    /// Unlike every other option this is placed before the source.
    pub fn density(&mut self, value: f64) -> &mut Self {
        if value.is_finite() {
            self.input_options.push(format!("-density {value}"));
        }
        self
    }

    /// Remove profiles and comments.
    pub fn strip(&mut self) -> &mut Self {
        self.push(StepKind::Strip, "-strip".to_string())
    }

    /// Render the full command line.
    ///
    /// `format` selects an explicit output codec for the destination.
    pub fn render(
        &self,
        source: &Source,
        destination: &Destination,
        format: Option<&str>,
    ) -> CommandLine {
        let mut tokens = Vec::with_capacity(self.input_options.len() + self.steps.len() + 3);
        tokens.push(self.executable.clone());
        tokens.extend(self.input_options.iter().cloned());
        tokens.push(source.render());
        tokens.extend(self.steps.iter().map(|step| step.fragment.clone()));
        tokens.push(destination.render(format));
        CommandLine::new(tokens)
    }

    /// Run the command through the default shell runner.
    pub async fn execute(
        &self,
        source: Source,
        destination: Destination,
        options: &ExecuteOptions,
    ) -> Result<Destination> {
        self.execute_with(&ShellRunner, source, destination, options)
            .await
    }

    /// Run the command through `runner`.
    ///
    /// A stream source is fed to the tool's stdin and a stream destination
    /// receives its stdout. Resolves with the destination once the tool has
    /// exited successfully.
    pub async fn execute_with<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        source: Source,
        mut destination: Destination,
        options: &ExecuteOptions,
    ) -> Result<Destination> {
        let command = self.render(&source, &destination, options.format.as_deref());
        tracing::debug!(command = %command, "Executing");

        let mut stdin = match source {
            Source::Stream(reader) => Some(reader),
            Source::Path(_) => None,
        };
        let stdout = match &mut destination {
            Destination::Stream(writer) => Some(writer),
            Destination::Path(_) => None,
        };
        runner
            .run(Invocation {
                command: &command,
                tuning: &self.tuning,
                stdin: stdin.as_mut(),
                stdout,
            })
            .await?;

        Ok(destination)
    }
}
