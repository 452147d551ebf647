//! Identify and dimension queries.
//!
//! Both run `identify -format "<template>" <source>` where the template makes
//! ImageMagick print one JSON object per frame:
//!
//! ```text
//! {"format":"GIF","width":64,"height":64}{"format":"GIF","width":64,"height":64}
//! ```
//!
//! Only the first record is decoded; the number of records is the frame
//! count. Callers can add fields to the template with
//! [`IdentifyOptions::fields`] (e.g. `orient` = `%[orientation]`) and read them
//! back from [`ImageInfo::extra`].

use crate::command::CommandLine;
use crate::error::{Error, Result};
use crate::magick::Magick;
use crate::runner::{CommandRunner, Invocation, RunOutput};
use crate::stream::{Source, escape_double_quoted};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// One `{...}` record in identify output.
static RECORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("record pattern is valid"));

/// Marker ImageMagick prints when it has no decoder for the input.
const DECODE_DELEGATE: &str = "decode delegate";

/// Image dimensions, plus how many frames the source holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    /// 1 for still images, more for animations and multi-page documents.
    pub frames: usize,
}

/// How a template field is printed into the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatField {
    /// Quoted in the record, decoded as a JSON string.
    Text(String),
    /// Unquoted, so it must expand to a number (e.g. `%w`).
    Number(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyOptions {
    /// Extra template fields. Adding `width`, `height` or `format` replaces
    /// the default escape for that field.
    pub fields: Vec<(String, FormatField)>,
    /// Pass `-verbose`, making ImageMagick decode the whole image and fail on
    /// corrupt data.
    pub verify: bool,
}

impl IdentifyOptions {
    pub fn field(mut self, name: impl Into<String>, field: FormatField) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn verify(mut self) -> Self {
        self.verify = true;
        self
    }
}

/// Result of [`Magick::identify`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    /// Lower-cased format name; `jpeg` is reported as `jpg`.
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Number of frames found in the source.
    pub images: usize,
    /// Caller-requested fields, keyed by the names given in the options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_fields() -> Vec<(String, FormatField)> {
    vec![
        ("format".to_string(), FormatField::Text("%m".to_string())),
        ("width".to_string(), FormatField::Number("%w".to_string())),
        ("height".to_string(), FormatField::Number("%h".to_string())),
    ]
}

/// Build the `-format` template, escaped for use inside double quotes.
///
/// Fields keep their first position; a later entry with the same name
/// replaces the earlier value in place.
pub fn format_template(extra: &[(String, FormatField)]) -> String {
    let mut fields = default_fields();
    for (name, field) in extra {
        match fields.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = field.clone(),
            None => fields.push((name.clone(), field.clone())),
        }
    }

    // The template lands inside shell double quotes
    let body: Vec<String> = fields
        .iter()
        .map(|(name, field)| {
            let name = escape_double_quoted(name);
            match field {
                FormatField::Text(escape) => {
                    format!("\\\"{name}\\\":\\\"{}\\\"", escape_double_quoted(escape))
                }
                FormatField::Number(escape) => {
                    format!("\\\"{name}\\\":{}", escape_double_quoted(escape))
                }
            }
        })
        .collect();
    format!("{{{}}}", body.join(","))
}

/// Parse identify output into the first record and the record count.
pub fn parse_records(output: &str) -> Result<(Map<String, Value>, usize)> {
    let parse_error = || Error::Parse {
        output: output.to_string(),
    };

    let mut records = RECORD.find_iter(output);
    let first = records.next().ok_or_else(parse_error)?;
    let count = 1 + records.count();

    match serde_json::from_str::<Value>(first.as_str()) {
        Ok(Value::Object(map)) => Ok((map, count)),
        _ => Err(parse_error()),
    }
}

/// Remove an integer field from a record, as a `u32`.
fn take_dimension(record: &mut Map<String, Value>, key: &str) -> Option<u32> {
    record
        .remove(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

pub fn parse_dimensions(output: &str) -> Result<Dimensions> {
    let (mut record, frames) = parse_records(output)?;
    let (Some(width), Some(height)) = (
        take_dimension(&mut record, "width"),
        take_dimension(&mut record, "height"),
    ) else {
        return Err(Error::Parse {
            output: output.to_string(),
        });
    };
    Ok(Dimensions {
        width,
        height,
        frames,
    })
}

pub fn parse_info(output: &str) -> Result<ImageInfo> {
    let parse_error = || Error::Parse {
        output: output.to_string(),
    };
    let (mut record, images) = parse_records(output)?;

    let width = take_dimension(&mut record, "width").ok_or_else(parse_error)?;
    let height = take_dimension(&mut record, "height").ok_or_else(parse_error)?;
    let format = match record.remove("format") {
        Some(Value::String(format)) => normalize_format(&format),
        _ => return Err(parse_error()),
    };

    Ok(ImageInfo {
        format,
        width,
        height,
        images,
        extra: record,
    })
}

/// `JPEG` → `jpg`, everything else lower-cased.
fn normalize_format(format: &str) -> String {
    let lower = format.to_lowercase();
    if lower == "jpeg" {
        "jpg".to_string()
    } else {
        lower
    }
}

impl<R: CommandRunner> Magick<R> {
    /// Format, dimensions and frame count of `source`, plus any extra fields
    /// requested in `options`.
    pub async fn identify(&self, source: Source, options: &IdentifyOptions) -> Result<ImageInfo> {
        let mut tokens = vec![
            self.config().identify_executable.clone(),
            "-format".to_string(),
            format!("\"{}\"", format_template(&options.fields)),
        ];
        if options.verify {
            tokens.push("-verbose".to_string());
        }
        tokens.push(source.render());

        let output = self.query(CommandLine::new(tokens), source).await?;
        parse_info(&String::from_utf8_lossy(&output.stdout))
    }

    /// Width and height of the first frame, and the number of frames.
    pub async fn dimensions(&self, source: Source) -> Result<Dimensions> {
        let tokens = vec![
            self.config().identify_executable.clone(),
            "-format".to_string(),
            "\"{\\\"width\\\":%w,\\\"height\\\":%h}\"".to_string(),
            source.render(),
        ];
        let output = self.query(CommandLine::new(tokens), source).await?;
        parse_dimensions(&String::from_utf8_lossy(&output.stdout))
    }

    async fn query(&self, command: CommandLine, source: Source) -> Result<RunOutput> {
        tracing::debug!(command = %command, "identify");

        let mut stdin = match source {
            Source::Stream(reader) => Some(reader),
            Source::Path(_) => None,
        };
        let result = self
            .runner()
            .run(Invocation {
                command: &command,
                tuning: &self.config().execution,
                stdin: stdin.as_mut(),
                stdout: None,
            })
            .await;

        match result {
            Err(Error::ExternalTool { stderr, .. }) if stderr.contains(DECODE_DELEGATE) => {
                Err(Error::InvalidImage)
            }
            other => other,
        }
    }
}
