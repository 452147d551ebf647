//! Intent-driven transforms.
//!
//! A transform is described as an ordered set of named intents, usually
//! straight from JSON:
//!
//! ```json
//! { "quality": 80, "strip": true, "sharpen": { "mode": "variable" }, "resize": { "width": 100 } }
//! ```
//!
//! Intents are applied to a [`CommandBuilder`] in declaration order, so the
//! rendered command follows the key order of the object. Names that are not
//! operations are ignored, and so are values that do not parse.
//!
//! ## Variable Sharpening
//!
//! `sharpen: { mode: "variable" }` picks its preset from the working size of
//! the image, resolved in this order:
//!
//! 1. a resize with both sides
//! 2. a resize with one side, the other scaled by the original aspect ratio
//! 3. a crop
//! 4. the original dimensions
//!
//! Cases 2 and 4 query the source with `identify` first. A stream source is
//! forked for that so the transform still gets every byte.

use crate::command::{
    CommandBuilder, CropOptions, ExecuteOptions, ExtentOptions, ResizeOptions, RotateOptions,
    SharpenOptions, lenient, scale_to_height, scale_to_width,
};
use crate::config::MagickConfig;
use crate::error::Result;
use crate::magick::Magick;
use crate::runner::CommandRunner;
use crate::stream::{Destination, Source};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;
use std::fmt;

/// One requested operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Gravity(String),
    Resize(ResizeOptions),
    Crop(CropOptions),
    Extent(ExtentOptions),
    Rotate(RotateOptions),
    Sharpen(SharpenOptions),
    Quality(f64),
    Density(f64),
    Strip,
}

impl Intent {
    /// Parse one `name: value` pair. `None` for unknown names and for values
    /// that do not fit the operation.
    pub fn from_entry(name: &str, value: Value) -> Option<Self> {
        match name {
            "gravity" => value.as_str().map(|g| Intent::Gravity(g.to_string())),
            "resize" => serde_json::from_value(value).ok().map(Intent::Resize),
            "crop" => serde_json::from_value(value).ok().map(Intent::Crop),
            "extent" => serde_json::from_value(value).ok().map(Intent::Extent),
            "rotate" => serde_json::from_value(value).ok().map(Intent::Rotate),
            "sharpen" => serde_json::from_value(value).ok().map(Intent::Sharpen),
            "quality" => lenient::as_number(&value).map(Intent::Quality),
            "density" => lenient::as_number(&value).map(Intent::Density),
            "strip" => match value {
                Value::Bool(false) | Value::Null => None,
                _ => Some(Intent::Strip),
            },
            _ => {
                tracing::debug!(intent = name, "Ignoring unknown intent");
                None
            }
        }
    }
}

/// Intents in the order they were declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intents(Vec<Intent>);

impl Intents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, intent: Intent) -> &mut Self {
        self.0.push(intent);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Intent> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last resize intent, which decides the final size.
    pub fn resize(&self) -> Option<&ResizeOptions> {
        self.0.iter().rev().find_map(|intent| match intent {
            Intent::Resize(opts) => Some(opts),
            _ => None,
        })
    }

    pub fn crop(&self) -> Option<&CropOptions> {
        self.0.iter().rev().find_map(|intent| match intent {
            Intent::Crop(opts) => Some(opts),
            _ => None,
        })
    }

    pub fn needs_variable_sharpen(&self) -> bool {
        self.0
            .iter()
            .any(|intent| matches!(intent, Intent::Sharpen(opts) if opts.is_variable()))
    }

    /// Copy with `(width, height)` set on every variable sharpen intent.
    fn with_sharpen_dimensions(&self, width: u32, height: u32) -> Self {
        let mut resolved = self.clone();
        for intent in &mut resolved.0 {
            match intent {
                Intent::Sharpen(opts) if opts.is_variable() => {
                    opts.width = Some(width);
                    opts.height = Some(height);
                }
                _ => {}
            }
        }
        resolved
    }
}

impl FromIterator<Intent> for Intents {
    fn from_iter<I: IntoIterator<Item = Intent>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Intents {
    type Item = &'a Intent;
    type IntoIter = std::slice::Iter<'a, Intent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Deserializes from a map, keeping entry order.
impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct IntentsVisitor;

        impl<'de> Visitor<'de> for IntentsVisitor {
            type Value = Intents;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of transform intents")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Intents, A::Error> {
                let mut intents = Intents::new();
                while let Some((name, value)) = map.next_entry::<String, Value>()? {
                    if let Some(intent) = Intent::from_entry(&name, value) {
                        intents.push(intent);
                    }
                }
                Ok(intents)
            }
        }

        deserializer.deserialize_map(IntentsVisitor)
    }
}

/// Build a command from `intents`, in order.
pub fn apply_intents(config: &MagickConfig, intents: &Intents) -> CommandBuilder {
    let mut cmds = CommandBuilder::new(config);
    for intent in intents {
        match intent {
            Intent::Gravity(value) => cmds.gravity(value),
            Intent::Resize(opts) => cmds.resize(opts),
            Intent::Crop(opts) => cmds.crop(opts),
            Intent::Extent(opts) => cmds.extent(opts),
            Intent::Rotate(opts) => cmds.rotate(opts),
            Intent::Sharpen(opts) => cmds.sharpen(opts),
            Intent::Quality(value) => cmds.quality(*value),
            Intent::Density(value) => cmds.density(*value),
            Intent::Strip => cmds.strip(),
        };
    }
    cmds
}

/// Where the working size of a variable sharpen comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkingSize {
    Known(u32, u32),
    ScaleToWidth(u32),
    ScaleToHeight(u32),
    Original,
}

fn working_size(intents: &Intents) -> WorkingSize {
    if let Some(resize) = intents.resize() {
        match (resize.width, resize.height) {
            (Some(width), Some(height)) => return WorkingSize::Known(width, height),
            (Some(width), None) => return WorkingSize::ScaleToWidth(width),
            (None, Some(height)) => return WorkingSize::ScaleToHeight(height),
            (None, None) => {}
        }
    }
    // Only a crop that renders changes the size.
    if let Some(CropOptions {
        width: Some(width),
        height: Some(height),
        x: Some(_),
        y: Some(_),
    }) = intents.crop()
    {
        return WorkingSize::Known(*width, *height);
    }
    WorkingSize::Original
}

impl<R: CommandRunner> Magick<R> {
    /// Fill in the working dimensions of variable sharpen intents.
    ///
    /// Returns a resolved copy of `intents` together with the source to use
    /// for the transform: `source` itself, or one half of a fork when it had
    /// to be queried first. The caller's intents are left untouched.
    pub async fn resolve_sharpen(
        &self,
        intents: &Intents,
        source: Source,
    ) -> Result<(Intents, Source)> {
        if !intents.needs_variable_sharpen() {
            return Ok((intents.clone(), source));
        }

        let (width, height, source) = match working_size(intents) {
            WorkingSize::Known(width, height) => (width, height, source),
            needs_original => {
                let (query, source) = source.fork(self.config().execution.max_buffer).await?;
                let original = self.dimensions(query).await?;
                let original = (original.width, original.height);
                let (width, height) = match needs_original {
                    WorkingSize::ScaleToWidth(width) => scale_to_width(original, width),
                    WorkingSize::ScaleToHeight(height) => scale_to_height(original, height),
                    _ => original,
                };
                (width, height, source)
            }
        };
        tracing::debug!(width, height, "Resolved working size for variable sharpen");

        Ok((intents.with_sharpen_dimensions(width, height), source))
    }

    /// Apply `intents` to `source` and write the result to `destination`.
    pub async fn transform(
        &self,
        source: Source,
        destination: Destination,
        intents: &Intents,
        options: &ExecuteOptions,
    ) -> Result<Destination> {
        let (intents, source) = self.resolve_sharpen(intents, source).await?;
        let cmds = apply_intents(self.config(), &intents);
        self.execute(&cmds, source, destination, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::StepKind;
    use crate::config::ExecutionTuning;
    use crate::error::Error;
    use crate::runner::tests::MockRunner;
    use std::io::Cursor;

    fn intents(json: &str) -> Intents {
        serde_json::from_str(json).unwrap()
    }

    fn fragments(intents: &Intents) -> Vec<String> {
        apply_intents(&MagickConfig::default(), intents)
            .steps()
            .iter()
            .map(|step| step.fragment.clone())
            .collect()
    }

    fn magick(runner: MockRunner) -> Magick<MockRunner> {
        Magick::with_runner(MagickConfig::default(), runner)
    }

    async fn transform(im: &Magick<MockRunner>, intents: &Intents) -> Result<Destination> {
        im.transform(
            Source::path("src.jpg"),
            Destination::path("dst.jpg"),
            intents,
            &ExecuteOptions::default(),
        )
        .await
    }

    // =========================================================================
    // Parsing intents
    // =========================================================================

    #[test]
    fn keeps_declaration_order() {
        let parsed = intents(r#"{"strip": true, "quality": 80, "gravity": "Center"}"#);
        assert_eq!(
            parsed.iter().cloned().collect::<Vec<_>>(),
            [
                Intent::Strip,
                Intent::Quality(80.0),
                Intent::Gravity("Center".to_string())
            ]
        );
    }

    #[test]
    fn ignores_unknown_and_terminal_names() {
        let parsed = intents(
            r#"{"quality": 10, "exec": "no", "get": 1, "render": true, "execute": {}, "foobar": "monkey"}"#,
        );
        assert_eq!(fragments(&parsed), ["-quality 10"]);
    }

    #[test]
    fn drops_unparsable_values() {
        let parsed = intents(
            r#"{"quality": "abc", "resize": "big", "gravity": 5, "density": null, "strip": false}"#,
        );
        assert!(parsed.is_empty());
    }

    #[test]
    fn accepts_numeric_strings() {
        let parsed = intents(r#"{"quality": "80", "resize": {"width": "100"}}"#);
        assert_eq!(fragments(&parsed), ["-quality 80", "-filter Catrom -resize 100x"]);
    }

    #[test]
    fn rejects_non_map_input() {
        assert!(serde_json::from_str::<Intents>("[1, 2]").is_err());
    }

    // =========================================================================
    // apply_intents
    // =========================================================================

    #[test]
    fn applies_every_operation() {
        let parsed = intents(
            r#"{
                "gravity": "North",
                "resize": {"width": 100, "height": 50, "flag": ">"},
                "crop": {"width": 10, "height": 12, "x": 1, "y": -2},
                "extent": {"width": 100, "height": 100},
                "rotate": {"angle": 90, "x": 5, "y": 5, "bgColor": "white"},
                "sharpen": {"mode": "light"},
                "quality": 75,
                "strip": true
            }"#,
        );
        let cmds = apply_intents(&MagickConfig::default(), &parsed);
        let kinds: Vec<StepKind> = cmds.steps().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [
                StepKind::Gravity,
                StepKind::Resize,
                StepKind::Crop,
                StepKind::Extent,
                StepKind::Rotate,
                StepKind::Sharpen,
                StepKind::Quality,
                StepKind::Strip,
            ]
        );
        assert_eq!(cmds.steps()[2].fragment, "-crop 10x12+1-2");
        assert_eq!(
            cmds.steps()[4].fragment,
r#"-background "white" -virtual-pixel background -distort ScaleRotateTranslate '5,5 90'"#
        );
    }

    #[test]
    fn density_goes_before_source() {
        let parsed = intents(r#"{"strip": true, "density": 150}"#);
        let line = apply_intents(&MagickConfig::default(), &parsed).render(
            &Source::path("in.svg"),
            &Destination::path("out.png"),
            None,
        );
        assert_eq!(
            line.to_string(),
            r#"convert -density 150 "in.svg" -strip "out.png""#
        );
    }

    // =========================================================================
    // Working size
    // =========================================================================

    #[test]
    fn working_size_priority() {
        assert_eq!(
            working_size(&intents(
                r#"{"resize": {"width": 10, "height": 20}, "crop": {"width": 1, "height": 2, "x": 0, "y": 0}}"#
            )),
            WorkingSize::Known(10, 20)
        );
        assert_eq!(
            working_size(&intents(
                r#"{"resize": {"width": 10}, "crop": {"width": 1, "height": 2, "x": 0, "y": 0}}"#
            )),
            WorkingSize::ScaleToWidth(10)
        );
        assert_eq!(
            working_size(&intents(r#"{"resize": {"height": 20}}"#)),
            WorkingSize::ScaleToHeight(20)
        );
        assert_eq!(
            working_size(&intents(
                r#"{"crop": {"width": 1, "height": 2, "x": 0, "y": 0}}"#
            )),
            WorkingSize::Known(1, 2)
        );
        assert_eq!(
            working_size(&intents(r#"{"crop": {"width": 1, "height": 2}}"#)),
            WorkingSize::Original
        );
        assert_eq!(working_size(&Intents::new()), WorkingSize::Original);
    }

    // =========================================================================
    // transform
    // =========================================================================

    #[tokio::test]
    async fn creates_commands_in_order() {
        let runner = MockRunner::new().with_stdout(r#"{"width":13,"height":10}"#);
        let im = magick(runner);
        let parsed = intents(
            r#"{
                "quality": 10,
                "strip": true,
                "sharpen": {"mode": "variable"},
                "resize": {"width": 100, "flag": "!"},
                "crop": {"width": 10, "height": 12, "x": 1, "y": 2},
                "rotate": {"angle": 20}
            }"#,
        );

        transform(&im, &parsed).await.unwrap();

        let commands = im.runner().get_commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("identify -format"));
        assert_eq!(
            commands[1],
            r#"convert "src.jpg" -quality 10 -strip -unsharp 0.8x0.8+1.2+0.05 -filter Catrom -resize 100x\! -crop 10x12+1+2 "dst.jpg""#
        );
    }

    #[tokio::test]
    async fn known_size_skips_query() {
        let im = magick(MockRunner::new());
        let parsed =
            intents(r#"{"sharpen": {"mode": "variable"}, "resize": {"width": 250, "height": 250}}"#);

        transform(&im, &parsed).await.unwrap();

        assert_eq!(
            im.runner().get_commands(),
            [r#"convert "src.jpg" -unsharp 0.65x0.65+1.1+0.05 -filter Catrom -resize 250x250 "dst.jpg""#]
        );
    }

    #[tokio::test]
    async fn crop_size_skips_query() {
        let im = magick(MockRunner::new());
        let parsed = intents(
            r#"{"crop": {"width": 40, "height": 900, "x": 0, "y": 0}, "sharpen": {"mode": "variable"}}"#,
        );

        transform(&im, &parsed).await.unwrap();

        let commands = im.runner().get_commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains("-unsharp 1x1+1.5+0"), "{}", commands[0]);
    }

    #[tokio::test]
    async fn crop_without_offsets_does_not_set_size() {
        let runner = MockRunner::new().with_stdout(r#"{"width":4000,"height":3000}"#);
        let im = magick(runner);
        let parsed =
            intents(r#"{"crop": {"width": 40, "height": 900}, "sharpen": {"mode": "variable"}}"#);

        transform(&im, &parsed).await.unwrap();

        // The crop never renders, so the original size decides: no sharpening
        let commands = im.runner().get_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1], r#"convert "src.jpg" "dst.jpg""#);
    }

    #[tokio::test]
    async fn original_size_is_queried() {
        let runner = MockRunner::new().with_stdout(r#"{"width":600,"height":400}"#);
        let im = magick(runner);

        transform(&im, &intents(r#"{"sharpen": {"mode": "variable"}}"#))
            .await
            .unwrap();

        let commands = im.runner().get_commands();
        assert_eq!(
            commands[0],
            r#"identify -format "{\"width\":%w,\"height\":%h}" "src.jpg""#
        );
        assert_eq!(
            commands[1],
            r#"convert "src.jpg" -unsharp 0.5x0.5+1+0.05 "dst.jpg""#
        );
    }

    #[tokio::test]
    async fn large_original_gets_no_sharpening() {
        let runner = MockRunner::new().with_stdout(r#"{"width":4000,"height":3000}"#);
        let im = magick(runner);

        transform(&im, &intents(r#"{"sharpen": {"mode": "variable"}, "strip": true}"#))
            .await
            .unwrap();

        assert_eq!(
            im.runner().get_commands()[1],
            r#"convert "src.jpg" -strip "dst.jpg""#
        );
    }

    #[tokio::test]
    async fn height_only_resize_scales_width() {
        let runner = MockRunner::new().with_stdout(r#"{"width":1300,"height":1000}"#);
        let im = magick(runner);
        let parsed = intents(r#"{"sharpen": {"mode": "variable"}, "resize": {"height": 400}}"#);

        let (resolved, _) = im
            .resolve_sharpen(&parsed, Source::path("src.jpg"))
            .await
            .unwrap();

        let Some(Intent::Sharpen(opts)) = resolved.iter().next() else {
            panic!("expected sharpen intent first");
        };
        assert_eq!((opts.width, opts.height), (Some(520), Some(400)));
    }

    #[tokio::test]
    async fn caller_intents_are_not_mutated() {
        let im = magick(MockRunner::new());
        let parsed =
            intents(r#"{"sharpen": {"mode": "variable"}, "resize": {"width": 80, "height": 60}}"#);
        let before = parsed.clone();

        let (resolved, _) = im
            .resolve_sharpen(&parsed, Source::path("src.jpg"))
            .await
            .unwrap();

        assert_eq!(parsed, before);
        assert_ne!(resolved, parsed);
    }

    #[tokio::test]
    async fn fixed_preset_skips_query() {
        let im = magick(MockRunner::new());

        transform(&im, &intents(r#"{"sharpen": {"mode": "strong"}}"#))
            .await
            .unwrap();

        assert_eq!(
            im.runner().get_commands(),
            [r#"convert "src.jpg" -unsharp 0.8x0.8+1.2+0.05 "dst.jpg""#]
        );
    }

    #[tokio::test]
    async fn stream_source_is_forked_for_query() {
        let runner = MockRunner::new().with_stdout(r#"{"width":13,"height":10}"#);
        let im = magick(runner);
        let parsed = intents(r#"{"sharpen": {"mode": "variable"}, "resize": {"width": 100}}"#);

        im.transform(
            Source::stream(Cursor::new(b"raw image bytes".to_vec())),
            Destination::stream(Cursor::new(Vec::new())),
            &parsed,
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

        // Query and transform each received the full input
        assert_eq!(
            im.runner().get_stdin(),
            [b"raw image bytes".to_vec(), b"raw image bytes".to_vec()]
        );
        let commands = im.runner().get_commands();
        assert!(commands[0].ends_with(" -"));
        assert_eq!(
            commands[1],
            "convert - -unsharp 0.8x0.8+1.2+0.05 -filter Catrom -resize 100x -"
        );
    }

    #[tokio::test]
    async fn fork_respects_max_buffer() {
        let config = MagickConfig {
            execution: ExecutionTuning {
                max_buffer: 4,
                ..ExecutionTuning::default()
            },
            ..MagickConfig::default()
        };
        let im = Magick::with_runner(config, MockRunner::new());

        let result = im
            .transform(
                Source::stream(Cursor::new(b"too many bytes".to_vec())),
                Destination::path("dst.jpg"),
                &intents(r#"{"sharpen": {"mode": "variable"}}"#),
                &ExecuteOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(Error::MaxBufferExceeded { limit: 4 })));
        assert!(im.runner().get_commands().is_empty());
    }

    #[tokio::test]
    async fn query_failure_fails_transform() {
        let runner = MockRunner::new().with_failure("identify: unable to open image `src.jpg'");
        let im = magick(runner);

        let result = transform(&im, &intents(r#"{"sharpen": {"mode": "variable"}}"#)).await;

        assert!(matches!(result, Err(Error::ExternalTool { .. })));
        // The convert step never ran
        assert_eq!(im.runner().get_commands().len(), 1);
    }
}
