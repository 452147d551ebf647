//! # magick-pipe
//!
//! Build ImageMagick `convert` command lines from typed options, run them
//! through the shell, and query images with `identify`.
//!
//! ```text
//! intents (JSON)  →  transform  →  CommandBuilder  →  CommandRunner  →  convert
//!                        │
//!                        └── identify (only for variable sharpening)
//! ```
//!
//! The library never decodes pixels. It decides *which* arguments to pass,
//! in *what* order, and wires files or byte streams to the tool.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`command`] | [`CommandBuilder`](command::CommandBuilder): option records, pure calculations, step rendering |
//! | [`transform`] | Named intents applied in order, plus working-size resolution for variable sharpening |
//! | [`identify`] | `identify` queries: format template, output parsing, error translation |
//! | [`magick`] | [`Magick`] client owning configuration and a runner |
//! | [`runner`] | [`CommandRunner`](runner::CommandRunner) trait and the tokio-based [`ShellRunner`](runner::ShellRunner) |
//! | [`stream`] | [`Source`] / [`Destination`]: a path or a byte stream |
//! | [`config`] | `magick-pipe.toml` loading, validation, process-wide defaults |
//! | [`error`] | The crate [`Error`] type |
//!
//! # Design Decisions
//!
//! ## Skip, Don't Fail
//!
//! Builder operations with incomplete or invalid options add nothing. A
//! transform described by loosely typed JSON still runs with whatever parts
//! of it make sense; only the tool itself can fail a command.
//!
//! ## Streams Are Moved
//!
//! A byte stream can be consumed once. [`Source`] is taken by value by every
//! call that reads it, so double consumption does not compile. When a
//! transform has to measure a stream before converting it, the stream is
//! buffered once and forked ([`Source::fork`]).
//!
//! ## A Shell, Not argv
//!
//! The rendered line runs as `sh -c <line>`. Configured executables may then
//! carry environment prefixes (`MAGICK_MEMORY_LIMIT=256MB convert`), and the
//! line that is logged is exactly the line that runs. Paths are quoted and
//! escaped for the shell when rendered.
//!
//! ## Explicit Configuration
//!
//! [`MagickConfig`](config::MagickConfig) is a value handed to builders and
//! clients. The process-wide default ([`config::set_defaults`]) exists for
//! convenience; nothing reads it behind the caller's back.

pub mod command;
pub mod config;
pub mod error;
pub mod identify;
pub mod magick;
pub mod runner;
pub mod stream;
pub mod transform;

pub use error::{Error, Result};
pub use magick::Magick;
pub use stream::{Destination, Source};
pub use transform::{Intent, Intents, apply_intents};
