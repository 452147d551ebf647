//! `convert` command assembly.
//!
//! | Operation | Rendered fragment |
//! |---|---|
//! | **gravity** | `-gravity Center` |
//! | **resize** | `-filter Catrom -resize 100x50\!` |
//! | **crop** | `-crop 100x250-10+0` |
//! | **extent** | `-extent 100x200` |
//! | **rotate** | `[-background "blue" -virtual-pixel background ]-distort ScaleRotateTranslate 'x,y angle'` |
//! | **sharpen** | `-unsharp 0.65x0.65+1.1+0.05` |
//! | **quality** | `-quality 80` |
//! | **density** | `-density 300` (before the source) |
//! | **strip** | `-strip` |
//!
//! The module is split into:
//! - **Parameters**: option records and the enums they are checked against
//! - **Calculations**: pure functions for presets and geometry
//! - **Builder**: [`CommandBuilder`], which renders and executes

mod builder;
mod calculations;
mod params;

pub use builder::{CommandBuilder, CommandLine, ExecuteOptions, Step, StepKind};
pub use calculations::{scale_to_height, scale_to_width, variable_preset};
pub use params::{
    CropOptions, ExtentOptions, Gravity, ResizeFlag, ResizeOptions, RotateOptions, SharpenMode,
    SharpenOptions, SharpenPreset, Unsharp,
};
pub(crate) use params::lenient;
