//! The ImageMagick client.
//!
//! [`Magick`] owns a configuration and a [`CommandRunner`] and is the entry
//! point for everything that spawns a tool: executing builders, identify and
//! dimension queries ([`crate::identify`]) and intent-driven transforms
//! ([`crate::transform`]).

use crate::command::{CommandBuilder, ExecuteOptions};
use crate::config::{self, MagickConfig};
use crate::error::Result;
use crate::runner::{CommandRunner, ShellRunner};
use crate::stream::{Destination, Source};

#[derive(Debug, Clone)]
pub struct Magick<R = ShellRunner> {
    config: MagickConfig,
    runner: R,
}

impl Magick<ShellRunner> {
    pub fn new(config: MagickConfig) -> Self {
        Self::with_runner(config, ShellRunner)
    }

    /// Client using the process-wide defaults from [`config::set_defaults`].
    pub fn from_defaults() -> Self {
        Self::new(config::defaults())
    }
}

impl Default for Magick<ShellRunner> {
    fn default() -> Self {
        Self::new(MagickConfig::default())
    }
}

impl<R: CommandRunner> Magick<R> {
    pub fn with_runner(config: MagickConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &MagickConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// A fresh builder seeded with this client's configuration.
    pub fn commands(&self) -> CommandBuilder {
        CommandBuilder::new(&self.config)
    }

    /// Execute `builder` through this client's runner.
    pub async fn execute(
        &self,
        builder: &CommandBuilder,
        source: Source,
        destination: Destination,
        options: &ExecuteOptions,
    ) -> Result<Destination> {
        builder
            .execute_with(&self.runner, source, destination, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::MockRunner;

    #[test]
    fn commands_use_client_config() {
        let config = MagickConfig {
            executable: "magick convert".to_string(),
            ..MagickConfig::default()
        };
        let im = Magick::new(config);
        let line = im.commands().render(
            &Source::path("a.jpg"),
            &Destination::path("b.jpg"),
            None,
        );
        assert_eq!(line.to_string(), r#"magick convert "a.jpg" "b.jpg""#);
    }

    #[tokio::test]
    async fn execute_goes_through_runner() {
        let im = Magick::with_runner(MagickConfig::default(), MockRunner::new());
        let mut cmds = im.commands();
        cmds.quality(80.0);

        im.execute(
            &cmds,
            Source::path("a.jpg"),
            Destination::path("b.jpg"),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            im.runner().get_commands(),
            [r#"convert "a.jpg" -quality 80 "b.jpg""#]
        );
    }
}
