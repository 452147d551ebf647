use clap::{Parser, Subcommand};
use magick_pipe::command::ExecuteOptions;
use magick_pipe::config::{self, MagickConfig};
use magick_pipe::identify::{FormatField, IdentifyOptions};
use magick_pipe::{Destination, Intents, Magick, Source, apply_intents};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Path argument where `-` stands for stdin or stdout.
const STDIO: &str = "-";

#[derive(Parser)]
#[command(name = "magick-pipe")]
#[command(about = "Drive ImageMagick convert/identify from JSON transform intents")]
#[command(long_about = "\
Drive ImageMagick convert/identify from JSON transform intents

Intents are a JSON object applied in key order:

  {
    \"quality\": 80,
    \"strip\": true,
    \"sharpen\": { \"mode\": \"variable\" },
    \"resize\": { \"width\": 400, \"flag\": \">\" },
    \"crop\": { \"width\": 200, \"height\": 200, \"x\": 10, \"y\": 0 }
  }

Operations: gravity, resize, crop, extent, rotate, sharpen, quality, density,
strip. Unknown keys and unparsable values are ignored.

Use '-' as SOURCE or DEST to read stdin or write stdout.
Run 'magick-pipe gen-config' to generate a documented magick-pipe.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./magick-pipe.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the convert executable
    #[arg(long, global = true)]
    executable: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Where to read transform intents from.
#[derive(clap::Args, Clone)]
struct IntentArgs {
    /// Intents as a JSON object
    #[arg(long, conflicts_with = "intents_file")]
    intents: Option<String>,

    /// File holding the intents JSON object
    #[arg(long)]
    intents_file: Option<PathBuf>,

    /// Explicit output format, e.g. png
    #[arg(long)]
    format: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the convert command line for the intents without running it
    Render {
        source: String,
        dest: String,
        #[command(flatten)]
        intents: IntentArgs,
    },
    /// Apply the intents to SOURCE and write DEST
    Transform {
        source: String,
        dest: String,
        #[command(flatten)]
        intents: IntentArgs,
    },
    /// Print format, dimensions and frame count as JSON
    Identify {
        source: String,
        /// Decode the whole image to catch corrupt files
        #[arg(long)]
        verify: bool,
        /// Extra text field, NAME=ESCAPE (e.g. orient=%[orientation])
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Extra numeric field, NAME=ESCAPE (e.g. depth=%z)
        #[arg(long = "number-field", value_parser = parse_field)]
        number_fields: Vec<(String, String)>,
    },
    /// Print width, height and frame count as JSON
    Dimensions { source: String },
    /// Print a stock magick-pipe.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout may carry image data
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "magick_pipe=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let Cli {
        config: config_path,
        executable,
        command,
    } = Cli::parse();
    let client = || load_config(config_path.as_deref(), executable.clone()).map(Magick::new);

    match command {
        Command::Render {
            source,
            dest,
            intents,
        } => {
            let im = client()?;
            let cmds = apply_intents(im.config(), &load_intents(&intents)?);
            let line = cmds.render(
                &open_source(&source),
                &open_destination(&dest),
                intents.format.as_deref(),
            );
            println!("{line}");
        }
        Command::Transform {
            source,
            dest,
            intents,
        } => {
            let im = client()?;
            let options = ExecuteOptions {
                format: intents.format.clone(),
            };
            let intents = load_intents(&intents)?;
            im.transform(
                open_source(&source),
                open_destination(&dest),
                &intents,
                &options,
            )
            .await?;
        }
        Command::Identify {
            source,
            verify,
            fields,
            number_fields,
        } => {
            let im = client()?;
            let options = IdentifyOptions {
                fields: fields
                    .into_iter()
                    .map(|(name, escape)| (name, FormatField::Text(escape)))
                    .chain(
                        number_fields
                            .into_iter()
                            .map(|(name, escape)| (name, FormatField::Number(escape))),
                    )
                    .collect(),
                verify,
            };
            let info = im.identify(open_source(&source), &options).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Dimensions { source } => {
            let im = client()?;
            let dims = im.dimensions(open_source(&source)).await?;
            println!("{}", serde_json::to_string_pretty(&dims)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load_config(
    path: Option<&Path>,
    executable: Option<String>,
) -> Result<MagickConfig, config::ConfigError> {
    let mut config = match path {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(Path::new("."))?,
    };
    if let Some(executable) = executable {
        config.executable = executable;
        config.validate()?;
    }
    Ok(config)
}

fn load_intents(args: &IntentArgs) -> Result<Intents, Box<dyn std::error::Error>> {
    let json = match (&args.intents, &args.intents_file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Ok(Intents::new()),
    };
    Ok(serde_json::from_str(&json)?)
}

fn open_source(arg: &str) -> Source {
    if arg == STDIO {
        Source::stream(tokio::io::stdin())
    } else {
        Source::path(arg)
    }
}

fn open_destination(arg: &str) -> Destination {
    if arg == STDIO {
        Destination::stream(tokio::io::stdout())
    } else {
        Destination::path(arg)
    }
}

fn parse_field(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, escape)) if !name.is_empty() => Ok((name.to_string(), escape.to_string())),
        _ => Err(format!("expected NAME=ESCAPE, got '{arg}'")),
    }
}
