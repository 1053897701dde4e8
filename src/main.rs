use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use axum::body::Bytes;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use elise_gateway::api::ApiServerBuilder;
use elise_gateway::engines::AudioInput;
use elise_gateway::{AudioBuffer, Config, Engines, Orchestrator, Transcript};

/// Elise - voice gateway for the Elise avatar
#[derive(Parser)]
#[command(name = "elise", version, about)]
struct Cli {
    /// Path to the config file (defaults to ~/.config/elise/config.toml)
    #[arg(short, long, env = "ELISE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Classify a transcript against the command phrases
    Classify {
        /// Transcript text
        text: String,
    },
    /// Transcribe a local audio file
    Transcribe {
        /// Audio file
        file: PathBuf,
    },
    /// Synthesize text to an MP3 file
    Say {
        /// Text to speak
        text: String,
        /// Output file
        #[arg(short, long, default_value = "out.mp3")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info,elise_gateway=info",
        1 => "info,elise_gateway=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Classify { text } => classify(&config, &text),
        Command::Transcribe { file } => transcribe(&config, &file).await,
        Command::Say { text, output } => say(&config, &text, &output).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.server.port,
        language = %config.transcription.language,
        voice = %config.synthesis.voice,
        "starting elise gateway"
    );

    let engines = Engines::from_config(&config)?;
    let orchestrator = Arc::new(Orchestrator::from_config(&config, engines)?);

    ApiServerBuilder::new(orchestrator)
        .server_config(&config.server)
        .build()
        .run()
        .await?;

    Ok(())
}

fn classify(config: &Config, text: &str) -> anyhow::Result<()> {
    let matcher = config.commands.matcher()?;
    let transcript = Transcript::from_raw(text);

    match matcher.find_match(&transcript) {
        Some((intent, phrase)) => println!("{intent:?} (matched \"{phrase}\")"),
        None => println!("{:?}", matcher.classify(&transcript)),
    }
    Ok(())
}

async fn transcribe(config: &Config, file: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read(file).await?;
    let file_name = file.file_name().and_then(|n| n.to_str());
    let buffer = AudioBuffer::from_upload(Bytes::from(data), None, file_name);

    let engines = Engines::from_config(config)?;
    let input = AudioInput {
        buffer: &buffer,
        path: file,
    };
    let raw = engines
        .transcription
        .transcribe(input, &config.transcription.language, config.transcription.task)
        .await?;

    let transcript = Transcript::from_raw(&raw);
    let intent = config.commands.matcher()?.classify(&transcript);
    println!("{transcript}");
    tracing::info!(?intent, format = ?buffer.format(), "transcribed");
    Ok(())
}

async fn say(config: &Config, text: &str, output: &Path) -> anyhow::Result<()> {
    let engines = Engines::from_config(config)?;
    let audio = engines
        .synthesis
        .synthesize(text, &config.synthesis.voice)
        .await?;

    tokio::fs::write(output, &audio).await?;
    println!("wrote {} bytes to {}", audio.len(), output.display());
    Ok(())
}
