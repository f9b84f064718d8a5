use clap::{Parser, Subcommand};
use reqwest::blocking::Client;
use show_splicer::audio_buffer::{AudioBuffer, AudioFormat};
use show_splicer::codec::{self, Mp3Encoder, ShowEncoder, TrackTags, WavEncoder};
use show_splicer::config::{Credentials, GoogleAuth, PipelineConfig};
use show_splicer::contentful::ContentfulClient;
use show_splicer::drive::{DriveClient, GOOGLE_TOKEN_URL};
use show_splicer::pipeline::PostProduction;
use show_splicer::services::{Alerter, LogAlerter, Services};
use show_splicer::slack::SlackWebhook;
use show_splicer::soundcloud::{SOUNDCLOUD_TOKEN_URL, SoundCloudClient};
use show_splicer::splice::{self, SilencePolicy, SpliceOutcome};
use show_splicer::token::{OAuthClient, OAuthTokenStore, StaticToken, TokenState, TokenStore};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "show_splicer", about = "Radio show post-production pipeline")]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every recording in the inbox folder and publish it
    Run,
    /// Splice a local recording between two local jingles
    Splice {
        /// Recorded show
        show: PathBuf,
        /// Intro jingle
        start: PathBuf,
        /// Outro jingle
        end: PathBuf,
        /// Output file; .mp3 goes through ffmpeg, anything else is written as WAV
        #[arg(short, long)]
        output: PathBuf,
        /// Silence policy: leading-trailing or interior (overrides config)
        #[arg(long)]
        policy: Option<String>,
        /// Process recordings shorter than the minimum show length anyway
        #[arg(long)]
        force: bool,
    },
    /// Configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// SoundCloud token maintenance
    Token {
        #[command(subcommand)]
        action: TokenCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the effective configuration
    Show,
    /// Write the default configuration (refuses to overwrite)
    Init,
}

#[derive(Subcommand)]
enum TokenCmd {
    /// Refresh the SoundCloud token now and update the cache
    Refresh,
    /// Write the tokens from the environment into the cache
    Seed,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = PipelineConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Run => run(&config),
        Commands::Splice {
            show,
            start,
            end,
            output,
            policy,
            force,
        } => splice_local(&config, &show, &start, &end, &output, policy.as_deref(), force),
        Commands::Config { action } => match action {
            ConfigCmd::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigCmd::Init => {
                let path = cli.config.unwrap_or_else(PipelineConfig::default_path);
                if path.exists() {
                    return Err(format!("{} already exists", path.display()).into());
                }
                PipelineConfig::default().save(&path)?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        },
        Commands::Token { action } => token(&config, action),
    }
}

fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("show_splicer/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(30 * 60))
        .build()
}

fn soundcloud_tokens(
    config: &PipelineConfig,
    creds: &Credentials,
    http: Client,
) -> OAuthTokenStore {
    let sc = &creds.soundcloud;
    OAuthTokenStore::new(
        "SoundCloud",
        http,
        OAuthClient {
            token_url: SOUNDCLOUD_TOKEN_URL.into(),
            client_id: sc.client_id.clone(),
            client_secret: sc.client_secret.clone(),
        },
        TokenState {
            access_token: sc.access_token.clone(),
            refresh_token: sc.refresh_token.clone(),
            expires_at: None,
        },
        config.token_cache_path(),
    )
}

fn build_services(config: &PipelineConfig, creds: Credentials, http: Client) -> Services {
    let drive_token: Box<dyn TokenStore> = match &creds.google {
        GoogleAuth::Static(token) => Box::new(StaticToken(token.clone())),
        GoogleAuth::Refresh {
            client_id,
            client_secret,
            refresh_token,
        } => Box::new(OAuthTokenStore::new(
            "Google",
            http.clone(),
            OAuthClient {
                token_url: GOOGLE_TOKEN_URL.into(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            },
            TokenState {
                access_token: String::new(),
                refresh_token: refresh_token.clone(),
                expires_at: None,
            },
            None,
        )),
    };
    let alerter: Box<dyn Alerter> = match &creds.slack_url {
        Some(url) => Box::new(SlackWebhook::new(http.clone(), url.clone())),
        None => {
            log::warn!("SLACK_ERROR_URL not set, failures are only logged");
            Box::new(LogAlerter)
        }
    };
    let sc_tokens = soundcloud_tokens(config, &creds, http.clone());

    Services {
        store: Box::new(DriveClient::new(http.clone(), drive_token)),
        publisher: Box::new(SoundCloudClient::new(http.clone(), Box::new(sc_tokens))),
        metadata: Box::new(ContentfulClient::new(
            http,
            creds.contentful,
            config.contentful.clone(),
        )),
        alerter,
    }
}

fn run(config: &PipelineConfig) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    let creds = Credentials::from_env()?;
    let services = build_services(config, creds, http_client()?);
    let encoder = Mp3Encoder::new(config.bitrate_kbps, &config.ffmpeg_path);

    let production = match PostProduction::new(&services, config, &encoder) {
        Ok(p) => p,
        Err(e) => {
            services
                .alerter
                .notify_failure(&format!("Post-production run aborted: {}", e));
            return Err(e.into());
        }
    };
    let report = production.run_inbox().inspect_err(|e| {
        services
            .alerter
            .notify_failure(&format!("Post-production run aborted: {}", e));
    })?;
    println!(
        "{} processed, {} skipped, {} failed",
        report.processed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}

fn read_audio(path: &Path, target: Option<AudioFormat>) -> Result<AudioBuffer, Box<dyn Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let ext = codec::extension_of(&path.to_string_lossy());
    let audio = match target {
        Some(format) => codec::decode_conformed(bytes, ext.as_deref(), format)?,
        None => codec::decode(bytes, ext.as_deref())?,
    };
    Ok(audio)
}

fn splice_local(
    config: &PipelineConfig,
    show: &Path,
    start: &Path,
    end: &Path,
    output: &Path,
    policy: Option<&str>,
    force: bool,
) -> Result<(), Box<dyn Error>> {
    let mut splice_config = config.splice.clone();
    if let Some(p) = policy {
        splice_config.silence_policy = SilencePolicy::from_str_loose(p)?;
    }
    if force {
        splice_config.min_input_len_ms = 0;
    }

    let start_jingle = read_audio(start, None)?;
    let format = start_jingle.format();
    let end_jingle = read_audio(end, Some(format))?;
    let recording = read_audio(show, Some(format))?;
    println!(
        "Show {} ms, jingles {} ms / {} ms, {} policy",
        recording.duration_ms(),
        start_jingle.duration_ms(),
        end_jingle.duration_ms(),
        splice_config.silence_policy
    );

    let finished = match splice::splice(&recording, &start_jingle, &end_jingle, &splice_config)? {
        SpliceOutcome::Finished(f) => f,
        SpliceOutcome::Skipped { length_ms } => {
            println!(
                "Skipped: show is {} ms, under the {} ms minimum (use --force)",
                length_ms, splice_config.min_input_len_ms
            );
            return Ok(());
        }
    };

    let is_mp3 = codec::extension_of(&output.to_string_lossy()).as_deref() == Some("mp3");
    let encoder: Box<dyn ShowEncoder> = if is_mp3 {
        Box::new(Mp3Encoder::new(config.bitrate_kbps, &config.ffmpeg_path))
    } else {
        Box::new(WavEncoder)
    };
    let tags = TrackTags {
        artist: Some(config.artist_tag.clone()),
        ..TrackTags::default()
    };
    let bytes = encoder.encode(&finished.audio, &tags)?;
    std::fs::write(output, bytes).map_err(|e| format!("{}: {}", output.display(), e))?;
    println!(
        "Wrote {} ({} ms, {} ms of silence removed)",
        output.display(),
        finished.audio.duration_ms(),
        finished.removed_ms
    );
    Ok(())
}

fn token(config: &PipelineConfig, action: TokenCmd) -> Result<(), Box<dyn Error>> {
    let creds = Credentials::from_env()?;
    let cache = config
        .token_cache_path()
        .ok_or("no cache directory available, set token_cache in the config")?;
    match action {
        TokenCmd::Refresh => {
            let store = soundcloud_tokens(config, &creds, http_client()?);
            let token = store.force_refresh()?;
            match token.expires_at {
                Some(at) => println!("Refreshed, valid until {}", at.to_rfc3339()),
                None => println!("Refreshed"),
            }
        }
        TokenCmd::Seed => {
            let state = TokenState {
                access_token: creds.soundcloud.access_token.clone(),
                refresh_token: creds.soundcloud.refresh_token.clone(),
                expires_at: None,
            };
            state.save(&cache)?;
            println!("Seeded {}", cache.display());
        }
    }
    Ok(())
}
