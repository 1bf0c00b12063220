mod cache;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rtsp_client::{Client, ClientConfig, Dispatch, PacingMode, PlaybackRate, SessionState};
use tracing_subscriber::EnvFilter;

use crate::cache::FrameCache;

#[derive(Parser)]
#[command(
    name = "rtsp-client",
    about = "Interactive RTSP/RTP streaming client"
)]
struct Args {
    /// Server host name or IP address
    server_addr: String,
    /// Server RTSP control port
    server_port: u16,
    /// Local UDP port to receive RTP on
    rtp_port: u16,
    /// Resource to stream (e.g. movie.Mjpeg)
    resource: String,

    /// Who controls playback speed
    #[arg(long, value_enum, default_value_t = Pacing::Client)]
    pacing: Pacing,

    /// Inter-frame delay at 1x when pacing on the client
    #[arg(long, default_value_t = 500)]
    frame_interval_ms: u64,

    /// Control connection timeout in seconds
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Where to cache the latest frame [default: cache-<rtp_port>.jpg]
    #[arg(long)]
    cache: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Pacing {
    /// Send SPEED_* requests and let the server adjust delivery
    Server,
    /// Sleep between admitted frames
    Client,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(
            &self.server_addr,
            self.server_port,
            self.rtp_port,
            &self.resource,
        );
        config.pacing = match self.pacing {
            Pacing::Server => PacingMode::ServerDirected,
            Pacing::Client => PacingMode::ClientPaced {
                base_interval: Duration::from_millis(self.frame_interval_ms),
            },
        };
        config.connect_timeout = Some(Duration::from_secs(self.connect_timeout));
        config
    }
}

const TEARDOWN_WAIT: Duration = Duration::from_secs(5);

const HELP: &str = "commands: setup | play | pause | teardown | speed <0.5x|1x|2x> | status | quit";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("cache-{}.jpg", args.rtp_port)));
    let cache = Arc::new(FrameCache::new(cache_path));

    let client = match Client::connect(args.client_config(), cache.clone()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Connection Failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Connected to {}; frames are cached at {}",
        client.config().server_endpoint(),
        cache.path().display()
    );
    println!("{HELP}");

    let code = run(&client);

    client.shutdown();
    if let Err(e) = cache.clear() {
        tracing::warn!(error = %e, "failed to remove frame cache");
    }
    code
}

/// Read commands from stdin until `quit`, EOF, or an acknowledged teardown.
fn run(client: &Client) -> ExitCode {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("failed to read command: {e}");
                return ExitCode::FAILURE;
            }
            None => return ExitCode::SUCCESS,
        };

        let mut words = line.split_whitespace();
        let result = match words.next() {
            None => continue,
            Some("setup") => client.setup().map(Some),
            Some("play") => client.play().map(Some),
            Some("pause") => client.pause().map(Some),
            Some("teardown") => {
                let result = client.teardown();
                if matches!(result, Ok(Dispatch::Sent { .. })) {
                    if !client.wait_for_state(SessionState::Init, TEARDOWN_WAIT) {
                        eprintln!("no reply to TEARDOWN, closing anyway");
                        return ExitCode::FAILURE;
                    }
                    // The control loop ends once the teardown is acknowledged.
                    if let Err(e) = client.wait() {
                        eprintln!("control connection ended with error: {e}");
                    }
                    println!("session closed");
                    return ExitCode::SUCCESS;
                }
                result.map(Some)
            }
            Some("speed") => match words.next().map(str::parse::<PlaybackRate>) {
                Some(Ok(rate)) => client.set_rate(rate),
                Some(Err(e)) => {
                    println!("{e}");
                    continue;
                }
                None => {
                    println!("current rate: {}", client.rate());
                    continue;
                }
            },
            Some("status") => {
                print_status(client);
                continue;
            }
            Some("quit" | "exit") => return ExitCode::SUCCESS,
            Some(_) => {
                println!("{HELP}");
                continue;
            }
        };

        match result {
            Ok(Some(Dispatch::Sent { cseq })) => println!("sent (CSeq {cseq})"),
            Ok(Some(Dispatch::Skipped(reason))) => println!("skipped: {reason:?}"),
            Ok(None) => println!("rate set to {}", client.rate()),
            Err(e) => {
                eprintln!("request failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
}

fn print_status(client: &Client) {
    let session = client.session();
    let session_id = session
        .session_id()
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    println!(
        "state {} | session {} | CSeq {} | rate {}",
        session.state(),
        session_id,
        session.request_seq(),
        client.rate()
    );
    if let Some(stats) = client.media_stats() {
        println!(
            "frames admitted {} | dropped {} | malformed {}",
            stats.admitted, stats.dropped, stats.malformed
        );
    }
}
