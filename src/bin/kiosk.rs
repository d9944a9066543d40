use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, warn};

use cmdbus::bus::{FanoutBus, PeerBus};
use cmdbus::config::Config;
use cmdbus::coordinators::kiosk::{KioskRequest, KioskResponse, STATUS_UNEXPECTED_FAILURE};
use cmdbus::coordinators::HackerKiosk;
use cmdbus::ota::DemoOtaClient;

const IDLE_TICK_PERIOD_MS: u64 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("kiosk")
        .version("0.1.0")
        .about("Hacker kiosk backend: attack walkthrough over the demonstrator C&C bus")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file (defaults to the loopback demo topology)")
                .takes_value(true),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Both bus channels are fatal if they cannot be constructed.
    let cmd_bus = FanoutBus::new(&config.net.kiosk_bind, &config.net.cc_subscribers)?;
    let info_bus = PeerBus::new(
        &config.net.info_bind,
        &config.net.info_peer,
        Some(&config.net.info_allowlist),
        &config.net.info_denylist,
    )?;
    let ota = DemoOtaClient::new(vec![config.net.ota_url_secure_infotainment.clone()]);

    let kiosk = HackerKiosk::new(
        Box::new(cmd_bus),
        Box::new(info_bus),
        Box::new(ota),
        &config,
    )?;
    let kiosk = Arc::new(Mutex::new(kiosk));

    let listener = TcpListener::bind(("127.0.0.1", config.net.kiosk_port)).await?;
    info!(port = config.net.kiosk_port, "kiosk request server listening");

    // Idle ticks keep the walkthrough advancing between requests.
    let idle_kiosk = Arc::clone(&kiosk);
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_millis(IDLE_TICK_PERIOD_MS));
        loop {
            interval.tick().await;
            idle_kiosk.lock().await.idle_tick();
        }
    });

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "kiosk client connected");
                let client_kiosk = Arc::clone(&kiosk);
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, client_kiosk).await {
                        warn!(%addr, %err, "kiosk client error");
                    }
                    info!(%addr, "kiosk client disconnected");
                });
            }
            Err(err) => {
                error!(%err, "failed to accept kiosk client");
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    kiosk: Arc<Mutex<HackerKiosk>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<KioskRequest>(trimmed) {
            Ok(request) => {
                info!(func = %request.func, "kiosk request");
                kiosk.lock().await.handle_request(&request)
            }
            Err(err) => {
                error!(%err, raw = trimmed, "unparseable kiosk request");
                KioskResponse {
                    status: STATUS_UNEXPECTED_FAILURE,
                    retval: serde_json::json!(format!("bad request: {err}")),
                }
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}
