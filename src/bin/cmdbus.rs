use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;

use cmdbus::bus::{Bus, FanoutBus};
use cmdbus::config::Config;
use cmdbus::protocol::{
    component_id, component_name, FramePayload, SCENARIO_BASELINE, SCENARIO_SECURE_ECU,
    SCENARIO_SECURE_INFOTAINMENT,
};

const LISTEN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("cmdbus")
        .version("0.1.0")
        .about("Operator console for the demonstrator command bus")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file (defaults to the loopback demo topology)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Local bind address for bus traffic")
                .takes_value(true)
                .default_value("127.0.0.1:0")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("restart")
                .about("Request a restart of one component")
                .arg(
                    Arg::with_name("target")
                        .help("Component name from the published id table, e.g. TARGET_1")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("scenario")
                .about("Switch the active scenario")
                .arg(
                    Arg::with_name("name")
                        .help("Scenario to activate")
                        .required(true)
                        .possible_values(&["baseline", "secure_infotainment", "secure_ecu"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("hack")
                .about("Announce the active hack (drives the LED pattern)")
                .arg(
                    Arg::with_name("name")
                        .help("Hack name from the published id table, e.g. HACK_BRAKE")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("ready")
                .about("Announce a component as ready")
                .arg(
                    Arg::with_name("component")
                        .help("Component name from the published id table")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("listen")
                .about("Print C&C traffic addressed to the bind address")
                .arg(
                    Arg::with_name("count")
                        .long("count")
                        .value_name("N")
                        .help("Stop after N frames")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let bind = matches.value_of("bind").unwrap_or("127.0.0.1:0");
    let mut bus = FanoutBus::new(bind, &config.net.cc_subscribers)?;

    match matches.subcommand() {
        ("restart", Some(sub)) => {
            let target = lookup_id(sub, "target")?;
            send(&mut bus, FramePayload::RestartTarget { target })?;
        }
        ("scenario", Some(sub)) => {
            let scenario = match sub.value_of("name").unwrap_or_default() {
                "secure_infotainment" => SCENARIO_SECURE_INFOTAINMENT,
                "secure_ecu" => SCENARIO_SECURE_ECU,
                _ => SCENARIO_BASELINE,
            };
            send(
                &mut bus,
                FramePayload::ActiveScenario {
                    scenario: scenario as u8,
                },
            )?;
        }
        ("hack", Some(sub)) => {
            let hack = lookup_id(sub, "name")?;
            send(&mut bus, FramePayload::HackActive { hack: hack as u8 })?;
        }
        ("ready", Some(sub)) => {
            let component = lookup_id(sub, "component")?;
            send(&mut bus, FramePayload::ComponentReady { component })?;
        }
        ("listen", Some(sub)) => {
            let count: Option<u32> = sub.value_of("count").and_then(|v| v.parse().ok());
            listen(&mut bus, count)?;
        }
        _ => {
            eprintln!("{}", "no subcommand given; try --help".yellow());
        }
    }

    Ok(())
}

fn lookup_id(sub: &ArgMatches<'_>, key: &str) -> Result<u32, Box<dyn std::error::Error>> {
    let name = sub.value_of(key).unwrap_or_default();
    component_id(&name.to_ascii_uppercase())
        .ok_or_else(|| format!("`{name}` is not in the published id table").into())
}

fn send(bus: &mut FanoutBus, payload: FramePayload) -> Result<(), Box<dyn std::error::Error>> {
    bus.send(&payload.encode())?;
    println!("{} {:?}", "sent".green().bold(), payload);
    Ok(())
}

fn listen(bus: &mut FanoutBus, count: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "listening for C&C frames (ctrl-c to stop)".cyan());
    let mut seen = 0u32;
    loop {
        if let Some(frame) = bus.recv(LISTEN_TIMEOUT)? {
            match FramePayload::decode(&frame) {
                Ok(payload) => println!("{} {:?}", "frame".blue().bold(), payload),
                Err(err) => println!(
                    "{} id={} ({}): {}",
                    "raw".yellow(),
                    frame.id,
                    component_name(frame.id).unwrap_or("?"),
                    err
                ),
            }
            seen += 1;
            if let Some(limit) = count {
                if seen >= limit {
                    return Ok(());
                }
            }
        }
    }
}
