use clap::{App, Arg};
use tracing::info;

use cmdbus::bus::FanoutBus;
use cmdbus::config::Config;
use cmdbus::coordinators::Commander;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("commander")
        .version("0.1.0")
        .about("Target fleet commander for the demonstrator C&C bus")
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

    // Bus construction failure is fatal to the coordinator.
    let bus = FanoutBus::new(&config.net.commander_bind, &config.net.cc_subscribers)?;
    let mut commander = Commander::new(Box::new(bus), &config)?;
    info!(bind = %config.net.commander_bind, "commander up");

    let poll_period = config.timing.poll_period();
    while !commander.is_exiting() {
        commander.tick();
        std::thread::sleep(poll_period);
    }

    info!("commander exited");
    Ok(())
}
