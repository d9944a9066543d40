use clap::{App, Arg};
use tracing::info;

use cmdbus::bus::FanoutBus;
use cmdbus::component::{ComponentHandler, ScriptedComponent};
use cmdbus::config::Config;
use cmdbus::coordinators::director::{DISPLAY_PROXY, LIGHTING, SIMULATOR, SPEED_DISPLAY};
use cmdbus::coordinators::Director;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("director")
        .version("0.1.0")
        .about("Ignition director governing the driving simulator and its peripherals")
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

    // Demo subordinates; a deployment wires real simulator adapters in
    // through the same ManagedComponent seam.
    let mut handler = ComponentHandler::new();
    handler.register(Box::new(ScriptedComponent::ready(SIMULATOR)));
    handler.register(Box::new(ScriptedComponent::ready(DISPLAY_PROXY)));
    handler.register(Box::new(ScriptedComponent::ready(SPEED_DISPLAY)));
    handler.register(Box::new(ScriptedComponent::ready(LIGHTING)));

    let bus = FanoutBus::new(&config.net.director_bind, &config.net.cc_subscribers)?;
    let mut director = Director::new(Box::new(bus), handler, &config)?;
    info!(bind = %config.net.director_bind, "director up");

    // The steady-state receive is the loop's pacing; no extra sleep needed.
    while !director.is_exiting() {
        director.tick();
    }

    info!("director exited");
    Ok(())
}
