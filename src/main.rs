use printkit::config::Config;
use printkit::console::Console;
use printkit::init_logging;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging()?;

    let mut config = Config::load_default();

    // Positional overrides: printkit [LOCATION [BAUD]]
    let mut args = std::env::args().skip(1);
    if let Some(location) = args.next() {
        config.connection.location = location;
    }
    if let Some(baud) = args.next() {
        config.connection.baud = baud.parse()?;
    }
    config.validate()?;

    Console::new(config).run()
}
