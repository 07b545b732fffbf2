//! Mode listing.

use kiln_agent::ModeRegistry;
use kiln_core::Config;

/// Print every built-in mode with the configured overrides applied.
pub fn list(config: &Config) {
    let modes = ModeRegistry::with_defaults();
    modes.load_map(&config.modes);
    for mode in modes.iter() {
        let state = if mode.is_enabled() { "on " } else { "off" };
        println!("{} {:<18} [{}] {}", state, mode.name(), mode.scope(), mode.description());
    }
}
