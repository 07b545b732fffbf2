//! Diagnostic command to check installation.

use kiln_core::Config;
use kiln_providers::ProviderRegistry;

pub fn run(config: &Config) {
    println!("Running diagnostics...\n");

    // Check config directory
    let config_dir = Config::config_dir();
    println!("Config directory: {:?}", config_dir);
    if config_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist");
    }

    // Check data directory
    let data_dir = Config::data_dir();
    println!("\nData directory: {:?}", data_dir);
    if data_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (will be created when history is first saved)");
    }

    // Check configuration
    let validation = config.validate();
    println!("\nConfiguration:");
    if validation.is_ok() {
        println!("  ✓ Valid");
    }
    for issue in validation.errors() {
        println!("  ✗ {}: {}", issue.field, issue.message);
    }
    for issue in validation.warnings() {
        println!("  ! {}: {}", issue.field, issue.message);
    }

    // Game server
    println!(
        "\nGame server: {} (version {}, {} auth)",
        config.server.address(),
        config.server.game_version,
        config.server.auth
    );

    // Check providers
    println!("\nProviders:");
    let registry = ProviderRegistry::from_config(config);
    if registry.is_empty() {
        println!("  ✗ No providers configured");
    }
    for provider in registry.providers() {
        let status = if provider.is_configured() {
            "✓ configured"
        } else {
            "✗ not configured"
        };
        println!(
            "  {} {} ({}, default model {})",
            status,
            provider.name(),
            provider.id(),
            provider.default_model()
        );
    }
    match registry.get(&config.general.provider) {
        Some(provider) => println!("\nSelected provider: {}", provider.name()),
        None => println!("\nSelected provider: ✗ '{}' is not available", config.general.provider),
    }

    // Check environment variables
    println!("\nAPI Keys:");
    for var in ["DEEPSEEK_API_KEY", "OPENAI_API_KEY"] {
        if std::env::var(var).is_ok() {
            println!("  ✓ {} is set", var);
        } else {
            println!("  ✗ {} is not set", var);
        }
    }
}
