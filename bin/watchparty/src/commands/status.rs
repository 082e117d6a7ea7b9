use watchparty_browser::{find_browser_binary, BrowserEngine};
use watchparty_core::Paths;

use super::{load_config, Overrides};

fn mark(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "✗"
    }
}

pub fn run(overrides: Overrides) -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("watchparty status");
    println!("=================");
    println!();

    let config_path = overrides
        .config
        .clone()
        .unwrap_or_else(|| paths.config_file());
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found, using defaults)" }
    );

    let config = load_config(&paths, &overrides)?;

    let or_unset = |s: &str| {
        if s.trim().is_empty() {
            "(unset)".to_string()
        } else {
            s.to_string()
        }
    };
    println!("Room:      {}", or_unset(&config.session.vc_url));
    println!("Bot name:  {}", or_unset(&config.session.bot_name));
    println!("Stop mode: {:?}", config.session.stop_mode);
    println!();

    // Browser
    let engine = BrowserEngine::from_name(&config.browser.engine);
    let browser = config
        .browser
        .binary
        .clone()
        .or_else(|| find_browser_binary(engine));
    println!(
        "Browser:   {} {}",
        engine.name(),
        match &browser {
            Some(path) => format!("✓ {}", path),
            None => "✗ not found".to_string(),
        }
    );
    println!(
        "Profile:   {}",
        config.browser.profile_dir(&paths).display()
    );

    // Resolver
    let resolver = which::which(&config.resolver.program);
    println!(
        "Resolver:  {} {}",
        config.resolver.program,
        match &resolver {
            Ok(path) => format!("✓ {}", path.display()),
            Err(_) => "✗ not found".to_string(),
        }
    );
    println!(
        "Workdir:   {}",
        config.resolver.working_dir(&paths).display()
    );
    println!();

    match config.validate() {
        Ok(()) => println!("Configuration: {} ready", mark(true)),
        Err(e) => println!("Configuration: {} {}", mark(false), e),
    }

    Ok(())
}
