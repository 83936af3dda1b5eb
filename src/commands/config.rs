use anyhow::Result;
use eventhub_core::Source;
use eventhub_core::config::Settings;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    let config_path = Settings::config_path()?;
    let settings = Settings::load()?;

    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());
    println!("  Store:   {}", settings.store_path().display());

    println!();
    println!("{}", "Sources".bold());
    for source in Source::ALL {
        let provider = settings.provider(source);
        let linked = std::env::var(&provider.token_env).is_ok_and(|t| !t.trim().is_empty());
        let state = match (provider.enabled, linked) {
            (false, _) => "disabled".dimmed().to_string(),
            (true, true) => "linked".green().to_string(),
            (true, false) => format!("no token in ${}", provider.token_env).yellow().to_string(),
        };
        println!("  {:<10} {}", source.to_string(), state);
    }

    println!();
    println!("{}", "Effective settings".bold());
    for line in settings.to_toml()?.lines() {
        println!("  {}", line);
    }

    Ok(())
}
