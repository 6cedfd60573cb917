use anyhow::Result;
use chrono::Utc;
use console::style;
use shift_core::config::ShiftConfig;
use shift_core::scaffold;

/// Scaffold a timestamped migration file.
pub fn migration(config: &ShiftConfig, name: &str) -> Result<()> {
    let layout = config.layout();
    let path = scaffold::create_migration(&layout.migrations_dir, name, Utc::now())?;

    println!(
        "  {} Created migration: {}",
        style("✓").green(),
        style(path.display()).cyan()
    );
    println!();
    Ok(())
}

/// Scaffold a SQL function template.
pub fn function(config: &ShiftConfig, name: &str) -> Result<()> {
    let layout = config.layout();
    let snake = scaffold::to_snake_case(name);
    let path = scaffold::create_function(&layout.functions_dir, name, Utc::now())?;

    println!(
        "  {} Function template for {} created: {}",
        style("✓").green(),
        style(&snake).bold(),
        style(path.display()).cyan()
    );
    println!(
        "  {} Apply it with {}",
        style("ℹ").blue(),
        style("shift --policies").bold()
    );
    println!();
    Ok(())
}
