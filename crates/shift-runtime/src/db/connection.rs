use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::ConnectOptions;
use tracing::{debug, info};

use shift_core::config::DatabaseConfig;
use shift_core::error::{Result, ShiftError};

/// Build connect options from configuration.
///
/// A URL takes precedence over discrete host/port/user/database fields.
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    if !config.is_configured() {
        return Err(ShiftError::Connection(
            "no database configured: set DATABASE_URL, POSTGRES_URL or POSTGRES_HOST/POSTGRES_DB"
                .into(),
        ));
    }

    let mut options = match &config.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .map_err(|e| ShiftError::Connection(format!("Invalid database URL: {}", e)))?,
        None => {
            let mut options = PgConnectOptions::new().port(config.port_or_default());
            if let Some(host) = &config.host {
                options = options.host(host);
            }
            if let Some(user) = &config.user {
                options = options.username(user);
            }
            if let Some(password) = &config.password {
                options = options.password(password);
            }
            if let Some(database) = &config.database {
                options = options.database(database);
            }
            options
        }
    };

    options = options.application_name(config.application_name_or_default());
    if !config.debug_sql {
        options = options.disable_statement_logging();
    }

    Ok(options)
}

/// Open the single connection a run works on.
pub async fn connect(config: &DatabaseConfig) -> Result<PgConnection> {
    let target = config.redacted_target();
    info!("Connecting to database {}", target);

    let options = connect_options(config)?;
    let mut conn = options.connect().await.map_err(|e| {
        ShiftError::Connection(format!("Failed to connect to {}: {}", target, e))
    })?;

    sqlx::query("SELECT set_config('search_path', $1, false)")
        .bind(&config.search_path)
        .execute(&mut conn)
        .await
        .map_err(|e| ShiftError::Connection(format!("Failed to set search_path: {}", e)))?;
    debug!("search_path set to {}", config.search_path);

    info!("Connected to {}", target);
    Ok(conn)
}
