use serde::{Deserialize, Serialize};

/// Database configuration.
///
/// Either `url` or the discrete connection parts are used; `url` wins when
/// both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Database name.
    #[serde(default)]
    pub database: Option<String>,

    /// Reported to the server as `application_name`.
    #[serde(default)]
    pub application_name: Option<String>,

    /// Applied with `SET search_path` right after connecting.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Log every statement sent through the driver.
    #[serde(default)]
    pub debug_sql: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            application_name: None,
            search_path: default_search_path(),
            debug_sql: false,
        }
    }
}

fn default_search_path() -> String {
    "public".to_string()
}

const DEFAULT_PORT: u16 = 5432;

const DEFAULT_APPLICATION_NAME: &str = "shift";

impl DatabaseConfig {
    /// Fill unset fields from environment lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if self.url.is_none() {
            self.url = non_empty("DATABASE_URL").or_else(|| non_empty("POSTGRES_URL"));
        }
        if self.host.is_none() {
            self.host = non_empty("POSTGRES_HOST");
        }
        if self.port.is_none() {
            self.port = non_empty("POSTGRES_PORT").and_then(|p| p.parse().ok());
        }
        if self.user.is_none() {
            self.user = non_empty("POSTGRES_USER");
        }
        if self.password.is_none() {
            self.password = non_empty("POSTGRES_PASSWORD");
        }
        if self.database.is_none() {
            self.database = non_empty("POSTGRES_DB");
        }
        if self.application_name.is_none() {
            self.application_name =
                non_empty("POSTGRES_APP_NAME").or_else(|| non_empty("APP_NAME"));
        }
        if !self.debug_sql {
            self.debug_sql = non_empty("DEBUG_SQL").is_some();
        }
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn application_name_or_default(&self) -> &str {
        self.application_name
            .as_deref()
            .unwrap_or(DEFAULT_APPLICATION_NAME)
    }

    /// Whether anything at all points at a database.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.host.is_some() || self.database.is_some()
    }

    /// Connection target safe to print: credentials are never included.
    ///
    /// Query parameters are dropped from URLs since libpq accepts `user`,
    /// `password` and `sslpassword` there.
    pub fn redacted_target(&self) -> String {
        if let Some(url) = &self.url {
            let base = match url.find(|c| c == '?' || c == '#') {
                Some(end) => &url[..end],
                None => url.as_str(),
            };
            let target = match base.rsplit_once('@') {
                Some((_, target)) => target,
                None => base,
            };
            return if base.len() < url.len() {
                format!("{} (parameters hidden)", target)
            } else {
                target.to_string()
            };
        }

        format!(
            "{}@{}:{}/{} (password: {})",
            self.user.as_deref().unwrap_or("-"),
            self.host.as_deref().unwrap_or("localhost"),
            self.port_or_default(),
            self.database.as_deref().unwrap_or("-"),
            if self.password.is_some() { "******" } else { "none" },
        )
    }
}
