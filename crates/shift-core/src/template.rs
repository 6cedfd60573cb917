//! Template rendering for scaffolded SQL files.
//!
//! Provides simple `{{var}}` replacement.

use std::collections::HashMap;

/// Render a template by replacing `{{key}}` placeholders with values.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

/// Helper macro to create a HashMap of template variables.
#[macro_export]
macro_rules! template_vars {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(map.insert($key, $value);)*
        map
    }};
}
