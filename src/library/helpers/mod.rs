//! Various small helper functions

mod backoff;

pub use backoff::IdleBackoff;

use lazy_static::lazy_static;
use regex::Regex;
use std::error::Error;
use uuid::Uuid;

lazy_static! {
    static ref CAMEL_CASE_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^A-Za-z0-9]+").unwrap();
}

/// Splits the input string into two parts at the first occurence of the separator
pub fn split_into_two(input: &str, separator: &'static str) -> Option<(String, String)> {
    let parts: Vec<&str> = input.splitn(2, separator).collect();

    if parts.len() != 2 {
        return None;
    }

    Some((parts[0].to_string(), parts[1].to_string()))
}

/// Normalizes a free-form label into a lowercase snake-case slug
///
/// Camel-case boundaries and runs of non-alphanumeric characters become a single underscore,
/// leading and trailing separators are removed (`"Admin Tasks"` and `"AdminTasks"` both yield `admin_tasks`).
pub fn snake_case_slug(label: &str) -> String {
    let separated = CAMEL_CASE_BOUNDARY.replace_all(label, "${1}_${2}");
    let collapsed = NON_ALPHANUMERIC.replace_all(&separated, "_");

    collapsed.trim_matches('_').to_lowercase()
}

/// Generates a process-wide unique event identifier in the form `{service}:{uuid}`
pub fn unique_event_id(service_name: &str) -> String {
    format!("{}:{}", service_name, Uuid::new_v4())
}

/// Renders an error and all of its sources into one line, outermost first
pub fn format_error_chain(error: &(dyn Error + 'static)) -> String {
    let mut source: Option<&(dyn Error + 'static)> = Some(error);
    let mut causes: Vec<String> = Vec::new();

    while let Some(error) = source {
        causes.push(error.to_string());
        source = error.source();
    }

    causes.join(": caused by: ")
}
