//! Query execution settings read from the environment.

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

pub const TIMEOUT_ENV: &str = "ARCHITECT_QUERY_TIMEOUT_SECS";
pub const CAST_PARAMETERS_ENV: &str = "ARCHITECT_CAST_PARAMETERS";
pub const MAX_LIMIT_ENV: &str = "ARCHITECT_MAX_LIMIT";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuerySettings {
    /// Applied when a request carries no timeout of its own. `None` waits indefinitely.
    pub default_timeout: Option<Duration>,
    /// Append `::wire` casts to placeholders.
    pub cast_parameters: bool,
    /// Upper bound for select limits.
    pub max_limit: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            default_timeout: None,
            cast_parameters: true,
            max_limit: 1000,
        }
    }
}

impl QuerySettings {
    /// Defaults overridden by whichever variables are set. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = QuerySettings::default();
        if let Some(secs) = read_var::<u64>(TIMEOUT_ENV)? {
            settings.default_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(cast) = read_var::<bool>(CAST_PARAMETERS_ENV)? {
            settings.cast_parameters = cast;
        }
        if let Some(max) = read_var::<u64>(MAX_LIMIT_ENV)? {
            if max == 0 {
                return Err(ConfigError::Validation(format!("{} must be positive", MAX_LIMIT_ENV)));
            }
            settings.max_limit = max;
        }
        Ok(settings)
    }

    pub fn timeout_for(&self, requested: Option<Duration>) -> Option<Duration> {
        requested.or(self.default_timeout)
    }
}

fn read_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match dotenvy::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Load(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_wins() {
        let s = QuerySettings {
            default_timeout: Some(Duration::from_secs(30)),
            ..QuerySettings::default()
        };
        assert_eq!(s.timeout_for(Some(Duration::from_secs(2))), Some(Duration::from_secs(2)));
        assert_eq!(s.timeout_for(None), Some(Duration::from_secs(30)));
        assert_eq!(QuerySettings::default().timeout_for(None), None);
    }

    #[test]
    fn parses_variables() {
        assert_eq!(read_var::<u64>("ARCHITECT_TEST_UNSET_VARIABLE").unwrap(), None);
        std::env::set_var("ARCHITECT_TEST_BAD_LIMIT", "lots");
        assert!(matches!(
            read_var::<u64>("ARCHITECT_TEST_BAD_LIMIT"),
            Err(ConfigError::Load(_))
        ));
        std::env::set_var("ARCHITECT_TEST_CAST", "false");
        assert_eq!(read_var::<bool>("ARCHITECT_TEST_CAST").unwrap(), Some(false));
    }
}
