/// Configures retry budget, resync cadence and transport behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueueOptions {
    /// Failed attempts after which an entry is dropped.
    pub max_retries: u32,
    /// Delay before a follow-up pass when entries remain after a pass.
    pub resync_delay_ms: u64,
    /// Optional per-request timeout in milliseconds. `None` leaves it to
    /// the transport.
    pub timeout_ms: Option<u64>,
    /// Base URL that relative targets (e.g. `/api/events`) are resolved
    /// against.
    pub base_url: Option<String>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            resync_delay_ms: 5_000,
            timeout_ms: None,
            base_url: None,
        }
    }
}

impl QueueOptions {
    /// Builds options from environment variables, keeping defaults for
    /// anything unset.
    ///
    /// Reads:
    /// - `OFFLINE_QUEUE_MAX_RETRIES`
    /// - `OFFLINE_QUEUE_RESYNC_DELAY_MS`
    /// - `OFFLINE_QUEUE_TIMEOUT_MS`
    /// - `OFFLINE_QUEUE_BASE_URL`
    ///
    /// Returns an error if a variable is set but empty or not a number.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(value) = non_empty(&lookup, "OFFLINE_QUEUE_MAX_RETRIES")? {
            options.max_retries = parse_number(&value, "OFFLINE_QUEUE_MAX_RETRIES")?;
        }
        if let Some(value) = non_empty(&lookup, "OFFLINE_QUEUE_RESYNC_DELAY_MS")? {
            options.resync_delay_ms = parse_number(&value, "OFFLINE_QUEUE_RESYNC_DELAY_MS")?;
        }
        if let Some(value) = non_empty(&lookup, "OFFLINE_QUEUE_TIMEOUT_MS")? {
            options.timeout_ms = Some(parse_number(&value, "OFFLINE_QUEUE_TIMEOUT_MS")?);
        }
        if let Some(value) = non_empty(&lookup, "OFFLINE_QUEUE_BASE_URL")? {
            options.base_url = Some(value);
        }

        Ok(options)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> std::result::Result<Option<String>, String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(format!("{key} is set but empty")),
        Some(value) => Ok(Some(value.trim().to_owned())),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{key} must be a non-negative integer, got '{value}'"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::QueueOptions;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_three_retries_and_five_second_resync() {
        let options = QueueOptions::default();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.resync_delay_ms, 5_000);
        assert_eq!(options.timeout_ms, None);
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let options = QueueOptions::from_lookup(lookup(&[])).expect("empty env is valid");
        assert_eq!(options, QueueOptions::default());
    }

    #[test]
    fn reads_every_variable() {
        let options = QueueOptions::from_lookup(lookup(&[
            ("OFFLINE_QUEUE_MAX_RETRIES", "5"),
            ("OFFLINE_QUEUE_RESYNC_DELAY_MS", "250"),
            ("OFFLINE_QUEUE_TIMEOUT_MS", "1000"),
            ("OFFLINE_QUEUE_BASE_URL", " http://localhost:5173 "),
        ]))
        .expect("valid env");

        assert_eq!(options.max_retries, 5);
        assert_eq!(options.resync_delay_ms, 250);
        assert_eq!(options.timeout_ms, Some(1_000));
        assert_eq!(options.base_url.as_deref(), Some("http://localhost:5173"));
    }

    #[test]
    fn rejects_empty_and_malformed_values() {
        let err = QueueOptions::from_lookup(lookup(&[("OFFLINE_QUEUE_MAX_RETRIES", "  ")]))
            .expect_err("empty value must fail");
        assert!(err.contains("set but empty"));

        let err = QueueOptions::from_lookup(lookup(&[("OFFLINE_QUEUE_TIMEOUT_MS", "soon")]))
            .expect_err("non-numeric value must fail");
        assert!(err.contains("OFFLINE_QUEUE_TIMEOUT_MS"));
    }
}
