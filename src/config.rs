use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Connection, caching and quota settings for one upstream API.
#[derive(Clone, Debug)]
pub struct UpstreamSettings {
    pub base_url: String,
    /// Required by both providers' usage policies; checked per request so a
    /// missing value surfaces as a configuration error, not a startup crash.
    pub user_agent: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub cache_ttl: Duration,
    pub rate_limit_max_calls: usize,
    pub rate_limit_period: Duration,
}

impl UpstreamSettings {
    /// Pooled HTTP client honouring the connect and response timeouts.
    /// The user agent is attached per request so it can be reported missing.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub default_lat: f64,
    pub default_lon: f64,
    pub default_timezone: String,
    pub default_target_time: String,
    pub cache_max_entries: u64,
    pub met: UpstreamSettings,
    pub geocoder: UpstreamSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let connect_timeout = vars.seconds("HTTP_CONNECT_TIMEOUT_S", 5.0)?;
        let read_timeout = vars.seconds("HTTP_READ_TIMEOUT_S", 10.0)?;

        Ok(Config {
            bind_addr: vars.string("BIND_ADDR", "0.0.0.0:8080"),
            default_lat: vars.parse("DEFAULT_LAT", 44.8125)?,
            default_lon: vars.parse("DEFAULT_LON", 20.4612)?,
            default_timezone: vars.string("DEFAULT_TIMEZONE", "Europe/Belgrade"),
            default_target_time: vars.string("DEFAULT_TARGET_TIME", "14:00"),
            cache_max_entries: vars.parse("CACHE_MAX_ENTRIES", 10_000)?,
            met: UpstreamSettings {
                base_url: vars.string(
                    "MET_BASE_URL",
                    "https://api.met.no/weatherapi/locationforecast/2.0",
                ),
                user_agent: vars.optional("MET_USER_AGENT"),
                connect_timeout,
                read_timeout,
                cache_ttl: vars.seconds("MET_CACHE_TTL_S", 600.0)?,
                rate_limit_max_calls: vars.parse("MET_RL_MAX_CALLS", 20)?,
                rate_limit_period: vars.seconds("MET_RL_PERIOD_S", 1.0)?,
            },
            geocoder: UpstreamSettings {
                base_url: vars.string("GEOCODER_BASE_URL", "https://nominatim.openstreetmap.org"),
                user_agent: vars.optional("GEOCODER_USER_AGENT"),
                connect_timeout,
                read_timeout,
                cache_ttl: vars.seconds("GEOCODER_CACHE_TTL_S", 86_400.0)?,
                rate_limit_max_calls: vars.parse("GEOCODER_RL_MAX_CALLS", 1)?,
                rate_limit_period: vars.seconds("GEOCODER_RL_PERIOD_S", 1.0)?,
            },
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("{} has invalid value {:?}: {}", name, raw, e)),
            None => Ok(default),
        }
    }

    fn seconds(&self, name: &str, default: f64) -> anyhow::Result<Duration> {
        let secs: f64 = self.parse(name, default)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow::anyhow!("{} must be a non-negative number of seconds: {}", name, e))
    }
}
