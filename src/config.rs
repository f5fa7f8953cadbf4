use std::env;

#[derive(Debug, thiserror::Error)]
#[error("{0} not set!")]
pub struct MissingVar(&'static str);

#[derive(Clone, Debug)]
pub struct Config {
    /// Host the provider can reach us on, used to build webhook and socket urls.
    pub public_host: String,
    pub bind_addr: String,
    pub plivo_auth_id: String,
    pub plivo_auth_token: String,
    pub plivo_phone_number: String,
    pub google_places_api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, MissingVar> {
        Ok(Self {
            public_host: env::var("PUBLIC_HOST").unwrap_or_else(|_| "localhost:7860".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:7860".to_string()),
            plivo_auth_id: required("PLIVO_AUTH_ID")?,
            plivo_auth_token: required("PLIVO_AUTH_TOKEN")?,
            plivo_phone_number: required("PLIVO_PHONE_NUMBER")?,
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY").unwrap_or_default(),
        })
    }

    pub fn https_url(&self, path: &str) -> String {
        format!("https://{}{path}", self.public_host)
    }

    pub fn wss_url(&self, path: &str) -> String {
        format!("wss://{}{path}", self.public_host)
    }
}

fn required(name: &'static str) -> Result<String, MissingVar> {
    env::var(name).map_err(|_| MissingVar(name))
}
