use crate::error::AppError;
use crate::places_types::{SearchTextPayload, SearchTextResponse};
use crate::types::Restaurant;
use crate::utils::normalize_phone_number;

use async_trait::async_trait;
use tracing::{debug, error};

const SEARCH_TEXT_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const FIELD_MASK: &str =
    "places.displayName,places.formattedAddress,places.nationalPhoneNumber,places.id";

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Best match for `query` that has a phone number, if any.
    async fn search(&self, query: &str) -> Result<Option<Restaurant>, AppError>;
}

pub struct GooglePlaces {
    http_client: reqwest::Client,
    api_key: String,
}

impl GooglePlaces {
    pub fn new(http_client: reqwest::Client, api_key: String) -> Self {
        Self {
            http_client,
            api_key,
        }
    }
}

#[async_trait]
impl PlaceSearch for GooglePlaces {
    async fn search(&self, query: &str) -> Result<Option<Restaurant>, AppError> {
        let payload = SearchTextPayload {
            text_query: query,
            language_code: "en",
        };
        let resp = self
            .http_client
            .post(SEARCH_TEXT_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send request to google places");
                AppError::Search(e.to_string())
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Search(format!(
                "Google Places API error {status}: {body}"
            )));
        }
        let resp = resp.json::<SearchTextResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize google places response");
            AppError::Search(e.to_string())
        })?;
        debug!(query=%query, results=resp.places.len(), "google places search");
        Ok(first_restaurant(resp))
    }
}

/// Only the top hit counts, and only if it has a phone number we can dial.
fn first_restaurant(resp: SearchTextResponse) -> Option<Restaurant> {
    let place = resp.places.into_iter().next()?;
    if place.national_phone_number.is_empty() {
        return None;
    }
    Some(Restaurant {
        name: place
            .display_name
            .map(|n| n.text)
            .unwrap_or_else(|| "Unknown".to_string()),
        address: place.formatted_address,
        phone_number: normalize_phone_number(&place.national_phone_number),
        place_id: Some(place.id).filter(|id| !id.is_empty()),
    })
}
