use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchTextPayload<'a> {
    pub text_query: &'a str,
    pub language_code: &'a str,
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchTextResponse {
    #[serde(default)]
    pub places: Vec<Place>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub display_name: Option<LocalizedText>,
    pub formatted_address: String,
    pub national_phone_number: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LocalizedText {
    pub text: String,
}
