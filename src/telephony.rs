use crate::consts::RECORDING_TIME_LIMIT_SECS;
use crate::error::AppError;
use crate::plivo_types::{CreateCallPayload, CreateCallResponse, RecordPayload};

use async_trait::async_trait;
use tracing::{debug, error};

/// An outbound leg to place.  The provider calls `answer_url` (GET) when the callee picks up and
/// `hangup_url` (POST) when the leg ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub to: String,
    pub answer_url: String,
    pub hangup_url: String,
}

#[async_trait]
pub trait Telephony: Send + Sync {
    /// Returns the provider's request id for the new leg.
    async fn create_call(&self, request: &CallRequest) -> Result<String, AppError>;
    async fn start_recording(&self, call_id: &str, callback_url: &str) -> Result<(), AppError>;
    async fn hangup(&self, call_id: &str) -> Result<(), AppError>;
}

pub struct PlivoClient {
    http_client: reqwest::Client,
    auth_id: String,
    auth_token: String,
    from_number: String,
}

impl PlivoClient {
    pub fn new(
        http_client: reqwest::Client,
        auth_id: String,
        auth_token: String,
        from_number: String,
    ) -> Self {
        Self {
            http_client,
            auth_id,
            auth_token,
            from_number,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "https://api.plivo.com/v1/Account/{}/{path}",
            self.auth_id
        )
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, AppError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        error!(status=%status, body=%body, "plivo api error");
        Err(AppError::Provider(format!("plivo api error {status}: {body}")))
    }
}

#[async_trait]
impl Telephony for PlivoClient {
    async fn create_call(&self, request: &CallRequest) -> Result<String, AppError> {
        let payload = CreateCallPayload {
            from: &self.from_number,
            to: &request.to,
            answer_url: &request.answer_url,
            answer_method: "GET",
            hangup_url: &request.hangup_url,
            hangup_method: "POST",
        };
        let resp = self
            .http_client
            .post(self.url("Call/"))
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send create call request to plivo");
                AppError::Provider(e.to_string())
            })?;
        let created = Self::check(resp)
            .await?
            .json::<CreateCallResponse>()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to deserialize plivo create call response");
                AppError::Provider(e.to_string())
            })?;
        debug!(request_uuid=%created.request_uuid, message=%created.message, "plivo call created");
        Ok(created.request_uuid)
    }

    async fn start_recording(&self, call_id: &str, callback_url: &str) -> Result<(), AppError> {
        let payload = RecordPayload {
            time_limit: RECORDING_TIME_LIMIT_SECS,
            callback_url,
            callback_method: "POST",
        };
        let resp = self
            .http_client
            .post(self.url(&format!("Call/{call_id}/Record/")))
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send record request to plivo");
                AppError::Provider(e.to_string())
            })?;
        Self::check(resp).await.map(|_| ())
    }

    async fn hangup(&self, call_id: &str) -> Result<(), AppError> {
        let resp = self
            .http_client
            .delete(self.url(&format!("Call/{call_id}/")))
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send hangup request to plivo");
                AppError::Provider(e.to_string())
            })?;
        Self::check(resp).await.map(|_| ())
    }
}
