//! REST implementations of [`MessageSender`] and [`ProfileService`].
//!
//! Endpoints:
//! - `POST {base}/api/rooms/{room}/messages` -- submit a message
//! - `GET  {base}/api/users/{id}/profile`    -- single profile lookup
//! - `POST {base}/api/users/profiles`        -- batch profile lookup

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use studyroom_shared::{
    AuthorProfile, Draft, Message, ProfileError, RoomId, SendError, UserId, ValidationError,
};

use crate::services::{MessageSender, ProfileService};
use crate::wire::{MessageDto, ProfileDto, SendBodyDto};

/// Client for the study-group REST backend.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Use a preconfigured client (timeouts, proxies, default headers).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct BatchProfilesBody<'a> {
    ids: Vec<&'a str>,
}

#[async_trait]
impl MessageSender for HttpApi {
    async fn send(&self, room: &RoomId, draft: &Draft) -> Result<Message, SendError> {
        let url = self.url(&format!("/api/rooms/{room}/messages"));
        debug!(room = %room, "submitting message");

        let response = self
            .client
            .post(&url)
            .json(&SendBodyDto::from_draft(draft))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            // The backend rejected the message; retrying the same payload
            // cannot succeed, so this maps to the validation kind.
            let reason = response.text().await.unwrap_or_default();
            return Err(SendError::Validation(ValidationError::Rejected(format!(
                "{status}: {reason}"
            ))));
        }
        if !status.is_success() {
            return Err(SendError::Transport(format!("server answered {status}")));
        }

        let dto: MessageDto = response
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("invalid send response: {e}")))?;
        Ok(dto.into_message())
    }
}

#[async_trait]
impl ProfileService for HttpApi {
    async fn fetch_profile(&self, author: &UserId) -> Result<AuthorProfile, ProfileError> {
        let url = self.url(&format!("/api/users/{author}/profile"));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProfileError::NotFound);
        }
        if !status.is_success() {
            return Err(ProfileError::Transport(format!("server answered {status}")));
        }

        let dto: ProfileDto = response
            .json()
            .await
            .map_err(|e| ProfileError::Transport(format!("invalid profile response: {e}")))?;
        Ok(dto.into_profile())
    }

    /// One request for the whole batch; authors the backend has no record
    /// of are simply absent from the response map.
    async fn fetch_profiles(
        &self,
        authors: &[UserId],
    ) -> Result<HashMap<UserId, AuthorProfile>, ProfileError> {
        if authors.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.url("/api/users/profiles");
        let body = BatchProfilesBody {
            ids: authors.iter().map(|a| a.0.as_str()).collect(),
        };
        debug!(count = authors.len(), "batch profile lookup");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProfileError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProfileError::Transport(format!("server answered {status}")));
        }

        let dtos: HashMap<String, ProfileDto> = response
            .json()
            .await
            .map_err(|e| ProfileError::Transport(format!("invalid batch response: {e}")))?;

        Ok(dtos
            .into_iter()
            .map(|(id, dto)| (UserId::new(id), dto.into_profile()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let api = HttpApi::new("https://api.example/");
        assert_eq!(
            api.url("/api/users/u-1/profile"),
            "https://api.example/api/users/u-1/profile"
        );
    }
}
