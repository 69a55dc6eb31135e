use serde::Deserialize;

use crate::backend::error::{ChatError, Result};

const USERS_URL: &str = "https://api.twitch.tv/helix/users";

/// User info response
#[derive(Debug, Clone, Deserialize)]
pub struct UsersResponse {
    pub data: Vec<UserData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    #[allow(dead_code)] // Part of Twitch API response
    pub display_name: String,
}

/// Twitch Helix client, used to turn a channel login into its channel id
pub struct TwitchApi {
    client: reqwest::Client,
    client_id: String,
}

impl TwitchApi {
    pub fn new(client_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
        }
    }

    /// Helix rejects requests without a client id
    pub fn has_client_id(&self) -> bool {
        !self.client_id.trim().is_empty()
    }

    /// Get user information by login name
    pub async fn get_user_by_login(&self, login: &str, access_token: &str) -> Result<UserData> {
        let url = format!("{}?login={}", USERS_URL, urlencoding::encode(login));
        let bearer = access_token.strip_prefix("oauth:").unwrap_or(access_token);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Client-Id", &self.client_id)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if status.as_u16() == 401 {
                return Err(ChatError::Auth(format!("Token rejected: {}", error_text)));
            }
            return Err(ChatError::Http(format!("HTTP {}: {}", status, error_text)));
        }

        let users_response = response.json::<UsersResponse>().await?;
        first_user(users_response, login)
    }
}

fn first_user(response: UsersResponse, login: &str) -> Result<UserData> {
    response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Resolution(format!("Twitch user '{}' not found", login)))
}
