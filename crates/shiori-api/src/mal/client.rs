use std::time::Duration;

use reqwest::Client;

use super::auth;
use super::error::MalError;
use super::types::{MalSearchResponse, MalUser};
use crate::traits::{AnimeSearchResult, Credential, TrackerService, WatchStatus};

const BASE_URL: &str = "https://api.myanimelist.net";

/// Bound on every remote call. There is no retry; a timed-out call is
/// reported to the caller like any other failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// MyAnimeList API v2 client.
pub struct MalClient {
    client_id: String,
    http: Client,
}

impl MalClient {
    pub fn new(client_id: String) -> Self {
        Self {
            client_id,
            http: Client::new(),
        }
    }

    fn auth_header(credential: &Credential) -> String {
        format!("Bearer {}", credential.access_token)
    }

    /// Check the HTTP response for errors and return the body text on failure.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, MalError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(MalError::Api {
                status,
                message: body,
            })
        }
    }

    /// Fetch the authenticated user's profile.
    async fn get_user(&self, access_token: &str) -> Result<MalUser, MalError> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/v2/users/@me"))
            .header("Authorization", format!("Bearer {access_token}"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        resp.json().await.map_err(|e| MalError::Parse(e.to_string()))
    }
}

impl TrackerService for MalClient {
    type Error = MalError;

    async fn authenticate(&self) -> Result<Credential, MalError> {
        let token = auth::authorize(&self.client_id).await?;
        let user = self.get_user(&token.access_token).await?;
        Ok(Credential {
            access_token: token.access_token,
            display_name: user.name,
        })
    }

    async fn search_anime(
        &self,
        credential: &Credential,
        query: &str,
    ) -> Result<Vec<AnimeSearchResult>, MalError> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/v2/anime"))
            .header("Authorization", Self::auth_header(credential))
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("q", query),
                ("limit", "10"),
                ("fields", "id,title,alternative_titles,num_episodes"),
            ])
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        let search: MalSearchResponse = resp
            .json()
            .await
            .map_err(|e| MalError::Parse(e.to_string()))?;

        Ok(search
            .data
            .into_iter()
            .map(|n| n.node.into_search_result())
            .collect())
    }

    async fn update_status(
        &self,
        credential: &Credential,
        anime_id: u64,
        status: WatchStatus,
        episodes: u32,
    ) -> Result<(), MalError> {
        let url = format!("{BASE_URL}/v2/anime/{anime_id}/my_list_status");

        // MAL requires a form-encoded body for PATCH, not JSON.
        let resp = self
            .http
            .patch(&url)
            .header("Authorization", Self::auth_header(credential))
            .timeout(REQUEST_TIMEOUT)
            .form(&[
                ("status", status.as_str().to_string()),
                ("num_watched_episodes", episodes.to_string()),
            ])
            .send()
            .await?;

        Self::check_response(resp).await?;
        Ok(())
    }
}
