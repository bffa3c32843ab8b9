use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{SessionId, VoteKind},
    error::BackendError,
    protocol::{
        Environment, ListObjectsRequest, NewScriptIdea, NewVote, ScriptIdea, StorageObject,
        VoteRecord, VoteTarget,
    },
};
use url::Url;

use crate::config::BackendCredentials;

/// Query/insert/list contract of the hosted backend. Nothing else in the
/// crate talks to the network for data.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// All environments, oldest first.
    async fn fetch_environments(&self) -> Result<Vec<Environment>>;
    /// All script ideas, newest first.
    async fn fetch_script_ideas(&self) -> Result<Vec<ScriptIdea>>;
    /// Target id of every vote row of `kind`.
    async fn fetch_vote_targets(&self, kind: VoteKind) -> Result<Vec<String>>;
    async fn fetch_votes_by_voter(&self, voter: &SessionId) -> Result<Vec<VoteRecord>>;
    /// Inserts all rows in one request.
    async fn insert_votes(&self, votes: &[NewVote]) -> Result<()>;
    async fn insert_script_idea(&self, idea: &NewScriptIdea) -> Result<()>;
    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListObjectsRequest,
    ) -> Result<Vec<StorageObject>>;
    fn public_url(&self, bucket: &str, object_name: &str) -> String;
}

/// Gateway over the hosted REST (`/rest/v1`) and storage (`/storage/v1`) APIs.
pub struct RestGateway {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl RestGateway {
    pub fn new(credentials: &BackendCredentials) -> Self {
        Self::with_client(Client::new(), credentials)
    }

    pub fn with_client(http: Client, credentials: &BackendCredentials) -> Self {
        Self {
            http,
            base_url: credentials.url.as_str().trim_end_matches('/').to_string(),
            anon_key: credentials.anon_key.clone(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .authorized(self.http.get(self.rest_url(table)))
            .query(query)
            .send()
            .await
            .with_context(|| format!("failed to query {table}"))?;
        let res = ensure_success(res).await?;
        res.json()
            .await
            .with_context(|| format!("failed to decode {table} rows"))
    }

    async fn insert<T: serde::Serialize + ?Sized>(&self, table: &str, rows: &T) -> Result<()> {
        let res = self
            .authorized(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .with_context(|| format!("failed to insert into {table}"))?;
        ensure_success(res).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for RestGateway {
    async fn fetch_environments(&self) -> Result<Vec<Environment>> {
        self.select(
            "environments",
            &[
                ("select", "*".to_string()),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_script_ideas(&self) -> Result<Vec<ScriptIdea>> {
        self.select(
            "script_ideas",
            &[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_vote_targets(&self, kind: VoteKind) -> Result<Vec<String>> {
        let rows: Vec<VoteTarget> = self
            .select(
                "votes",
                &[
                    ("select", "target_id".to_string()),
                    ("vote_type", format!("eq.{kind}")),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.target_id).collect())
    }

    async fn fetch_votes_by_voter(&self, voter: &SessionId) -> Result<Vec<VoteRecord>> {
        self.select(
            "votes",
            &[
                ("select", "vote_type,target_id".to_string()),
                ("voter_session", format!("eq.{voter}")),
            ],
        )
        .await
    }

    async fn insert_votes(&self, votes: &[NewVote]) -> Result<()> {
        if votes.is_empty() {
            return Ok(());
        }
        self.insert("votes", votes).await
    }

    async fn insert_script_idea(&self, idea: &NewScriptIdea) -> Result<()> {
        self.insert("script_ideas", idea).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListObjectsRequest,
    ) -> Result<Vec<StorageObject>> {
        let res = self
            .authorized(
                self.http
                    .post(format!("{}/storage/v1/object/list/{bucket}", self.base_url)),
            )
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to list bucket {bucket}"))?;
        let res = ensure_success(res).await?;
        res.json()
            .await
            .with_context(|| format!("failed to decode listing for bucket {bucket}"))
    }

    fn public_url(&self, bucket: &str, object_name: &str) -> String {
        public_object_url(&self.base_url, bucket, object_name)
    }
}

pub fn public_object_url(base_url: &str, bucket: &str, object_name: &str) -> String {
    let fallback = format!(
        "{}/storage/v1/object/public/{bucket}/{object_name}",
        base_url.trim_end_matches('/')
    );
    let Ok(mut url) = Url::parse(base_url) else {
        return fallback;
    };
    let Ok(mut segments) = url.path_segments_mut() else {
        return fallback;
    };
    segments
        .pop_if_empty()
        .extend(["storage", "v1", "object", "public", bucket])
        .extend(object_name.split('/'));
    drop(segments);
    url.to_string()
}

async fn ensure_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(BackendError::from_body(status.as_u16(), &body).into())
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
