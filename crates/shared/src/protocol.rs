use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{EnvironmentId, ScriptIdeaId, SessionId, VoteKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvironmentId,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptIdea {
    #[serde(deserialize_with = "string_or_number")]
    pub id: ScriptIdeaId,
    pub idea: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_session: Option<SessionId>,
    pub created_at: DateTime<Utc>,
}

/// One row of the `votes` collection as inserted by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVote {
    pub voter_session: SessionId,
    pub vote_type: VoteKind,
    pub target_id: String,
}

impl NewVote {
    pub fn environment(voter: &SessionId, environment_id: &EnvironmentId) -> Self {
        Self {
            voter_session: voter.clone(),
            vote_type: VoteKind::Environment,
            target_id: environment_id.0.clone(),
        }
    }

    pub fn script(voter: &SessionId, idea_id: &ScriptIdeaId) -> Self {
        Self {
            voter_session: voter.clone(),
            vote_type: VoteKind::Script,
            target_id: idea_id.0.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScriptIdea {
    pub idea: String,
    pub author_session: SessionId,
}

/// Projection of a vote row used for the session's own-vote bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote_type: VoteKind,
    #[serde(deserialize_with = "string_or_number")]
    pub target_id: String,
}

/// Projection of a vote row used for tallying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTarget {
    #[serde(deserialize_with = "string_or_number")]
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub column: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListObjectsRequest {
    pub prefix: String,
    pub limit: usize,
    pub offset: usize,
    #[serde(rename = "sortBy")]
    pub sort_by: SortBy,
}

impl ListObjectsRequest {
    pub fn by_name(limit: usize) -> Self {
        Self {
            prefix: String::new(),
            limit,
            offset: 0,
            sort_by: SortBy {
                column: "name".to_string(),
                order: SortOrder::Asc,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Votes,
    ScriptIdeas,
}

impl ChangeTable {
    pub const ALL: [ChangeTable; 2] = [ChangeTable::Votes, ChangeTable::ScriptIdeas];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeTable::Votes => "votes",
            ChangeTable::ScriptIdeas => "script_ideas",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        match name {
            "votes" => Some(ChangeTable::Votes),
            "script_ideas" => Some(ChangeTable::ScriptIdeas),
            _ => None,
        }
    }
}

/// Row-insert notification observed on the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub table: ChangeTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
}

/// Envelope used by the realtime websocket endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

fn string_or_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(value) => T::from(value),
        Raw::Int(value) => T::from(value.to_string()),
    })
}

impl From<String> for ScriptIdeaId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
