use al_core::core::{ProjectType, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields supplied when creating a project; the store assigns the id.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub project_type: ProjectType,
}

/// A user's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub user: UserId,
    pub joined_at: DateTime<Utc>,
}

/// Documents in a project and how many of them a user has not annotated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub remaining: usize,
}

/// Annotation counts per label and per member, in label-id and user-id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub label: LabelStats,
    pub user: UserStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelStats {
    pub labels: Vec<String>,
    pub data: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub users: Vec<String>,
    pub data: Vec<usize>,
}
