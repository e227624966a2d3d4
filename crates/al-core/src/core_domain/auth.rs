use crate::core::{
    Annotation, AnnotationStore, ApiKey, AuthError, AutoLabelError, ProjectId, UserId,
};

// ---------------------------------------------------------------------------
// User permission types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub admin: bool,
}

// ---------------------------------------------------------------------------
// AuthService: authenticates API keys and checks project permissions
// ---------------------------------------------------------------------------

/// Maps API keys to users.
///
/// Stored as `Vec<(ApiKey, UserInfo)>` since `ApiKey` has no `Hash`. Lookup
/// visits every entry regardless of where a match sits.
pub struct AuthService {
    users: Vec<(ApiKey, UserInfo)>,
}

impl AuthService {
    pub fn new(users: Vec<(ApiKey, UserInfo)>) -> Self {
        Self { users }
    }

    pub fn validate(&self, key: &ApiKey) -> Result<&UserInfo, AuthError> {
        let mut matched: Option<&UserInfo> = None;
        for (stored_key, info) in &self.users {
            if stored_key == key {
                matched = Some(info);
            }
        }
        matched.ok_or(AuthError::InvalidApiKey)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserInfo> {
        self.users.iter().map(|(_, info)| info)
    }

    pub fn require_admin(user: &UserInfo) -> Result<(), AuthError> {
        if user.admin {
            Ok(())
        } else {
            Err(AuthError::AdminRequired {
                user: user.id.clone(),
            })
        }
    }

    /// Admins pass without an explicit membership row.
    pub fn require_member(
        store: &dyn AnnotationStore,
        project: ProjectId,
        user: &UserInfo,
    ) -> Result<(), AutoLabelError> {
        if user.admin || store.is_member(project, &user.id)? {
            return Ok(());
        }
        Err(AuthError::NotProjectMember {
            user: user.id.clone(),
            project,
        }
        .into())
    }

    pub fn require_owner(annotation: &Annotation, user: &UserInfo) -> Result<(), AuthError> {
        if annotation.user == user.id {
            Ok(())
        } else {
            Err(AuthError::NotAnnotationOwner {
                annotation: annotation.id,
                user: user.id.clone(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
