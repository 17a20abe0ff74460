use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use speakin_types::{AccountId, Party};

use crate::config::AuthConfig;
use crate::error::{ServerError, ServerResult};

/// Caller of the session service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: AccountId,
    pub is_admin: bool,
}

impl Identity {
    pub fn user(user_id: AccountId) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: AccountId) -> Self {
        Self { user_id, is_admin: true }
    }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    pub fn from_parts(parts: &Parts) -> Self {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map_or(Self::Anonymous, |token| Self::Bearer(token.to_string()))
    }
}

/// What a caller is trying to do, with the accounts that own the target.
#[derive(Clone, Copy, Debug)]
pub enum Action {
    ManageSlot { tutor_id: AccountId },
    Book { student_id: AccountId },
    /// Read or update a booking.
    AccessBooking { student_id: AccountId, tutor_id: AccountId },
    Recover,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManageSlot { tutor_id } => write!(f, "manage-slot:{tutor_id}"),
            Self::Book { student_id } => write!(f, "book:{student_id}"),
            Self::AccessBooking { student_id, tutor_id } => write!(f, "booking:{student_id}/{tutor_id}"),
            Self::Recover => write!(f, "recover"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;

    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool> {
        Ok(permits(identity, action))
    }
}

/// Ownership rules shared by every provider.
pub fn permits(identity: &Identity, action: &Action) -> bool {
    if identity.is_admin {
        return true;
    }
    match *action {
        Action::ManageSlot { tutor_id } => identity.user_id == tutor_id,
        Action::Book { student_id } => identity.user_id == student_id,
        Action::AccessBooking { student_id, tutor_id } => {
            identity.user_id == student_id || identity.user_id == tutor_id
        }
        Action::Recover => false,
    }
}

/// Which side of a booking a caller is on. Admins must say which side they
/// act for.
pub fn initiator(
    identity: &Identity,
    student_id: AccountId,
    tutor_id: AccountId,
    requested: Option<Party>,
) -> ServerResult<Party> {
    if identity.is_admin {
        return requested.ok_or_else(|| ServerError::BadRequest("admins must name the initiator".into()));
    }
    let party = if identity.user_id == student_id {
        Party::Student
    } else if identity.user_id == tutor_id {
        Party::Tutor
    } else {
        return Err(ServerError::Forbidden("only the student or the tutor can cancel this booking".into()));
    };
    match requested {
        Some(named) if named != party => Err(ServerError::Forbidden(format!("caller cannot act as the {named}"))),
        _ => Ok(party),
    }
}

/// Bearer tokens listed in the `[auth]` section.
pub struct StaticTokenAuth {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuth {
    pub fn new(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|entry| {
                let identity = Identity { user_id: entry.user_id, is_admin: entry.is_admin };
                (entry.token.clone(), identity)
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => self.tokens.get(token).cloned().ok_or(ServerError::Unauthorized),
            Credentials::Anonymous => Err(ServerError::Unauthorized),
        }
    }
}

/// Extractor for an authenticated caller.
pub struct Authenticated {
    pub identity: Identity,
    auth: Arc<dyn AuthProvider>,
}

impl Authenticated {
    pub async fn require(&self, action: Action) -> ServerResult<()> {
        if self.auth.authorize(&self.identity, &action).await? {
            Ok(())
        } else {
            Err(ServerError::Forbidden(action.to_string()))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    Arc<dyn AuthProvider>: FromRef<S>,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<dyn AuthProvider>::from_ref(state);
        let identity = auth.authenticate(&Credentials::from_parts(parts)).await?;
        Ok(Self { identity, auth })
    }
}
