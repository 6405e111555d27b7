//! Request extractors layered on top of [`AuthUser`].

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::app::AppState;
use crate::authz::{Action, Actor, AuthUserId, PolicyEvaluator, Resource, SessionState};
use crate::errors::{AppError, AppResult};
use crate::events::ActivityActor;
use crate::jwt::AuthUser;

/// The caller's resolved session. Anonymous sessions are accepted.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub auth_user_id: AuthUserId,
    pub state: SessionState,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        let session = state.sessions.resolve(auth.auth_user_id).await;
        Ok(CurrentSession {
            auth_user_id: auth.auth_user_id,
            state: settled(session)?,
        })
    }
}

/// Surfaces a failed resolution as 503/504 instead of a silent denial.
pub fn settled(state: SessionState) -> AppResult<SessionState> {
    match state {
        SessionState::Resolved(_) => Ok(state),
        SessionState::Failed(err) => Err(err.into()),
        SessionState::Uninitialized | SessionState::Resolving => {
            Err(AppError::Unavailable("session could not be resolved".to_string()))
        }
    }
}

/// A caller that belongs to an organization.
#[derive(Debug, Clone)]
pub struct CurrentActor {
    pub auth_user_id: AuthUserId,
    pub actor: Actor,
}

impl CurrentActor {
    pub fn require(&self, evaluator: &dyn PolicyEvaluator, resource: Resource, action: Action) -> AppResult<()> {
        if evaluator.can(Some(&self.actor), resource, action) {
            return Ok(());
        }
        tracing::info!(member_id = %self.actor.member_id, %resource, %action, "request forbidden");
        Err(AppError::forbidden(format!("missing permission {resource}.{action}")))
    }

    pub fn activity(&self) -> ActivityActor {
        ActivityActor {
            member_id: self.actor.member_id,
            organization_id: self.actor.organization_id,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = CurrentSession::from_request_parts(parts, state).await?;
        let actor = session
            .state
            .actor()
            .cloned()
            .ok_or_else(|| AppError::forbidden("not a member of any organization"))?;

        Ok(CurrentActor {
            auth_user_id: session.auth_user_id,
            actor,
        })
    }
}
