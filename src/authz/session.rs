//! Session/actor context.
//!
//! Resolves `(member, organization, role)` for an authenticated user once
//! and caches the snapshot until sign-out or until the role it holds is
//! edited or deleted. Lifecycle per user:
//!
//! ```text
//! Uninitialized -> Resolving -> Resolved(Actor) | Resolved(Anonymous) | Failed
//!       ^                              |
//!       +------ sign-out / role change +
//! ```
//!
//! Concurrent `resolve`/`refresh` calls for the same user share one
//! in-flight lookup. A lookup that was overtaken by an invalidation never
//! commits its result, and one overtaken by sign-out is discarded: callers
//! arriving after the sign-out start a fresh lookup.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;

use super::actor::Actor;
use super::directory::DirectoryBackend;
use super::errors::{DirectoryError, ResolveError, ResolveStep};
use super::evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
use super::matrix::{Action, Resource};
use super::scope;
use super::store::RoleInvalidation;
use super::{AuthUserId, ProjectId, RoleId};
use crate::errors::AppError;
use crate::models::role::Role;

const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for each directory lookup.
    pub step_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let step_timeout_ms = std::env::var("SESSION_STEP_TIMEOUT_MS")
            .map(|val| val.parse::<u64>())
            .unwrap_or(Ok(DEFAULT_STEP_TIMEOUT_MS))
            .map_err(|_| AppError::configuration("SESSION_STEP_TIMEOUT_MS must be a valid integer"))?;

        Ok(Self {
            step_timeout: Duration::from_millis(step_timeout_ms),
        })
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Actor(Actor),
    /// Authenticated, but not a member of any organization yet.
    Anonymous,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Uninitialized,
    Resolving,
    Resolved(Resolution),
    Failed(ResolveError),
}

impl SessionState {
    pub fn actor(&self) -> Option<&Actor> {
        match self {
            SessionState::Resolved(Resolution::Actor(actor)) => Some(actor),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SessionState::Resolved(_))
    }

    pub fn has_permission(&self, resource: Resource, action: Action) -> bool {
        DefaultPolicyEvaluator.can(self.actor(), resource, action)
    }

    pub fn has_permission_named(&self, resource: &str, action: &str) -> bool {
        DefaultPolicyEvaluator.can_named(self.actor(), resource, action)
    }

    pub fn can_view_own(&self, resource: Resource) -> bool {
        DefaultPolicyEvaluator.can_view_own_only(self.actor(), resource)
    }

    pub fn has_full_project_access(&self) -> bool {
        scope::has_full_project_access(self.actor())
    }

    pub fn has_project_access(&self, project_id: &ProjectId) -> bool {
        scope::has_project_access(self.actor(), project_id)
    }

    pub fn allowed_project_ids(&self) -> Option<Vec<ProjectId>> {
        scope::allowed_project_ids(self.actor())
    }
}

struct SessionEntry {
    state: SessionState,
    generation: u64,
    /// Fixed when the entry is created. A new epoch means the session was
    /// signed out and started over.
    epoch: u64,
}

#[derive(Clone, Copy)]
struct Attempt {
    epoch: u64,
    generation: u64,
}

enum Commit {
    Stored,
    Stale,
    SignedOut,
}

type InFlight = Arc<OnceCell<SessionState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionContext {
    directory: Arc<dyn DirectoryBackend>,
    config: SessionConfig,
    sessions: Mutex<HashMap<AuthUserId, SessionEntry>>,
    in_flight: Mutex<HashMap<AuthUserId, InFlight>>,
    generations: AtomicU64,
}

impl SessionContext {
    pub fn new(directory: Arc<dyn DirectoryBackend>, config: SessionConfig) -> Self {
        Self {
            directory,
            config,
            sessions: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(1),
        }
    }

    /// Current state without triggering resolution.
    pub fn state(&self, auth_user_id: AuthUserId) -> SessionState {
        lock(&self.sessions)
            .get(&auth_user_id)
            .map(|entry| entry.state.clone())
            .unwrap_or(SessionState::Uninitialized)
    }

    /// Returns the cached snapshot, resolving it first when there is none.
    /// Failed sessions are retried.
    pub async fn resolve(&self, auth_user_id: AuthUserId) -> SessionState {
        match self.state(auth_user_id) {
            state @ SessionState::Resolved(_) => state,
            _ => self.run(auth_user_id).await,
        }
    }

    /// Re-runs resolution, joining a lookup that is already in flight.
    pub async fn refresh(&self, auth_user_id: AuthUserId) -> SessionState {
        self.run(auth_user_id).await
    }

    pub async fn refresh_user_data(&self, auth_user_id: AuthUserId) -> Result<(), ResolveError> {
        match self.refresh(auth_user_id).await {
            SessionState::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }

    /// Sign-out or token expiry: forget the snapshot.
    pub fn sign_out(&self, auth_user_id: AuthUserId) {
        lock(&self.in_flight).remove(&auth_user_id);
        if lock(&self.sessions).remove(&auth_user_id).is_some() {
            tracing::info!(%auth_user_id, "session invalidated");
        }
    }

    /// Drops every snapshot holding `role_id` and marks lookups in flight as
    /// stale. Returns the number of sessions affected.
    pub fn invalidate_role(&self, role_id: RoleId) -> usize {
        let in_flight: Vec<AuthUserId> = lock(&self.in_flight).keys().copied().collect();

        let mut sessions = lock(&self.sessions);
        let mut affected = 0;
        for (auth_user_id, entry) in sessions.iter_mut() {
            let holds_role = entry.state.actor().is_some_and(|actor| actor.holds_role(role_id));
            let resolving = in_flight.contains(auth_user_id);

            if holds_role {
                entry.state = SessionState::Uninitialized;
            }
            if holds_role || resolving {
                entry.generation = self.next_generation();
                affected += 1;
            }
        }

        tracing::info!(%role_id, affected, "role change invalidated sessions");
        affected
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    async fn run(&self, auth_user_id: AuthUserId) -> SessionState {
        let cell = {
            let mut in_flight = lock(&self.in_flight);
            in_flight
                .entry(auth_user_id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let joined = &cell;
        let state = cell
            .get_or_init(|| async move {
                let state = self.resolve_until_stable(auth_user_id).await;
                // Released before the result is published: a finished lookup
                // is never joined.
                self.release(auth_user_id, joined);
                state
            })
            .await;

        state.clone()
    }

    fn release(&self, auth_user_id: AuthUserId, cell: &InFlight) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight
            .get(&auth_user_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            in_flight.remove(&auth_user_id);
        }
    }

    async fn resolve_until_stable(&self, auth_user_id: AuthUserId) -> SessionState {
        let mut state = SessionState::Uninitialized;
        let mut epoch = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(started) = self.begin(auth_user_id, epoch) else {
                return SessionState::Uninitialized;
            };
            epoch = Some(started.epoch);
            state = self.lookup(auth_user_id).await;

            match self.commit(auth_user_id, started, &state) {
                Commit::Stored => return state,
                Commit::SignedOut => return SessionState::Uninitialized,
                Commit::Stale => {
                    tracing::debug!(%auth_user_id, attempt, "session changed during resolution, retrying");
                }
            }
        }

        tracing::warn!(%auth_user_id, "session kept changing during resolution, result not cached");
        state
    }

    /// Starts an attempt. Retries pass the epoch of the first attempt and get
    /// `None` once the session was signed out in between.
    fn begin(&self, auth_user_id: AuthUserId, epoch: Option<u64>) -> Option<Attempt> {
        let generation = self.next_generation();
        let mut sessions = lock(&self.sessions);
        let entry = match (sessions.entry(auth_user_id), epoch) {
            (Entry::Occupied(occupied), Some(epoch)) if occupied.get().epoch != epoch => return None,
            (Entry::Occupied(occupied), _) => occupied.into_mut(),
            (Entry::Vacant(_), Some(_)) => return None,
            (Entry::Vacant(vacant), None) => vacant.insert(SessionEntry {
                state: SessionState::Uninitialized,
                generation,
                epoch: generation,
            }),
        };
        entry.generation = generation;
        // A refresh keeps serving the previous snapshot until the new one lands.
        if !entry.state.is_resolved() {
            entry.state = SessionState::Resolving;
        }
        Some(Attempt {
            epoch: entry.epoch,
            generation,
        })
    }

    fn commit(&self, auth_user_id: AuthUserId, attempt: Attempt, state: &SessionState) -> Commit {
        let mut sessions = lock(&self.sessions);
        match sessions.get_mut(&auth_user_id) {
            None => Commit::SignedOut,
            Some(entry) if entry.epoch != attempt.epoch => Commit::SignedOut,
            Some(entry) if entry.generation != attempt.generation => Commit::Stale,
            Some(entry) => {
                entry.state = state.clone();
                Commit::Stored
            }
        }
    }

    async fn step<T, F>(&self, step: ResolveStep, lookup: F) -> Result<T, ResolveError>
    where
        F: Future<Output = Result<T, DirectoryError>>,
    {
        match tokio::time::timeout(self.config.step_timeout, lookup).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ResolveError::Connectivity(err.to_string())),
            Err(_) => Err(ResolveError::TimedOut { step }),
        }
    }

    async fn lookup(&self, auth_user_id: AuthUserId) -> SessionState {
        match self.lookup_actor(auth_user_id).await {
            Ok(resolution) => SessionState::Resolved(resolution),
            Err(err) => {
                tracing::warn!(%auth_user_id, error = %err, "session resolution failed");
                SessionState::Failed(err)
            }
        }
    }

    async fn lookup_actor(&self, auth_user_id: AuthUserId) -> Result<Resolution, ResolveError> {
        let Some(member) = self
            .step(ResolveStep::Member, self.directory.fetch_member(auth_user_id))
            .await?
        else {
            tracing::info!(%auth_user_id, "no organization membership");
            return Ok(Resolution::Anonymous);
        };

        let Some(organization) = self
            .step(
                ResolveStep::Organization,
                self.directory.fetch_organization(member.organization_id),
            )
            .await?
        else {
            tracing::warn!(member_id = %member.id, organization_id = %member.organization_id, "member's organization is missing");
            return Ok(Resolution::Anonymous);
        };

        let role = match member.role_id {
            None => None,
            Some(role_id) => self
                .step(ResolveStep::Role, self.directory.fetch_role(organization.id, role_id))
                .await?
                .and_then(|db_role| {
                    if db_role.organization_id != organization.id {
                        tracing::warn!(%role_id, "role belongs to another organization");
                        return None;
                    }
                    match Role::try_from(db_role) {
                        Ok(role) => Some(Arc::new(role)),
                        Err(err) => {
                            tracing::warn!(%role_id, error = %err, "malformed role, using zero permissions");
                            None
                        }
                    }
                }),
        };

        if role.is_none() {
            tracing::warn!(member_id = %member.id, role_id = ?member.role_id, "member has no usable role");
        }

        tracing::debug!(%auth_user_id, member_id = %member.id, org = %organization.slug, "session resolved");
        Ok(Resolution::Actor(
            Actor::new(member.id, organization.id)
                .with_assigned_role(member.role_id)
                .with_shared_role(role),
        ))
    }
}

impl RoleInvalidation for SessionContext {
    fn role_changed(&self, role_id: RoleId) {
        self.invalidate_role(role_id);
    }
}
