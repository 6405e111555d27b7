use super::actor::Actor;
use super::matrix::{parse_key, Action, PermissionValue, Resource};
use super::record::{OwnershipField, ScopedRecord};
use super::scope;

/// Which field makes a record "own" for each resource.
///
/// `dashboard` and `settings` have no records, so `OwnOnly` never matches
/// there.
pub fn ownership_field(resource: Resource) -> Option<OwnershipField> {
    match resource {
        Resource::Tickets => Some(OwnershipField::AssigneeId),
        Resource::Projects
        | Resource::Quotes
        | Resource::Features
        | Resource::Feedback
        | Resource::Financials
        | Resource::Expenses
        | Resource::Forms => Some(OwnershipField::CreatedBy),
        Resource::Crm | Resource::Emails => Some(OwnershipField::OwnerId),
        Resource::Team => Some(OwnershipField::MemberId),
        Resource::Dashboard | Resource::Settings => None,
    }
}

/// Policy evaluator trait for pluggable authorization logic.
///
/// Every method is pure over an already-resolved actor snapshot and
/// fails closed: a missing actor or role is a denial, never an error.
pub trait PolicyEvaluator: Send + Sync {
    /// Coarse "is this action class permitted at all" check. `OwnOnly`
    /// counts as permitted here; row ownership is checked by
    /// [`PolicyEvaluator::can_on_record`].
    fn can(&self, actor: Option<&Actor>, resource: Resource, action: Action) -> bool;

    /// Refines `can` for one record. Project scope and ownership are
    /// independent gates and both must pass.
    fn can_on_record(
        &self,
        actor: Option<&Actor>,
        resource: Resource,
        action: Action,
        record: &dyn ScopedRecord,
    ) -> bool;

    /// True iff `view` is exactly `OwnOnly`, so callers can push an owner
    /// predicate into their query.
    fn can_view_own_only(&self, actor: Option<&Actor>, resource: Resource) -> bool {
        actor.is_some_and(|a| a.permission(resource, Action::View) == PermissionValue::OwnOnly)
    }

    /// String-keyed form for callers at a JSON or HTTP boundary.
    fn can_named(&self, actor: Option<&Actor>, resource: &str, action: &str) -> bool {
        match parse_key(resource, action) {
            Some((resource, action)) => self.can(actor, resource, action),
            None => {
                tracing::debug!(resource, action, "unknown permission key");
                false
            }
        }
    }
}

/// Default evaluator over the role's permission matrix.
///
/// Evaluation order for a record:
/// 1. no actor or no role -> deny
/// 2. record outside the role's project scope -> deny
/// 3. `Allowed` -> allow
/// 4. `OwnOnly` -> allow iff the resource's ownership field is the actor
/// 5. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn owns(actor: &Actor, resource: Resource, record: &dyn ScopedRecord) -> bool {
        ownership_field(resource)
            .and_then(|field| record.owner(field))
            .is_some_and(|owner| owner == actor.member_id)
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn can(&self, actor: Option<&Actor>, resource: Resource, action: Action) -> bool {
        let Some(actor) = actor else {
            tracing::debug!(%resource, %action, "no actor, permission denied");
            return false;
        };

        let grant = actor.permission(resource, action);
        let allowed = grant.is_granted();
        tracing::debug!(
            member_id = %actor.member_id,
            %resource,
            %action,
            grant = ?grant,
            allowed,
            "permission check"
        );
        allowed
    }

    fn can_on_record(
        &self,
        actor: Option<&Actor>,
        resource: Resource,
        action: Action,
        record: &dyn ScopedRecord,
    ) -> bool {
        let Some(actor) = actor else {
            return false;
        };

        if !scope::admits(Some(actor), record.project_ids()) {
            tracing::debug!(
                member_id = %actor.member_id,
                %resource,
                %action,
                "record outside project scope"
            );
            return false;
        }

        match actor.permission(resource, action) {
            PermissionValue::Allowed => true,
            PermissionValue::OwnOnly => {
                let owns = Self::owns(actor, resource, record);
                tracing::debug!(
                    member_id = %actor.member_id,
                    %resource,
                    %action,
                    owns,
                    "own-only check"
                );
                owns
            }
            PermissionValue::Denied => false,
        }
    }
}

/// Keeps the records the actor may `view`, applying scope and ownership.
pub fn filter_visible<E, T>(
    evaluator: &E,
    actor: Option<&Actor>,
    resource: Resource,
    records: Vec<T>,
) -> Vec<T>
where
    E: PolicyEvaluator + ?Sized,
    T: ScopedRecord,
{
    records
        .into_iter()
        .filter(|record| evaluator.can_on_record(actor, resource, Action::View, record))
        .collect()
}
