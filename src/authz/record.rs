use super::{MemberId, ProjectId};

/// The column that identifies a record's owner for `OwnOnly` grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipField {
    AssigneeId,
    CreatedBy,
    OwnerId,
    MemberId,
}

impl OwnershipField {
    pub fn column(self) -> &'static str {
        match self {
            OwnershipField::AssigneeId => "assignee_id",
            OwnershipField::CreatedBy => "created_by",
            OwnershipField::OwnerId => "owner_id",
            OwnershipField::MemberId => "member_id",
        }
    }
}

/// A record the evaluator can decide on.
///
/// Implementors only need to answer for the ownership fields they actually
/// carry; anything else returns `None`, which never matches an actor.
pub trait ScopedRecord {
    fn owner(&self, field: OwnershipField) -> Option<MemberId>;

    /// Projects this record belongs to. Empty means org-wide.
    fn project_ids(&self) -> &[ProjectId] {
        &[]
    }
}

impl<T: ScopedRecord + ?Sized> ScopedRecord for &T {
    fn owner(&self, field: OwnershipField) -> Option<MemberId> {
        (**self).owner(field)
    }

    fn project_ids(&self) -> &[ProjectId] {
        (**self).project_ids()
    }
}
