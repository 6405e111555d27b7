use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::errors::ValidationError;

/// Areas of the application a role can be granted access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Dashboard,
    Projects,
    Tickets,
    Team,
    Crm,
    Quotes,
    Features,
    Feedback,
    Emails,
    Settings,
    Financials,
    Expenses,
    Forms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    ManageOrg,
    ManageUsers,
    ManageRoles,
}

const CRUD: &[Action] = &[Action::View, Action::Create, Action::Edit, Action::Delete];
const SETTINGS: &[Action] = &[
    Action::View,
    Action::ManageOrg,
    Action::ManageUsers,
    Action::ManageRoles,
];
const VIEW_ONLY: &[Action] = &[Action::View];

impl Resource {
    pub const ALL: [Resource; 13] = [
        Resource::Dashboard,
        Resource::Projects,
        Resource::Tickets,
        Resource::Team,
        Resource::Crm,
        Resource::Quotes,
        Resource::Features,
        Resource::Feedback,
        Resource::Emails,
        Resource::Settings,
        Resource::Financials,
        Resource::Expenses,
        Resource::Forms,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Dashboard => "dashboard",
            Resource::Projects => "projects",
            Resource::Tickets => "tickets",
            Resource::Team => "team",
            Resource::Crm => "crm",
            Resource::Quotes => "quotes",
            Resource::Features => "features",
            Resource::Feedback => "feedback",
            Resource::Emails => "emails",
            Resource::Settings => "settings",
            Resource::Financials => "financials",
            Resource::Expenses => "expenses",
            Resource::Forms => "forms",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    /// The actions this resource exposes in the permission schema.
    pub fn actions(self) -> &'static [Action] {
        match self {
            Resource::Dashboard => VIEW_ONLY,
            Resource::Settings => SETTINGS,
            _ => CRUD,
        }
    }

    pub fn supports(self, action: Action) -> bool {
        self.actions().contains(&action)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::View,
        Action::Create,
        Action::Edit,
        Action::Delete,
        Action::ManageOrg,
        Action::ManageUsers,
        Action::ManageRoles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::ManageOrg => "manage_org",
            Action::ManageUsers => "manage_users",
            Action::ManageRoles => "manage_roles",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }

    pub fn is_mutating(self) -> bool {
        self != Action::View
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a `resource.action` pair coming from a string boundary.
///
/// Pairs outside the schema (including valid names combined wrongly, such as
/// `dashboard.delete`) yield `None`.
pub fn parse_key(resource: &str, action: &str) -> Option<(Resource, Action)> {
    let resource = Resource::parse(resource)?;
    let action = Action::parse(action).filter(|a| resource.supports(*a))?;
    Some((resource, action))
}

/// Tri-state grant for one resource/action pair.
///
/// Stored as `false`, `true` or `"own"` in role JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionValue {
    #[default]
    Denied,
    Allowed,
    OwnOnly,
}

impl PermissionValue {
    /// True for `Allowed` and `OwnOnly`.
    pub fn is_granted(self) -> bool {
        !matches!(self, PermissionValue::Denied)
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(PermissionValue::Allowed),
            Value::Bool(false) => Some(PermissionValue::Denied),
            Value::String(s) if s == "own" => Some(PermissionValue::OwnOnly),
            _ => None,
        }
    }

    pub fn to_json(self) -> Value {
        match self {
            PermissionValue::Denied => Value::Bool(false),
            PermissionValue::Allowed => Value::Bool(true),
            PermissionValue::OwnOnly => Value::String("own".to_string()),
        }
    }
}

impl Serialize for PermissionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PermissionValue::Denied => serializer.serialize_bool(false),
            PermissionValue::Allowed => serializer.serialize_bool(true),
            PermissionValue::OwnOnly => serializer.serialize_str("own"),
        }
    }
}

impl<'de> Deserialize<'de> for PermissionValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        PermissionValue::from_json(&raw)
            .ok_or_else(|| D::Error::custom("expected true, false or \"own\""))
    }
}

/// A role's capability grid: resource -> action -> permission value.
///
/// A matrix obtained through [`PermissionMatrix::from_json`] or one of the
/// constructors always covers the full schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionMatrix(BTreeMap<Resource, BTreeMap<Action, PermissionValue>>);

impl PermissionMatrix {
    /// Builds a complete matrix by asking `grant` for every schema pair.
    pub fn from_fn(mut grant: impl FnMut(Resource, Action) -> PermissionValue) -> Self {
        let grid = Resource::ALL
            .into_iter()
            .map(|resource| {
                let row = resource
                    .actions()
                    .iter()
                    .map(|action| (*action, grant(resource, *action)))
                    .collect();
                (resource, row)
            })
            .collect();
        Self(grid)
    }

    /// The all-`Denied` matrix used for unresolved or role-less actors.
    pub fn default_matrix() -> Self {
        Self::from_fn(|_, _| PermissionValue::Denied)
    }

    pub fn full() -> Self {
        Self::from_fn(|_, _| PermissionValue::Allowed)
    }

    /// Strictly parses role JSON as stored by the backend.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let resources = value.as_object().ok_or_else(|| ValidationError::InvalidValue {
            key: "permissions".to_string(),
        })?;

        let mut grid = BTreeMap::new();
        for (resource_key, actions) in resources {
            let resource = Resource::parse(resource_key)
                .ok_or_else(|| ValidationError::UnknownKey(resource_key.clone()))?;
            let actions = actions.as_object().ok_or_else(|| ValidationError::InvalidValue {
                key: resource_key.clone(),
            })?;

            let mut row = BTreeMap::new();
            for (action_key, raw) in actions {
                let action = Action::parse(action_key)
                    .filter(|a| resource.supports(*a))
                    .ok_or_else(|| {
                        ValidationError::UnknownKey(format!("{resource_key}.{action_key}"))
                    })?;
                let grant = PermissionValue::from_json(raw).ok_or_else(|| {
                    ValidationError::InvalidValue {
                        key: format!("{resource_key}.{action_key}"),
                    }
                })?;
                row.insert(action, grant);
            }
            grid.insert(resource, row);
        }

        let matrix = Self(grid);
        validate(&matrix)?;
        Ok(matrix)
    }

    pub fn to_json(&self) -> Value {
        let map = self
            .0
            .iter()
            .map(|(resource, row)| {
                let actions = row
                    .iter()
                    .map(|(action, grant)| (action.as_str().to_string(), grant.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                (resource.as_str().to_string(), Value::Object(actions))
            })
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }

    /// Looks up a grant. Pairs outside the schema are always `Denied`.
    pub fn get(&self, resource: Resource, action: Action) -> PermissionValue {
        if !resource.supports(action) {
            return PermissionValue::Denied;
        }
        self.0
            .get(&resource)
            .and_then(|row| row.get(&action))
            .copied()
            .unwrap_or_default()
    }

    /// Sets a grant. Pairs outside the schema are ignored.
    pub fn set(&mut self, resource: Resource, action: Action, grant: PermissionValue) {
        if resource.supports(action) {
            self.0.entry(resource).or_default().insert(action, grant);
        }
    }

    pub fn with(mut self, resource: Resource, action: Action, grant: PermissionValue) -> Self {
        self.set(resource, action, grant);
        self
    }

    /// Overwrites every grant with the template's.
    pub fn apply_template(&mut self, template: &PermissionMatrix) {
        self.0 = template.0.clone();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resource, Action, PermissionValue)> + '_ {
        self.0
            .iter()
            .flat_map(|(resource, row)| row.iter().map(move |(a, g)| (*resource, *a, *g)))
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::default_matrix()
    }
}

impl<'de> Deserialize<'de> for PermissionMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        PermissionMatrix::from_json(&raw).map_err(D::Error::custom)
    }
}

/// Checks that a matrix covers exactly the fixed schema.
pub fn validate(matrix: &PermissionMatrix) -> Result<(), ValidationError> {
    for resource in Resource::ALL {
        let row = matrix
            .0
            .get(&resource)
            .ok_or(ValidationError::MissingResource(resource))?;

        for action in resource.actions() {
            if !row.contains_key(action) {
                return Err(ValidationError::MissingAction {
                    resource,
                    action: *action,
                });
            }
        }

        if let Some(extra) = row.keys().find(|a| !resource.supports(**a)) {
            return Err(ValidationError::UnknownKey(format!("{resource}.{extra}")));
        }
    }
    Ok(())
}

/// Applying a template is a full overwrite, never a deep merge.
pub fn merge_template(base: PermissionMatrix, template: &PermissionMatrix) -> PermissionMatrix {
    let mut merged = base;
    merged.apply_template(template);
    merged
}
