use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{TrainingError, TrainingResult};

/// The role of whoever issues a command, as resolved by the session layer.
/// The core attaches no meaning to it beyond the permission matrix.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub struct ActorRole(String);

impl ActorRole {
    pub fn new(role: impl AsRef<str>) -> Self {
        ActorRole(role.as_ref().trim().to_lowercase())
    }

    pub fn administrator() -> Self {
        ActorRole::new(ADMINISTRATOR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActorRole {
    fn from(role: String) -> Self {
        ActorRole::new(role)
    }
}

impl From<ActorRole> for String {
    fn from(role: ActorRole) -> Self {
        role.0
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const ADMINISTRATOR: &str = "administrator";

/// Commands that need a permission.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CreateEvent,
    UpdateEvent,
    TransitionEvent,
    DeleteEvent,
    SyncStatuses,
    Register,
    Withdraw,
    CheckIn,
    MarkAbsent,
    IssueToken,
}

impl Permission {
    pub const ALL: [Permission; 10] = [
        Permission::CreateEvent,
        Permission::UpdateEvent,
        Permission::TransitionEvent,
        Permission::DeleteEvent,
        Permission::SyncStatuses,
        Permission::Register,
        Permission::Withdraw,
        Permission::CheckIn,
        Permission::MarkAbsent,
        Permission::IssueToken,
    ];

    fn action(self) -> &'static str {
        match self {
            Permission::CreateEvent => "create events",
            Permission::UpdateEvent => "update events",
            Permission::TransitionEvent => "change event status",
            Permission::DeleteEvent => "delete events",
            Permission::SyncStatuses => "synchronize event statuses",
            Permission::Register => "register attendees",
            Permission::Withdraw => "withdraw attendees",
            Permission::CheckIn => "check in attendees",
            Permission::MarkAbsent => "mark attendees absent",
            Permission::IssueToken => "issue check-in tokens",
        }
    }
}

/// Which roles may issue which commands.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(from = "HashMap<String, BTreeSet<Permission>>")]
pub struct PermissionMatrix {
    grants: HashMap<ActorRole, BTreeSet<Permission>>,
}

impl PermissionMatrix {
    /// A matrix granting nothing to anyone.
    pub fn empty() -> Self {
        PermissionMatrix {
            grants: HashMap::new(),
        }
    }

    pub fn grant(mut self, role: ActorRole, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.grants.entry(role).or_default().extend(permissions);
        self
    }

    pub fn allows(&self, role: &ActorRole, permission: Permission) -> bool {
        self.grants
            .get(role)
            .map_or(false, |granted| granted.contains(&permission))
    }

    pub fn authorize(&self, role: &ActorRole, permission: Permission) -> TrainingResult<()> {
        if self.allows(role, permission) {
            Ok(())
        } else {
            Err(TrainingError::Forbidden {
                role: role.to_string(),
                action: permission.action().to_owned(),
            })
        }
    }
}

impl Default for PermissionMatrix {
    /// Administrators may do everything.
    fn default() -> Self {
        PermissionMatrix::empty().grant(ActorRole::administrator(), Permission::ALL.iter().copied())
    }
}

impl From<HashMap<String, BTreeSet<Permission>>> for PermissionMatrix {
    fn from(raw: HashMap<String, BTreeSet<Permission>>) -> Self {
        raw.into_iter()
            .fold(PermissionMatrix::empty(), |matrix, (role, permissions)| {
                matrix.grant(ActorRole::new(role), permissions)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrators_may_do_everything_by_default() {
        let matrix = PermissionMatrix::default();

        for permission in Permission::ALL.iter() {
            assert!(matrix.allows(&ActorRole::new(" Administrator "), *permission));
        }
        assert!(!matrix.allows(&ActorRole::new("officer"), Permission::Register));
    }

    #[test]
    fn roles_read_from_json_are_normalized() {
        let role: ActorRole = serde_json::from_str(r#"" Administrator ""#).expect("parse role");

        assert_eq!(role, ActorRole::administrator());
        assert!(PermissionMatrix::default().allows(&role, Permission::CreateEvent));
        assert_eq!(serde_json::to_string(&role).expect("serialize role"), r#""administrator""#);
    }

    #[test]
    fn matrix_parses_from_json() {
        let matrix: PermissionMatrix = serde_json::from_str(
            r#"{"facilitator": ["check_in", "mark_absent", "issue_token"], "Officer": []}"#,
        )
        .expect("parse matrix");

        let facilitator = ActorRole::new("facilitator");
        assert!(matrix.allows(&facilitator, Permission::CheckIn));
        assert!(!matrix.allows(&facilitator, Permission::CreateEvent));
        assert!(!matrix.allows(&ActorRole::administrator(), Permission::CreateEvent));

        match matrix.authorize(&ActorRole::new("officer"), Permission::DeleteEvent) {
            Err(TrainingError::Forbidden { role, action }) => {
                assert_eq!(role, "officer");
                assert_eq!(action, "delete events");
            }
            other => panic!("expected forbidden, got {:?}", other),
        }
    }
}
