#![forbid(unsafe_code)]

//! Static role policy (§4.1): `(role, action) -> allow`, evaluated by
//! union over the caller's role set. An unknown role contributes no
//! grants rather than erroring, per spec ("unknown role = deny").

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ManageResources,
    CreateReservation,
    CancelAnyReservation,
    CancelOwnReservation,
    JoinWaitlist,
    ManageWebhooks,
    ViewAnyReservation,
}

/// Grants held by a single named role. `guest` holds none of these, by
/// omission from every match arm below.
fn role_grants(role: &str, action: Action) -> bool {
    match (role, action) {
        ("admin", _) => true,
        ("user", Action::CreateReservation) => true,
        ("user", Action::CancelOwnReservation) => true,
        ("user", Action::JoinWaitlist) => true,
        _ => false,
    }
}

pub fn is_allowed(roles: &[String], action: Action) -> bool {
    roles.iter().any(|r| role_grants(r, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_manage_resources_user_cannot() {
        assert!(is_allowed(&["admin".to_string()], Action::ManageResources));
        assert!(!is_allowed(&["user".to_string()], Action::ManageResources));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(!is_allowed(&["bogus".to_string()], Action::CreateReservation));
    }

    #[test]
    fn union_over_role_set() {
        let roles = vec!["guest".to_string(), "user".to_string()];
        assert!(is_allowed(&roles, Action::CreateReservation));
        assert!(!is_allowed(&roles, Action::ManageResources));
    }
}
