/// Authorization policy
///
/// Every ownership/role decision in the service goes through `authorize` or
/// `listing_scope`; handlers never re-derive the rules. A denial is always
/// an explicit `Forbidden`, never a silently filtered result.
use crate::error::{AppError, AppResult};
use crate::token::Claims;
use serde::{Deserialize, Serialize};

/// Account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
    SecondaryUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::SecondaryUser => "secondary_user",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "secondary_user" => Ok(Role::SecondaryUser),
            _ => Err(AppError::InvalidRole(s.to_string())),
        }
    }
}

/// Account access levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
    Limited,
    ViewOnly,
}

impl AccessLevel {
    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "full" => Ok(AccessLevel::Full),
            "limited" => Ok(AccessLevel::Limited),
            "view_only" => Ok(AccessLevel::ViewOnly),
            _ => Err(AppError::Validation(format!("Invalid access level: {}", s))),
        }
    }
}

/// What the requester wants to do with the target resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewAccount,
    ManageAccount,
    ManageDevice,
}

/// The owner of the resource being acted on
#[derive(Debug, Clone, Copy)]
pub struct ResourceOwner {
    pub id: i64,
    pub role: Role,
}

/// Visibility scope for account listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingScope {
    /// Admin: every account except admins
    AllNonAdmin,
    /// Everyone else: secondary users only
    SecondaryOnly,
}

/// Decide whether `claims` may exercise `capability` on a resource owned by
/// `target`.
pub fn authorize(claims: &Claims, target: ResourceOwner, capability: Capability) -> AppResult<()> {
    match claims.role {
        Role::Admin => {
            // Admins manage everything except other admins' accounts
            if capability == Capability::ManageAccount
                && target.role == Role::Admin
                && target.id != claims.sub
            {
                return Err(AppError::Forbidden(
                    "Admins cannot manage other admin accounts".to_string(),
                ));
            }
            Ok(())
        }
        Role::User | Role::SecondaryUser => {
            if claims.sub == target.id {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "You can only act on your own resources".to_string(),
                ))
            }
        }
    }
}

/// Which accounts a listing request may see
pub fn listing_scope(claims: &Claims) -> ListingScope {
    match claims.role {
        Role::Admin => ListingScope::AllNonAdmin,
        Role::User | Role::SecondaryUser => ListingScope::SecondaryOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: i64, role: Role) -> Claims {
        Claims {
            sub,
            email: format!("u{}@example.com", sub),
            role,
            access_level: AccessLevel::Limited,
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn admin_may_act_on_non_admin_accounts() {
        let admin = claims(1, Role::Admin);
        let target = ResourceOwner {
            id: 2,
            role: Role::User,
        };

        assert!(authorize(&admin, target, Capability::ViewAccount).is_ok());
        assert!(authorize(&admin, target, Capability::ManageAccount).is_ok());
        assert!(authorize(&admin, target, Capability::ManageDevice).is_ok());
    }

    #[test]
    fn admin_may_not_manage_other_admins() {
        let admin = claims(1, Role::Admin);
        let other_admin = ResourceOwner {
            id: 2,
            role: Role::Admin,
        };

        assert!(matches!(
            authorize(&admin, other_admin, Capability::ManageAccount),
            Err(AppError::Forbidden(_))
        ));
        // Viewing is still allowed
        assert!(authorize(&admin, other_admin, Capability::ViewAccount).is_ok());
    }

    #[test]
    fn admin_may_manage_self() {
        let admin = claims(1, Role::Admin);
        let own = ResourceOwner {
            id: 1,
            role: Role::Admin,
        };

        assert!(authorize(&admin, own, Capability::ManageAccount).is_ok());
    }

    #[test]
    fn user_may_only_act_on_own_resources() {
        let user = claims(5, Role::User);
        let own = ResourceOwner {
            id: 5,
            role: Role::User,
        };
        let other = ResourceOwner {
            id: 6,
            role: Role::User,
        };

        assert!(authorize(&user, own, Capability::ManageDevice).is_ok());
        assert!(matches!(
            authorize(&user, other, Capability::ViewAccount),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn secondary_user_follows_ownership_rule() {
        let secondary = claims(9, Role::SecondaryUser);
        let other = ResourceOwner {
            id: 3,
            role: Role::SecondaryUser,
        };

        assert!(matches!(
            authorize(&secondary, other, Capability::ManageAccount),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn listing_scopes_by_role() {
        assert_eq!(
            listing_scope(&claims(1, Role::Admin)),
            ListingScope::AllNonAdmin
        );
        assert_eq!(
            listing_scope(&claims(2, Role::User)),
            ListingScope::SecondaryOnly
        );
        assert_eq!(
            listing_scope(&claims(3, Role::SecondaryUser)),
            ListingScope::SecondaryOnly
        );
    }
}
