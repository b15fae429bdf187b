use crate::{
    Account,
    CallError,
    contracts::FactoryReader,
};
use std::fmt;
use tracing::warn;

/// Authorization tier of the connected account with respect to the factory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    #[default]
    Guest,
    User,
    SuperAdmin,
    Creator,
}

impl Role {
    pub fn is_factory_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Creator)
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::SuperAdmin => "superadmin",
            Role::Creator => "creator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derives the role of `account`. No account means `Guest` and no remote calls.
/// A failed read for a connected account yields `User`.
pub async fn resolve_role<F>(account: Option<&Account>, factory: &F) -> Role
where
    F: FactoryReader + Sync,
{
    let Some(account) = account else {
        return Role::Guest;
    };
    let (creator, super_admins) = tokio::join!(factory.creator(), factory.super_admins());
    match classify(account, creator, super_admins) {
        Ok(role) => role,
        Err(err) => {
            warn!(%account, ?err, "role resolution failed; treating account as user");
            Role::User
        }
    }
}

fn classify(
    account: &Account,
    creator: Result<Account, CallError>,
    super_admins: Result<Vec<Account>, CallError>,
) -> Result<Role, CallError> {
    let creator = creator?;
    let super_admins = super_admins?;
    if *account == creator {
        return Ok(Role::Creator);
    }
    if super_admins.contains(account) {
        return Ok(Role::SuperAdmin);
    }
    Ok(Role::User)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::fakes::FakeChain;
    use proptest::prelude::*;

    fn account(byte: u8) -> Account {
        Account::from_bytes([byte; 20])
    }

    #[tokio::test]
    async fn resolve_role__no_account__is_guest_without_remote_calls() {
        // given
        let chain = FakeChain::new(account(1));
        chain.set_factory_down(true);

        // when
        let role = resolve_role(None, &chain.factory()).await;

        // then
        assert_eq!(role, Role::Guest);
        assert_eq!(chain.factory_reads(), 0);
    }

    #[tokio::test]
    async fn resolve_role__creator_also_super_admin__is_creator() {
        // given
        let chain = FakeChain::new(account(1));
        chain.add_super_admin(account(1));

        // when
        let role = resolve_role(Some(&account(1)), &chain.factory()).await;

        // then
        assert_eq!(role, Role::Creator);
    }

    #[tokio::test]
    async fn resolve_role__listed_super_admin__is_superadmin() {
        let chain = FakeChain::new(account(1));
        chain.add_super_admin(account(2));

        let role = resolve_role(Some(&account(2)), &chain.factory()).await;

        assert_eq!(role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn resolve_role__unlisted_account__is_user() {
        let chain = FakeChain::new(account(1));
        chain.add_super_admin(account(2));

        let role = resolve_role(Some(&account(3)), &chain.factory()).await;

        assert_eq!(role, Role::User);
    }

    #[tokio::test]
    async fn resolve_role__factory_unreachable__falls_back_to_user() {
        // given
        let chain = FakeChain::new(account(1));
        chain.set_factory_down(true);

        // when
        let role = resolve_role(Some(&account(1)), &chain.factory()).await;

        // then
        assert_eq!(role, Role::User);
    }

    #[test]
    fn classify__super_admin_read_fails__never_elevates() {
        let role = classify(
            &account(1),
            Ok(account(1)),
            Err(CallError::Transport("timeout".to_string())),
        );
        assert!(role.is_err());
    }

    proptest! {
        #[test]
        fn classify__matches_precedence_rules(
            me in 0u8..4,
            creator in 0u8..4,
            admins in prop::collection::vec(0u8..4, 0..4),
        ) {
            let admins: Vec<_> = admins.into_iter().map(account).collect();
            let role = classify(&account(me), Ok(account(creator)), Ok(admins.clone())).unwrap();
            let expected = if me == creator {
                Role::Creator
            } else if admins.contains(&account(me)) {
                Role::SuperAdmin
            } else {
                Role::User
            };
            prop_assert_eq!(role, expected);
        }
    }
}
