//! Page tokens and the view they resolve to.

use std::{
    fmt,
    str::FromStr,
};
use voting_client::Account;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Page {
    #[default]
    Landing,
    Create,
    MyRooms,
    Join,
    RoomDetail,
    RoomInteract,
    RoomMembers,
    AdminPanel,
    Home,
}

impl Page {
    pub const ALL: [Page; 9] = [
        Page::Landing,
        Page::Create,
        Page::MyRooms,
        Page::Join,
        Page::RoomDetail,
        Page::RoomInteract,
        Page::RoomMembers,
        Page::AdminPanel,
        Page::Home,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Page::Landing => "landing",
            Page::Create => "create",
            Page::MyRooms => "my-rooms",
            Page::Join => "join",
            Page::RoomDetail => "room-detail",
            Page::RoomInteract => "room-interact",
            Page::RoomMembers => "room-members",
            Page::AdminPanel => "admin-panel",
            Page::Home => "home",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Landing => "Welcome",
            Page::Create => "Create Room",
            Page::MyRooms => "My Rooms",
            Page::Join => "Join Room",
            Page::RoomDetail => "Room Administration",
            Page::RoomInteract => "Vote",
            Page::RoomMembers => "Room Members",
            Page::AdminPanel => "Factory Administration",
            Page::Home => "All Rooms",
        }
    }

    pub fn is_room_page(self) -> bool {
        matches!(
            self,
            Page::RoomDetail | Page::RoomInteract | Page::RoomMembers
        )
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Page::ALL
            .into_iter()
            .find(|page| page.token() == s)
            .ok_or_else(|| format!("unknown page '{s}'"))
    }
}

/// What gets rendered. Room views carry the room they show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Landing,
    Create,
    MyRooms,
    Join,
    RoomDetail(Account),
    RoomInteract(Account),
    RoomMembers(Account),
    AdminPanel,
    Home,
}

impl View {
    pub fn room(self) -> Option<Account> {
        match self {
            View::RoomDetail(room) | View::RoomInteract(room) | View::RoomMembers(room) => {
                Some(room)
            }
            _ => None,
        }
    }
}

/// Navigation state. Every navigation mounts a new view and bumps the epoch; results
/// requested under an older epoch belong to a view that is gone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Router {
    page: Page,
    active_room: Option<Account>,
    return_page: Page,
    epoch: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn active_room(&self) -> Option<Account> {
        self.active_room
    }

    pub fn return_page(&self) -> Page {
        self.return_page
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Room pages without an active room resolve to nothing rather than an error.
    pub fn route(&self) -> Option<View> {
        let view = match self.page {
            Page::Landing => View::Landing,
            Page::Create => View::Create,
            Page::MyRooms => View::MyRooms,
            Page::Join => View::Join,
            Page::AdminPanel => View::AdminPanel,
            Page::Home => View::Home,
            Page::RoomDetail => View::RoomDetail(self.active_room?),
            Page::RoomInteract => View::RoomInteract(self.active_room?),
            Page::RoomMembers => View::RoomMembers(self.active_room?),
        };
        Some(view)
    }

    pub fn navigate(&mut self, page: Page) -> u64 {
        if !self.page.is_room_page() && page.is_room_page() {
            self.return_page = self.page;
        }
        self.page = page;
        self.mount()
    }

    /// Opens `page` for `room`. Moving between room pages keeps the page the room
    /// was first opened from.
    pub fn open_room(&mut self, page: Page, room: Account) -> u64 {
        self.active_room = Some(room);
        self.navigate(page)
    }

    pub fn back(&mut self) -> u64 {
        let target = if self.page.is_room_page() {
            self.return_page
        } else {
            Page::Landing
        };
        self.page = target;
        self.mount()
    }

    /// Re-mounts the current view, e.g. after the session changed.
    pub fn remount(&mut self) -> u64 {
        self.mount()
    }

    fn mount(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    fn room(byte: u8) -> Account {
        Account::from_bytes([byte; 20])
    }

    #[test]
    fn route__room_page_without_active_room__renders_nothing() {
        for page in [Page::RoomDetail, Page::RoomInteract, Page::RoomMembers] {
            let mut router = Router::new();
            router.navigate(page);
            assert_eq!(router.route(), None, "{page}");
        }
    }

    #[test]
    fn route__non_room_pages__always_resolve() {
        let mut router = Router::new();
        for page in Page::ALL.into_iter().filter(|p| !p.is_room_page()) {
            router.navigate(page);
            assert!(router.route().is_some(), "{page}");
        }
    }

    #[test]
    fn open_room__from_listing__back_returns_to_listing() {
        // given
        let mut router = Router::new();
        router.navigate(Page::MyRooms);

        // when
        router.open_room(Page::RoomInteract, room(7));
        router.navigate(Page::RoomMembers);
        router.back();

        // then
        assert_eq!(router.page(), Page::MyRooms);
    }

    #[test]
    fn open_room__sets_active_room_for_every_room_view() {
        let mut router = Router::new();
        router.navigate(Page::Join);

        router.open_room(Page::RoomInteract, room(3));

        assert_eq!(router.route(), Some(View::RoomInteract(room(3))));
        assert_eq!(router.return_page(), Page::Join);
        router.navigate(Page::RoomDetail);
        assert_eq!(router.route(), Some(View::RoomDetail(room(3))));
    }

    #[test]
    fn navigate__bumps_epoch__older_results_are_stale() {
        let mut router = Router::new();
        let first = router.navigate(Page::Home);

        let second = router.navigate(Page::Home);

        assert!(!router.is_current(first));
        assert!(router.is_current(second));
    }

    #[test]
    fn from_str__round_trips_every_token() {
        for page in Page::ALL {
            assert_eq!(page.token().parse::<Page>(), Ok(page));
        }
        assert!("lobby".parse::<Page>().is_err());
    }

    proptest! {
        #[test]
        fn route__room_view_carries_active_room(
            pages in prop::collection::vec(0usize..9, 1..12),
            byte in 1u8..255,
        ) {
            let mut router = Router::new();
            router.open_room(Page::RoomInteract, room(byte));
            for idx in pages {
                router.navigate(Page::ALL[idx]);
                if let Some(view) = router.route() {
                    prop_assert_eq!(view.room().is_some(), router.page().is_room_page());
                    if let Some(active) = view.room() {
                        prop_assert_eq!(active, room(byte));
                    }
                }
            }
        }
    }
}
