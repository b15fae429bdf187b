pub mod router;
pub mod wallets;
