use crate::{
    Result,
    VotingError,
};
use alloy::primitives::Address;
use std::{
    fmt,
    str::FromStr,
};

const ADDRESS_LEN: usize = 20;

/// A 20-byte account or contract address.
///
/// Identity is the raw bytes, so two spellings that differ only in hex case are the
/// same account. Displayed in canonical lowercase form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account(Address);

impl Account {
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(Address::from(bytes))
    }

    pub fn address(&self) -> Address {
        self.0
    }

    /// Parses `0x`-prefixed hex in any letter case.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| {
                VotingError::invalid_input(format!(
                    "address '{trimmed}' must start with 0x"
                ))
            })?;
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(VotingError::invalid_input(format!(
                "address '{trimmed}' must have {} hex digits",
                ADDRESS_LEN * 2
            )));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes).map_err(|e| {
            VotingError::invalid_input(format!("address '{trimmed}' is not hex: {e}"))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn canonical(&self) -> String {
        format!("0x{}", hex::encode(self.0.as_slice()))
    }

    /// `0x1234…abcd`, for narrow table columns.
    pub fn short(&self) -> String {
        let full = self.canonical();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Address::ZERO
    }
}

impl FromStr for Account {
    type Err = VotingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<Address> for Account {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<Account> for Address {
    fn from(account: Account) -> Self {
        account.0
    }
}

/// True when `account` is present and equal to `other`.
pub fn same_account(account: Option<&Account>, other: &Account) -> bool {
    account.is_some_and(|a| a == other)
}
