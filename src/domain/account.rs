use {
    super::money::Currency,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Bank account number as printed on the statement.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Destination account payments are booked against. Read-mostly reference
/// data; its currency constrains every payment it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub account_number: AccountNumber,
    pub account_name: String,
    pub currency: Currency,
}

impl Account {
    pub fn new(
        account_number: AccountNumber,
        account_name: impl Into<String>,
        currency: Currency,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_number,
            account_name: account_name.into(),
            currency,
        }
    }
}
