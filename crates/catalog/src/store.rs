use serde::{Deserialize, Serialize};

use intake_core::{Entity, ShippingProfileId, StoreId, UserId};

/// Supplier store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    /// Owning customer (the "store prime").
    pub owner_id: Option<UserId>,
    pub default_currency_code: Option<String>,
    pub detail: StoreDetail,
}

impl Entity for Store {
    type Id = StoreId;

    fn id(&self) -> StoreId {
        self.id
    }
}

/// Contact and company details of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDetail {
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

impl StoreDetail {
    /// Address fragments in display order.
    pub fn address_parts(&self) -> impl Iterator<Item = &str> {
        [&self.postal_code, &self.city, &self.address_1, &self.address_2]
            .into_iter()
            .filter_map(|part| part.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

impl Customer {
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Entity for Customer {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingProfile {
    pub id: ShippingProfileId,
    pub store_id: StoreId,
    pub name: String,
    pub is_default: bool,
}

impl Entity for ShippingProfile {
    type Id = ShippingProfileId;

    fn id(&self) -> ShippingProfileId {
        self.id
    }
}
