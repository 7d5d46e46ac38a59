//! The contact record exchanged with the repository.
//!
//! Field names serialize in camelCase, matching the form's keys, so a
//! record round-trips through [`crate::GroupNode::value`] unchanged.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stored contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub id: String,
    pub icon: Option<String>,
    pub personal: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub favorites_ranking: Option<i64>,
    pub notes: Option<String>,
    pub phones: Vec<Phone>,
    pub address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Phone {
    pub phone_number: Option<String>,
    pub phone_type: Option<PhoneType>,
    pub preferred: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneType {
    Mobile,
    Work,
    Other,
}

impl PhoneType {
    pub const OPTIONS: &'static [&'static str] = &["mobile", "work", "other"];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub address_type: Option<AddressType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Home,
    Work,
    Other,
}

impl AddressType {
    pub const OPTIONS: &'static [&'static str] = &["home", "work", "other"];
}
