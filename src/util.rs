use std::str::FromStr;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ObjectIdString(#[serde(with = "object_id_string")] pub ObjectId);

impl From<ObjectId> for ObjectIdString {
    fn from(value: ObjectId) -> Self {
        Self(value)
    }
}

impl From<ObjectIdString> for ObjectId {
    fn from(value: ObjectIdString) -> Self {
        value.0
    }
}

impl std::ops::Deref for ObjectIdString {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::cmp::PartialEq for ObjectIdString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl std::cmp::Eq for ObjectIdString {}

impl std::cmp::PartialEq<ObjectId> for ObjectIdString {
    fn eq(&self, other: &ObjectId) -> bool {
        self.0 == *other
    }
}

mod object_id_string {
    use bson::oid::ObjectId;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ObjectId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Object id taken from the `:id` path segment.
///
/// A segment that is not a valid ObjectId is reported as a missing resource,
/// so malformed ids never reach the database.
#[derive(Debug, Clone, Copy)]
pub struct PathObjectId(pub ObjectId);

#[async_trait]
impl<S> FromRequestParts<S> for PathObjectId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<String>::from_request_parts(parts, state).await?;

        ObjectId::from_str(&id)
            .map(Self)
            .map_err(|_| Error::NoResource)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormattedDateTime(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

impl From<bson::DateTime> for FormattedDateTime {
    fn from(value: bson::DateTime) -> Self {
        Self(value.into())
    }
}

impl From<OffsetDateTime> for FormattedDateTime {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}

/// Calendar input that accepts either a full RFC 3339 timestamp or a bare
/// `YYYY-MM-DD` date, which is read as midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInput(pub OffsetDateTime);

impl FromStr for DateInput {
    type Err = time::error::Parse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match OffsetDateTime::parse(s, &Rfc3339) {
            Ok(it) => Ok(Self(it)),
            Err(_) => Date::parse(s, format_description!("[year]-[month]-[day]"))
                .map(|date| Self(date.midnight().assume_utc())),
        }
    }
}

impl From<DateInput> for bson::DateTime {
    fn from(value: DateInput) -> Self {
        value.0.into()
    }
}

impl<'de> Deserialize<'de> for DateInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for DateInput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        FormattedDateTime(self.0).serialize(serializer)
    }
}

pub fn verify_password(argon: &Argon2, password: &str, hashed: &str) -> bool {
    let hashed = match PasswordHash::new(hashed) {
        Ok(hashed) => hashed,
        Err(_) => return false,
    };

    argon.verify_password(password.as_bytes(), &hashed).is_ok()
}

pub fn hash_password(argon: &Argon2, password: &str) -> Result<String, Error> {
    let salt = password_hash::SaltString::generate(&mut password_hash::rand_core::OsRng);

    argon
        .hash_password(password.as_bytes(), &salt)
        .map(|it| it.to_string())
        .map_err(Into::into)
}

/// Decimal rendered as a JSON string so clients never see float rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalString(pub Decimal);

impl From<Decimal> for DecimalString {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Serialize for DecimalString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.normalize().to_string())
    }
}
