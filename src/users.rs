//! Internal user domain consumed by the gateway.
//!
//! The gateway never owns user persistence. It only needs validated value
//! types and a [`UserService`] to resolve a provider identity into a [`User`].

use std::future::Future;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use uuid::{Uuid, Version};

use crate::error::{BoxError, Error};

const MIN_USERNAME_LEN: usize = 4;

/// Internal user identifier. Guaranteed to be a UUID v4 by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(Uuid);

impl UserId {
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::try_parse(s).map_err(|e| Error::validation("user id", e.to_string()))?;
        if uuid.get_version() != Some(Version::Random) {
            return Err(Error::validation("user id", "must be a UUID v4"));
        }
        Ok(Self(uuid))
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.to_string()
    }
}

/// Username of at least four characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.chars().count() < MIN_USERNAME_LEN {
            return Err(Error::validation(
                "username",
                format!("must be at least {MIN_USERNAME_LEN} characters"),
            ));
        }
        Ok(Self(s))
    }
}

impl From<Username> for String {
    fn from(u: Username) -> Self {
        u.0
    }
}

/// Syntactically valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Email {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if !EmailAddress::is_valid(&s) {
            return Err(Error::validation("email", format!("{s:?} is not a valid address")));
        }
        Ok(Self(s))
    }
}

impl From<Email> for String {
    fn from(e: Email) -> Self {
        e.0
    }
}

/// Internal user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<Username>,
}

/// Unvalidated user row as it comes out of storage.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// Validate a storage row into a `User`. Every field is re-checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first field that fails.
    pub fn from_record(record: UserRecord) -> Result<Self, Error> {
        Ok(Self {
            id: record.id.try_into()?,
            email: record.email.try_into()?,
            username: record.username.map(Username::try_from).transpose()?,
        })
    }
}

/// Partial data for [`UserService::create_user`]. The service assigns the id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUser {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Projection selector for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Id,
    Email,
    Username,
}

impl UserField {
    pub const ALL: [UserField; 3] = [UserField::Id, UserField::Email, UserField::Username];
}

/// Consumer-provided user persistence.
///
/// `id` and `email` are always populated; `fields` decides whether optional
/// fields such as `username` are loaded.
pub trait UserService: Send + Sync + 'static {
    fn find_by_email(
        &self,
        email: &Email,
        fields: &[UserField],
    ) -> impl Future<Output = Result<Option<User>, BoxError>> + Send;

    fn find_by_id(&self, id: &UserId) -> impl Future<Output = Result<Option<User>, BoxError>> + Send;

    /// Create a user from partial data. A fresh [`UserId`] is generated.
    ///
    /// Emails are unique, compared case-insensitively. Creating with an email
    /// that is already taken returns the existing user, so racing first
    /// logins converge on one record.
    fn create_user(&self, data: CreateUser) -> impl Future<Output = Result<User, BoxError>> + Send;
}

/// Process-local [`UserService`], for tests and single-node demos.
#[derive(Debug, Default)]
pub struct InMemoryUserService {
    users: DashMap<UserId, User>,
    // lowercased email -> id
    by_email: DashMap<String, UserId>,
}

impl InMemoryUserService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn email_key(email: &Email) -> String {
    email.as_str().to_ascii_lowercase()
}

fn project(user: &User, fields: &[UserField]) -> User {
    let mut user = user.clone();
    if !fields.contains(&UserField::Username) {
        user.username = None;
    }
    user
}

impl UserService for InMemoryUserService {
    async fn find_by_email(
        &self,
        email: &Email,
        fields: &[UserField],
    ) -> Result<Option<User>, BoxError> {
        let Some(id) = self
            .by_email
            .get(&email_key(email))
            .map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|entry| project(entry.value(), fields)))
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, BoxError> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }

    async fn create_user(&self, data: CreateUser) -> Result<User, BoxError> {
        let email = data
            .email
            .ok_or_else(|| Error::validation("email", "is required"))?;
        let email: Email = email.try_into()?;
        let username = data.username.map(Username::try_from).transpose()?;

        // The index entry stays locked until the user is stored.
        match self.by_email.entry(email_key(&email)) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                self.users
                    .get(&id)
                    .map(|user| user.value().clone())
                    .ok_or_else(|| Error::Store(format!("email index points at missing user {id}")).into())
            }
            Entry::Vacant(entry) => {
                let user = User {
                    id: UserId::new_v4(),
                    email,
                    username,
                };
                self.users.insert(user.id, user.clone());
                entry.insert(user.id);
                Ok(user)
            }
        }
    }
}
