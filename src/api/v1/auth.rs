use argon2::Argon2;
use axum::{
    extract::{FromRef, FromRequestParts, State},
    headers::{authorization::Bearer, Authorization},
    http::{request::Parts, StatusCode},
    Json, RequestPartsExt, TypedHeader,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::{Error, UnauthorizedType},
    mongo_ext::Collection,
    presence::{CollectorStatus, Presence},
    util::{hash_password, verify_password, FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    collector::PresenceResponse,
    token::{decode_access_token, generate_access_token, JwtState},
};

#[derive(Clone)]
pub struct UserCollection(pub Collection<UserModel>);

impl std::ops::Deref for UserCollection {
    type Target = Collection<UserModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub collector_status: CollectorStatus,
    #[serde(default)]
    pub leave_date: Option<bson::DateTime>,
    #[serde(default)]
    pub last_unload_time: Option<bson::DateTime>,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl UserModel {
    pub fn presence(&self) -> Presence {
        Presence::new(self.collector_status, self.leave_date.map(Into::into))
    }

    pub fn last_unload_time(&self) -> Option<OffsetDateTime> {
        self.last_unload_time.map(Into::into)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Collector,
}

impl From<UserRole> for bson::Bson {
    fn from(value: UserRole) -> Self {
        let name = match value {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Collector => "collector",
        };

        bson::Bson::String(name.to_string())
    }
}

/// Caller identity taken verbatim from the bearer token.
#[derive(Debug, Clone, Copy)]
pub struct UserAccess {
    pub id: ObjectId,
    pub role: UserRole,
}

impl UserAccess {
    pub fn from_token(jwt_state: &JwtState, token: &str) -> Result<Self, Error> {
        let token = decode_access_token(jwt_state, token)
            .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidAccessToken))?;

        if token.claims.is_expired() {
            return Err(Error::Unauthorized(UnauthorizedType::InvalidAccessToken));
        }

        Ok(Self {
            id: token.claims.sub.0,
            role: token.claims.user_role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), Error> {
        if self.is_admin() {
            return Ok(());
        }

        Err(Error::Forbidden).tap_err(|_| tracing::debug!(user = ?self, "admin only"))
    }

    /// Allows the owner of `id` and admins.
    pub fn require_self_or_admin(&self, id: ObjectId) -> Result<(), Error> {
        if self.id == id || self.is_admin() {
            return Ok(());
        }

        Err(Error::Forbidden)
            .tap_err(|_| tracing::debug!(user = ?self, target = %id, "tried acting for another user"))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserAccess
where
    JwtState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(token)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidAccessToken))?;

        let jwt = JwtState::from_ref(state);

        Self::from_token(&jwt, token.token())
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 64))]
    pub password: String,

    #[serde(default)]
    pub role: Option<UserRole>,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    pub id: ObjectIdString,

    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceResponse>,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(value: UserModel) -> Self {
        let presence = match value.role {
            UserRole::Collector => Some(PresenceResponse::from(&value)),
            UserRole::User | UserRole::Admin => None,
        };

        Self {
            id: value.id.into(),
            name: value.name,
            email: value.email,
            role: value.role,
            location: value.location,

            presence,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

pub async fn create_user(
    users: UserCollection,
    argon: Argon2<'_>,
    request: RegisterRequest,
) -> Result<UserModel, Error> {
    request.validate()?;
    let count = users
        .count_documents(
            bson::doc! {
                "email": &request.email
            },
            None,
        )
        .await?;

    if count > 0 {
        return Err(Error::MustUniqueError("email".to_string()));
    }

    let model = UserModel {
        id: ObjectId::new(),
        name: request.name,
        email: request.email,
        password: hash_password(&argon, &request.password)?,
        role: request.role.unwrap_or_default(),
        location: request.location,
        collector_status: CollectorStatus::default(),
        leave_date: None,
        last_unload_time: None,
        created_at: OffsetDateTime::now_utc().into(),
        updated_at: OffsetDateTime::now_utc().into(),
    };
    users.insert_one(&model, None).await?;

    Ok(model)
}

#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn register(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    let user = create_user(users, argon, request).await?;
    tracing::debug!(id = %user.id, role = ?user.role, "registered user");

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginUser {
    pub id: ObjectIdString,
    pub name: String,
    pub role: UserRole,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub token: String,
    pub expired_at: FormattedDateTime,
    pub user: LoginUser,
}

pub async fn login(
    State(users): State<UserCollection>,
    State(jwt_state): State<JwtState>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Error> {
    let user = users
        .find_one(
            bson::doc! {
                "email": &request.email
            },
            None,
        )
        .await?;

    let user = match user {
        Some(user) if verify_password(&argon, &request.password, &user.password) => user,
        _ => {
            return Err(Error::Unauthorized(
                UnauthorizedType::WrongUsernameOrPassword,
            ))
        }
    };

    let access_token = generate_access_token(&jwt_state, user.id, user.role)?;

    Ok(Json(LoginResponse {
        token: access_token.token,
        expired_at: access_token.expired_at.into(),
        user: LoginUser {
            id: user.id.into(),
            name: user.name,
            role: user.role,
            email: user.email,
        },
    }))
}

pub async fn show(
    State(users): State<UserCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<UserResponse>, Error> {
    user.require_self_or_admin(id)?;

    let model = users
        .find_one_by_id(id)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!(%id, "tried showing non existing user"))?;

    Ok(Json(model.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CountResponse {
    pub count: u64,
}

pub async fn count(
    State(users): State<UserCollection>,
    _user: UserAccess,
) -> Result<Json<CountResponse>, Error> {
    let count = users
        .count_documents(bson::doc! { "role": UserRole::User }, None)
        .await?;

    Ok(Json(CountResponse { count }))
}
