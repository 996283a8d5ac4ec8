use axum::{http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lifecycle::TransitionError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("No resource found")]
    NoResource,

    #[error("{0}")]
    InvalidState(String),

    #[error("Truck is full ({load} of {capacity}), unload before collecting more")]
    CapacityExceeded { load: Decimal, capacity: Decimal },

    #[error("{0}")]
    PasswordHashError(#[from] password_hash::Error),

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),

    #[error("{0} must unique")]
    MustUniqueError(String),

    #[error("{0}")]
    Unauthorized(UnauthorizedType),

    #[error("You have no permission to access this resource")]
    Forbidden,

    #[error("{0}")]
    BSONSerError(#[from] bson::ser::Error),

    #[error("{0}")]
    BSONDeError(#[from] bson::de::Error),

    #[error("Upstream service failed: {0}")]
    UpstreamFailure(#[source] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum UnauthorizedType {
    #[error("Wrong Username or Password")]
    WrongUsernameOrPassword,

    #[error("Invalid access token")]
    InvalidAccessToken,
}

impl From<TransitionError> for Error {
    fn from(value: TransitionError) -> Self {
        Self::InvalidState(value.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
    r#type: String,
    message: String,
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        let message = err.to_string();

        let r#type = err.to_string_variant();

        let errors = match err {
            Error::ValidationError(err) => serde_json::to_value(err).ok(),
            Error::CapacityExceeded { load, capacity } => Some(serde_json::json!({
                "load": load.to_string(),
                "capacity": capacity.to_string(),
            })),
            Error::NoResource
            | Error::InvalidState(..)
            | Error::PasswordHashError(..)
            | Error::DatabaseError(..)
            | Error::JWTError(..)
            | Error::BSONSerError(..)
            | Error::BSONDeError(..)
            | Error::MustUniqueError(..)
            | Error::Unauthorized(..)
            | Error::Forbidden
            | Error::UpstreamFailure(..) => None,
        };

        Self {
            errors,
            message,
            r#type,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("error: {:?}", self);
        let status = match self {
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::ValidationError(..) | Self::MustUniqueError(..) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::InvalidState(..) => StatusCode::BAD_REQUEST,
            Self::CapacityExceeded { .. } => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NoResource => StatusCode::NOT_FOUND,
            Self::UpstreamFailure(..) => StatusCode::BAD_GATEWAY,
            Self::PasswordHashError(..)
            | Self::DatabaseError(..)
            | Self::JWTError(..)
            | Self::BSONSerError(..)
            | Self::BSONDeError(..) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error = ErrorJson::from(self);

        (status, Json(error)).into_response()
    }
}

impl Error {
    pub fn to_string_variant(&self) -> String {
        macro_rules! match_var {
            ($id:ident !) => {
                Self::$id
            };
            ($id:ident (..)) => {
                Self::$id(..)
            };
            ($id:ident {..}) => {
                Self::$id { .. }
            };
        }

        macro_rules! variant {
            ($($name:ident $tt:tt),+) => {
                match self {
                    $(
                        match_var!($name $tt) => {
                            stringify!($name)
                       }
                    )+
                }
            };
        }

        variant! {
            NoResource!,
            Forbidden!,
            ValidationError(..),
            InvalidState(..),
            CapacityExceeded{..},
            PasswordHashError(..),
            DatabaseError(..),
            JWTError(..),
            BSONSerError(..),
            BSONDeError(..),
            MustUniqueError(..),
            Unauthorized(..),
            UpstreamFailure(..)
        }
        .to_string()
    }
}

impl From<axum::extract::rejection::PathRejection> for Error {
    fn from(_value: axum::extract::rejection::PathRejection) -> Self {
        Self::NoResource
    }
}
