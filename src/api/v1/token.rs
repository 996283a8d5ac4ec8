use base64::{engine::general_purpose, Engine as _};
use bson::oid::ObjectId;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, TokenData};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{config::JwtKeys, error::Error, util::ObjectIdString};

use super::auth::UserRole;

#[derive(Debug, thiserror::Error)]
pub enum JwtKeyError {
    #[error("key is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{0}")]
    Key(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct JwtState {
    validation: jsonwebtoken::Validation,
    header: jsonwebtoken::Header,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtState {
    pub fn new(keys: &JwtKeys) -> Result<Self, JwtKeyError> {
        let (algorithm, encoding_key, decoding_key) = match keys {
            JwtKeys::Rsa {
                private_pem_base64,
                public_pem_base64,
            } => {
                let private_pem = general_purpose::STANDARD.decode(private_pem_base64)?;
                let public_pem = general_purpose::STANDARD.decode(public_pem_base64)?;

                (
                    Algorithm::RS256,
                    EncodingKey::from_rsa_pem(&private_pem)?,
                    DecodingKey::from_rsa_pem(&public_pem)?,
                )
            }
            JwtKeys::Secret(secret) => (
                Algorithm::HS256,
                EncodingKey::from_secret(secret),
                DecodingKey::from_secret(secret),
            ),
        };

        let header = jsonwebtoken::Header::new(algorithm);
        let mut validation = jsonwebtoken::Validation::new(algorithm);
        // expiry is checked in UserAccess::from_token
        validation.validate_exp = false;

        Ok(Self {
            header,
            validation,

            encoding_key,
            decoding_key,
        })
    }
}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AccessTokenClaims {
    pub sub: ObjectIdString,
    pub user_role: UserRole,
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < current_timestamp().unix_timestamp()
    }
}

pub struct GenerateAccessTokenResponse {
    pub expired_at: OffsetDateTime,
    pub token: String,
}

pub fn generate_access_token(
    jwt_state: &JwtState,
    user_id: ObjectId,
    role: UserRole,
) -> Result<GenerateAccessTokenResponse, Error> {
    let expired_at = current_timestamp() + Duration::hours(1);
    let token = generate_access_token_with_exp(jwt_state, user_id, role, expired_at.unix_timestamp())?;

    Ok(GenerateAccessTokenResponse { expired_at, token })
}

pub fn generate_access_token_with_exp(
    jwt_state: &JwtState,
    user_id: ObjectId,
    role: UserRole,
    exp: i64,
) -> Result<String, Error> {
    jsonwebtoken::encode(
        &jwt_state.header,
        &AccessTokenClaims {
            sub: user_id.into(),
            user_role: role,
            exp,
        },
        &jwt_state.encoding_key,
    )
    .map_err(Into::into)
}

pub fn decode_access_token(
    jwt_state: &JwtState,
    token: &str,
) -> Result<TokenData<AccessTokenClaims>, Error> {
    jsonwebtoken::decode(token, &jwt_state.decoding_key, &jwt_state.validation).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    pub fn jwt_state() -> JwtState {
        JwtState::new(&JwtKeys::Secret(b"test-secret".to_vec())).unwrap()
    }

    #[test]
    pub fn test_access_token() {
        let jwt = jwt_state();
        let id = ObjectId::new();

        let token = generate_access_token(&jwt, id, UserRole::Collector)
            .unwrap()
            .token;

        let token = decode_access_token(&jwt, &token).unwrap();
        assert_eq!(token.claims.sub, id);
        assert_eq!(token.claims.user_role, UserRole::Collector);
        assert!(!token.claims.is_expired());

        let token = generate_access_token_with_exp(
            &jwt,
            id,
            UserRole::User,
            (current_timestamp() + Duration::seconds(-1)).unix_timestamp(),
        )
        .unwrap();

        let token = decode_access_token(&jwt, &token).unwrap();

        assert!(token.claims.is_expired());
    }

    #[test]
    pub fn test_foreign_secret_is_rejected() {
        let other = JwtState::new(&JwtKeys::Secret(b"another-secret".to_vec())).unwrap();

        let token = generate_access_token(&other, ObjectId::new(), UserRole::Admin)
            .unwrap()
            .token;

        assert_matches!(
            decode_access_token(&jwt_state(), &token),
            Err(Error::JWTError(..))
        );
    }

    #[test]
    pub fn test_invalid_rsa_key() {
        let keys = JwtKeys::Rsa {
            private_pem_base64: "not base64!".to_string(),
            public_pem_base64: "not base64!".to_string(),
        };

        assert!(matches!(JwtState::new(&keys), Err(JwtKeyError::Base64(..))));
    }
}
