use serde::{Deserialize, Serialize};

pub mod auth;
pub mod collector;
pub mod request;
pub mod support;
pub mod token;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use argon2::Argon2;
    use axum::extract::State;
    use bson::oid::ObjectId;

    use crate::{app::AppState, config::Config, load::LoadPolicy};

    use super::{
        auth::{RegisterRequest, UserAccess, UserCollection, UserModel, UserRole},
        request::RequestCollection,
        token::JwtState,
    };

    /// An app wired to a throwaway database, acting as one user.
    pub struct Bootstrap {
        user_model: UserModel,
        pub app_state: AppState,
    }

    impl Bootstrap {
        pub fn user_access(&self) -> UserAccess {
            let model = super::token::generate_access_token(
                &self.app_state.jwt_state,
                self.user_model.id,
                self.user_model.role,
            )
            .unwrap();

            UserAccess::from_token(&self.app_state.jwt_state, &model.token).unwrap()
        }

        pub fn user_id(&self) -> ObjectId {
            self.user_model.id
        }

        /// Registers another user against the same database.
        pub async fn derive(&self, email: &str, role: UserRole) -> Bootstrap {
            let user = create_user(&self.app_state, email, role).await;

            Bootstrap {
                user_model: user,
                app_state: self.app_state.clone(),
            }
        }

        pub fn user_collection(&self) -> State<UserCollection> {
            State(self.app_state.user_collection.clone())
        }

        pub fn request_collection(&self) -> State<RequestCollection> {
            State(self.app_state.request_collection.clone())
        }

        pub fn argon(&self) -> State<Argon2<'static>> {
            State(self.app_state.argon.clone())
        }

        pub fn jwt_state(&self) -> State<JwtState> {
            State(self.app_state.jwt_state.clone())
        }

        pub fn load_policy(&self) -> State<LoadPolicy> {
            State(self.app_state.load_policy)
        }
    }

    pub async fn create_user(app: &AppState, email: &str, role: UserRole) -> UserModel {
        super::auth::create_user(
            app.user_collection.clone(),
            app.argon.clone(),
            RegisterRequest {
                name: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                password: "password".to_string(),
                role: Some(role),
                location: None,
            },
        )
        .await
        .unwrap()
    }

    /// Connects to `MONGODB_URI` with a fresh database and an admin user.
    pub async fn bootstrap() -> Bootstrap {
        dotenvy::dotenv().ok();
        let mongodb_uri = std::env::var("MONGODB_URI")
            .expect("Cannot retrieve MONGODB_URI from environment variable.");

        let database_name = format!("ecocollect-test-{}", ObjectId::new());
        let app_state = AppState::new(&Config::new(mongodb_uri, database_name))
            .await
            .unwrap();
        app_state.run_migration().await.unwrap();

        let user = create_user(&app_state, "admin@example.com", UserRole::Admin).await;

        Bootstrap {
            user_model: user,
            app_state,
        }
    }
}
