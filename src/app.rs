use axum::{extract::FromRef, routing, Router};

use crate::{
    api::v1::{
        auth::UserCollection, collector, request, request::RequestCollection, support,
        token::JwtState,
    },
    config::Config,
    load::LoadPolicy,
    migrate::MigrationCollection,
    notify::NotifierState,
};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub argon: argon2::Argon2<'static>,
    pub jwt_state: JwtState,

    pub mongo_client: mongodb::Client,
    pub user_collection: UserCollection,
    pub request_collection: RequestCollection,
    pub migrate_collection: MigrationCollection,

    pub notifier: NotifierState,
    pub load_policy: LoadPolicy,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let argon = argon2::Argon2::default();
        let jwt_state = JwtState::new(&config.jwt_keys)?;

        let mongo_client_opt = mongodb::options::ClientOptions::parse(&config.mongodb_uri).await?;
        let mongo_client = mongodb::Client::with_options(mongo_client_opt)?;

        let db = mongo_client.database(&config.database_name);
        Ok(Self {
            argon,
            jwt_state,

            mongo_client,
            user_collection: UserCollection(db.collection("users").into()),
            request_collection: RequestCollection(db.collection("requests").into()),
            migrate_collection: MigrationCollection(db.collection("migrations").into()),

            notifier: NotifierState::from_webhook(config.support_webhook_url.clone()),
            load_policy: config.load_policy,
        })
    }
}

pub fn router(app_state: AppState) -> Router {
    use crate::api::v1::auth;

    let api = Router::new().nest(
        "/v1",
        Router::new()
            .nest(
                "/auth",
                Router::new()
                    .route("/register", routing::post(auth::register))
                    .route("/login", routing::post(auth::login))
                    .route("/users/:id", routing::get(auth::show))
                    .route("/count", routing::get(auth::count)),
            )
            .route("/support", routing::post(support::send))
            .nest(
                "/requests",
                Router::new()
                    .route("/", routing::get(request::index).post(request::create))
                    .route("/stats", routing::get(request::stats))
                    .route("/user/:id", routing::get(request::index_by_user))
                    .route("/collector/:id", routing::get(request::index_by_collector))
                    .route("/:id", routing::delete(request::cancel))
                    .route("/:id/assign", routing::put(request::assign))
                    .route("/:id/reject", routing::put(request::reject))
                    .route("/:id/report-issue", routing::put(request::report_issue))
                    .route("/:id/complete", routing::put(request::complete))
                    .route("/:id/feedback", routing::put(request::feedback)),
            )
            .nest(
                "/collectors",
                Router::new()
                    .route("/", routing::get(collector::index))
                    .route(
                        "/:id/status",
                        routing::get(collector::show_status).put(collector::set_status),
                    )
                    .route("/:id/load", routing::get(collector::load))
                    .route("/:id/unload", routing::put(collector::unload)),
            ),
    );

    Router::new()
        .nest("/api", api)
        .with_state(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
