use std::collections::HashSet;

use bson::oid::ObjectId;
use mongodb::{options::IndexOptions, IndexModel};
use serde::{Deserialize, Serialize};

use crate::{app::AppState, error::Error, mongo_ext::Collection};

#[derive(Serialize, Deserialize)]
pub struct MigrateModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub version: i64,
}

#[derive(Clone)]
pub struct MigrationCollection(pub Collection<MigrateModel>);

impl std::ops::Deref for MigrationCollection {
    type Target = Collection<MigrateModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MigrationCollection {
    pub async fn insert_version(&self, version: i64) -> Result<(), mongodb::error::Error> {
        self.insert_one(
            MigrateModel {
                id: ObjectId::new(),
                version,
            },
            None,
        )
        .await
        .map(|_| ())
    }
}

impl AppState {
    async fn v1_migrate(&self) -> Result<(), mongodb::error::Error> {
        self.migrate_collection
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! {"version": 1})
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        self.user_collection
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! {"email": 1})
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }

    async fn v2_migrate(&self) -> Result<(), mongodb::error::Error> {
        self.request_collection
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! {"user_id": 1, "created_at": -1})
                    .build(),
                None,
            )
            .await?;

        self.request_collection
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! {"assigned_collector_id": 1, "status": 1})
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }

    /// Applies every migration not yet recorded in the `migrations` collection.
    ///
    /// Index creation is idempotent, so a run interrupted halfway is safe to
    /// repeat.
    pub async fn run_migration(&self) -> Result<(), Error> {
        let migration: HashSet<i64> = self
            .migrate_collection
            .find_all(None, None)
            .await?
            .into_iter()
            .map(|it| it.version)
            .collect();

        macro_rules! migrate {
            ($version:expr, $fun:ident) => {
                if !migration.contains(&$version) {
                    tracing::debug!("running migration version {}", $version);
                    self.$fun().await?;
                    self.migrate_collection.insert_version($version).await?;
                }
            };
        }

        migrate!(1, v1_migrate);
        migrate!(2, v2_migrate);

        Ok(())
    }
}
