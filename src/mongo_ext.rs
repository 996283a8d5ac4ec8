use std::ops::Deref;

use bson::{oid::ObjectId, Document};
use mongodb::options::FindOptions;
use serde::de::DeserializeOwned;

use crate::error::Error;

pub struct Collection<T>(pub mongodb::Collection<T>);

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Collection<T> {
    type Target = mongodb::Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> From<mongodb::Collection<T>> for Collection<T> {
    fn from(value: mongodb::Collection<T>) -> Self {
        Self(value)
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned + Send + Sync + Unpin,
{
    pub async fn find_one_by_id(&self, id: ObjectId) -> Result<Option<T>, Error> {
        self.find_one(bson::doc! { "_id": id }, None)
            .await
            .map_err(Into::into)
    }

    /// Runs `find` and drains the cursor.
    pub async fn find_all(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<T>, Error> {
        let mut cursor = self.find(filter, options).await?;

        let mut result = vec![];

        while cursor.advance().await? {
            result.push(cursor.deserialize_current()?);
        }

        Ok(result)
    }

    /// Updates the document only while it still matches `guard`.
    ///
    /// Returns `false` when nothing matched, leaving the document untouched.
    pub async fn update_one_by_id_where(
        &self,
        id: ObjectId,
        guard: Document,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> Result<bool, Error> {
        let mut filter = guard;
        filter.insert("_id", id);

        self.update_one(filter, update, None)
            .await
            .map(|it| it.matched_count > 0)
            .map_err(Into::into)
    }
}
