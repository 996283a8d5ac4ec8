use axum::{extract::State, Json};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;

use crate::{
    error::Error,
    lifecycle::RequestStatus,
    load::{LoadPolicy, TruckLoad},
    presence::{CollectorStatus, Presence},
    util::{DateInput, DecimalString, FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    auth::{UserAccess, UserCollection, UserModel, UserRole},
    request::{RequestCollection, WasteRequestModel},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PresenceResponse {
    pub status: CollectorStatus,
    pub return_date: Option<FormattedDateTime>,
    pub assignable: bool,
}

impl From<Presence> for PresenceResponse {
    fn from(value: Presence) -> Self {
        Self {
            status: value.status,
            return_date: value.return_date.map(Into::into),
            assignable: value.is_eligible_for_assignment(),
        }
    }
}

impl From<&UserModel> for PresenceResponse {
    fn from(value: &UserModel) -> Self {
        value.presence().into()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollectorResponse {
    pub id: ObjectIdString,
    pub name: String,
    pub email: String,
    pub location: Option<String>,
    pub presence: PresenceResponse,
}

impl From<UserModel> for CollectorResponse {
    fn from(value: UserModel) -> Self {
        Self {
            presence: PresenceResponse::from(&value),
            id: value.id.into(),
            name: value.name,
            email: value.email,
            location: value.location,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollectorIndexResponse {
    pub collectors: Vec<CollectorResponse>,
}

/// Looks up a user that must have the collector role.
pub async fn find_collector(users: &UserCollection, id: ObjectId) -> Result<UserModel, Error> {
    users
        .find_one_by_id(id)
        .await?
        .filter(|it| it.role == UserRole::Collector)
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!(%id, "collector not found"))
}

/// Replays the collector's completed jobs against their unload watermark.
pub async fn compute_load(
    requests: &RequestCollection,
    collector: &UserModel,
    policy: &LoadPolicy,
) -> Result<TruckLoad, Error> {
    let completed = requests
        .find_all(
            bson::doc! {
                "assigned_collector_id": collector.id,
                "status": RequestStatus::Completed,
            },
            None,
        )
        .await?;

    Ok(TruckLoad::aggregate(
        completed.iter().map(WasteRequestModel::load_entry),
        collector.last_unload_time(),
        policy,
        OffsetDateTime::now_utc(),
    ))
}

pub async fn index(
    State(users): State<UserCollection>,
    user: UserAccess,
) -> Result<Json<CollectorIndexResponse>, Error> {
    user.require_admin()?;

    let collectors = users
        .find_all(
            bson::doc! { "role": UserRole::Collector },
            FindOptions::builder().sort(bson::doc! { "name": 1 }).build(),
        )
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(CollectorIndexResponse { collectors }))
}

pub async fn show_status(
    State(users): State<UserCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<PresenceResponse>, Error> {
    user.require_self_or_admin(id)?;

    let collector = find_collector(&users, id).await?;

    Ok(Json(PresenceResponse::from(&collector)))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetStatusRequest {
    pub status: CollectorStatus,

    #[serde(default)]
    pub leave_date: Option<DateInput>,
}

#[tracing::instrument(skip_all, fields(collector = %id, status = ?request.status))]
pub async fn set_status(
    State(users): State<UserCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<PresenceResponse>, Error> {
    user.require_self_or_admin(id)?;

    find_collector(&users, id).await?;

    let presence = Presence::new(request.status, request.leave_date.map(|it| it.0));

    users
        .update_one(
            bson::doc! { "_id": id },
            bson::doc! {
                "$set": {
                    "collector_status": presence.status,
                    "leave_date": presence.return_date.map(bson::DateTime::from),
                    "updated_at": bson::DateTime::now(),
                }
            },
            None,
        )
        .await?;

    tracing::debug!("presence updated");

    Ok(Json(presence.into()))
}

#[derive(Serialize, Debug, Clone)]
pub struct LoadResponse {
    pub collector_id: ObjectIdString,

    pub current_load: DecimalString,
    pub display_load: DecimalString,
    pub capacity: DecimalString,
    pub is_full: bool,

    pub lifetime_weight: DecimalString,
    pub earnings: DecimalString,
    pub completed_jobs: usize,
    pub completed_today: usize,

    pub last_unload_time: Option<FormattedDateTime>,
}

impl LoadResponse {
    fn new(collector_id: ObjectId, load: TruckLoad) -> Self {
        Self {
            collector_id: collector_id.into(),

            current_load: load.current_load.into(),
            display_load: load.display_load.into(),
            capacity: load.capacity.into(),
            is_full: load.is_full(),

            lifetime_weight: load.lifetime_weight.into(),
            earnings: load.earnings.into(),
            completed_jobs: load.completed_jobs,
            completed_today: load.completed_today,

            last_unload_time: load.last_unload_time.map(Into::into),
        }
    }
}

pub async fn load(
    State(requests): State<RequestCollection>,
    State(users): State<UserCollection>,
    State(policy): State<LoadPolicy>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<LoadResponse>, Error> {
    user.require_self_or_admin(id)?;

    let collector = find_collector(&users, id).await?;
    let load = compute_load(&requests, &collector, &policy).await?;

    Ok(Json(LoadResponse::new(id, load)))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnloadResponse {
    pub last_unload_time: FormattedDateTime,
}

#[tracing::instrument(skip_all, fields(collector = %id))]
pub async fn unload(
    State(requests): State<RequestCollection>,
    State(users): State<UserCollection>,
    State(policy): State<LoadPolicy>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<UnloadResponse>, Error> {
    if user.id != id {
        return Err(Error::Forbidden);
    }

    let collector = find_collector(&users, id).await?;
    let load = compute_load(&requests, &collector, &policy).await?;

    if load.is_empty() {
        return Err(Error::InvalidState("truck is already empty".to_string()));
    }

    // same precision as the stored watermark
    let now = bson::DateTime::now();
    users
        .update_one(
            bson::doc! { "_id": id },
            bson::doc! {
                "$set": {
                    "last_unload_time": now,
                    "updated_at": now,
                }
            },
            None,
        )
        .await?;

    tracing::info!(unloaded = %load.current_load, "truck unloaded");

    Ok(Json(UnloadResponse {
        last_unload_time: now.into(),
    }))
}
