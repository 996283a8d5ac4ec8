use std::collections::{HashMap, HashSet};

use axum::{extract::State, http::StatusCode, Json};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    lifecycle::{RequestState, RequestStatus, Transition},
    load::{parse_amount, LoadEntry, LoadPolicy},
    mongo_ext::Collection,
    presence::AssignmentGate,
    util::{DateInput, FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    auth::{UserAccess, UserCollection, UserModel},
    collector::{compute_load, find_collector},
    MessageResponse,
};

#[derive(Clone)]
pub struct RequestCollection(pub Collection<WasteRequestModel>);

impl std::ops::Deref for RequestCollection {
    type Target = Collection<WasteRequestModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WasteRequestModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,

    pub waste_type: String,
    pub amount: String,
    pub location: String,
    pub pickup_date: bson::DateTime,

    pub status: RequestStatus,
    #[serde(default)]
    pub assigned_collector_id: Option<ObjectId>,
    #[serde(default)]
    pub feedback: Option<String>,

    /// Set once, when the request reaches Completed.
    #[serde(default)]
    pub completed_at: Option<bson::DateTime>,

    pub created_at: bson::DateTime,
    #[serde(default)]
    pub updated_at: Option<bson::DateTime>,
}

impl WasteRequestModel {
    pub fn state(&self) -> RequestState {
        RequestState {
            status: self.status,
            assigned_collector: self.assigned_collector_id,
            feedback: self.feedback.clone(),
        }
    }

    /// Documents written before `completed_at` existed fall back to their
    /// last update, then to the pickup date.
    pub fn completed_at(&self) -> OffsetDateTime {
        self.completed_at
            .or(self.updated_at)
            .unwrap_or(self.pickup_date)
            .into()
    }

    pub fn load_entry(&self) -> LoadEntry<'_> {
        LoadEntry {
            amount: &self.amount,
            completed_at: self.completed_at(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WasteRequestResponse {
    pub id: ObjectIdString,
    pub user_id: ObjectIdString,

    pub waste_type: String,
    pub amount: String,
    pub location: String,
    pub pickup_date: FormattedDateTime,

    pub status: RequestStatus,
    pub assigned_collector_id: Option<ObjectIdString>,
    pub feedback: Option<String>,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<WasteRequestModel> for WasteRequestResponse {
    fn from(value: WasteRequestModel) -> Self {
        Self {
            id: value.id.into(),
            user_id: value.user_id.into(),

            waste_type: value.waste_type,
            amount: value.amount,
            location: value.location,
            pickup_date: value.pickup_date.into(),

            status: value.status,
            assigned_collector_id: value.assigned_collector_id.map(Into::into),
            feedback: value.feedback,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.unwrap_or(value.created_at).into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JoinedRequestResponse {
    #[serde(flatten)]
    pub request: WasteRequestResponse,
    pub requester: Option<Requester>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestIndexResponse<T> {
    pub requests: Vec<T>,
}

fn newest_first() -> FindOptions {
    FindOptions::builder()
        .sort(bson::doc! { "created_at": -1 })
        .build()
}

async fn find_request(requests: &RequestCollection, id: ObjectId) -> Result<WasteRequestModel, Error> {
    requests
        .find_one_by_id(id)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!(%id, "request not found"))
}

/// Writes `next` over `model`, but only while the stored status is still the
/// one `next` was computed from.
async fn persist(
    requests: &RequestCollection,
    mut model: WasteRequestModel,
    next: RequestState,
) -> Result<WasteRequestModel, Error> {
    let from = model.status;
    let now = bson::DateTime::now();

    let mut set = bson::doc! {
        "status": next.status,
        "assigned_collector_id": next.assigned_collector,
        "feedback": next.feedback.clone(),
        "updated_at": now,
    };

    let completed_now = from != RequestStatus::Completed && next.status == RequestStatus::Completed;
    if completed_now {
        set.insert("completed_at", now);
    }

    let updated = requests
        .update_one_by_id_where(model.id, bson::doc! { "status": from }, bson::doc! { "$set": set })
        .await?;

    if !updated {
        return Err(Error::InvalidState(format!(
            "request was modified concurrently and is no longer {from}"
        )))
        .tap_err(|_| tracing::debug!(id = %model.id, "lost status race"));
    }

    tracing::debug!(id = %model.id, %from, to = %next.status, "request updated");

    model.status = next.status;
    model.assigned_collector_id = next.assigned_collector;
    model.feedback = next.feedback;
    model.updated_at = Some(now);
    if completed_now {
        model.completed_at = Some(now);
    }

    Ok(model)
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    pub user_id: ObjectIdString,

    #[validate(length(min = 1, max = 124))]
    pub waste_type: String,

    #[validate(length(min = 1, max = 64))]
    pub amount: String,

    #[validate(length(min = 1, max = 256))]
    pub location: String,

    pub pickup_date: DateInput,
}

#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn create(
    State(requests): State<RequestCollection>,
    State(users): State<UserCollection>,
    user: UserAccess,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<WasteRequestResponse>), Error> {
    request.validate()?;

    let owner = request.user_id.0;
    user.require_self_or_admin(owner)?;

    users
        .find_one_by_id(owner)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!(%owner, "request for unknown user"))?;

    let now = OffsetDateTime::now_utc();
    let state = RequestState::pending();

    let model = WasteRequestModel {
        id: ObjectId::new(),
        user_id: owner,

        waste_type: request.waste_type,
        amount: request.amount,
        location: request.location,
        pickup_date: request.pickup_date.into(),

        status: state.status,
        assigned_collector_id: state.assigned_collector,
        feedback: state.feedback,

        completed_at: None,
        created_at: now.into(),
        updated_at: Some(now.into()),
    };

    requests.insert_one(&model, None).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

pub async fn index(
    State(requests): State<RequestCollection>,
    State(users): State<UserCollection>,
    user: UserAccess,
) -> Result<Json<RequestIndexResponse<JoinedRequestResponse>>, Error> {
    user.require_admin()?;

    let models = requests.find_all(None, newest_first()).await?;

    let user_ids = models
        .iter()
        .map(|it| it.user_id)
        .collect::<HashSet<ObjectId>>()
        .into_iter()
        .collect::<Vec<_>>();

    let requesters: HashMap<ObjectId, UserModel> = users
        .find_all(bson::doc! { "_id": { "$in": user_ids } }, None)
        .await?
        .into_iter()
        .map(|it| (it.id, it))
        .collect();

    let requests = models
        .into_iter()
        .map(|model| JoinedRequestResponse {
            requester: requesters.get(&model.user_id).map(|it| Requester {
                name: it.name.clone(),
                email: it.email.clone(),
            }),
            request: model.into(),
        })
        .collect();

    Ok(Json(RequestIndexResponse { requests }))
}

pub async fn index_by_user(
    State(requests): State<RequestCollection>,
    user: UserAccess,
    PathObjectId(user_id): PathObjectId,
) -> Result<Json<RequestIndexResponse<WasteRequestResponse>>, Error> {
    user.require_self_or_admin(user_id)?;

    let requests = requests
        .find_all(bson::doc! { "user_id": user_id }, newest_first())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(RequestIndexResponse { requests }))
}

pub async fn index_by_collector(
    State(requests): State<RequestCollection>,
    user: UserAccess,
    PathObjectId(collector_id): PathObjectId,
) -> Result<Json<RequestIndexResponse<WasteRequestResponse>>, Error> {
    user.require_self_or_admin(collector_id)?;

    let requests = requests
        .find_all(
            bson::doc! { "assigned_collector_id": collector_id },
            newest_first(),
        )
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(RequestIndexResponse { requests }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignRequest {
    pub collector_id: ObjectIdString,

    /// Required to assign a collector who is on leave.
    #[serde(default)]
    pub confirm_leave: bool,
}

#[tracing::instrument(skip_all, fields(request = %id, collector = %request.collector_id.0))]
pub async fn assign(
    State(requests): State<RequestCollection>,
    State(users): State<UserCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
    Json(request): Json<AssignRequest>,
) -> Result<Json<WasteRequestResponse>, Error> {
    user.require_admin()?;

    let model = find_request(&requests, id).await?;
    let next = model.state().apply(Transition::Assign(request.collector_id.0))?;

    let collector = find_collector(&users, request.collector_id.0).await?;

    match collector.presence().assignment_gate() {
        AssignmentGate::Eligible => {}
        AssignmentGate::NeedsConfirmation { return_date } if request.confirm_leave => {
            tracing::info!(?return_date, "assigning collector on leave");
        }
        AssignmentGate::NeedsConfirmation { return_date } => {
            let until = return_date
                .map(|it| format!(" until {}", it.date()))
                .unwrap_or_default();

            return Err(Error::InvalidState(format!(
                "collector {} is on leave{until}, confirm to assign anyway",
                collector.name
            )));
        }
        AssignmentGate::Blocked => {
            return Err(Error::InvalidState(format!(
                "collector {} is offline",
                collector.name
            )));
        }
    }

    let model = persist(&requests, model, next).await?;

    Ok(Json(model.into()))
}

#[tracing::instrument(skip_all, fields(request = %id))]
pub async fn reject(
    State(requests): State<RequestCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<WasteRequestResponse>, Error> {
    user.require_admin()?;

    let model = find_request(&requests, id).await?;
    let next = model.state().apply(Transition::Reject)?;
    let model = persist(&requests, model, next).await?;

    Ok(Json(model.into()))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct ReportIssueRequest {
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}

#[tracing::instrument(skip_all, fields(request = %id))]
pub async fn report_issue(
    State(requests): State<RequestCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
    Json(request): Json<ReportIssueRequest>,
) -> Result<Json<WasteRequestResponse>, Error> {
    request.validate()?;

    let model = find_request(&requests, id).await?;
    if model.assigned_collector_id != Some(user.id) && !user.is_admin() {
        return Err(Error::Forbidden);
    }

    let next = model
        .state()
        .apply(Transition::ReportIssue(request.reason))?;
    let model = persist(&requests, model, next).await?;

    Ok(Json(model.into()))
}

#[tracing::instrument(skip_all, fields(request = %id, collector = %user.id))]
pub async fn complete(
    State(requests): State<RequestCollection>,
    State(users): State<UserCollection>,
    State(policy): State<LoadPolicy>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<WasteRequestResponse>, Error> {
    let model = find_request(&requests, id).await?;
    if model.assigned_collector_id != Some(user.id) {
        return Err(Error::Forbidden)
            .tap_err(|_| tracing::debug!("completing a job assigned to someone else"));
    }

    let next = model.state().apply(Transition::Complete)?;

    let collector = find_collector(&users, user.id).await?;
    let load = compute_load(&requests, &collector, &policy).await?;
    load.check_capacity(parse_amount(&model.amount))
        .tap_err(|it| tracing::info!(load = %it.load, capacity = %it.capacity, "truck is full"))?;

    let model = persist(&requests, model, next).await?;

    Ok(Json(model.into()))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct FeedbackRequest {
    #[validate(length(min = 1, max = 1024))]
    pub feedback: String,
}

pub async fn feedback(
    State(requests): State<RequestCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<WasteRequestResponse>, Error> {
    request.validate()?;

    let model = find_request(&requests, id).await?;
    user.require_self_or_admin(model.user_id)?;

    let next = model.state().with_feedback(request.feedback);
    let model = persist(&requests, model, next).await?;

    Ok(Json(model.into()))
}

#[tracing::instrument(skip_all, fields(request = %id))]
pub async fn cancel(
    State(requests): State<RequestCollection>,
    user: UserAccess,
    PathObjectId(id): PathObjectId,
) -> Result<Json<MessageResponse>, Error> {
    let model = find_request(&requests, id).await?;
    user.require_self_or_admin(model.user_id)?;

    model.state().ensure_cancellable()?;

    let deleted = requests
        .delete_one(
            bson::doc! { "_id": id, "status": RequestStatus::Pending },
            None,
        )
        .await?;

    if deleted.deleted_count == 0 {
        return Err(Error::InvalidState(
            "request is no longer pending and cannot be cancelled".to_string(),
        ));
    }

    Ok(Json(MessageResponse::new("Request cancelled")))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

pub async fn stats(
    State(requests): State<RequestCollection>,
    user: UserAccess,
) -> Result<Json<Vec<CategoryCount>>, Error> {
    user.require_admin()?;

    let mut cursor = requests
        .aggregate(
            [
                bson::doc! { "$group": { "_id": "$waste_type", "count": { "$sum": 1 } } },
                bson::doc! { "$project": { "_id": 0, "category": "$_id", "count": 1 } },
            ],
            None,
        )
        .await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let document = cursor.deserialize_current()?;
        result.push(bson::from_document(document)?);
    }

    Ok(Json(result))
}
