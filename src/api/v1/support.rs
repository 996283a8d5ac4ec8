use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::Error,
    notify::{NotifierState, SupportMessage},
};

use super::{auth::UserAccess, MessageResponse};

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct SupportRequest {
    #[validate(length(min = 1, max = 200))]
    pub subject: String,

    #[validate(length(min = 1, max = 4096))]
    pub message: String,
}

#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn send(
    State(notifier): State<NotifierState>,
    user: UserAccess,
    Json(request): Json<SupportRequest>,
) -> Result<Json<MessageResponse>, Error> {
    request.validate()?;

    let message = SupportMessage::new(request.subject, request.message, user.id);

    notifier
        .send_support_message(&message)
        .await
        .map_err(|err| Error::UpstreamFailure(err.into()))?;

    Ok(Json(MessageResponse::new("Message sent successfully")))
}
