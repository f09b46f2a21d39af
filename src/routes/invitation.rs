use crate::{
    cryptography::KeySource,
    flows::invitation::InvitationFlow,
    response::OutcomeResponse,
    user_manager::AccountStore,
};
use axum::{
    extract::Query,
    response::{IntoResponse, Response},
    Extension, Form,
};
use serde::Deserialize;
use std::sync::Arc;

/// Path the password form posts back to.
#[derive(Clone, Debug)]
pub struct FormAction(pub Arc<str>);

#[derive(Debug, Deserialize)]
pub struct InvitationQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Deserialize)]
pub struct InvitationForm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

pub async fn view_invitation_route<K: KeySource, S: AccountStore>(
    Extension(flow): Extension<Arc<InvitationFlow<K, S>>>,
    Extension(FormAction(action)): Extension<FormAction>,
    Query(query): Query<InvitationQuery>,
) -> Response {
    let outcome = flow.view(&query.token).await;
    OutcomeResponse::new(outcome, action.as_ref()).into_response()
}

pub async fn submit_invitation_route<K: KeySource, S: AccountStore>(
    Extension(flow): Extension<Arc<InvitationFlow<K, S>>>,
    Extension(FormAction(action)): Extension<FormAction>,
    Form(form): Form<InvitationForm>,
) -> Response {
    let outcome = flow.submit(&form.token, &form.password).await;
    OutcomeResponse::new(outcome, action.as_ref()).into_response()
}
