pub mod invitation;

use crate::{
    cryptography::KeySource,
    flows::invitation::InvitationFlow,
    response::method_not_allowed,
    user_manager::AccountStore,
};
use axum::{routing::get, Extension, Router};
use invitation::{submit_invitation_route, view_invitation_route, FormAction};
use std::sync::Arc;

/// GET views the invitation, POST sets the password, anything else is a 405
/// before the flow is consulted.
pub fn invitation_router<K: KeySource, S: AccountStore>(
    flow: Arc<InvitationFlow<K, S>>,
    path: &str,
) -> Router {
    Router::new()
        .route(
            path,
            get(view_invitation_route::<K, S>)
                .post(submit_invitation_route::<K, S>)
                .fallback(method_not_allowed),
        )
        .layer(Extension(flow))
        .layer(Extension(FormAction(Arc::from(path))))
}
