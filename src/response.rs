use crate::flows::{FlowOutcome, StatusClass};
use axum::{
    http::{header::CONTENT_SECURITY_POLICY, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;

const CSP: &str = "default-src 'self'; \
    object-src 'none'; \
    frame-ancestors 'none'; \
    form-action 'self'; \
    base-uri 'self'";

impl From<StatusClass> for StatusCode {
    fn from(status: StatusClass) -> Self {
        match status {
            StatusClass::Ok => StatusCode::OK,
            StatusClass::BadRequest => StatusCode::BAD_REQUEST,
            StatusClass::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Everything the invitation page template needs.
#[derive(Debug, Default)]
pub struct InvitationPage<'a> {
    pub action: &'a str,
    pub error: Option<&'a str>,
    pub message: Option<&'a str>,
    pub token: Option<&'a str>,
    pub success: bool,
}

impl<'a> InvitationPage<'a> {
    pub fn from_outcome(outcome: &'a FlowOutcome, action: &'a str) -> Self {
        Self {
            action,
            error: outcome.title(),
            message: outcome.message(),
            token: outcome.form_token(),
            success: matches!(outcome, FlowOutcome::Success { .. }),
        }
    }

    pub fn render(&self) -> String {
        let mut body = String::new();
        if let Some(error) = self.error {
            body.push_str(&format!("<h2 class=\"error\">{}</h2>\n", escape_html(error)));
        }
        if let Some(message) = self.message {
            body.push_str(&format!("<p class=\"message\">{}</p>\n", escape_html(message)));
        }
        if self.success {
            body.push_str("<h2>Password set</h2>\n<p>Your password has been set. You may now log in.</p>\n");
        }
        if let Some(token) = self.token {
            body.push_str(&format!(
                "<form method=\"post\" action=\"{action}\">\n\
                 <input type=\"hidden\" name=\"token\" value=\"{token}\">\n\
                 <label for=\"password\">Choose a password</label>\n\
                 <input type=\"password\" id=\"password\" name=\"password\" autocomplete=\"new-password\" required>\n\
                 <button type=\"submit\">Set password</button>\n\
                 </form>\n",
                action = escape_html(self.action),
                token = escape_html(token),
            ));
        }
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Invitation</title>\n</head>\n<body>\n{}</body>\n</html>\n",
            body
        )
    }
}

/// Presentation of a flow outcome. `action` is the path the form posts to.
pub struct OutcomeResponse {
    outcome: FlowOutcome,
    action: String,
}

impl OutcomeResponse {
    pub fn new(outcome: FlowOutcome, action: impl Into<String>) -> Self {
        Self {
            outcome,
            action: action.into(),
        }
    }
}

impl IntoResponse for OutcomeResponse {
    fn into_response(self) -> Response {
        if let Some(redirect) = self.outcome.redirect() {
            return Redirect::to(redirect).into_response();
        }
        let status: StatusCode = self.outcome.status().into();
        let page = InvitationPage::from_outcome(&self.outcome, &self.action).render();
        (status, [(CONTENT_SECURITY_POLICY, CSP)], Html(page)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    error: &'static str,
    error_description: &'static str,
}

impl ApiError {
    pub fn method_not_allowed() -> Self {
        Self {
            error: "invalid_request",
            error_description: "method not allowed",
        }
    }
}

pub async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, Json(ApiError::method_not_allowed())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn form_is_rendered_only_with_a_token() {
        let show = FlowOutcome::ShowForm {
            token: "abc\"><script>".to_string(),
        };
        let page = InvitationPage::from_outcome(&show, "/invitation").render();
        assert!(page.contains("<form method=\"post\" action=\"/invitation\">"));
        assert!(page.contains("value=\"abc&quot;&gt;&lt;script&gt;\""));
        assert!(!page.contains("<script>"));

        let terminal = FlowOutcome::terminal("Link Expired", "gone", StatusClass::BadRequest);
        let page = InvitationPage::from_outcome(&terminal, "/invitation").render();
        assert!(!page.contains("<form"));
        assert!(page.contains("Link Expired"));
        assert!(page.contains("gone"));
    }

    #[test]
    fn recoverable_error_shows_message_and_form() {
        let outcome = FlowOutcome::RecoverableError {
            title: "Invalid Password".to_string(),
            message: "too short".to_string(),
            token: "tok".to_string(),
        };
        let page = InvitationPage::from_outcome(&outcome, "/invitation").render();
        assert!(page.contains("Invalid Password"));
        assert!(page.contains("too short"));
        assert!(page.contains("value=\"tok\""));
    }

    #[test]
    fn success_page_has_no_form() {
        let outcome = FlowOutcome::Success { redirect: None };
        let page = InvitationPage::from_outcome(&outcome, "/invitation").render();
        assert!(page.contains("Password set"));
        assert!(!page.contains("<form"));
    }

    #[test]
    fn status_classes_map_to_codes() {
        assert_eq!(StatusCode::from(StatusClass::Ok), StatusCode::OK);
        assert_eq!(StatusCode::from(StatusClass::BadRequest), StatusCode::BAD_REQUEST);
        assert_eq!(
            StatusCode::from(StatusClass::InternalError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn redirect_outcome_is_see_other() {
        let response = OutcomeResponse::new(
            FlowOutcome::Success {
                redirect: Some("https://app.example.com/".to_string()),
            },
            "/invitation",
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(axum::http::header::LOCATION).unwrap(),
            "https://app.example.com/"
        );
    }
}
