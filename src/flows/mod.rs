pub mod invitation;

use serde::Serialize;

/// Coarse HTTP status class of a flow outcome; the transport picks the code.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StatusClass {
    Ok,
    BadRequest,
    InternalError,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum FlowOutcome {
    /// Show the password form bound to `token`.
    ShowForm { token: String },
    /// Password set. The caller redirects when a target is present.
    Success { redirect: Option<String> },
    /// Input can be corrected and resubmitted with the same token.
    RecoverableError {
        title: String,
        message: String,
        token: String,
    },
    /// Needs a new invitation or an operator, never retried with this token.
    TerminalError {
        title: String,
        message: String,
        status: StatusClass,
    },
}

impl FlowOutcome {
    pub fn terminal(title: &str, message: &str, status: StatusClass) -> Self {
        Self::TerminalError {
            title: title.to_string(),
            message: message.to_string(),
            status,
        }
    }

    pub fn status(&self) -> StatusClass {
        match self {
            Self::ShowForm { .. } | Self::Success { .. } => StatusClass::Ok,
            Self::RecoverableError { .. } => StatusClass::BadRequest,
            Self::TerminalError { status, .. } => *status,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::RecoverableError { title, .. } | Self::TerminalError { title, .. } => {
                Some(title)
            }
            Self::ShowForm { .. } | Self::Success { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::RecoverableError { message, .. } | Self::TerminalError { message, .. } => {
                Some(message)
            }
            Self::ShowForm { .. } | Self::Success { .. } => None,
        }
    }

    /// Token to embed in a retry form, if the form should be shown at all.
    pub fn form_token(&self) -> Option<&str> {
        match self {
            Self::ShowForm { token } | Self::RecoverableError { token, .. } => Some(token),
            Self::Success { .. } | Self::TerminalError { .. } => None,
        }
    }

    pub fn redirect(&self) -> Option<&str> {
        match self {
            Self::Success { redirect } => redirect.as_deref(),
            _ => None,
        }
    }
}
