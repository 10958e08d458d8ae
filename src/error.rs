use thiserror::Error;

use crate::duration::DurationError;

/// Failures the command layer reports to the user.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Password for postgres user must be set in environment variable {var}")]
    MissingCredential { var: &'static str },

    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error("Chunk interval must be at least 1 minute")]
    IntervalTooShort,

    #[error("{what} must not be empty")]
    EmptyArgument { what: &'static str },

    #[error("no pods found in namespace {namespace} matching {selector}")]
    PodNotFound { namespace: String, selector: String },

    #[error("port-forward to {target} failed: {message}")]
    PortForward { target: String, message: String },

    #[error("secret {secret} has no key {key}")]
    SecretKeyMissing { secret: String, key: String },

    #[error("secret {secret} key {key} is not valid UTF-8")]
    SecretNotUtf8 { secret: String, key: String },

    #[error("Grafana API returned {status}: {body}")]
    Grafana { status: u16, body: String },
}

/// Render an error and its chain of causes for the terminal:
///
/// ```text
/// ERROR: listing pods in default matching release=tobs,role=master
///   caused by: ...
/// ```
///
/// Errors that already repeat their source in their own message (kube's do)
/// would print the same text again; such causes are skipped.
pub fn display_causes(err: &anyhow::Error) -> String {
    let mut out = format!("ERROR: {}\n", err);
    let mut previous = err.to_string();
    for cause in err.chain().skip(1) {
        let text = cause.to_string();
        if !previous.contains(&text) {
            out.push_str(&format!("  caused by: {}\n", text));
        }
        previous = text;
    }
    out
}
