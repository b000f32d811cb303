use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    PipelineNotFound,
    PipelineInvalidJson,
    PipelineAlreadyExists,

    RemoteRequestFailed,
    RemoteUnexpectedStatus,
    RemoteInvalidResponse,
    RemoteStaleEtag,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PipelineNotFound => "pipeline.not_found",
            ErrorCode::PipelineInvalidJson => "pipeline.invalid_json",
            ErrorCode::PipelineAlreadyExists => "pipeline.already_exists",

            ErrorCode::RemoteRequestFailed => "remote.request_failed",
            ErrorCode::RemoteUnexpectedStatus => "remote.unexpected_status",
            ErrorCode::RemoteInvalidResponse => "remote.invalid_response",
            ErrorCode::RemoteStaleEtag => "remote.stale_etag",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatusDetails {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let details = serde_json::to_value(MissingArgumentDetails { args })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            value,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_missing_key(key: impl Into<String>) -> Self {
        let details = serde_json::to_value(ConfigMissingKeyDetails { key: key.into() })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn pipeline_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::PipelineNotFound,
            format!("Pipeline '{}' does not exist on the server", name),
            serde_json::json!({ "pipeline": name }),
        )
        .with_hint("Check the pipeline name against the server's pipeline list")
    }

    pub fn pipeline_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = serde_json::to_value(PipelineInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::PipelineInvalidJson,
            "Pipeline definition is not valid JSON",
            details,
        )
    }

    pub fn pipeline_already_exists(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::PipelineAlreadyExists,
            format!("Pipeline '{}' already exists on the server", name),
            serde_json::json!({ "pipeline": name }),
        )
        .with_hint("Re-run the push; the pipeline exists now and will be updated instead")
    }

    pub fn remote_request_failed(error: impl Into<String>, context: Option<String>) -> Self {
        let mut err = Self::new(
            ErrorCode::RemoteRequestFailed,
            "Request to the server failed",
            serde_json::json!({ "error": error.into(), "context": context }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn remote_unexpected_status(status: u16, body: impl Into<String>) -> Self {
        let details = serde_json::to_value(RemoteStatusDetails {
            status,
            body: body.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::RemoteUnexpectedStatus,
            format!("Unexpected response from the server (HTTP {})", status),
            details,
        )
    }

    pub fn remote_invalid_response(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RemoteInvalidResponse,
            "Server returned a response that is not a pipeline",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn remote_stale_etag(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::RemoteStaleEtag,
            format!("Pipeline '{}' changed on the server since it was read", name),
            serde_json::json!({ "pipeline": name }),
        )
        .with_hint("Run 'pipefitter pipeline pull PATH' to refresh the local definition, then push again")
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::to_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
