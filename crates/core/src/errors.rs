use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("prompt template is missing a value for `{0}`")]
    MissingTemplateVariable(String),
    #[error("prompt template has an unterminated placeholder at byte {0}")]
    UnterminatedPlaceholder(usize),
    #[error("invalid prompt template: {0}")]
    InvalidTemplate(String),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Não foi possível processar a pergunta. Revise o texto e tente novamente."
            }
            Self::Internal { .. } => "Ocorreu um erro interno inesperado.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::InvalidRequest(message) => InterfaceError::BadRequest { message, correlation_id },
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}
