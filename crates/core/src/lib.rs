pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod prompt;

pub use domain::{Question, RenderedPrompt};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{RequestEvent, RequestFlow, RequestState};
pub use prompt::{PromptBuilder, PromptTemplate, INVENTORY_TEMPLATE};
