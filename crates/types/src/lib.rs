pub mod api;
pub mod evaluation;
pub mod signal;
pub mod wire;

pub use api::{ErrorResponse, TokenRequest, TokenResponse};
pub use evaluation::{CategoryScore, EvaluationPayload, TrainingReference};
pub use signal::{AgentSignal, ClientSignal};
pub use wire::{ClientWireEvent, ServerWireEvent};
