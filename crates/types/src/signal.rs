use crate::evaluation::EvaluationPayload;

/// Messages the client publishes over the reliable data channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientSignal {
    /// Sent once after connect, so the agent knows whether to produce a summary.
    #[serde(rename = "evaluate")]
    Evaluate { value: bool },
    /// Sent at stop time when the user opted in and no result has arrived yet.
    #[serde(rename = "request_evaluation")]
    RequestEvaluation,
}

/// Messages the agent publishes back over the data channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AgentSignal {
    #[serde(rename = "evaluation_ready")]
    EvaluationReady { data: EvaluationPayload },
    #[serde(rename = "evaluation_result")]
    EvaluationResult { data: EvaluationPayload },
}

impl AgentSignal {
    /// Both variants carry the same payload shape; callers treat them alike.
    pub fn into_payload(self) -> EvaluationPayload {
        match self {
            AgentSignal::EvaluationReady { data } => data,
            AgentSignal::EvaluationResult { data } => data,
        }
    }
}
