use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::model::{AgentModel, DecisionRequest, ModelTurn};

/// Deterministic backend that replays a prepared sequence of turns.
///
/// Useful for tests and for standing in while the real transport is
/// unavailable. An exhausted script is a transport failure, except when a
/// fallback turn was configured via [`ScriptedModel::repeating`].
pub struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelTurn, TransportError>>>,
    fallback: Option<ModelTurn>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self::with_outcomes(turns.into_iter().map(Ok).collect())
    }

    pub fn with_outcomes(outcomes: Vec<Result<ModelTurn, TransportError>>) -> Self {
        Self {
            turns: Mutex::new(VecDeque::from(outcomes)),
            fallback: None,
        }
    }

    /// Replays `turn` forever. Models a backend that keeps requesting tool
    /// calls no matter how often it is asked.
    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            fallback: Some(turn),
        }
    }

    pub fn remaining(&self) -> usize {
        self.turns.lock().expect("scripted turns lock poisoned").len()
    }
}

#[async_trait]
impl AgentModel for ScriptedModel {
    async fn decide(&self, _request: DecisionRequest<'_>) -> Result<ModelTurn, TransportError> {
        let mut guard = self.turns.lock().expect("scripted turns lock poisoned");
        if let Some(outcome) = guard.pop_front() {
            return outcome;
        }
        match &self.fallback {
            Some(turn) => Ok(turn.clone()),
            None => Err(TransportError::Response(
                "scripted model has no more turns".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::ModelAction;

    fn request<'a>() -> DecisionRequest<'a> {
        DecisionRequest {
            transcript: &[],
            tools: &[],
            model: None,
        }
    }

    #[tokio::test]
    async fn replays_turns_in_order_then_fails() {
        let model = ScriptedModel::new(vec![
            ModelTurn::call_tool("add", json!({"a": 1, "b": 2})),
            ModelTurn::respond("3"),
        ]);

        assert!(matches!(
            model.decide(request()).await.expect("first turn").action,
            ModelAction::CallTool { .. }
        ));
        assert!(matches!(
            model.decide(request()).await.expect("second turn").action,
            ModelAction::Respond { .. }
        ));
        assert!(matches!(
            model.decide(request()).await,
            Err(TransportError::Response(_))
        ));
    }

    #[tokio::test]
    async fn repeating_model_never_exhausts() {
        let model = ScriptedModel::repeating(ModelTurn::call_tool("poll", json!({})));

        for _ in 0..5 {
            let turn = model.decide(request()).await.expect("turn");
            assert!(matches!(turn.action, ModelAction::CallTool { .. }));
        }
    }

    #[tokio::test]
    async fn scripted_errors_pass_through() {
        let model = ScriptedModel::with_outcomes(vec![Err(TransportError::Request(
            "connection refused".to_string(),
        ))]);

        let err = model.decide(request()).await.expect_err("should fail");
        assert!(err.to_string().contains("connection refused"));
    }
}
