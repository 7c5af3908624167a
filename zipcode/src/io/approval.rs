//! Approval gates for steps that validation marked `NeedApproval`.
//!
//! The runtime suspends on a gate and resumes once it answers. Gates never
//! answer on their own behalf unless they are explicitly auto-approving.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::plan::{PlanStep, StepId};

/// What the gate is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub run_id: String,
    pub step: PlanStep,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: String },
}

/// Source of approval signals.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Approves every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision {
        debug!(step_id = request.step.id, "auto-approving step");
        ApprovalDecision::Approved
    }
}

/// Gate resolved from outside the run, by step id.
///
/// A UI holds an `Arc<ApprovalQueue>`, lists [`pending`](Self::pending)
/// requests and answers with [`resolve`](Self::resolve).
#[derive(Default)]
pub struct ApprovalQueue {
    waiting: Mutex<HashMap<StepId, (ApprovalRequest, oneshot::Sender<ApprovalDecision>)>>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests currently awaiting an answer, ordered by step id.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let waiting = self
            .waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut pending: Vec<ApprovalRequest> =
            waiting.values().map(|(request, _)| request.clone()).collect();
        pending.sort_by_key(|request| request.step.id);
        pending
    }

    /// Answer the request for `step_id`. Returns false if none is waiting.
    pub fn resolve(&self, step_id: StepId, decision: ApprovalDecision) -> bool {
        let entry = self
            .waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&step_id);
        match entry {
            Some((_, sender)) => sender.send(decision).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ApprovalGate for ApprovalQueue {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(request.step.id, (request.clone(), tx));
        // Dropped with the review future when the run is cancelled mid-wait.
        let _pending = PendingGuard {
            queue: self,
            step_id: request.step.id,
        };
        rx.await.unwrap_or_else(|_| ApprovalDecision::Denied {
            reason: "approval channel closed".to_string(),
        })
    }
}

struct PendingGuard<'a> {
    queue: &'a ApprovalQueue,
    step_id: StepId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.queue
            .waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.step_id);
    }
}

/// Asks on stderr and reads `y`/`n` from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinApprovalGate;

#[async_trait]
impl ApprovalGate for StdinApprovalGate {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let question = format!(
            "step {} needs approval ({}):\n  {}\napprove? [y/N] ",
            request.step.id, request.reason, request.step.task
        );
        let mut stderr = tokio::io::stderr();
        if let Err(err) = stderr.write_all(question.as_bytes()).await {
            warn!(error = %err, "could not write approval prompt");
        }
        let _ = stderr.flush().await;

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut answer).await {
            Ok(_) => parse_answer(&answer),
            Err(err) => ApprovalDecision::Denied {
                reason: format!("read approval answer: {err}"),
            },
        }
    }
}

fn parse_answer(answer: &str) -> ApprovalDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Approved,
        _ => ApprovalDecision::Denied {
            reason: "denied by operator".to_string(),
        },
    }
}
