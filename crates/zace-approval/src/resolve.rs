//! `resolveCommandApproval` (§4.5): the five-step decision chain that turns
//! a proposed `execute_command` invocation into an `Allow`/`Deny`/`RequestUser`
//! decision.

use std::collections::HashSet;

use serde_json::{Map, Value};
use zace_core::model::ApprovalDecision;
use zace_core::signature::stable_hash_of;
use zace_core::types::ApprovalScope;
use zace_core::AppError;

use crate::classifier::SafetyClassifier;
use crate::store::{ApprovalRule, ApprovalStore, RuleDecision};

/// Everything `resolve_command_approval` needs beyond the command itself.
/// Borrowed, not owned: the run loop holds the store and allowlist across
/// many calls within a run.
pub struct ApprovalContext<'a> {
    pub classifier: &'a dyn SafetyClassifier,
    pub store: &'a ApprovalStore,
    /// Signatures the user pre-approved for this run only; consumed on match.
    pub one_shot_allowlist: &'a mut HashSet<String>,
    pub session_id: &'a str,
}

fn command_signature(command: &str, cwd: Option<&str>) -> String {
    let trimmed = command.trim();
    let mut payload = Map::new();
    payload.insert("command".to_string(), Value::String(trimmed.to_string()));
    if let Some(cwd) = cwd {
        payload.insert("cwd".to_string(), Value::String(cwd.to_string()));
    }
    stable_hash_of("approval", &Value::Object(payload))
}

/// Implements §4.5 steps 1-5. Only commands the classifier flags as
/// destructive ever reach the signature/allowlist/rule machinery — a
/// benign command is always `Allow{scope: Once, required_approval: false}`.
pub async fn resolve_command_approval(
    ctx: &mut ApprovalContext<'_>,
    command: &str,
    cwd: Option<&str>,
) -> Result<ApprovalDecision, AppError> {
    let reason = ctx.classifier.classify(command).await?;
    let Some(reason) = reason else {
        return Ok(ApprovalDecision::Allow {
            scope: ApprovalScope::Once,
            required_approval: false,
        });
    };

    let signature = command_signature(command, cwd);

    if ctx.one_shot_allowlist.remove(&signature) {
        return Ok(ApprovalDecision::Allow {
            scope: ApprovalScope::Once,
            required_approval: true,
        });
    }

    if let Some(rule) = ctx.store.lookup(&signature, ctx.session_id) {
        return Ok(match rule.decision {
            RuleDecision::Allow => ApprovalDecision::Allow {
                scope: rule.scope,
                required_approval: true,
            },
            RuleDecision::Deny => ApprovalDecision::Deny {
                scope: rule.scope,
                message: format!("command denied by a previously recorded {:?}-scope rule", rule.scope),
            },
        });
    }

    let message = format!(
        "This command looks destructive ({reason}): `{command}`. Reply with one of \
         \"allow once\", \"allow session\", \"allow workspace\", or \"deny\" \
         (confirmation token: {signature})."
    );
    Ok(ApprovalDecision::RequestUser {
        command_signature: signature,
        reason,
        message,
    })
}

/// How an external collaborator resolved a pending `RequestUser` decision
/// (§4.5 "Interpretation of user replies").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserApprovalReply {
    AllowOnce,
    AllowSession,
    AllowWorkspace,
    Deny,
    Unclear,
}

/// Applies an already-interpreted user reply to a pending approval signature:
/// records it in the one-shot allowlist for `AllowOnce`, or upserts a
/// persisted rule for session/workspace scope. `Unclear` is a no-op — the
/// caller should re-prompt rather than guess.
pub fn apply_user_reply(
    store: &mut ApprovalStore,
    one_shot_allowlist: &mut HashSet<String>,
    session_id: &str,
    signature: &str,
    created_at: &str,
    reply: UserApprovalReply,
) {
    match reply {
        UserApprovalReply::AllowOnce => {
            one_shot_allowlist.insert(signature.to_string());
        }
        UserApprovalReply::AllowSession => store.upsert(ApprovalRule {
            signature: signature.to_string(),
            scope: ApprovalScope::Session,
            decision: RuleDecision::Allow,
            created_at: created_at.to_string(),
            session_id: Some(session_id.to_string()),
        }),
        UserApprovalReply::AllowWorkspace => store.upsert(ApprovalRule {
            signature: signature.to_string(),
            scope: ApprovalScope::Workspace,
            decision: RuleDecision::Allow,
            created_at: created_at.to_string(),
            session_id: None,
        }),
        UserApprovalReply::Deny => store.upsert(ApprovalRule {
            signature: signature.to_string(),
            scope: ApprovalScope::Workspace,
            decision: RuleDecision::Deny,
            created_at: created_at.to_string(),
            session_id: None,
        }),
        UserApprovalReply::Unclear => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::HeuristicClassifier;

    #[tokio::test]
    async fn benign_command_allows_without_reason() {
        let classifier = HeuristicClassifier::default();
        let store = ApprovalStore::default();
        let mut allowlist = HashSet::new();
        let mut ctx = ApprovalContext {
            classifier: &classifier,
            store: &store,
            one_shot_allowlist: &mut allowlist,
            session_id: "s1",
        };
        let decision = resolve_command_approval(&mut ctx, "ls -la", None).await.unwrap();
        assert!(matches!(
            decision,
            ApprovalDecision::Allow { required_approval: false, .. }
        ));
    }

    #[tokio::test]
    async fn destructive_command_without_rule_requests_user() {
        let classifier = HeuristicClassifier::default();
        let store = ApprovalStore::default();
        let mut allowlist = HashSet::new();
        let mut ctx = ApprovalContext {
            classifier: &classifier,
            store: &store,
            one_shot_allowlist: &mut allowlist,
            session_id: "s1",
        };
        let decision = resolve_command_approval(&mut ctx, "rm -rf build/", None).await.unwrap();
        assert!(matches!(decision, ApprovalDecision::RequestUser { .. }));
    }

    #[tokio::test]
    async fn one_shot_allowlist_is_consumed_on_match() {
        let classifier = HeuristicClassifier::default();
        let store = ApprovalStore::default();
        let mut allowlist = HashSet::new();
        let signature = command_signature("rm -rf build/", None);
        allowlist.insert(signature);
        let mut ctx = ApprovalContext {
            classifier: &classifier,
            store: &store,
            one_shot_allowlist: &mut allowlist,
            session_id: "s1",
        };
        let decision = resolve_command_approval(&mut ctx, "rm -rf build/", None).await.unwrap();
        assert!(matches!(decision, ApprovalDecision::Allow { required_approval: true, .. }));
        assert!(ctx.one_shot_allowlist.is_empty());

        let decision_again = resolve_command_approval(&mut ctx, "rm -rf build/", None).await.unwrap();
        assert!(matches!(decision_again, ApprovalDecision::RequestUser { .. }));
    }

    #[tokio::test]
    async fn persisted_workspace_deny_rule_blocks() {
        let classifier = HeuristicClassifier::default();
        let mut store = ApprovalStore::default();
        let signature = command_signature("rm -rf build/", None);
        store.upsert(ApprovalRule {
            signature,
            scope: ApprovalScope::Workspace,
            decision: RuleDecision::Deny,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            session_id: None,
        });
        let mut allowlist = HashSet::new();
        let mut ctx = ApprovalContext {
            classifier: &classifier,
            store: &store,
            one_shot_allowlist: &mut allowlist,
            session_id: "s1",
        };
        let decision = resolve_command_approval(&mut ctx, "rm -rf build/", None).await.unwrap();
        assert!(matches!(decision, ApprovalDecision::Deny { .. }));
    }

    #[test]
    fn apply_user_reply_allow_session_persists_rule() {
        let mut store = ApprovalStore::default();
        let mut allowlist = HashSet::new();
        apply_user_reply(
            &mut store,
            &mut allowlist,
            "s1",
            "sig-x",
            "2026-01-01T00:00:00Z",
            UserApprovalReply::AllowSession,
        );
        assert!(store.lookup("sig-x", "s1").is_some());
        assert!(store.lookup("sig-x", "s2").is_none());
    }
}
