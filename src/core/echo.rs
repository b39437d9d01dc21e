//! Echo room and dissonance check
//!
//! Both are prompt templates sent through the gateway. Dissonance
//! "detection" reads a yes/no out of free-form LLM text; it is a heuristic
//! placeholder, not a classifier.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{BeliefCompiler, GatewayClient};
use crate::types::ConversationTurn;

/// Evidence items returned with an attribution
pub const MAX_EVIDENCE: usize = 2;

/// Used when the gateway fails
pub const FALLBACK_ATTRIBUTIONS: [&str; 3] = [
    "也许我的期待在某种程度上影响了这次对话的走向...",
    "回想起来，我的态度可能传达了某种潜在的信息...",
    "这次互动让我意识到，我的内心可能有着更深层的渴望...",
];

/// Used in local test mode
pub const LOCAL_ATTRIBUTION: &str = "（预览环境）从我目前的探索中来看，这种体验让我感受到了意识的多层次性。\
我注意到自己的想法和行为之间存在着微妙的关联，这种觉察本身就是一种成长。";

/// Analysis text when the gateway cannot answer
pub const ANALYSIS_UNAVAILABLE: &str = "暂时无法分析这段对话。";

lazy_static! {
    // "检测结果：是" / "检测结果: 否"
    static ref RE_VERDICT: Regex = Regex::new(r"检测结果\s*[:：]\s*(是|否)").unwrap();
}

/// Where an attribution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    AiGenerated,
    Fallback,
    Local,
}

/// Echo room answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoOutcome {
    pub attribution: String,
    pub memory_evidence: Vec<String>,
    pub source: AttributionSource,
}

/// Dissonance check answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DissonanceVerdict {
    pub dissonance_detected: bool,
    pub analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub echo_room_triggered: bool,
}

/// Generate a subjective attribution for the player's recent experience
pub async fn echo_attribution(
    gateway: &GatewayClient,
    compiler: &BeliefCompiler,
    history: &[ConversationTurn],
    confusion: Option<&str>,
    event_id: Option<&str>,
) -> EchoOutcome {
    let memory_evidence = memory_evidence(history);

    if !gateway.is_live() {
        return EchoOutcome {
            attribution: LOCAL_ATTRIBUTION.to_string(),
            memory_evidence,
            source: AttributionSource::Local,
        };
    }

    let prompt = compiler.echo_prompt(history, confusion, event_id);
    let ask = confusion.unwrap_or("请帮我理解刚才发生的一切。");
    match gateway.try_complete(&prompt, ask, &[]).await {
        Ok(attribution) => EchoOutcome {
            attribution,
            memory_evidence,
            source: AttributionSource::AiGenerated,
        },
        Err(err) => {
            warn!(error = %err, "echo generation failed, using fallback attribution");
            EchoOutcome {
                attribution: fallback_attribution().to_string(),
                memory_evidence,
                source: AttributionSource::Fallback,
            }
        }
    }
}

/// Up to two most recent player utterances, oldest first
pub fn memory_evidence(history: &[ConversationTurn]) -> Vec<String> {
    let mut evidence: Vec<String> = history
        .iter()
        .rev()
        .filter(|t| t.is_user() && !t.text.trim().is_empty())
        .take(MAX_EVIDENCE)
        .map(|t| format!("我曾说：「{}」", t.text.trim()))
        .collect();
    evidence.reverse();
    evidence
}

/// Ask the gateway whether the transcript shows cognitive dissonance
pub async fn check_dissonance(
    gateway: &GatewayClient,
    compiler: &BeliefCompiler,
    player_id: &str,
    transcript: &str,
) -> DissonanceVerdict {
    if !gateway.is_live() {
        return DissonanceVerdict {
            dissonance_detected: false,
            analysis: gateway.complete(compiler.dissonance_prompt(), transcript, &[]).await,
            event_id: None,
            echo_room_triggered: false,
        };
    }

    let analysis = match gateway.try_complete(compiler.dissonance_prompt(), transcript, &[]).await {
        Ok(analysis) => analysis,
        Err(err) => {
            warn!(player_id, error = %err, "dissonance analysis failed, reporting none");
            return DissonanceVerdict {
                dissonance_detected: false,
                analysis: ANALYSIS_UNAVAILABLE.to_string(),
                event_id: None,
                echo_room_triggered: false,
            };
        }
    };
    let detected = detect_dissonance(&analysis);
    let event_id = detected.then(|| dissonance_event_id(player_id, Utc::now()));
    if let Some(id) = &event_id {
        info!(player_id, event_id = %id, "dissonance detected, echo room opened");
    }

    DissonanceVerdict {
        dissonance_detected: detected,
        analysis,
        event_id,
        echo_room_triggered: detected,
    }
}

/// Read a yes/no verdict out of the analysis text
///
/// Prefers an explicit `检测结果：是/否` line and falls back to the old
/// substring check, which is fragile on free-form text.
pub fn detect_dissonance(analysis: &str) -> bool {
    if let Some(caps) = RE_VERDICT.captures(analysis) {
        return &caps[1] == "是";
    }
    analysis.contains('是') || analysis.contains("检测到")
}

/// `dissonance_{player}_{YYYYmmdd_HHMMSS}`
pub fn dissonance_event_id(player_id: &str, at: DateTime<Utc>) -> String {
    format!("dissonance_{}_{}", player_id, at.format("%Y%m%d_%H%M%S"))
}

fn fallback_attribution() -> &'static str {
    FALLBACK_ATTRIBUTIONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_ATTRIBUTIONS[0])
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GatewayConfig;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_explicit_verdict_wins() {
        assert!(detect_dissonance("检测结果：是\n原因：前后矛盾"));
        // "是" appears in the reason but the verdict says no
        assert!(!detect_dissonance("检测结果: 否\n原因：这只是正常的寒暄"));
    }

    #[test]
    fn test_substring_heuristic_without_verdict() {
        assert!(detect_dissonance("玩家的行为是矛盾的"));
        assert!(detect_dissonance("我们检测到了冲突"));
        assert!(!detect_dissonance("一切正常"));
    }

    #[test]
    fn test_event_id_format() {
        let at = Utc.with_ymd_and_hms(2025, 8, 20, 9, 5, 3).unwrap();
        assert_eq!(dissonance_event_id("p1", at), "dissonance_p1_20250820_090503");
    }

    #[test]
    fn test_memory_evidence_takes_recent_player_turns() {
        let history = vec![
            ConversationTurn::user("第一次"),
            ConversationTurn::npc("陈浩", "嗯"),
            ConversationTurn::user("第二次"),
            ConversationTurn::user("  "),
            ConversationTurn::user("第三次"),
        ];
        assert_eq!(
            memory_evidence(&history),
            vec!["我曾说：「第二次」".to_string(), "我曾说：「第三次」".to_string()]
        );
        assert!(memory_evidence(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_echo_local_mode() {
        let gateway = GatewayClient::new(GatewayConfig::default());
        let outcome = echo_attribution(&gateway, &BeliefCompiler::new(), &[], Some("为什么"), None).await;
        assert_eq!(outcome.source, AttributionSource::Local);
        assert_eq!(outcome.attribution, LOCAL_ATTRIBUTION);
    }

    #[tokio::test]
    async fn test_echo_gateway_failure_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let gateway = GatewayClient::new(GatewayConfig::default().with_base_url(server.uri()).with_api_key("k"));

        let history = vec![ConversationTurn::user("我帮了他，他却很冷淡")];
        let outcome = echo_attribution(&gateway, &BeliefCompiler::new(), &history, None, Some("evt")).await;
        assert_eq!(outcome.source, AttributionSource::Fallback);
        assert!(FALLBACK_ATTRIBUTIONS.contains(&outcome.attribution.as_str()));
        assert_eq!(outcome.memory_evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_dissonance_detected_opens_echo_room() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "检测结果：是\n原因：友善行为得到冷淡回应"}}]
            })))
            .mount(&server)
            .await;
        let gateway = GatewayClient::new(GatewayConfig::default().with_base_url(server.uri()).with_api_key("k"));

        let verdict = check_dissonance(&gateway, &BeliefCompiler::new(), "p7", "user: 你好").await;
        assert!(verdict.dissonance_detected);
        assert!(verdict.echo_room_triggered);
        assert!(verdict.event_id.unwrap().starts_with("dissonance_p7_"));
    }

    #[tokio::test]
    async fn test_dissonance_gateway_failure_never_triggers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let gateway = GatewayClient::new(GatewayConfig::default().with_base_url(server.uri()).with_api_key("k"));

        // Canned gateway replies can contain "是"; none of them may count
        for _ in 0..20 {
            let verdict = check_dissonance(&gateway, &BeliefCompiler::new(), "p1", "user: 你好").await;
            assert!(!verdict.dissonance_detected);
            assert!(!verdict.echo_room_triggered);
            assert!(verdict.event_id.is_none());
            assert_eq!(verdict.analysis, ANALYSIS_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn test_dissonance_local_mode_never_triggers() {
        let gateway = GatewayClient::new(GatewayConfig::default());
        let verdict = check_dissonance(&gateway, &BeliefCompiler::new(), "p1", "user: 是的是的").await;
        assert!(!verdict.dissonance_detected);
        assert!(verdict.event_id.is_none());
    }
}
