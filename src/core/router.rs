//! NPC Router: greedy keyword-frequency classifier
//!
//! Most distinct trigger hits wins, ties go to the earlier candidate.
//! No hits → observation verbs go to the environment narrator, anything
//! else to the default NPC or a random universal role.

use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::debug;
use crate::types::{NpcRoute, RouteKind, RoutingResult, ENVIRONMENT_ID};

/// Used when there is no candidate at all
pub const LAST_RESORT_NPC: &str = "local_resident";

lazy_static! {
    // Observation verbs answered by the scene rather than an NPC
    static ref RE_OBSERVE: Regex = Regex::new(r"看向|观察|注视|打量|环顾|查看").unwrap();

    static ref RE_GIRL: Regex = Regex::new(r"小女孩|女孩").unwrap();
    static ref RE_LOOK_AROUND: Regex = Regex::new(r"环顾|四周").unwrap();
    static ref RE_BAR: Regex = Regex::new(r"吧台|柜台").unwrap();
}

/// What to do when nothing matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterFallback {
    /// Always this NPC (if it is among the candidates)
    Default(String),
    /// Uniform choice among universal roles
    RandomUniversal,
}

/// NPC router
#[derive(Debug, Clone)]
pub struct NpcRouter {
    fallback: RouterFallback,
}

impl Default for NpcRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NpcRouter {
    /// Router with random universal fallback
    pub fn new() -> Self {
        Self {
            fallback: RouterFallback::RandomUniversal,
        }
    }

    /// Router that falls back to one designated NPC
    pub fn with_default(npc_id: impl Into<String>) -> Self {
        Self {
            fallback: RouterFallback::Default(npc_id.into()),
        }
    }

    pub fn fallback(&self) -> &RouterFallback {
        &self.fallback
    }

    /// Pick an NPC id for the message. Always returns an id.
    pub fn select(&self, message: &str, candidates: &[NpcRoute]) -> String {
        let lower = message.to_lowercase();
        match best_match(&lower, candidates) {
            Some((index, _)) => candidates[index].npc_id.clone(),
            None => self.fallback_with(candidates, &mut rand::thread_rng()).0,
        }
    }

    /// Full routing decision, including environment narration
    pub fn route(&self, message: &str, candidates: &[NpcRoute]) -> RoutingResult {
        self.route_with(message, candidates, &mut rand::thread_rng())
    }

    /// `route` with an explicit random source
    pub fn route_with<R: Rng + ?Sized>(
        &self,
        message: &str,
        candidates: &[NpcRoute],
        rng: &mut R,
    ) -> RoutingResult {
        let lower = message.to_lowercase();

        if let Some((index, matched)) = best_match(&lower, candidates) {
            let npc_id = candidates[index].npc_id.clone();
            debug!(npc_id = %npc_id, hits = matched.len(), "routed by keyword");
            return RoutingResult {
                reasoning: format!("消息命中关键词 {:?}，路由到 {}", matched, npc_id),
                npc_id,
                kind: RouteKind::Matched,
                matched,
            };
        }

        if let Some(action) = RE_OBSERVE.find(&lower) {
            return RoutingResult {
                npc_id: ENVIRONMENT_ID.to_string(),
                kind: RouteKind::Environment,
                matched: vec![action.as_str().to_string()],
                reasoning: format!("检测到观察类动作\"{}\"，生成环境描述", action.as_str()),
            };
        }

        let (npc_id, reasoning) = self.fallback_with(candidates, rng);
        debug!(npc_id = %npc_id, "routed by fallback");
        RoutingResult {
            npc_id,
            kind: RouteKind::Fallback,
            matched: Vec::new(),
            reasoning,
        }
    }

    fn fallback_with<R: Rng + ?Sized>(&self, candidates: &[NpcRoute], rng: &mut R) -> (String, String) {
        if let RouterFallback::Default(id) = &self.fallback {
            if candidates.iter().any(|c| &c.npc_id == id) {
                return (id.clone(), format!("未命中任何关键词，使用默认角色 {}", id));
            }
        }

        let universal: Vec<&NpcRoute> = candidates.iter().filter(|c| c.universal).collect();
        if let Some(pick) = universal.choose(rng) {
            return (
                pick.npc_id.clone(),
                format!("未命中任何关键词，随机选择通用角色 {}", pick.npc_id),
            );
        }

        match candidates.first() {
            Some(first) => (first.npc_id.clone(), format!("未命中任何关键词，使用首个角色 {}", first.npc_id)),
            None => (LAST_RESORT_NPC.to_string(), "没有可用角色，使用当地居民".to_string()),
        }
    }
}

/// Index of the candidate with the most distinct trigger hits, and those hits
fn best_match(lower_message: &str, candidates: &[NpcRoute]) -> Option<(usize, Vec<String>)> {
    let mut best: Option<(usize, Vec<String>)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let matched = matched_triggers(lower_message, &candidate.triggers);
        if matched.is_empty() {
            continue;
        }
        // Strictly greater keeps the earlier candidate on ties
        let better = best.as_ref().map_or(true, |(_, hits)| matched.len() > hits.len());
        if better {
            best = Some((index, matched));
        }
    }

    best
}

fn matched_triggers(lower_message: &str, triggers: &[String]) -> Vec<String> {
    let mut matched: Vec<String> = Vec::new();
    for trigger in triggers {
        let trigger = trigger.trim().to_lowercase();
        if trigger.is_empty() || matched.contains(&trigger) {
            continue;
        }
        if lower_message.contains(&trigger) {
            matched.push(trigger);
        }
    }
    matched
}

/// Fixed scene narration for observation actions
pub fn describe_environment(action: &str) -> &'static str {
    if RE_GIRL.is_match(action) {
        "酒馆角落坐着一个约十岁的小女孩，她怯生生地抱着一个破旧的布娃娃，时不时偷偷看向客人们。\
         她的衣服虽然朴素但很干净，眼中带着超越年龄的警觉。"
    } else if RE_LOOK_AROUND.is_match(action) {
        "昏暗的灯光下，酒馆展现出它独特的氛围。厚重的木制桌椅散发着岁月的痕迹，墙上挂着发黄的地图和船舶模型。\
         空气中弥漫着酒精、烟草和木材的混合味道。几位常客各自坐在熟悉的位置，低声交谈着。"
    } else if RE_BAR.is_match(action) {
        "吧台用深色橡木制成，表面被擦得锃亮。背后的酒架上摆满了各式酒瓶，从廉价的麦酒到昂贵的威士忌应有尽有。\
         酒保正熟练地擦拭着玻璃杯，偶尔抬头观察客人们的需求。"
    } else {
        "你仔细观察着周围的环境。酒馆虽然不大，但每个角落都有着自己的故事。\
         烛光摇曳，投下变幻的阴影，让这个地方充满了神秘的气息。"
    }
}

// =============================================================================
// TESTS
// =============================================================================
