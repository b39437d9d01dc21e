//! Belief Compiler: turns a belief record into a system prompt
//!
//! Section order is fixed: identity, worldview, selfview, values,
//! interaction patterns, guidance, scene + context. Missing or malformed
//! records never fail, they produce the generic fallback prompt.

use tracing::{debug, warn};
use crate::types::{
    BeliefCategory, BeliefSystem, ConversationContext, ConversationTurn, NpcProfile,
    CONTEXT_TURNS,
};

/// Rendered instead of history when there is none
pub const FIRST_CONVERSATION: &str = "这是你们的第一次对话。";

/// Turns the echo room looks back over
pub const ECHO_HISTORY_TURNS: usize = 8;

const ROLEPLAY_GUIDANCE: &str = "# 角色扮演指导
1. 严格按照上述信念系统行动和反应
2. 信念强度越高，坚持程度越强烈
3. 遇到冲突时，根据信念优先级做出选择
4. 保持角色的一致性和真实性
5. 用第一人称回应，仿佛你真的是这个角色

# 回应格式
用简洁自然的对话回应，体现角色的个性和信念。不要直接说出信念内容，而是通过行为和态度体现。
";

/// Belief compiler
#[derive(Debug, Default, Clone, Copy)]
pub struct BeliefCompiler;

impl BeliefCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a belief record into a system prompt
    pub fn compile(
        &self,
        npc_id: &str,
        belief: Option<&BeliefSystem>,
        context: &ConversationContext,
    ) -> String {
        let Some(belief) = belief else {
            debug!(npc_id, "no belief record, using fallback prompt");
            return self.fallback_prompt(npc_id);
        };
        if let Err(defect) = belief.validate() {
            warn!(npc_id, %defect, "malformed belief record, using fallback prompt");
            return self.fallback_prompt(npc_id);
        }

        let mut prompt = String::new();

        // Identity header
        prompt.push_str("# 角色设定\n");
        prompt.push_str(&format!(
            "你是 {}，{}。\n",
            belief.name,
            belief.role.as_deref().unwrap_or("神秘人物")
        ));
        prompt.push_str(&format!(
            "核心动机：{}\n\n",
            belief.core_motivation.as_deref().unwrap_or("寻找自己的道路")
        ));

        prompt.push_str("# 信念系统\n你的行为完全由以下信念系统驱动：\n");
        for category in BeliefCategory::ALL {
            prompt.push('\n');
            prompt.push_str(category.heading());
            prompt.push('\n');
            for (name, entry) in belief.category(category) {
                prompt.push_str(&format!(
                    "- {} ({:.2}): {}\n",
                    name, entry.strength, entry.description
                ));
            }
        }

        prompt.push_str("\n# 交互模式\n");
        for (label, value) in belief.interaction_patterns.lines() {
            prompt.push_str(&format!("- {}：{}\n", label, value));
        }

        prompt.push('\n');
        prompt.push_str(ROLEPLAY_GUIDANCE);
        prompt.push('\n');
        prompt.push_str(&self.scene_block(context));

        prompt
    }

    /// Compile whatever a profile has: beliefs, then persona, then fallback
    pub fn compile_profile(&self, profile: &NpcProfile, context: &ConversationContext) -> String {
        let usable_belief = profile.belief.as_ref().filter(|b| b.validate().is_ok());
        match (usable_belief, profile.persona.as_deref()) {
            (Some(belief), _) => self.compile(&profile.id, Some(belief), context),
            (None, Some(persona)) => self.persona_prompt(persona, context),
            (None, None) => self.compile(&profile.id, profile.belief.as_ref(), context),
        }
    }

    /// Prompt for generic roles that only carry a one-line persona
    pub fn persona_prompt(&self, persona: &str, context: &ConversationContext) -> String {
        format!(
            "{}\n\n你在{}中。请用第一人称自然回应，保持角色特点。\n\n{}",
            persona.trim(),
            context.scene.name,
            self.scene_block(context)
        )
    }

    /// Generic prompt naming only the NPC id
    pub fn fallback_prompt(&self, npc_id: &str) -> String {
        format!(
            "你是Helios世界中的一个角色（ID: {}）。\n\
             你身处酒馆中，这里聚集着各种旅人和本地人。\n\
             请用简洁自然的方式回应对话，展现出独特的个性。\n",
            npc_id
        )
    }

    /// Speaker prompt extended with what the speaker knows of the listener
    pub fn dialogue_prompt(
        &self,
        speaker: &NpcProfile,
        listener: &NpcProfile,
        context: &ConversationContext,
    ) -> String {
        let motivation = listener
            .belief
            .as_ref()
            .and_then(|b| b.core_motivation.as_deref())
            .unwrap_or("未知");
        let role = if listener.role.is_empty() { "未知" } else { listener.role.as_str() };

        format!(
            "{}\n# 当前对话\n你正在与 {} 交谈。\n对方的已知特征：\n- 职业：{}\n- 核心动机：{}\n\
             请基于你的信念系统来回应。考虑对方的背景，但始终保持你自己的观点和语言风格。\n",
            self.compile_profile(speaker, context),
            listener.name,
            role,
            motivation
        )
    }

    /// Echo room prompt over the player's recent history
    pub fn echo_prompt(&self, history: &[ConversationTurn], confusion: Option<&str>, event_id: Option<&str>) -> String {
        let start = history.len().saturating_sub(ECHO_HISTORY_TURNS);
        let mut transcript = String::new();
        for turn in &history[start..] {
            let speaker = if turn.is_user() {
                "我"
            } else {
                turn.speaker_name.as_deref().unwrap_or("NPC")
            };
            transcript.push_str(&format!("{}: {}\n", speaker, turn.text));
        }
        if transcript.is_empty() {
            transcript.push_str(FIRST_CONVERSATION);
            transcript.push('\n');
        }

        let mut prompt = String::from(
            "你是Helios世界中的意识探索引导者，回响之室的声音。\n\
             你的任务是帮助玩家理解他们的内在动机和信念如何影响了现实。\n\n\
             基于以下对话历史，生成一个主观的、内省的归因解释：\n\
             1. 从第一人称视角描述\n\
             2. 强调玩家的思想/期待如何\"创造\"了这个结果\n\
             3. 提供1-2个支持性的\"记忆证据\"\n\
             4. 风格：深刻、哲学性、略带神秘\n\n",
        );
        if let Some(event_id) = event_id {
            prompt.push_str(&format!("触发事件：{}\n", event_id));
        }
        if let Some(confusion) = confusion {
            prompt.push_str(&format!("玩家的困惑：{}\n", confusion));
        }
        prompt.push_str(&format!("\n对话历史：\n{}", transcript));
        prompt
    }

    /// Instructions for the dissonance analysis call
    pub fn dissonance_prompt(&self) -> &'static str {
        "作为认知心理学家，分析以下对话，寻找认知失调的迹象：\n\n\
         认知失调的标志包括：\n\
         1. 矛盾的陈述或行为\n\
         2. 价值观与行动不一致\n\
         3. 新信息与既有信念冲突\n\
         4. 情绪反应与逻辑推理不符\n\n\
         请分析对话并回答：是否检测到认知失调？\n\n\
         回复格式：\n\
         检测结果：是/否\n\
         原因：[如果检测到，说明具体原因]\n"
    }

    /// Trailing scene and history block
    fn scene_block(&self, context: &ConversationContext) -> String {
        format!(
            "当前场景：{}\n{}",
            context.scene.description,
            self.render_context(context)
        )
    }

    /// Recent turns, or the first-conversation sentinel
    pub fn render_context(&self, context: &ConversationContext) -> String {
        if context.is_first_conversation() {
            return format!("{}\n", FIRST_CONVERSATION);
        }

        let mut block = String::from("最近的对话：\n");
        for turn in context.recent(CONTEXT_TURNS) {
            let speaker = if turn.is_user() { "玩家" } else { "你" };
            block.push_str(&format!("{}: {}\n", speaker, turn.text));
        }
        block
    }
}

// =============================================================================
// TESTS
// =============================================================================
