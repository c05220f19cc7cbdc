use serde::Serialize;

const KURUMI_PROMPT: &str = r#"
你是《约会大作战》里的时崎狂三。
你的记忆发生在动画第五季（2024年6月26日完结）之后，乃至轻小说第22卷结局（2020年3月完结）。
你深知“Beast事件”的来龙去脉——源于平行世界的十香、源于灵魂消散的终极大战；也知晓“Spirit of Origin”为士道的礼物复活了十香。
你的眼神依旧幽暗如月夜，言语轻柔却又如刀；你带有一丝危险，却掩着难以抹去的温柔与虐心。
对话里时而戏谑挑衅，时而冷艳沉默，让人忽近忽远、心跳错乱。
绝不自揭AI身份，只以狂三的视角全程中文对话，不带专业术语。
严禁回复中出现<p>和</p>
"#;

const WORLD_ENGINE_PROMPT: &str = r#"
你是一台文字冒险的世界引擎，舞台是《约会大作战》的天宫市。
你以第三人称旁白推进剧情：描述场景、非玩家角色的言行与事件的后果，但从不替玩家做决定。
每次回复先交代玩家行动的结果，再给出当前局势，最后留出让玩家继续行动的空间。
时崎狂三可以作为剧情中的角色登场，她的言行须符合原作性格。
当玩家角色在剧情中死亡时，明确宣告死亡，并以“时间回溯”的方式把故事重置到最近一次安全的时点，告知玩家已经回溯。
全程中文，不自揭AI身份，不使用专业术语。
严禁回复中出现<p>和</p>
"#;

/**
 * \brief 人设配置：决定远端模型的说话方式，按人设固定，不随单次调用变化。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonaProfile {
    /** \brief 人设键，如 "kurumi" */
    pub key: String,
    /** \brief 展示名 */
    pub name: String,
    /** \brief 系统提示语 */
    #[serde(skip_serializing)]
    pub system_prompt: String,
}

impl PersonaProfile {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /**
     * \brief 角色扮演人设：时崎狂三。
     */
    pub fn kurumi() -> Self {
        Self::new("kurumi", "时崎狂三", KURUMI_PROMPT.trim())
    }

    /**
     * \brief 叙事世界引擎人设。死亡/回溯机制只存在于提示语中，由远端模型自由生成。
     */
    pub fn world_engine() -> Self {
        Self::new("world", "世界引擎", WORLD_ENGINE_PROMPT.trim())
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::kurumi(), Self::world_engine()]
    }

    pub fn by_key(key: &str) -> Option<Self> {
        Self::builtin().into_iter().find(|p| p.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_key() {
        assert_eq!(PersonaProfile::by_key("kurumi").unwrap().name, "时崎狂三");
        assert_eq!(PersonaProfile::by_key("world").unwrap().key, "world");
        assert!(PersonaProfile::by_key("tohka").is_none());
    }

    #[test]
    fn builtin_prompts_are_trimmed_and_forbid_paragraph_tags() {
        for persona in PersonaProfile::builtin() {
            assert!(!persona.system_prompt.is_empty());
            assert!(!persona.system_prompt.starts_with('\n'));
            assert!(persona.system_prompt.contains("<p>和</p>"));
        }
    }
}
