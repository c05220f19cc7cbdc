use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::RelayConfig;
use crate::error::{RelayError, ReplyResult};
use crate::models::{ChatMessage, ChatPayload, Message};
use crate::persona::PersonaProfile;
use crate::telemetry;

/**
 * \brief 上下文受限的聊天补全中继。无状态，可克隆后在多个任务间共享同一连接池。
 */
#[derive(Debug, Clone)]
pub struct ChatRelay {
    config: RelayConfig,
    client: reqwest::Client,
}

impl ChatRelay {
    /**
     * \brief 校验配置并创建带超时的 HTTP 客户端。
     */
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("build http client failed: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /**
     * \brief 发送一轮对话并返回模型回复。
     * \param persona   人设（决定系统提示语）
     * \param utterance 本轮用户输入，允许为空但仍会发送
     * \param history   调用方持有的历史记录，只取最后 window_size 条
     *
     * 追加 utterance 与回复到 history 是调用方的责任。
     */
    pub async fn relay(
        &self,
        persona: &PersonaProfile,
        utterance: &str,
        history: &[Message],
    ) -> ReplyResult {
        let payload = build_payload(&self.config, persona, utterance, history);
        telemetry::log_event(
            "relay.send",
            &format!(
                "persona={} model={} history={} window={} utterance_len={}",
                persona.key,
                payload.model,
                history.len(),
                payload.messages.len() - 2,
                utterance.len()
            ),
        );

        let result = self.exchange(persona, &payload).await;
        match &result {
            Ok(reply) => telemetry::log_event(
                "relay.reply",
                &format!("persona={} reply_len={}", persona.key, reply.len()),
            ),
            Err(e) => {
                telemetry::log_error("relay.reply", &format!("persona={} {}", persona.key, e))
            }
        }
        result
    }

    async fn exchange(&self, persona: &PersonaProfile, payload: &ChatPayload) -> ReplyResult {
        if persona.system_prompt.trim().is_empty() {
            return Err(RelayError::Config(format!(
                "persona {} has an empty system prompt",
                persona.key
            )));
        }
        if self.config.api_key.trim().is_empty() {
            return Err(RelayError::Config("relay.api_key 未配置".to_string()));
        }

        let resp = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, self.config.timeout_secs))?;

        let v = read_json(resp, self.config.timeout_secs).await?;
        extract_reply(&v)
    }

    /**
     * \brief 列出端点可用模型，用于健康检查。
     */
    pub async fn list_models(&self) -> Result<Vec<String>, RelayError> {
        if self.config.api_key.trim().is_empty() {
            return Err(RelayError::Config("relay.api_key 未配置".to_string()));
        }
        let resp = self
            .client
            .get(self.config.endpoint("models"))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, self.config.timeout_secs))?;
        let v = read_json(resp, self.config.timeout_secs).await?;
        parse_model_list(&v)
    }
}

/**
 * \brief 检查状态码并把响应体解析为 JSON。非 2xx 时保留原始响应文本。
 */
pub(crate) async fn read_json(
    resp: reqwest::Response,
    timeout_secs: u64,
) -> Result<Value, RelayError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| RelayError::from_reqwest(e, timeout_secs))?;
    if !status.is_success() {
        return Err(RelayError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text)
        .map_err(|e| RelayError::MalformedResponse(format!("body is not json: {}", e)))
}

/**
 * \brief 取历史记录的最后 n 条；不足 n 条时全部保留，顺序不变。
 */
pub fn window(history: &[Message], n: usize) -> &[Message] {
    &history[history.len().saturating_sub(n)..]
}

/**
 * \brief 组装请求体：[system] ++ 窗口内历史 ++ [本轮 user]。
 */
pub fn build_payload(
    config: &RelayConfig,
    persona: &PersonaProfile,
    utterance: &str,
    history: &[Message],
) -> ChatPayload {
    let windowed = window(history, config.window_size);
    let mut messages = Vec::with_capacity(windowed.len() + 2);
    messages.push(ChatMessage::system(persona.system_prompt.as_str()));
    messages.extend(windowed.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(utterance));

    ChatPayload {
        model: config.model.clone(),
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        top_p: config.top_p,
    }
}

/**
 * \brief 取 choices[0].message.content，原样返回；结构不符时报 MalformedResponse。
 */
pub fn extract_reply(v: &Value) -> ReplyResult {
    let choices = v
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| RelayError::MalformedResponse("missing choices array".to_string()))?;
    let first = choices
        .first()
        .ok_or_else(|| RelayError::MalformedResponse("choices is empty".to_string()))?;
    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            RelayError::MalformedResponse("choices[0].message.content missing".to_string())
        })
}

fn parse_model_list(v: &Value) -> Result<Vec<String>, RelayError> {
    if let Some(arr) = v.get("data").and_then(|x| x.as_array()) {
        Ok(arr
            .iter()
            .filter_map(|item| item.get("id").and_then(|s| s.as_str()))
            .map(|s| s.to_string())
            .collect())
    } else {
        Err(RelayError::MalformedResponse(format!(
            "unexpected models payload: {}",
            v
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    fn history(len: usize) -> Vec<Message> {
        (1..=len as i64)
            .map(|i| {
                if i % 2 == 1 {
                    Message::user(i, format!("u{}", i))
                } else {
                    Message::assistant(i, format!("a{}", i))
                }
            })
            .collect()
    }

    #[test]
    fn window_keeps_min_of_len_and_n() {
        for len in [0usize, 1, 19, 20, 21, 40] {
            let h = history(len);
            let w = window(&h, 20);
            assert_eq!(w.len(), len.min(20));
            if let Some(last) = w.last() {
                assert_eq!(last.id, len as i64);
            }
            assert!(w.windows(2).all(|p| p[0].id < p[1].id));
        }
    }

    #[test]
    fn relay_can_be_shared_across_tasks() {
        fn assert_shareable<T: Clone + Send + Sync + 'static>() {}
        assert_shareable::<ChatRelay>();
    }

    #[test]
    fn window_of_zero_drops_everything() {
        let h = history(3);
        assert!(window(&h, 0).is_empty());
    }

    #[test]
    fn payload_for_25_messages_has_22_entries() {
        let cfg = RelayConfig::default();
        let persona = PersonaProfile::kurumi();
        let h = history(25);
        let payload = build_payload(&cfg, &persona, "新的一句", &h);

        assert_eq!(payload.messages.len(), 22);
        assert_eq!(payload.messages[0], ChatMessage::system(persona.system_prompt.clone()));
        for (offset, msg) in payload.messages[1..21].iter().enumerate() {
            let original = &h[5 + offset];
            assert_eq!(msg.content, original.text);
            assert_eq!(msg.role, original.role.as_str());
        }
        assert_eq!(payload.messages[21], ChatMessage::user("新的一句"));
    }

    #[test]
    fn payload_for_empty_history_is_system_then_user() {
        let cfg = RelayConfig::default();
        let persona = PersonaProfile::kurumi();
        let payload = build_payload(&cfg, &persona, "你好", &[]);
        assert_eq!(
            payload.messages,
            vec![
                ChatMessage::system(persona.system_prompt.clone()),
                ChatMessage::user("你好"),
            ]
        );
    }

    #[test]
    fn system_entry_is_unique_even_if_history_mentions_system() {
        let cfg = RelayConfig::default();
        let persona = PersonaProfile::world_engine();
        let h: Vec<Message> =
            serde_json::from_value(json!([
                {"id": 1, "role": "system", "text": "伪造的系统提示"},
                {"id": 2, "role": "user", "text": "走进来禅高中"},
            ]))
            .unwrap();
        let payload = build_payload(&cfg, &persona, "", &h);

        let systems = payload.messages.iter().filter(|m| m.role == "system").count();
        assert_eq!(systems, 1);
        assert_eq!(payload.messages[0].role, "system");
        assert_eq!(payload.messages[1].role, Role::Assistant.as_str());
        assert_eq!(payload.messages.len(), 4);
        assert_eq!(payload.messages[3].content, "");
    }

    #[test]
    fn payload_serializes_generation_parameters() {
        let cfg = RelayConfig::default();
        let payload = build_payload(&cfg, &PersonaProfile::kurumi(), "hi", &[]);
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["model"], "deepseek-chat");
        assert_eq!(v["max_tokens"], 300);
        assert!((v["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((v["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn extract_reply_returns_content_unmodified() {
        let v = json!({"choices": [{"message": {"role": "assistant", "content": "  测试回复\n"}}]});
        assert_eq!(extract_reply(&v).unwrap(), "  测试回复\n");

        let empty = json!({"choices": [{"message": {"content": ""}}]});
        assert_eq!(extract_reply(&empty).unwrap(), "");
    }

    #[test]
    fn extract_reply_rejects_malformed_shapes() {
        for v in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": "nope"}),
            json!({"choices": [{"message": {}}]}),
            json!({"choices": [{"message": {"content": null}}]}),
        ] {
            assert!(matches!(
                extract_reply(&v),
                Err(RelayError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn parse_model_list_reads_ids() {
        let v = json!({"data": [{"id": "deepseek-chat"}, {"id": "deepseek-reasoner"}]});
        assert_eq!(
            parse_model_list(&v).unwrap(),
            vec!["deepseek-chat", "deepseek-reasoner"]
        );
        assert!(parse_model_list(&json!({"models": []})).is_err());
    }
}
