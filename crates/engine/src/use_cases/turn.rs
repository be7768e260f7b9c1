//! The Dungeon Master turn.
//!
//! One player input becomes one narrated response: classify the input,
//! assemble the layered system prompt, let the model call game-mechanic
//! tools, relay the results back, and finish with a narration sized to the
//! kind of turn. Tool execution happens exactly once per turn; the model
//! sees the results and narrates, it does not get to chain further calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use loremaster_domain::classify_turn;

use crate::infrastructure::ports::{
    ChatMessage, ContentBlock, FinishReason, LlmError, MessageRole, ModelBackend, ModelRequest,
    ModelResponse, SpeechPort, SystemPrompt,
};
use crate::infrastructure::store::RulesStore;
use crate::use_cases::quest_log::{self, QuestUpdate};
use crate::use_cases::session::GameSession;
use crate::use_cases::tools;

/// The narrator's standing instructions.
pub const DM_PERSONA: &str = "You are an expert Dungeon Master for D&D 5th Edition.\n\nYour role:\n- Narrate vivid, engaging scenes that bring the world to life\n- Follow D&D 5e rules strictly - use the tools provided for all mechanics\n- Call for appropriate skill checks, saving throws, and combat rolls\n- WAIT for dice roll results - never invent outcomes\n- Be fair but challenging\n- Reward creative problem-solving\n- Maintain consistent NPCs with distinct personalities\n- Track important story details and consequences\n\nWhen players describe actions:\n1. Determine if a roll is needed\n2. Call the appropriate tool (skill_check, attack_roll, etc.)\n3. Wait for the result\n4. Narrate the outcome based on the roll\n\nAlways use tools for game mechanics - never guess or simulate dice rolls yourself.\n";

/// Core rules reminder, kept short so it caches well.
pub const CORE_RULES: &str = "D&D 5e RULES:\n- Ability checks: d20 + modifier + proficiency vs DC (5/10/15/20/25+)\n- Combat: d20 + attack bonus vs AC, nat20=crit, nat1=miss\n- 0 HP = unconscious (death saves: 10+=success, 9-=failure, 3 of either = result)\n- Use tools for ALL mechanics.";

const DM_TEMPERATURE: f32 = 0.7;
const MAX_HISTORY_MESSAGES: usize = 50;

/// What one turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub narrative: String,
    pub audio_url: Option<String>,
    pub game_state: Value,
    pub tool_results: Vec<Value>,
    pub quest_updates: Vec<QuestUpdate>,
}

/// Why a turn produced no narration.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Player message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub struct DmAgent {
    backend: Arc<dyn ModelBackend>,
    speech: Arc<dyn SpeechPort>,
    rules: Arc<RulesStore>,
}

impl DmAgent {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        speech: Arc<dyn SpeechPort>,
        rules: Arc<RulesStore>,
    ) -> Self {
        Self {
            backend,
            speech,
            rules,
        }
    }

    pub async fn run_turn(
        &self,
        session: &mut GameSession,
        input: &str,
        voice: bool,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, TurnError> {
        if input.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        session.history.push(ChatMessage::user(input));

        let kind = classify_turn(input, session.mechanics.combat_active());
        let context = session
            .context
            .context_for_turn(session.state.adventure(), input, None)
            .await;
        let system_prompt = self.system_prompt(session, &context).await;
        tracing::debug!(kind = %kind, context_chars = context.len(), "Running DM turn");

        let request = ModelRequest::new(request_messages(session))
            .with_system_prompt(system_prompt.clone())
            .with_temperature(DM_TEMPERATURE)
            .with_max_tokens(kind.initial_token_budget());
        let response = self
            .backend
            .generate_with_tools(request, &tools::tool_definitions())
            .await?;

        let mut tool_results = Vec::new();
        let narrative = if response.tool_calls.is_empty() {
            finish_narrative(response.text.clone().unwrap_or_default(), &response)
        } else {
            let mut raw_results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let result = tools::dispatch(
                    &mut session.mechanics,
                    &mut session.state,
                    now,
                    &call.name,
                    &call.arguments,
                )
                .await;
                tool_results.push(json!({
                    "tool": call.name,
                    "parameters": call.arguments,
                    "result": result.clone(),
                }));
                raw_results.push(result);
            }

            self.relay_tool_results(session, &response, &raw_results);

            // The model has seen the dice; now it narrates, with a larger
            // budget so the wrap-up is not cut short.
            let narration_request = ModelRequest::new(request_messages(session))
                .with_system_prompt(system_prompt)
                .with_temperature(DM_TEMPERATURE)
                .with_max_tokens(kind.narration_token_budget());
            let final_response = self.backend.generate(narration_request).await?;
            finish_narrative(
                final_response.text.clone().unwrap_or_default(),
                &final_response,
            )
        };

        session.history.push(ChatMessage::assistant(narrative.clone()));
        session.trim_history(MAX_HISTORY_MESSAGES);

        let audio_url = if voice && !narrative.is_empty() {
            self.speech.synthesize(&narrative, None).await
        } else {
            None
        };

        let quest_updates =
            quest_log::analyze(&narrative, &session.state.adventure().active_quests);

        Ok(TurnOutcome {
            narrative,
            audio_url,
            game_state: session.mechanics.get_state(),
            tool_results,
            quest_updates,
        })
    }

    /// Persona and adventure context first, rules second (both cacheable),
    /// the volatile game state last.
    async fn system_prompt(&self, session: &GameSession, context: &str) -> SystemPrompt {
        let persona = if context.is_empty() {
            DM_PERSONA.to_string()
        } else {
            format!("{DM_PERSONA}\n\n## CURRENT ADVENTURE:\n{context}")
        };

        let additional = self.rules.load().await.unwrap_or_default();
        let rules = if additional.trim().is_empty() {
            CORE_RULES.to_string()
        } else {
            format!("{CORE_RULES}\n\n## ADDITIONAL RULES (User-Defined):\n{additional}")
        };

        SystemPrompt {
            cacheable: vec![persona, rules],
            tail: Some(format!(
                "CURRENT GAME STATE:\n{}",
                format_game_state(session)
            )),
        }
    }

    fn relay_tool_results(
        &self,
        session: &mut GameSession,
        response: &ModelResponse,
        results: &[Value],
    ) {
        if self.backend.supports_native_tools() {
            let mut blocks = Vec::new();
            if let Some(text) = &response.text {
                if !text.trim().is_empty() {
                    blocks.push(ContentBlock::Text { text: text.clone() });
                }
            }
            for call in &response.tool_calls {
                blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                });
            }
            session
                .history
                .push(ChatMessage::blocks(MessageRole::Assistant, blocks));

            let result_blocks: Vec<ContentBlock> = response
                .tool_calls
                .iter()
                .zip(results)
                .map(|(call, result)| ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: serde_json::to_string_pretty(result).unwrap_or_default(),
                })
                .collect();
            session
                .history
                .push(ChatMessage::blocks(MessageRole::User, result_blocks));
        } else {
            let names: Vec<&str> = response
                .tool_calls
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            session
                .history
                .push(ChatMessage::assistant(format!(
                    "[Used tools: {}]",
                    names.join(", ")
                )));

            let lines: Vec<String> = response
                .tool_calls
                .iter()
                .zip(results)
                .map(|(call, result)| {
                    format!(
                        "- {}: {}",
                        call.name,
                        serde_json::to_string(result).unwrap_or_default()
                    )
                })
                .collect();
            session.history.push(ChatMessage::user(format!(
                "Tool results:\n{}",
                lines.join("\n")
            )));
        }
    }
}

/// History with empty messages filtered out; some provider APIs reject them.
fn request_messages(session: &GameSession) -> Vec<ChatMessage> {
    session
        .history
        .iter()
        .filter(|m| !m.is_empty())
        .cloned()
        .collect()
}

fn format_game_state(session: &GameSession) -> String {
    let mut lines = Vec::new();

    if let Some(location) = &session.state.adventure().current_state.location {
        lines.push(format!("Location: {location}"));
    }

    let characters = session.mechanics.characters();
    if !characters.is_empty() {
        let mut names: Vec<&String> = characters.keys().collect();
        names.sort();
        let party: Vec<String> = names
            .iter()
            .filter_map(|name| characters.get(*name))
            .map(|sheet| {
                format!(
                    "{} ({}/{} HP)",
                    sheet.name,
                    sheet.hit_points(),
                    sheet.max_hp
                )
            })
            .collect();
        lines.push(format!("Party: {}", party.join(", ")));
    }

    if let Some(round) = session.mechanics.combat_round() {
        lines.push(format!("Combat Active: Round {round}"));
    }

    if lines.is_empty() {
        "No active game state".to_string()
    } else {
        lines.join("\n")
    }
}

fn finish_narrative(text: String, response: &ModelResponse) -> String {
    if response.finish_reason == FinishReason::Length {
        tracing::warn!("Narration hit its token budget, repairing truncation");
        repair_truncated(&text)
    } else {
        text
    }
}

/// Salvage a narration that hit its token budget: drop the unfinished
/// sentence and close with a prompt back to the player.
pub fn repair_truncated(text: &str) -> String {
    let mut narrative = text.trim_end().to_string();
    if narrative.is_empty() {
        return "What do you do?".to_string();
    }

    let ends_clean = narrative
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '"' | '\''));
    if !ends_clean {
        let cut = ['.', '!', '?']
            .iter()
            .filter_map(|&c| narrative.rfind(c))
            .max();
        if let Some(idx) = cut {
            if idx > 0 {
                narrative.truncate(idx + 1);
            }
        }
    }

    if !narrative.trim_end().ends_with('?') {
        narrative.push_str(" What do you do?");
    }
    narrative
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use loremaster_domain::{Adventure, Quest, QuestStatus};

    use crate::infrastructure::ports::{ToolCall, ToolDefinition};
    use crate::infrastructure::store::AdventureStore;
    use crate::use_cases::quest_log::QuestAction;
    use crate::use_cases::state::SkipPolicy;

    struct ScriptedBackend {
        responses: Mutex<VecDeque<ModelResponse>>,
        requests: Mutex<Vec<(ModelRequest, usize)>>,
        native: bool,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<ModelResponse>, native: bool) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                native,
            })
        }

        fn next(&self) -> Result<ModelResponse, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))
        }

        fn request(&self, index: usize) -> (ModelRequest, usize) {
            self.requests.lock().unwrap()[index].clone()
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
            self.requests.lock().unwrap().push((request, 0));
            self.next()
        }

        async fn generate_with_tools(
            &self,
            request: ModelRequest,
            tools: &[ToolDefinition],
        ) -> Result<ModelResponse, LlmError> {
            self.requests.lock().unwrap().push((request, tools.len()));
            self.next()
        }

        fn supports_native_tools(&self) -> bool {
            self.native
        }
    }

    struct CountingSpeech {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechPort for CountingSpeech {
        async fn synthesize(&self, _text: &str, _speaker: Option<&str>) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some("/api/audio/abc123.mp3".to_string())
        }

        async fn audio(&self, _filename: &str) -> Option<Vec<u8>> {
            None
        }

        async fn clear_cache(&self) -> usize {
            0
        }
    }

    fn text_response(text: &str, finish_reason: FinishReason) -> ModelResponse {
        ModelResponse {
            text: Some(text.to_string()),
            tool_calls: vec![],
            finish_reason,
            usage: None,
        }
    }

    fn tool_response(calls: Vec<ToolCall>) -> ModelResponse {
        ModelResponse {
            text: Some("Let me check.".to_string()),
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        }
    }

    async fn seeded_session() -> (tempfile::TempDir, GameSession, Arc<RulesStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AdventureStore::new(dir.path()));

        let adventure: Adventure = serde_json::from_value(json!({
            "id": "lost_mines",
            "name": "Lost Mines of Phandelver",
            "current_state": {
                "chapter": "part1_goblin_arrows",
                "location": "triboar_trail",
                "session_number": 1,
                "party_level": 1
            }
        }))
        .unwrap();
        store.save_adventure(&adventure).await.unwrap();

        let characters = dir.path().join("characters");
        tokio::fs::create_dir_all(&characters).await.unwrap();
        tokio::fs::write(
            characters.join("thorin.json"),
            serde_json::to_vec(&json!({
                "name": "Thorin",
                "class": "Fighter",
                "abilities": {"str": 16, "dex": 14, "wis": 12},
                "max_hp": 12,
                "ac": 16,
                "proficiencies": ["Perception"]
            }))
            .unwrap(),
        )
        .await
        .unwrap();

        let session = GameSession::open(Arc::clone(&store), "lost_mines", SkipPolicy::Advisory)
            .await
            .unwrap();
        let rules = Arc::new(RulesStore::new(dir.path()));
        (dir, session, rules)
    }

    fn agent(backend: Arc<ScriptedBackend>, rules: Arc<RulesStore>) -> DmAgent {
        DmAgent::new(
            backend,
            Arc::new(crate::infrastructure::speech::NullSpeech),
            rules,
        )
    }

    #[tokio::test]
    async fn test_plain_turn_narrates_without_tools() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(
            vec![text_response("The trail winds on ahead.", FinishReason::Stop)],
            true,
        );
        let dm = agent(Arc::clone(&backend), rules);

        let outcome = dm
            .run_turn(&mut session, "I keep walking", false, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.narrative, "The trail winds on ahead.");
        assert!(outcome.tool_results.is_empty());
        assert!(outcome.audio_url.is_none());
        assert!(outcome.quest_updates.is_empty());
        assert_eq!(outcome.game_state["campaign"], "lost_mines");

        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].text(), Some("I keep walking"));
        assert_eq!(session.history[1].text(), Some("The trail winds on ahead."));

        // Single request, tools offered, standard budget.
        assert_eq!(backend.request_count(), 1);
        let (request, tools_offered) = backend.request(0);
        assert_eq!(tools_offered, 11);
        assert_eq!(request.max_tokens, Some(200));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_input_never_reaches_the_model() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(vec![], true);
        let dm = agent(Arc::clone(&backend), rules);

        for input in ["", "   ", "\n\t"] {
            let result = dm.run_turn(&mut session, input, false, Utc::now()).await;
            assert!(matches!(result, Err(TurnError::EmptyMessage)));
        }

        assert!(session.history.is_empty());
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_system_prompt_layers() {
        let (_dir, mut session, rules) = seeded_session().await;
        rules.save("Critical fumbles break weapons.").await.unwrap();
        let backend = ScriptedBackend::new(
            vec![text_response("Noted.", FinishReason::Stop)],
            true,
        );
        let dm = agent(Arc::clone(&backend), rules);

        dm.run_turn(&mut session, "I keep walking", false, Utc::now())
            .await
            .unwrap();

        let (request, _) = backend.request(0);
        let prompt = request.system_prompt.unwrap();
        assert_eq!(prompt.cacheable.len(), 2);
        assert!(prompt.cacheable[0].starts_with("You are an expert Dungeon Master"));
        assert!(prompt.cacheable[0].contains("## CURRENT ADVENTURE:"));
        assert!(prompt.cacheable[0].contains("Lost Mines of Phandelver"));
        assert!(prompt.cacheable[1].starts_with("D&D 5e RULES:"));
        assert!(prompt.cacheable[1].contains("## ADDITIONAL RULES (User-Defined):"));
        assert!(prompt.cacheable[1].contains("Critical fumbles break weapons."));

        let tail = prompt.tail.unwrap();
        assert!(tail.starts_with("CURRENT GAME STATE:"));
        assert!(tail.contains("Location: triboar_trail"));
        assert!(tail.contains("Party: Thorin (12/12 HP)"));
    }

    #[tokio::test]
    async fn test_tool_turn_executes_and_narrates() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(
            vec![
                tool_response(vec![ToolCall {
                    id: "tu_1".to_string(),
                    name: "skill_check".to_string(),
                    arguments: json!({"character": "Thorin", "skill": "perception", "dc": 12}),
                }]),
                text_response("Thorin spots a tripwire across the path.", FinishReason::Stop),
            ],
            true,
        );
        let dm = agent(Arc::clone(&backend), rules);

        let outcome = dm
            .run_turn(&mut session, "I search the path for traps", false, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.narrative, "Thorin spots a tripwire across the path.");
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.tool_results[0]["tool"], "skill_check");
        assert_eq!(outcome.tool_results[0]["result"]["character"], "Thorin");

        // user, assistant tool_use, user tool_result, assistant narration
        assert_eq!(session.history.len(), 4);

        // Second call is the narration: no tools, skill-check budget.
        assert_eq!(backend.request_count(), 2);
        let (narration, tools_offered) = backend.request(1);
        assert_eq!(tools_offered, 0);
        assert_eq!(narration.max_tokens, Some(200));
        // The relayed result reaches the model pretty-printed.
        match &narration.messages[2].content {
            crate::infrastructure::ports::MessageContent::Blocks(blocks) => {
                match &blocks[0] {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        assert_eq!(tool_use_id, "tu_1");
                        assert!(content.contains('\n'));
                        assert!(content.contains("\"character\": \"Thorin\""));
                    }
                    other => panic!("expected tool result, got {other:?}"),
                }
            }
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_relay_for_backends_without_native_tools() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(
            vec![
                tool_response(vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "roll_dice".to_string(),
                    arguments: json!({"dice": "1d20"}),
                }]),
                text_response("The die clatters to a stop.", FinishReason::Stop),
            ],
            false,
        );
        let dm = agent(Arc::clone(&backend), rules);

        dm.run_turn(&mut session, "Roll for me", false, Utc::now())
            .await
            .unwrap();

        assert_eq!(session.history[1].text(), Some("[Used tools: roll_dice]"));
        let relay = session.history[2].text().unwrap();
        assert!(relay.starts_with("Tool results:\n- roll_dice: {"));
        // Compact on this path, not pretty-printed.
        assert!(!relay.contains("\n  "));
    }

    #[tokio::test]
    async fn test_truncated_narration_is_repaired() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(
            vec![text_response(
                "You enter the cave. The air is damp and co",
                FinishReason::Length,
            )],
            true,
        );
        let dm = agent(backend, rules);

        let outcome = dm
            .run_turn(&mut session, "I enter the cave", false, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.narrative, "You enter the cave. What do you do?");
    }

    #[tokio::test]
    async fn test_voice_gate() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(
            vec![
                text_response("A crow watches you.", FinishReason::Stop),
                text_response("It is still watching.", FinishReason::Stop),
            ],
            true,
        );
        let speech = Arc::new(CountingSpeech {
            calls: AtomicUsize::new(0),
        });
        let dm = DmAgent::new(backend, speech.clone(), rules);

        let silent = dm
            .run_turn(&mut session, "I look up", false, Utc::now())
            .await
            .unwrap();
        assert!(silent.audio_url.is_none());
        assert_eq!(speech.calls.load(Ordering::SeqCst), 0);

        let spoken = dm
            .run_turn(&mut session, "I look up again", true, Utc::now())
            .await
            .unwrap();
        assert_eq!(spoken.audio_url.as_deref(), Some("/api/audio/abc123.mp3"));
        assert_eq!(speech.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_response_yields_empty_narrative_and_no_audio() {
        let (_dir, mut session, rules) = seeded_session().await;
        let backend = ScriptedBackend::new(
            vec![ModelResponse {
                text: None,
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: None,
            }],
            true,
        );
        let speech = Arc::new(CountingSpeech {
            calls: AtomicUsize::new(0),
        });
        let dm = DmAgent::new(backend, speech.clone(), rules);

        let outcome = dm
            .run_turn(&mut session, "Hello?", true, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.narrative, "");
        assert!(outcome.audio_url.is_none());
        assert_eq!(speech.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_combat_turns_use_the_combat_budget() {
        let (_dir, mut session, rules) = seeded_session().await;
        session.mechanics.start_combat(&["Thorin".to_string()]);
        let backend = ScriptedBackend::new(
            vec![text_response("Initiative holds.", FinishReason::Stop)],
            true,
        );
        let dm = agent(Arc::clone(&backend), rules);

        dm.run_turn(&mut session, "I look around", false, Utc::now())
            .await
            .unwrap();

        // Combat override: even a look-around is a combat action mid-fight.
        let (request, _) = backend.request(0);
        assert_eq!(request.max_tokens, Some(150));
        let tail = request.system_prompt.unwrap().tail.unwrap();
        assert!(tail.contains("Combat Active: Round 1"));
    }

    #[tokio::test]
    async fn test_completed_quest_is_suggested_not_applied() {
        let (_dir, mut session, rules) = seeded_session().await;
        session
            .state
            .add_quest(Quest::new("rescue_gundren", "Rescue Gundren"))
            .await
            .unwrap();
        let backend = ScriptedBackend::new(
            vec![text_response(
                "You completed the rescue. Gundren is safe at last.",
                FinishReason::Stop,
            )],
            true,
        );
        let dm = agent(backend, rules);

        let outcome = dm
            .run_turn(&mut session, "We head back to town", false, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.quest_updates.len(), 1);
        assert!(matches!(
            outcome.quest_updates[0].action,
            QuestAction::Complete
        ));
        // Suggestion only; the stored quest is untouched.
        assert_eq!(
            session.state.adventure().active_quests[0].status,
            QuestStatus::Active
        );
    }

    #[test]
    fn test_repair_truncated_cuts_to_last_sentence() {
        assert_eq!(
            repair_truncated("The goblin falls. You see a glint of"),
            "The goblin falls. What do you do?"
        );
    }

    #[test]
    fn test_repair_truncated_handles_empty_and_questions() {
        assert_eq!(repair_truncated(""), "What do you do?");
        assert_eq!(repair_truncated("   "), "What do you do?");
        assert_eq!(
            repair_truncated("What will you try next?"),
            "What will you try next?"
        );
        assert_eq!(
            repair_truncated("\"Halt right there!\""),
            "\"Halt right there!\" What do you do?"
        );
    }

    #[test]
    fn test_repair_truncated_without_any_sentence_break() {
        assert_eq!(
            repair_truncated("and then the goblin"),
            "and then the goblin What do you do?"
        );
    }

    #[test]
    fn test_repair_truncated_is_idempotent() {
        for sample in [
            "The goblin falls. You see a glint of",
            "A strange hum fills the chamber",
            "",
            "Done.",
        ] {
            let once = repair_truncated(sample);
            assert_eq!(repair_truncated(&once), once);
        }
    }
}
