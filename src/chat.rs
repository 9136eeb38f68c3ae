use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{CHAT_FALLBACK_REPLY, CHAT_GREETING, CHAT_SYSTEM_PROMPT};
use crate::llm::gemini::GeminiClient;
use crate::poster::types::ChatMessage;

/// Assistant conversation. The transcript is what the user sees; the history
/// is what the model has seen and only grows on successful turns.
pub struct ChatSession {
    client: GeminiClient,
    system_instruction: String,
    transcript: Mutex<Vec<ChatMessage>>,
    history: Mutex<Vec<ChatMessage>>,
    typing: AtomicBool,
}

/// Clears the typing flag however the send ends.
struct TypingGuard<'a>(&'a AtomicBool);

impl Drop for TypingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChatSession {
    pub fn new(client: GeminiClient) -> Self {
        Self::with_system_instruction(client, CHAT_SYSTEM_PROMPT)
    }

    pub fn with_system_instruction(client: GeminiClient, system_instruction: &str) -> Self {
        Self {
            client,
            system_instruction: system_instruction.to_string(),
            transcript: Mutex::new(vec![ChatMessage::model(CHAT_GREETING)]),
            history: Mutex::new(Vec::new()),
            typing: AtomicBool::new(false),
        }
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.lock().clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }

    /// Sends one user message and returns the reply shown to the user.
    ///
    /// Blank input, or a call while another send is in flight, returns `None`.
    pub async fn send(&self, text: &str) -> Option<String> {
        let user_text = text.trim();
        if user_text.is_empty() {
            return None;
        }
        if self
            .typing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let _typing = TypingGuard(&self.typing);

        let user_message = ChatMessage::user(user_text);
        self.transcript.lock().push(user_message.clone());

        let mut request = self.history.lock().clone();
        request.push(user_message.clone());

        let reply = match self
            .client
            .generate_text(&self.system_instruction, &request)
            .await
        {
            Ok(reply) => {
                let mut history = self.history.lock();
                history.push(user_message);
                history.push(ChatMessage::model(reply.clone()));
                info!("Chat reply received ({} turns in history)", history.len());
                reply
            }
            Err(err) => {
                warn!("Chat request failed: {}", err);
                CHAT_FALLBACK_REPLY.to_string()
            }
        };

        self.transcript.lock().push(ChatMessage::model(reply.clone()));
        Some(reply)
    }
}
