//! Conversation state for a single query.

use std::collections::HashSet;

use crate::llm::{ContentBlock, Message, Role};
use crate::{Error, Result};

/// An ordered message list that keeps roles alternating and every tool result
/// paired with an earlier tool use.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    tool_use_ids: HashSet<String>,
}

impl Conversation {
    /// Start a conversation with the user's query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(query)],
            tool_use_ids: HashSet::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if self.messages.last().map(|last| last.role) == Some(message.role) {
            return Err(Error::InvalidState(format!(
                "two consecutive {:?} messages",
                message.role
            )));
        }

        for block in &message.content {
            if let ContentBlock::ToolResult { tool_use_id, .. } = block {
                if message.role != Role::User {
                    return Err(Error::InvalidState(
                        "tool results must come from the user".into(),
                    ));
                }
                if !self.tool_use_ids.contains(tool_use_id) {
                    return Err(Error::InvalidState(format!(
                        "tool result for unknown tool use {tool_use_id}"
                    )));
                }
            }
        }

        self.tool_use_ids
            .extend(message.tool_use_ids().map(str::to_string));
        self.messages.push(message);
        Ok(())
    }
}
