//! Prompt construction
//!
//! Llama 2 chat models expect the conversation to be folded into a single
//! string using `[INST]` / `<<SYS>>` markers.

use super::types::{CompletionRequest, Role};

/// Greeting the model must repeat verbatim when a conversation starts
pub const OPENING_GREETING: &str = "Hello! I am an AI assistant, I Dey Play I Dey Show";

/// Instructions prepended to every conversation. Never stored in history.
pub const SYSTEM_PROMPT: &str = "You're a helpful assistant. Always start the conversation using the \
text delimited by triple backticks as is. Answer questions as comprehensively \
and informatively as possible, but be brief. If a question lacks clarity or \
factual grounding, explain the limitations instead of providing inaccurate information. \
If you don't know the answer, say that you don't know. If you're unsure about \
something, don't resort to making things up.
```Hello! I am an AI assistant, I Dey Play I Dey Show```";

const SYS_BEGIN: &str = "<s>[INST] <<SYS>>\n";
const SYS_END: &str = "\n<</SYS>>\n\n";
const USER_BEGIN: &str = "<s>[INST] ";
const USER_END: &str = " [/INST]";
const AI_BEGIN: &str = " ";
const AI_END: &str = " </s>";

/// Render a request in the Llama 2 chat format.
///
/// The first human turn directly follows the system block inside the same
/// `[INST]`; every later human turn opens a new `<s>[INST]`.
pub fn llama2_chat_prompt(request: &CompletionRequest) -> String {
    let mut prompt = String::new();
    let mut after_system = false;

    for turn in request.turns() {
        match turn.role {
            Role::System => {
                prompt.push_str(SYS_BEGIN);
                prompt.push_str(&turn.content);
                prompt.push_str(SYS_END);
                after_system = true;
            }
            Role::Human => {
                if !after_system {
                    prompt.push_str(USER_BEGIN);
                }
                prompt.push_str(&turn.content);
                prompt.push_str(USER_END);
                after_system = false;
            }
            Role::Assistant => {
                prompt.push_str(AI_BEGIN);
                prompt.push_str(&turn.content);
                prompt.push_str(AI_END);
                after_system = false;
            }
        }
    }

    prompt
}
