//! Test doubles shared by the bot's unit, scenario and integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::ai::{Assistant, Error, Turn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub complete: usize,
    pub transcribe: usize,
    pub synthesize: usize,
}

#[derive(Default)]
struct State {
    replies: VecDeque<Result<String, Error>>,
    prompts: Vec<Vec<Turn>>,
    audio_names: Vec<String>,
    calls: Calls,
}

/// Scripted `Assistant`. Completions pop queued replies in order and fall back
/// to a fixed answer once the queue is empty.
pub struct FakeAssistant {
    state: Mutex<State>,
    transcription: Result<String, Error>,
    synthesis: Result<Vec<u8>, Error>,
}

pub const DEFAULT_REPLY: &str = "fake reply";
pub const FAKE_AUDIO: &[u8] = b"OggS fake opus";

impl FakeAssistant {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            transcription: Ok("fake transcription".to_string()),
            synthesis: Ok(FAKE_AUDIO.to_vec()),
        }
    }

    /// Queue a successful completion.
    pub fn reply(self, text: &str) -> Self {
        self.state.lock().unwrap().replies.push_back(Ok(text.to_string()));
        self
    }

    /// Queue a failed completion.
    pub fn fail(self, error: Error) -> Self {
        self.state.lock().unwrap().replies.push_back(Err(error));
        self
    }

    pub fn transcription(mut self, text: &str) -> Self {
        self.transcription = Ok(text.to_string());
        self
    }

    pub fn transcription_error(mut self, error: Error) -> Self {
        self.transcription = Err(error);
        self
    }

    pub fn synthesis_error(mut self, error: Error) -> Self {
        self.synthesis = Err(error);
        self
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls
    }

    /// Every completion request, in order.
    pub fn prompts(&self) -> Vec<Vec<Turn>> {
        self.state.lock().unwrap().prompts.clone()
    }

    pub fn last_prompt(&self) -> Option<Vec<Turn>> {
        self.state.lock().unwrap().prompts.last().cloned()
    }

    pub fn last_audio_name(&self) -> Option<String> {
        self.state.lock().unwrap().audio_names.last().cloned()
    }
}

impl Assistant for FakeAssistant {
    async fn complete(&self, turns: &[Turn]) -> Result<String, Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.complete += 1;
        state.prompts.push(turns.to_vec());
        state.replies.pop_front().unwrap_or_else(|| Ok(DEFAULT_REPLY.to_string()))
    }

    async fn transcribe(&self, _audio: Vec<u8>, file_name: &str) -> Result<String, Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.transcribe += 1;
        state.audio_names.push(file_name.to_string());
        self.transcription.clone()
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, Error> {
        self.state.lock().unwrap().calls.synthesize += 1;
        self.synthesis.clone()
    }
}
