//! Telegram side: turning updates into events and replies into API calls.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, FileId, InputFile, ReplyMarkup};
use tracing::{info, warn};

use crate::bot::audio::VoiceClip;
use crate::bot::command::Command;
use crate::bot::keyboard::CallbackData;
use crate::bot::reply::{Outbound, Reply};
use crate::bot::router::Event;
use crate::config::Catalog;

/// Telegram rejects longer text messages.
pub const MAX_MESSAGE_CHARS: usize = 4096;
/// Captions are limited separately.
pub const MAX_CAPTION_CHARS: usize = 1024;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    catalog: Catalog,
}

impl TelegramClient {
    pub fn new(bot: Bot, catalog: Catalog) -> Self {
        Self { bot, catalog }
    }

    /// Classify an incoming message. Voice notes carry a download that only
    /// runs if the clip gets past the duration check.
    pub fn event_from_message(&self, msg: &Message, bot_username: Option<&str>) -> Event {
        if let Some(voice) = msg.voice() {
            return Event::Voice(VoiceClip {
                duration_secs: voice.duration.seconds(),
                download: self.download(voice.file.id.clone()),
            });
        }

        match msg.text() {
            Some(text) => match Command::detect(text, bot_username) {
                Some(command) => Event::Command(command),
                None => Event::Text(text.to_string()),
            },
            None => Event::Unsupported,
        }
    }

    fn download(&self, file_id: FileId) -> crate::bot::audio::Download {
        let bot = self.bot.clone();
        Box::pin(async move {
            let file = bot
                .get_file(file_id)
                .await
                .map_err(|e| format!("Failed to get file info: {e}"))?;

            let mut data = Vec::new();
            bot.download_file(&file.path, &mut data)
                .await
                .map_err(|e| format!("Failed to download file: {e}"))?;
            Ok(data)
        })
    }

    /// Send everything in `reply` to `chat_id`, then answer the callback
    /// query if there was one. A failed item is logged and the rest still go out.
    pub async fn deliver(&self, chat_id: ChatId, reply: Reply, callback: Option<CallbackQueryId>) {
        if let Some(id) = callback
            && let Err(e) = self.answer_callback(id, reply.alert.as_deref()).await
        {
            warn!("{e}");
        }

        for item in reply.items {
            if let Err(e) = self.send(chat_id, item).await {
                warn!("{e}");
            }
        }
    }

    async fn answer_callback(&self, id: CallbackQueryId, alert: Option<&str>) -> Result<(), String> {
        let mut request = self.bot.answer_callback_query(id);
        if let Some(text) = alert {
            request = request.text(text).show_alert(true);
        }
        request.await.map(|_| ()).map_err(|e| format!("Failed to answer callback: {e}"))
    }

    async fn send(&self, chat_id: ChatId, item: Outbound) -> Result<(), String> {
        match item {
            Outbound::Text { text, menu } => {
                let markup = menu.map(|m| m.markup(&self.catalog));
                self.send_text(chat_id, &text, markup).await
            }
            Outbound::Photo { path, caption, menu } => {
                info!("📷 Sending {} to chat {}", path.display(), chat_id);
                let mut request = self.bot.send_photo(chat_id, InputFile::file(path));
                if let Some(caption) = caption {
                    request = request.caption(truncate(&caption, MAX_CAPTION_CHARS));
                }
                if let Some(menu) = menu {
                    request = request.reply_markup(menu.markup(&self.catalog));
                }
                request.await.map(|_| ()).map_err(|e| format!("Failed to send photo: {e}"))
            }
            Outbound::Voice { audio, menu } => {
                info!("🔊 Sending voice to chat {} ({} bytes)", chat_id, audio.len());
                let file = InputFile::memory(audio).file_name("voice.ogg");
                let mut request = self.bot.send_voice(chat_id, file);
                if let Some(menu) = menu {
                    request = request.reply_markup(menu.markup(&self.catalog));
                }
                request.await.map(|_| ()).map_err(|e| format!("Failed to send voice: {e}"))
            }
        }
    }

    /// Long text goes out in several messages; the keyboard rides on the last one.
    async fn send_text(&self, chat_id: ChatId, text: &str, markup: Option<ReplyMarkup>) -> Result<(), String> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut request = self.bot.send_message(chat_id, chunk);
            if i == last
                && let Some(ref markup) = markup
            {
                request = request.reply_markup(markup.clone());
            }
            request.await.map_err(|e| format!("Failed to send: {e}"))?;
        }
        Ok(())
    }
}

/// Parse callback data, keeping the raw string when it is not ours.
pub fn event_from_callback(data: Option<&str>) -> Event {
    let data = data.unwrap_or_default();
    match CallbackData::parse(data) {
        Some(parsed) => Event::Callback(parsed),
        None => Event::UnknownCallback(data.to_string()),
    }
}

/// Split on line breaks where possible, never inside a character.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // One line longer than a message: hard split
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars - 1).collect();
    cut.push('…');
    cut
}
