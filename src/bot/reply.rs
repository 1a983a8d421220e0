//! What handlers send back, independent of Telegram.

use std::path::PathBuf;

use crate::bot::keyboard::Menu;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text { text: String, menu: Option<Menu> },
    Photo { path: PathBuf, caption: Option<String>, menu: Option<Menu> },
    Voice { audio: Vec<u8>, menu: Option<Menu> },
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into(), menu: None }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self::Text { text: text.into(), menu: Some(menu) }
    }

    pub fn photo(path: PathBuf) -> Self {
        Self::Photo { path, caption: None, menu: None }
    }

    pub fn voice(audio: Vec<u8>, menu: Menu) -> Self {
        Self::Voice { audio, menu: Some(menu) }
    }

    /// What the user reads: the message text or the photo caption.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::Photo { caption, .. } => caption.as_deref(),
            Self::Voice { .. } => None,
        }
    }

    pub fn menu(&self) -> Option<Menu> {
        match self {
            Self::Text { menu, .. } | Self::Photo { menu, .. } | Self::Voice { menu, .. } => *menu,
        }
    }
}

/// Everything produced for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub items: Vec<Outbound>,
    /// Text for the callback-query popup, shown as an alert.
    pub alert: Option<String>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Outbound) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { items: vec![Outbound::text(text)], alert: None }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self { items: vec![Outbound::with_menu(text, menu)], alert: None }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self { items: Vec::new(), alert: Some(text.into()) }
    }

    /// All text replies joined, for logging and assertions.
    pub fn texts(&self) -> Vec<&str> {
        self.items.iter().filter_map(Outbound::as_text).collect()
    }

    pub fn last_menu(&self) -> Option<Menu> {
        self.items.iter().rev().find_map(Outbound::menu)
    }
}
