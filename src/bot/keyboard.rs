//! Menus attached to replies, and the callback data their buttons carry.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, ReplyMarkup};

use crate::config::Catalog;

const PERSONA_PREFIX: &str = "talk_";
const TOPIC_PREFIX: &str = "quiz_";
const LANGUAGE_PREFIX: &str = "lang_";

/// What a pressed inline button means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackData {
    /// Back to the main menu (also ends random facts and persona talk).
    Start,
    MoreFact,
    EndGpt,
    Persona(String),
    Topic(String),
    NextQuestion,
    ChangeTopic,
    EndQuiz,
    Language(String),
    ChangeLanguage,
    EndTranslate,
    EndVoice,
}

impl CallbackData {
    pub fn parse(data: &str) -> Option<Self> {
        let parsed = match data {
            "start" => Self::Start,
            "random" => Self::MoreFact,
            "break" => Self::EndGpt,
            "quiz_more" => Self::NextQuestion,
            "change_topic" => Self::ChangeTopic,
            "end_quiz" => Self::EndQuiz,
            "change_lang" => Self::ChangeLanguage,
            "main_menu" => Self::EndTranslate,
            "end_voice" => Self::EndVoice,
            _ => {
                let suffix = |prefix: &str| {
                    data.strip_prefix(prefix)
                        .filter(|rest| !rest.is_empty())
                        .map(String::from)
                };
                if let Some(id) = suffix(PERSONA_PREFIX) {
                    Self::Persona(id)
                } else if let Some(id) = suffix(TOPIC_PREFIX) {
                    Self::Topic(id)
                } else if let Some(code) = suffix(LANGUAGE_PREFIX) {
                    Self::Language(code)
                } else {
                    return None;
                }
            }
        };
        Some(parsed)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Start => "start".into(),
            Self::MoreFact => "random".into(),
            Self::EndGpt => "break".into(),
            Self::Persona(id) => format!("{PERSONA_PREFIX}{id}"),
            Self::Topic(id) => format!("{TOPIC_PREFIX}{id}"),
            Self::NextQuestion => "quiz_more".into(),
            Self::ChangeTopic => "change_topic".into(),
            Self::EndQuiz => "end_quiz".into(),
            Self::Language(code) => format!("{LANGUAGE_PREFIX}{code}"),
            Self::ChangeLanguage => "change_lang".into(),
            Self::EndTranslate => "main_menu".into(),
            Self::EndVoice => "end_voice".into(),
        }
    }
}

/// Which keyboard goes under a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    /// Reply keyboard with every command.
    Main,
    RandomFact,
    GptExit,
    Personas,
    TalkExit,
    QuizTopics,
    QuizControl,
    Languages,
    TranslatorControl,
    VoiceControl,
}

/// Captions of the main reply keyboard. Each carries its command so that
/// pressing the button sends something the command parser recognises.
pub const MAIN_MENU_BUTTONS: [&str; 6] = [
    "🎲 /random - Random fact",
    "🤖 /gpt - ChatGPT",
    "👤 /talk - Talk to a persona",
    "🧩 /quiz - Quiz",
    "🌐 /translate - Translator",
    "🎙️ /voice - Voice chat",
];

fn button(text: &str, data: CallbackData) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, data.encode())
}

fn column(buttons: Vec<InlineKeyboardButton>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(buttons.into_iter().map(|b| vec![b]))
}

impl Menu {
    pub fn markup(&self, catalog: &Catalog) -> ReplyMarkup {
        let inline = match self {
            Menu::Main => {
                let rows = MAIN_MENU_BUTTONS
                    .chunks(2)
                    .map(|pair| pair.iter().map(|text| KeyboardButton::new(*text)).collect::<Vec<_>>());
                return ReplyMarkup::Keyboard(KeyboardMarkup::new(rows).resize_keyboard());
            }
            Menu::RandomFact => InlineKeyboardMarkup::new([[
                button("🔁 One more fact", CallbackData::MoreFact),
                button("🏠 Finish", CallbackData::Start),
            ]]),
            Menu::GptExit => InlineKeyboardMarkup::new([[button("🏠 Finish", CallbackData::EndGpt)]]),
            Menu::Personas => column(
                catalog
                    .personas
                    .iter()
                    .map(|p| button(&p.name.to_uppercase(), CallbackData::Persona(p.id.clone())))
                    .collect(),
            ),
            Menu::TalkExit => InlineKeyboardMarkup::new([[button("🏠 Finish", CallbackData::Start)]]),
            Menu::QuizTopics => column(
                catalog
                    .topics
                    .iter()
                    .map(|t| button(&t.label, CallbackData::Topic(t.id.clone())))
                    .collect(),
            ),
            Menu::QuizControl => column(vec![
                button("🔄 Next question", CallbackData::NextQuestion),
                button("🔀 Change topic", CallbackData::ChangeTopic),
                button("🏠 Finish", CallbackData::EndQuiz),
            ]),
            Menu::Languages => {
                let buttons: Vec<_> = catalog
                    .languages
                    .iter()
                    .map(|l| button(&l.label, CallbackData::Language(l.code.clone())))
                    .collect();
                InlineKeyboardMarkup::new(buttons.chunks(2).map(|pair| pair.to_vec()))
            }
            Menu::TranslatorControl => InlineKeyboardMarkup::new([[
                button("🔀 Change language", CallbackData::ChangeLanguage),
                button("🏠 Finish", CallbackData::EndTranslate),
            ]]),
            Menu::VoiceControl => InlineKeyboardMarkup::new([[button("🏠 Finish", CallbackData::EndVoice)]]),
        };
        ReplyMarkup::InlineKeyboard(inline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(markup: &ReplyMarkup) -> Vec<String> {
        let ReplyMarkup::InlineKeyboard(inline) = markup else {
            panic!("expected inline keyboard");
        };
        inline
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                other => panic!("unexpected button kind {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_callback_data_round_trips_through_buttons() {
        let catalog = Catalog::default();
        for menu in [
            Menu::RandomFact,
            Menu::GptExit,
            Menu::Personas,
            Menu::TalkExit,
            Menu::QuizTopics,
            Menu::QuizControl,
            Menu::Languages,
            Menu::TranslatorControl,
            Menu::VoiceControl,
        ] {
            for data in callback_data(&menu.markup(&catalog)) {
                let parsed = CallbackData::parse(&data).unwrap_or_else(|| panic!("{menu:?}: {data}"));
                assert_eq!(parsed.encode(), data);
            }
        }
    }

    #[test]
    fn test_parse_prefixed() {
        assert_eq!(CallbackData::parse("talk_hawking"), Some(CallbackData::Persona("hawking".into())));
        assert_eq!(CallbackData::parse("quiz_math"), Some(CallbackData::Topic("math".into())));
        assert_eq!(CallbackData::parse("quiz_more"), Some(CallbackData::NextQuestion));
        assert_eq!(CallbackData::parse("lang_french"), Some(CallbackData::Language("french".into())));
        assert_eq!(CallbackData::parse("lang_"), None);
        assert_eq!(CallbackData::parse("whatever"), None);
    }

    #[test]
    fn test_persona_menu_lists_catalog() {
        let catalog = Catalog::default();
        let data = callback_data(&Menu::Personas.markup(&catalog));
        assert_eq!(data.len(), catalog.personas.len());
        assert_eq!(data[0], "talk_cobain");
    }

    #[test]
    fn test_languages_two_per_row() {
        let catalog = Catalog::default();
        let ReplyMarkup::InlineKeyboard(inline) = Menu::Languages.markup(&catalog) else {
            panic!("expected inline keyboard");
        };
        assert_eq!(inline.inline_keyboard.len(), 4);
        assert!(inline.inline_keyboard.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_main_menu_is_reply_keyboard() {
        let ReplyMarkup::Keyboard(keyboard) = Menu::Main.markup(&Catalog::default()) else {
            panic!("expected reply keyboard");
        };
        assert_eq!(keyboard.keyboard.len(), 3);
        assert_eq!(keyboard.keyboard[0][0].text, MAIN_MENU_BUTTONS[0]);
    }
}
