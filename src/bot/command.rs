//! Bot commands and how they are spotted in incoming text.

use std::sync::LazyLock;

use regex::Regex;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "main menu")]
    Start,
    #[command(description = "a random fact")]
    Random,
    #[command(description = "chat with ChatGPT")]
    Gpt,
    #[command(description = "talk to a famous persona")]
    Talk,
    #[command(description = "quiz on a topic of your choice")]
    Quiz,
    #[command(description = "translator")]
    Translate,
    #[command(description = "voice chat")]
    Voice,
}

/// `/name` or `/name@bot` as a standalone word anywhere in the text.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)/([A-Za-z]+)(?:@([A-Za-z0-9_]+))?(?:\s|$)").expect("static regex")
});

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "random" => Some(Self::Random),
            "gpt" => Some(Self::Gpt),
            "talk" => Some(Self::Talk),
            "quiz" => Some(Self::Quiz),
            "translate" => Some(Self::Translate),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }

    /// Find the first known command in `text`.
    ///
    /// Commands addressed to another bot (`/quiz@other_bot`) are ignored when
    /// our username is known. Main-menu captions such as "🧩 /quiz - Quiz"
    /// resolve to their command.
    pub fn detect(text: &str, bot_username: Option<&str>) -> Option<Self> {
        COMMAND_RE.captures_iter(text).find_map(|caps| {
            if let (Some(mention), Some(ours)) = (caps.get(2), bot_username)
                && !mention.as_str().eq_ignore_ascii_case(ours)
            {
                return None;
            }
            Self::from_name(&caps[1])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::keyboard::MAIN_MENU_BUTTONS;

    #[test]
    fn test_plain_commands() {
        assert_eq!(Command::detect("/start", None), Some(Command::Start));
        assert_eq!(Command::detect("/QUIZ", None), Some(Command::Quiz));
        assert_eq!(Command::detect("/translate please", None), Some(Command::Translate));
    }

    #[test]
    fn test_main_menu_captions() {
        let expected = [
            Command::Random,
            Command::Gpt,
            Command::Talk,
            Command::Quiz,
            Command::Translate,
            Command::Voice,
        ];
        for (caption, command) in MAIN_MENU_BUTTONS.iter().zip(expected) {
            assert_eq!(Command::detect(caption, None), Some(command), "{caption}");
        }
    }

    #[test]
    fn test_bot_mentions() {
        assert_eq!(Command::detect("/gpt@my_bot", Some("my_bot")), Some(Command::Gpt));
        assert_eq!(Command::detect("/gpt@My_Bot", Some("my_bot")), Some(Command::Gpt));
        assert_eq!(Command::detect("/gpt@other_bot", Some("my_bot")), None);
        assert_eq!(Command::detect("/gpt@other_bot", None), Some(Command::Gpt));
    }

    #[test]
    fn test_not_commands() {
        assert_eq!(Command::detect("tell me about quiz shows", None), None);
        assert_eq!(Command::detect("path/voice/file", None), None);
        assert_eq!(Command::detect("/unknown", None), None);
        assert_eq!(Command::detect("", None), None);
    }

    #[test]
    fn test_descriptions_list_every_command() {
        let descriptions = Command::descriptions().to_string();
        for name in ["/start", "/random", "/gpt", "/talk", "/quiz", "/translate", "/voice"] {
            assert!(descriptions.contains(name), "{name} missing");
        }
    }
}
